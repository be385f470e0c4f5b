//! Highway upload session.
//!
//! This module drives one upload to one transfer server: connect, write a
//! frame, wait for any reply, repeat until every frame has been acknowledged.
//! The next action is decided by [`PumpState::on_event`] from the current
//! state and the last I/O event only; the async driver performs the I/O the
//! state asks for.

use bytes::Bytes;
use msf_wire::Frame;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

use crate::transport::connect_tcp;

/// Configuration for a highway session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Size of the buffer acknowledgements are read into
    pub ack_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ack_buffer_size: 1024,
        }
    }
}

/// Pump states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    /// Nothing started
    Idle,
    /// Waiting for the TCP connection
    Connecting,
    /// Frame `i` is to be written
    Sending(usize),
    /// Frame `i` was written; waiting for any reply
    WaitingAck(usize),
    /// Every frame was acknowledged
    Done,
    /// Connection closed or errored before completion
    Failed,
}

/// I/O events fed into the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpEvent {
    /// Upload requested
    Start,
    /// Connection established
    Connected,
    /// The current frame was fully written
    Written,
    /// Bytes arrived from the server
    DataReceived(usize),
    /// Server closed the connection
    Closed,
    /// Transport error
    Error(String),
}

impl PumpState {
    /// Compute the next state.
    ///
    /// Terminal states absorb every event. `Closed` and `Error` end the pump
    /// from any live state.
    pub fn on_event(self, event: &PumpEvent, total_frames: usize) -> PumpState {
        use PumpState::*;

        match (self, event) {
            (Done, _) | (Failed, _) => self,
            (_, PumpEvent::Closed) | (_, PumpEvent::Error(_)) => Failed,
            (Idle, PumpEvent::Start) => Connecting,
            (Connecting, PumpEvent::Connected) if total_frames == 0 => Done,
            (Connecting, PumpEvent::Connected) => Sending(0),
            (Sending(i), PumpEvent::Written) => WaitingAck(i),
            (WaitingAck(i), PumpEvent::DataReceived(n)) if *n > 0 => {
                if i + 1 < total_frames {
                    Sending(i + 1)
                } else {
                    Done
                }
            }
            (state, _) => state,
        }
    }

    /// Whether the pump has stopped
    pub fn is_terminal(self) -> bool {
        matches!(self, PumpState::Done | PumpState::Failed)
    }
}

/// How an upload ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Every frame was acknowledged
    Completed,
    /// The server closed the connection before the last acknowledgement
    ClosedEarly,
    /// Connect or I/O failure
    Failed(String),
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadOutcome::Completed => write!(f, "completed"),
            UploadOutcome::ClosedEarly => write!(f, "closed early"),
            UploadOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Summary of one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Frames the upload consisted of
    pub total_frames: usize,
    /// Frames fully written
    pub frames_sent: usize,
    /// Frames answered by the server
    pub frames_acked: usize,
    /// Encoded bytes written
    pub bytes_sent: u64,
    /// Wall time from start to finish
    pub elapsed: Duration,
    /// Terminal outcome
    pub outcome: UploadOutcome,
}

impl UploadReport {
    /// Whether the server acknowledged every frame
    pub fn is_complete(&self) -> bool {
        self.outcome == UploadOutcome::Completed
    }
}

/// Highway upload session
pub struct HighwaySession {
    config: SessionConfig,
}

impl HighwaySession {
    /// Create a session with the given configuration
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Upload `frames` to the transfer server at `addr`.
    ///
    /// Never returns an error: connect failures, transport errors and early
    /// closure are reported through [`UploadReport::outcome`]. There is no
    /// timeout here; wrap the future in one if needed.
    pub async fn upload<I>(&self, addr: SocketAddr, frames: I) -> UploadReport
    where
        I: IntoIterator<Item = Frame>,
        I::IntoIter: ExactSizeIterator,
    {
        let started = Instant::now();
        let frames = frames.into_iter();
        let total = frames.len();
        let state = PumpState::Idle.on_event(&PumpEvent::Start, total);

        info!("Starting highway upload of {} frames to {}", total, addr);

        let stream = match connect_tcp(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to connect to transfer server {}: {}", addr, e);
                return UploadReport {
                    total_frames: total,
                    frames_sent: 0,
                    frames_acked: 0,
                    bytes_sent: 0,
                    elapsed: started.elapsed(),
                    outcome: UploadOutcome::Failed(e.to_string()),
                };
            }
        };

        let state = state.on_event(&PumpEvent::Connected, total);
        let report = self.pump(stream, frames, total, state, started).await;

        info!(
            "Highway upload to {} {} ({}/{} frames acknowledged, {} bytes in {:?})",
            addr, report.outcome, report.frames_acked, total, report.bytes_sent, report.elapsed
        );
        report
    }

    /// Upload over an already connected stream
    pub async fn upload_over<S, I>(&self, stream: S, frames: I) -> UploadReport
    where
        S: AsyncRead + AsyncWrite + Unpin,
        I: IntoIterator<Item = Frame>,
        I::IntoIter: ExactSizeIterator,
    {
        let started = Instant::now();
        let frames = frames.into_iter();
        let total = frames.len();
        let state = PumpState::Idle
            .on_event(&PumpEvent::Start, total)
            .on_event(&PumpEvent::Connected, total);
        self.pump(stream, frames, total, state, started).await
    }

    async fn pump<S, I>(
        &self,
        mut stream: S,
        mut frames: I,
        total: usize,
        mut state: PumpState,
        started: Instant,
    ) -> UploadReport
    where
        S: AsyncRead + AsyncWrite + Unpin,
        I: Iterator<Item = Frame>,
    {
        let mut ack_buf = vec![0u8; self.config.ack_buffer_size.max(1)];
        let mut frames_sent = 0;
        let mut frames_acked = 0;
        let mut bytes_sent = 0u64;
        let mut last_event = PumpEvent::Connected;

        while !state.is_terminal() {
            let event = match state {
                PumpState::Sending(i) => match next_encoded(&mut frames) {
                    Ok(bytes) => match stream.write_all(&bytes).await {
                        Ok(()) => {
                            frames_sent += 1;
                            bytes_sent += bytes.len() as u64;
                            debug!("Sent frame {}/{} ({} bytes)", i + 1, total, bytes.len());
                            PumpEvent::Written
                        }
                        Err(e) => PumpEvent::Error(e.to_string()),
                    },
                    Err(reason) => PumpEvent::Error(reason),
                },
                PumpState::WaitingAck(i) => match stream.read(&mut ack_buf).await {
                    Ok(0) => {
                        debug!("Server closed connection while frame {} was outstanding", i + 1);
                        PumpEvent::Closed
                    }
                    Ok(n) => {
                        frames_acked += 1;
                        trace!("Received {} byte reply to frame {}", n, i + 1);
                        PumpEvent::DataReceived(n)
                    }
                    Err(e) => PumpEvent::Error(e.to_string()),
                },
                PumpState::Idle | PumpState::Connecting => {
                    PumpEvent::Error(format!("pump entered in state {:?}", state))
                }
                PumpState::Done | PumpState::Failed => break,
            };

            state = state.on_event(&event, total);
            last_event = event;
        }

        let outcome = match (state, last_event) {
            (PumpState::Done, _) => {
                if let Err(e) = stream.shutdown().await {
                    trace!("Shutdown after final acknowledgement failed: {}", e);
                }
                UploadOutcome::Completed
            }
            (_, PumpEvent::Error(reason)) => {
                warn!("Highway upload failed: {}", reason);
                UploadOutcome::Failed(reason)
            }
            _ => UploadOutcome::ClosedEarly,
        };

        UploadReport {
            total_frames: total,
            frames_sent,
            frames_acked,
            bytes_sent,
            elapsed: started.elapsed(),
            outcome,
        }
    }
}

impl Default for HighwaySession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

fn next_encoded<I: Iterator<Item = Frame>>(frames: &mut I) -> Result<Bytes, String> {
    let frame = frames
        .next()
        .ok_or_else(|| "frame source ended early".to_string())?;
    frame.encode().map_err(|e| e.to_string())
}
