//! Highway transfer node binary.
//!
//! Resolves transfer servers through the encrypted service directory and
//! uploads local files to them over the chunked highway protocol.

use anyhow::{bail, Context};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use msf_directory::DirectoryClient;
use msf_session::{HighwaySession, SessionConfig};
use msf_wire::{ChunkPackets, UploadObject};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[macro_use]
mod logging;
mod config;
mod reader;

use config::TransferConfig;
use logging::TransferLogFormatter;

/// Highway upload and service-directory client
#[derive(Parser, Debug)]
#[command(name = "msf-transfer", version, about = "Highway upload and service-directory client")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the transfer server list from the directory
    Servers,

    /// Upload a file to a transfer server
    Upload {
        /// File to upload
        #[arg(long)]
        file: PathBuf,

        /// Transfer server, e.g. 183.3.235.62:80; resolved from the directory when omitted
        #[arg(long)]
        server: Option<SocketAddr>,

        /// Per-object service ticket, hex encoded
        #[arg(long)]
        key: String,

        /// Upload command id (defaults to the configured one)
        #[arg(long)]
        command_id: Option<u32>,

        /// Starting sequence number (random when omitted)
        #[arg(long)]
        sequence: Option<u16>,

        /// Upload deadline, e.g. 30s (defaults to the configured one)
        #[arg(long)]
        timeout: Option<humantime::Duration>,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("msf_transfer={}", args.log_level).parse()?)
        .add_directive(format!("msf_session={}", args.log_level).parse()?)
        .add_directive(format!("msf_wire={}", args.log_level).parse()?)
        .add_directive(format!("msf_directory={}", args.log_level).parse()?);

    let formatter = TransferLogFormatter::new("msf-transfer".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true)
        .event_format(formatter)
        .init();

    info!("Starting msf-transfer v{}", env!("CARGO_PKG_VERSION"));

    let config = TransferConfig::load_from_file(&args.config)?;

    match args.command {
        Command::Servers => list_servers(&config).await,
        Command::Upload {
            file,
            server,
            key,
            command_id,
            sequence,
            timeout,
        } => {
            let request = UploadRequest {
                file,
                server,
                key,
                command_id: command_id.unwrap_or(config.upload.command_id),
                sequence,
                timeout: timeout.map(Duration::from).unwrap_or(config.upload.timeout()),
            };
            upload(&config, request).await
        }
    }
}

struct UploadRequest {
    file: PathBuf,
    server: Option<SocketAddr>,
    key: String,
    command_id: u32,
    sequence: Option<u16>,
    timeout: Duration,
}

async fn list_servers(config: &TransferConfig) -> anyhow::Result<()> {
    let client = DirectoryClient::new(config.directory.clone())?;
    let servers = client
        .fetch_servers(&config.identity)
        .await
        .context("server list request failed")?;

    for server in &servers {
        println!("{}", server);
    }
    Ok(())
}

async fn resolve_server(config: &TransferConfig) -> anyhow::Result<SocketAddr> {
    let client = DirectoryClient::new(config.directory.clone())?;
    let servers = client
        .fetch_servers(&config.identity)
        .await
        .context("server list request failed")?;

    for server in &servers {
        match server.socket_addr() {
            Some(addr) => {
                component_info!("directory", "Using transfer server {}", addr);
                return Ok(addr);
            }
            None => component_warn!("directory", "Skipping non-IPv4 transfer server {}", server),
        }
    }
    bail!("directory returned no usable transfer server")
}

async fn upload(config: &TransferConfig, request: UploadRequest) -> anyhow::Result<()> {
    let key = hex::decode(request.key.trim()).context("--key must be hex encoded")?;
    let buffer = reader::read_bounded(&request.file, config.upload.max_file_bytes).await?;

    let addr = match request.server {
        Some(addr) => addr,
        None => resolve_server(config).await?,
    };

    component_debug!(
        "upload",
        "Read {} bytes, service ticket is {} bytes",
        buffer.len(),
        key.len()
    );

    let object = UploadObject::new(buffer, Bytes::from(key));
    let identity = &config.identity;
    let frames = match request.sequence {
        Some(start) => ChunkPackets::new(&object, identity, request.command_id, start),
        None => object.packets(identity, request.command_id),
    };

    component_info!(
        "upload",
        "Uploading {} ({} bytes, md5 {}) to {} in {} frames",
        request.file.display(),
        object.len(),
        hex::encode(object.digest()),
        addr,
        frames.len()
    );

    let session = HighwaySession::new(SessionConfig {
        ack_buffer_size: config.upload.ack_buffer_size,
    });
    let report = match tokio::time::timeout(request.timeout, session.upload(addr, frames)).await {
        Ok(report) => report,
        Err(_) => bail!("upload to {} timed out after {:?}", addr, request.timeout),
    };

    if !report.is_complete() {
        component_error!(
            "upload",
            "Upload {}: {}/{} frames acknowledged",
            report.outcome,
            report.frames_acked,
            report.total_frames
        );
        bail!("upload to {} {}", addr, report.outcome);
    }

    component_info!(
        "upload",
        "Upload complete: {} frames, {} bytes in {:?}",
        report.frames_acked,
        report.bytes_sent,
        report.elapsed
    );
    Ok(())
}
