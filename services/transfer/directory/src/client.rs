//! HTTP client for the service directory.

use crate::address::ServerEntry;
use crate::error::DirectoryError;
use crate::request::{encrypt_request, parse_response};
use msf_wire::{ClientIdentity, TeaKey};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Production server-list endpoint
pub const DIRECTORY_URL: &str = "https://configsvr.msf.3g.qq.com/configsvr/serverlist.jsp";

/// Key shared by every client and the directory server
pub const DIRECTORY_KEY: TeaKey = TeaKey::new([
    0xF0, 0x44, 0x1F, 0x5F, 0xF4, 0x2D, 0xA5, 0x8F, 0xDC, 0xF7, 0x94, 0x9A, 0xBA, 0x62, 0xD4,
    0x11,
]);

/// Default deadline for one server-list exchange, in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Directory client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Server-list endpoint
    pub url: String,
    /// Deadline covering connect, request and response
    pub timeout_ms: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: DIRECTORY_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl DirectoryConfig {
    /// Exchange deadline
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Resolves transfer servers from the directory
pub struct DirectoryClient {
    http: reqwest::Client,
    config: DirectoryConfig,
    key: TeaKey,
}

impl DirectoryClient {
    /// Create a client using the shared directory key
    pub fn new(config: DirectoryConfig) -> Result<Self, DirectoryError> {
        Self::with_key(config, DIRECTORY_KEY)
    }

    /// Create a client with a different key
    pub fn with_key(config: DirectoryConfig, key: TeaKey) -> Result<Self, DirectoryError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { http, config, key })
    }

    /// Fetch the transfer server list.
    ///
    /// The whole exchange is bounded by the configured timeout. When it
    /// expires the in-flight request is dropped and `Timeout` is returned.
    pub async fn fetch_servers(
        &self,
        identity: &ClientIdentity,
    ) -> Result<Vec<ServerEntry>, DirectoryError> {
        let deadline = self.config.timeout();
        let started = Instant::now();

        match tokio::time::timeout(deadline, self.exchange(identity)).await {
            Ok(Ok(servers)) => {
                info!(
                    "Resolved {} transfer servers in {:?}",
                    servers.len(),
                    started.elapsed()
                );
                Ok(servers)
            }
            Ok(Err(e)) => {
                warn!("Server list request to {} failed: {}", self.config.url, e);
                Err(e)
            }
            Err(_) => {
                warn!(
                    "Server list request to {} timed out after {:?}",
                    self.config.url, deadline
                );
                Err(DirectoryError::Timeout(deadline))
            }
        }
    }

    async fn exchange(&self, identity: &ClientIdentity) -> Result<Vec<ServerEntry>, DirectoryError> {
        let body = encrypt_request(identity, &self.key);
        debug!(
            "Posting {} byte server list request to {}",
            body.len(),
            self.config.url
        );

        let response = self.http.post(&self.config.url).body(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }

        let raw = response.bytes().await?;
        debug!("Received {} byte server list response", raw.len());
        parse_response(&raw, &self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::IpField;
    use crate::request::{encode_request, encrypt_response};
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use bytes::Bytes;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    const PATH: &str = "/configsvr/serverlist.jsp";

    /// Canned directory answer plus a record of the bodies it received
    #[derive(Clone)]
    struct FakeDirectory {
        status: StatusCode,
        response: Bytes,
        requests: mpsc::UnboundedSender<Bytes>,
    }

    async fn serverlist(
        State(directory): State<FakeDirectory>,
        body: Bytes,
    ) -> (StatusCode, Bytes) {
        let _ = directory.requests.send(body);
        (directory.status, directory.response.clone())
    }

    async fn spawn_directory(app: Router) -> DirectoryConfig {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        DirectoryConfig {
            url: format!("http://{}{}", addr, PATH),
            ..DirectoryConfig::default()
        }
    }

    async fn serve_once(
        status: StatusCode,
        response: Vec<u8>,
    ) -> (DirectoryConfig, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new()
            .route(PATH, post(serverlist))
            .with_state(FakeDirectory {
                status,
                response: Bytes::from(response),
                requests: tx,
            });
        (spawn_directory(app).await, rx)
    }

    fn identity() -> ClientIdentity {
        ClientIdentity {
            uin: 42,
            sub_app_id: 537064989,
            imei: "358240051111110".to_string(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = DirectoryConfig::default();
        assert_eq!(config.url, DIRECTORY_URL);
        assert_eq!(config.timeout(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_fetch_servers() {
        let response = encrypt_response(
            &[
                (IpField::Packed(0x3EEB03B7), 80),
                (IpField::from("14.17.32.10"), 8080),
            ],
            &DIRECTORY_KEY,
        );
        let (config, mut requests) = serve_once(StatusCode::OK, response).await;
        let client = DirectoryClient::new(config).unwrap();

        let servers = client.fetch_servers(&identity()).await.unwrap();
        assert_eq!(
            servers,
            vec![
                ServerEntry::new("183.3.235.62", 80),
                ServerEntry::new("14.17.32.10", 8080),
            ]
        );

        let body = requests.recv().await.unwrap();
        let plain = DIRECTORY_KEY.decrypt(&body).unwrap();
        assert_eq!(&plain[..], &encode_request(&identity())[..]);
    }

    #[tokio::test]
    async fn test_custom_key() {
        let key = TeaKey::new(*b"fedcba9876543210");
        let response = encrypt_response(&[(IpField::from("10.1.2.3"), 443)], &key);
        let (config, mut requests) = serve_once(StatusCode::OK, response).await;
        let client = DirectoryClient::with_key(config, key).unwrap();

        let servers = client.fetch_servers(&identity()).await.unwrap();
        assert_eq!(servers, vec![ServerEntry::new("10.1.2.3", 443)]);

        let body = requests.recv().await.unwrap();
        assert!(key.decrypt(&body).is_ok());
        assert!(DIRECTORY_KEY.decrypt(&body).is_err());
    }

    #[tokio::test]
    async fn test_http_status_error() {
        let (config, _requests) = serve_once(StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).await;
        let client = DirectoryClient::new(config).unwrap();

        let err = client.fetch_servers(&identity()).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Status(500)));
    }

    #[tokio::test]
    async fn test_undecryptable_response() {
        let (config, _requests) = serve_once(StatusCode::OK, vec![0xAB; 24]).await;
        let client = DirectoryClient::new(config).unwrap();

        let err = client.fetch_servers(&identity()).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Cipher(_)));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // Accepts the request and never answers
        let app = Router::new().route(PATH, post(|| std::future::pending::<()>()));
        let client = DirectoryClient::new(spawn_directory(app).await).unwrap();

        let started = Instant::now();
        let err = client.fetch_servers(&identity()).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, DirectoryError::Timeout(d) if d == Duration::from_secs(3)));
        assert!(elapsed >= Duration::from_millis(2900), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(4), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_unreachable_directory() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = DirectoryClient::new(DirectoryConfig {
            url: format!("http://{}{}", addr, PATH),
            ..DirectoryConfig::default()
        })
        .unwrap();

        let err = client.fetch_servers(&identity()).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Http(_)));
    }
}
