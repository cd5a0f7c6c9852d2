//! Connection provisioning.
//!
//! `ConnectionProvisioner` turns the current auth token into a signed
//! endpoint URL, performs the WebSocket upgrade with the browser-style
//! headers the endpoint expects, and wraps the socket in a `Connection`
//! carrying its own send gate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::handshake::client::{Request, generate_key};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::auth::{AuthToken, TokenProvider};
use super::retry::SendGate;
use super::transport::{MessageTransport, TextFragment, WebSocketTransport};
use super::{
    CHROMIUM_MAJOR_VERSION, CLOSE_TIMEOUT_MS, DEFAULT_CONNECT_TIMEOUT_MS, READALOUD_ORIGIN,
    READALOUD_WS_URL, SEC_MS_GEC_VERSION, TRUSTED_CLIENT_TOKEN,
};
use crate::core::tts::base::{TTSError, TTSResult, TransportError};

// =============================================================================
// Connection
// =============================================================================

/// One open transport plus the gate that serializes writes on it.
pub struct Connection {
    /// Client-generated id sent as `ConnectionId`
    pub id: String,
    transport: Box<dyn MessageTransport>,
    gate: SendGate,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("open", &self.transport.is_open())
            .finish()
    }
}

impl Connection {
    pub fn new(id: impl Into<String>, transport: Box<dyn MessageTransport>) -> Self {
        Self {
            id: id.into(),
            transport,
            gate: SendGate::default(),
        }
    }

    pub fn with_send_gate(mut self, gate: SendGate) -> Self {
        self.gate = gate;
        self
    }

    #[inline]
    pub fn transport(&self) -> &dyn MessageTransport {
        self.transport.as_ref()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Writes all fragments of one message through the send gate.
    pub async fn send_message(&self, fragments: &[TextFragment]) -> Result<(), TransportError> {
        self.gate.send(self.transport.as_ref(), fragments).await
    }

    /// Closes with a normal-closure frame, aborting if that fails or stalls.
    pub async fn shutdown(&self) {
        let close = tokio::time::timeout(
            Duration::from_millis(CLOSE_TIMEOUT_MS),
            self.transport.close(),
        )
        .await;

        match close {
            Ok(Ok(())) => debug!("Closed read-aloud connection {}", self.id),
            Ok(Err(e)) => {
                warn!("Graceful close of {} failed: {}, aborting", self.id, e);
                self.transport.abort().await;
            }
            Err(_) => {
                warn!("Graceful close of {} timed out, aborting", self.id);
                self.transport.abort().await;
            }
        }
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Opens fresh connections for the reconnect loop.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn open(&self, cancel: &CancellationToken) -> TTSResult<Connection>;
}

/// Opens authenticated WebSocket connections to the read-aloud endpoint.
#[derive(Debug, Clone)]
pub struct ConnectionProvisioner {
    tokens: Arc<TokenProvider>,
    endpoint: String,
    connect_timeout: Duration,
}

impl Default for ConnectionProvisioner {
    fn default() -> Self {
        Self::new(Arc::new(TokenProvider::default()))
    }
}

impl ConnectionProvisioner {
    pub fn new(tokens: Arc<TokenProvider>) -> Self {
        Self {
            tokens,
            endpoint: READALOUD_WS_URL.to_string(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }

    /// Overrides the endpoint, e.g. to point at a local mock server.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Builds the signed endpoint URL for one connection.
    pub fn build_url(&self, token: &AuthToken, connection_id: &str) -> String {
        let mut url = String::with_capacity(self.endpoint.len() + 200);
        url.push_str(&self.endpoint);
        url.push_str("?TrustedClientToken=");
        url.push_str(TRUSTED_CLIENT_TOKEN);
        url.push_str("&Sec-MS-GEC=");
        url.push_str(&token.value);
        url.push_str("&Sec-MS-GEC-Version=");
        url.push_str(SEC_MS_GEC_VERSION);
        url.push_str("&ConnectionId=");
        url.push_str(connection_id);
        url
    }

    /// Builds the upgrade request with the browser compatibility headers.
    pub fn build_request(&self, url: &str) -> TTSResult<Request> {
        let user_agent = format!(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
             Chrome/{v}.0.0.0 Safari/537.36 Edg/{v}.0.0.0",
            v = CHROMIUM_MAJOR_VERSION
        );

        Request::builder()
            .method("GET")
            .uri(url)
            .header("Host", host_of(url))
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Key", generate_key())
            .header("Sec-WebSocket-Version", "13")
            .header("Pragma", "no-cache")
            .header("Cache-Control", "no-cache")
            .header("Accept-Encoding", "gzip, deflate, br")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("User-Agent", user_agent)
            .header("Origin", READALOUD_ORIGIN)
            .header("Sec-Fetch-Site", "none")
            .header("Sec-Fetch-Mode", "websocket")
            .header("Sec-Fetch-Dest", "empty")
            .body(())
            .map_err(|e| {
                TTSError::ConnectionFailed(format!("Failed to build WebSocket request: {e}"))
            })
    }
}

/// Host (with port, if any) of a `ws://` or `wss://` URL.
fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?']).next().unwrap_or(rest)
}

#[async_trait]
impl ConnectionFactory for ConnectionProvisioner {
    async fn open(&self, cancel: &CancellationToken) -> TTSResult<Connection> {
        let connection_id = Uuid::new_v4().simple().to_string();
        let token = self.tokens.current();
        let url = self.build_url(&token, &connection_id);
        let request = self.build_request(&url)?;

        debug!("Connecting to read-aloud endpoint {}", self.endpoint);

        let connect = tokio::time::timeout(self.connect_timeout, connect_async(request));
        let ws_stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TTSError::Cancelled),
            result = connect => match result {
                Ok(Ok((stream, response))) => {
                    info!(
                        "Connected to read-aloud endpoint (status: {}, connection: {})",
                        response.status(),
                        connection_id
                    );
                    stream
                }
                Ok(Err(e)) => {
                    return Err(TTSError::ConnectionFailed(format!(
                        "WebSocket connection failed: {e}"
                    )));
                }
                Err(_) => {
                    return Err(TTSError::ConnectionFailed(format!(
                        "Connection timed out after {}ms",
                        self.connect_timeout.as_millis()
                    )));
                }
            },
        };

        Ok(Connection::new(
            connection_id,
            Box::new(WebSocketTransport::new(ws_stream)),
        ))
    }
}
