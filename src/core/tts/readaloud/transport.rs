//! Ordered message transport abstraction.
//!
//! The protocol engine only needs four things from a connection: send one
//! text fragment, receive the next frame, close, and report whether the
//! socket is still open. `WebSocketTransport` provides them on top of
//! tokio-tungstenite; tests substitute a scripted transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::{CloseCode, Data, OpCode};
use tokio_tungstenite::tungstenite::protocol::frame::{CloseFrame, Frame};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::core::tts::base::{TransportError, TransportErrorKind};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Frames
// =============================================================================

/// One outbound text frame of a (possibly fragmented) logical message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment {
    pub data: String,
    /// `false` for the first frame of a message, `true` for continuation frames
    pub continuation: bool,
    /// Set only on the last frame of the message
    pub fin: bool,
}

impl TextFragment {
    /// A message that fits in a single frame.
    pub fn whole(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            continuation: false,
            fin: true,
        }
    }
}

/// Inbound frames relevant to the synthesis protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Bytes),
    Close,
}

// =============================================================================
// Transport Trait
// =============================================================================

/// Ordered, single-connection message transport.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Sends one text frame. Frames of one message must be sent back to back.
    async fn send_text(&self, fragment: &TextFragment) -> Result<(), TransportError>;

    /// Receives the next protocol-relevant frame; `None` once the stream ends.
    async fn next_frame(&self) -> Option<Result<InboundFrame, TransportError>>;

    /// Sends a normal-closure close frame.
    async fn close(&self) -> Result<(), TransportError>;

    /// Drops the connection without a closing handshake.
    async fn abort(&self);

    /// Whether the connection can still carry traffic.
    fn is_open(&self) -> bool;
}

// =============================================================================
// WebSocket Implementation
// =============================================================================

/// `MessageTransport` over a tokio-tungstenite client stream.
///
/// Sink and stream halves are locked independently so a reader waiting for
/// audio never blocks a concurrent close.
pub struct WebSocketTransport {
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
    stream: Mutex<Option<SplitStream<WsStream>>>,
    open: Arc<AtomicBool>,
}

impl WebSocketTransport {
    pub fn new(ws: WsStream) -> Self {
        let (sink, stream) = ws.split();
        Self {
            sink: Mutex::new(Some(sink)),
            stream: Mutex::new(Some(stream)),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    fn closed_error() -> TransportError {
        TransportError::new(TransportErrorKind::InvalidState, "connection already closed")
    }

    fn to_message(fragment: &TextFragment) -> Message {
        if !fragment.continuation && fragment.fin {
            return Message::Text(fragment.data.clone().into());
        }

        let opcode = if fragment.continuation {
            OpCode::Data(Data::Continue)
        } else {
            OpCode::Data(Data::Text)
        };
        Message::Frame(Frame::message(
            Bytes::from(fragment.data.clone().into_bytes()),
            opcode,
            fragment.fin,
        ))
    }
}

#[async_trait]
impl MessageTransport for WebSocketTransport {
    async fn send_text(&self, fragment: &TextFragment) -> Result<(), TransportError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or_else(Self::closed_error)?;

        sink.send(Self::to_message(fragment)).await.map_err(|e| {
            let err = TransportError::from(e);
            if err.kind == TransportErrorKind::InvalidState {
                self.open.store(false, Ordering::Release);
            }
            err
        })
    }

    async fn next_frame(&self) -> Option<Result<InboundFrame, TransportError>> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut()?;

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(Ok(InboundFrame::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Binary(data))) => return Some(Ok(InboundFrame::Binary(data))),
                Some(Ok(Message::Close(frame))) => {
                    debug!("Read-aloud WebSocket closed by server: {:?}", frame);
                    self.open.store(false, Ordering::Release);
                    return Some(Ok(InboundFrame::Close));
                }
                // Pings are answered by tungstenite on the next write/flush
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    let err = TransportError::from(e);
                    if err.kind != TransportErrorKind::Io {
                        self.open.store(false, Ordering::Release);
                    }
                    return Some(Err(err));
                }
                None => {
                    self.open.store(false, Ordering::Release);
                    return None;
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.open.store(false, Ordering::Release);
        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Ok(());
        };

        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        let result = sink.send(Message::Close(Some(frame))).await;
        *guard = None;
        result.map_err(TransportError::from)
    }

    async fn abort(&self) {
        self.open.store(false, Ordering::Release);
        if let Ok(mut sink) = self.sink.try_lock() {
            *sink = None;
        }
        match timeout(Duration::from_millis(50), self.stream.lock()).await {
            Ok(mut stream) => *stream = None,
            Err(_) => warn!("Read-aloud stream busy during abort; dropping on release"),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_fragment_maps_to_text_message() {
        let msg = WebSocketTransport::to_message(&TextFragment::whole("hello"));
        assert!(matches!(msg, Message::Text(ref t) if t.as_str() == "hello"));
    }

    #[test]
    fn test_partial_fragments_map_to_raw_frames() {
        let first = TextFragment {
            data: "abc".to_string(),
            continuation: false,
            fin: false,
        };
        let last = TextFragment {
            data: "def".to_string(),
            continuation: true,
            fin: true,
        };

        match WebSocketTransport::to_message(&first) {
            Message::Frame(frame) => {
                assert_eq!(frame.header().opcode, OpCode::Data(Data::Text));
                assert!(!frame.header().is_final);
            }
            other => panic!("Expected raw frame, got {other:?}"),
        }
        match WebSocketTransport::to_message(&last) {
            Message::Frame(frame) => {
                assert_eq!(frame.header().opcode, OpCode::Data(Data::Continue));
                assert!(frame.header().is_final);
            }
            other => panic!("Expected raw frame, got {other:?}"),
        }
    }
}
