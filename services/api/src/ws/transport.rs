//! Concrete sockets behind the [`Transport`] interface.
//!
//! The client side is an axum `WebSocket`; the provider side is a
//! `tokio-tungstenite` client stream. Each is split into a send half, wrapped
//! in a `Transport`, and a receive half, mapped into a stream of [`Incoming`]
//! frames. Both halves share an "open" flag that the receive half clears as
//! soon as it observes the connection going away.

use super::delivery::{SendError, Transport};
use anyhow::anyhow;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{BoxStream, SplitSink},
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream,
    tungstenite::{self, protocol::Message as WsMessage},
};
use tracing::debug;

/// The provider connection as returned by `connect_async`.
pub type ProviderStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A data frame read from either socket. Ping/pong frames are filtered out.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Text(String),
    Binary(Bytes),
    Close,
}

/// The receive half of a socket.
pub type IncomingStream = BoxStream<'static, anyhow::Result<Incoming>>;

/// The send half of the client's websocket.
pub struct ClientSocket {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    open: Arc<AtomicBool>,
}

impl ClientSocket {
    /// Splits an upgraded client socket into its transport and incoming halves.
    pub fn split(socket: WebSocket) -> (Arc<Self>, IncomingStream) {
        let (sink, stream) = socket.split();
        let open = Arc::new(AtomicBool::new(true));
        let flag = open.clone();

        let incoming = stream
            .filter_map(move |frame| {
                let frame = match frame {
                    Ok(Message::Text(text)) => Some(Ok(Incoming::Text(text.as_str().to_owned()))),
                    Ok(Message::Binary(data)) => Some(Ok(Incoming::Binary(data))),
                    Ok(Message::Close(_)) => {
                        flag.store(false, Ordering::SeqCst);
                        Some(Ok(Incoming::Close))
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
                    Err(e) => {
                        flag.store(false, Ordering::SeqCst);
                        Some(Err(anyhow!(e)))
                    }
                };
                futures_util::future::ready(frame)
            })
            .boxed();

        let transport = Arc::new(Self {
            sink: Mutex::new(sink),
            open,
        });
        (transport, incoming)
    }
}

#[async_trait]
impl Transport for ClientSocket {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn try_send(&self, text: String) -> Result<(), SendError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.into())).await.map_err(|e| {
            let reason = e.to_string();
            // axum hides the underlying protocol error type, so the reason
            // text is all there is to tell a dead peer from a hiccup.
            let lowered = reason.to_lowercase();
            if lowered.contains("closed") || lowered.contains("reset") || lowered.contains("broken pipe") {
                self.open.store(false, Ordering::SeqCst);
                SendError::Closed(reason)
            } else {
                SendError::Transient(reason)
            }
        })
    }

    async fn close(&self) {
        let was_open = self.open.swap(false, Ordering::SeqCst);
        let mut sink = self.sink.lock().await;
        if was_open {
            let _ = sink.send(Message::Close(None)).await;
        }
        if let Err(e) = sink.close().await {
            debug!(error = %e, "Client socket was already closed.");
        }
    }
}

/// The send half of the realtime provider connection.
pub struct ProviderSocket {
    sink: Mutex<SplitSink<ProviderStream, WsMessage>>,
    open: Arc<AtomicBool>,
}

impl ProviderSocket {
    /// Splits a provider connection into its transport and incoming halves.
    pub fn split(stream: ProviderStream) -> (Arc<Self>, IncomingStream) {
        let (sink, stream) = stream.split();
        let open = Arc::new(AtomicBool::new(true));
        let flag = open.clone();

        let incoming = stream
            .filter_map(move |frame| {
                let frame = match frame {
                    Ok(WsMessage::Text(text)) => Some(Ok(Incoming::Text(text.as_str().to_owned()))),
                    Ok(WsMessage::Binary(data)) => Some(Ok(Incoming::Binary(data))),
                    Ok(WsMessage::Close(close_frame)) => {
                        debug!(?close_frame, "Provider sent a close frame.");
                        flag.store(false, Ordering::SeqCst);
                        Some(Ok(Incoming::Close))
                    }
                    Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => None,
                    Err(e) => {
                        flag.store(false, Ordering::SeqCst);
                        Some(Err(anyhow!(e)))
                    }
                };
                futures_util::future::ready(frame)
            })
            .boxed();

        let transport = Arc::new(Self {
            sink: Mutex::new(sink),
            open,
        });
        (transport, incoming)
    }
}

#[async_trait]
impl Transport for ProviderSocket {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn try_send(&self, text: String) -> Result<(), SendError> {
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::Text(text.into())).await.map_err(|e| {
            if is_closed_error(&e) {
                self.open.store(false, Ordering::SeqCst);
                SendError::Closed(e.to_string())
            } else {
                SendError::Transient(e.to_string())
            }
        })
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!(error = %e, "Provider socket was already closed.");
        }
    }
}

fn is_closed_error(error: &tungstenite::Error) -> bool {
    use std::io::ErrorKind;
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => true,
        tungstenite::Error::Io(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::ConnectionAborted
        ),
        tungstenite::Error::Protocol(tungstenite::error::ProtocolError::ResetWithoutClosingHandshake) => true,
        _ => false,
    }
}
