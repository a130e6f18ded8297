//! Transport seam between the shared connection and the wire.
//!
//! The shared connection only needs "open a stream, send text, read frames";
//! [`WsTransport`] provides that over tokio-tungstenite. Tests substitute an
//! in-memory implementation.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, protocol::Message};
use url::Url;

use crate::auth::AuthProvider;
use crate::error::{CampusLinkError, Result};
use crate::event_handlers::DisconnectReason;

type WebSocketStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Frame surfaced by a [`TransportStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    /// A text payload (binary payloads are decoded as UTF-8 first).
    Text(String),
    /// Answer to a keepalive ping.
    Pong,
    /// The peer closed the stream, or it ended.
    Close(DisconnectReason),
}

/// Opens streams to the realtime endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &str, auth: &AuthProvider) -> Result<Box<dyn TransportStream>>;
}

/// One open, bidirectional stream.
///
/// `next_frame` must be cancel-safe: the connection task races it against
/// commands and keepalive timers.
#[async_trait]
pub trait TransportStream: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    async fn ping(&mut self) -> Result<()>;

    async fn next_frame(&mut self) -> Result<TransportFrame>;

    async fn close(&mut self);
}

/// Build the WebSocket URL of the realtime endpoint from the API base URL.
///
/// `http` maps to `ws` and `https` to `wss`; `ws`/`wss` are kept. Credentials
/// embedded in the URL are rejected, since they would leak into logs.
pub fn resolve_ws_url(server_url: &str, ws_path: &str) -> Result<String> {
    let base = Url::parse(server_url.trim()).map_err(|e| {
        CampusLinkError::ConfigurationError(format!(
            "Invalid server_url '{}': {}",
            server_url, e
        ))
    })?;

    if base.host_str().is_none() {
        return Err(CampusLinkError::ConfigurationError(
            "server_url must include a host".to_string(),
        ));
    }
    if !base.username().is_empty() || base.password().is_some() {
        return Err(CampusLinkError::ConfigurationError(
            "server_url must not embed credentials; use the token store instead".to_string(),
        ));
    }

    let ws_scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(CampusLinkError::ConfigurationError(format!(
                "Unsupported server_url scheme '{}'; expected http(s) or ws(s)",
                other
            )));
        },
    };

    let mut ws_url = base;
    ws_url.set_scheme(ws_scheme).map_err(|_| {
        CampusLinkError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;
    ws_url.set_fragment(None);
    ws_url.set_query(None);

    let path = ws_path.trim();
    if path.is_empty() {
        ws_url.set_path("/");
    } else if path.starts_with('/') {
        ws_url.set_path(path);
    } else {
        ws_url.set_path(&format!("/{}", path));
    }

    Ok(ws_url.to_string())
}

/// WebSocket transport over tokio-tungstenite (rustls, webpki roots).
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str, auth: &AuthProvider) -> Result<Box<dyn TransportStream>> {
        log::debug!("[campus-link] Opening WebSocket to {}", url);

        let mut request = url.into_client_request().map_err(|e| {
            CampusLinkError::WebSocketError(format!("Failed to build WebSocket request: {}", e))
        })?;
        auth.apply_to_ws_request(&mut request)?;

        match tokio_tungstenite::connect_async(request).await {
            Ok((stream, _)) => Ok(Box::new(WsStream { inner: stream })),
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                let status = response.status();
                let body_text = response
                    .into_body()
                    .as_ref()
                    .and_then(|b| {
                        if b.is_empty() {
                            None
                        } else {
                            Some(String::from_utf8_lossy(b).into_owned())
                        }
                    })
                    .unwrap_or_default();
                match status.as_u16() {
                    401 => Err(CampusLinkError::AuthenticationError(
                        "Unauthorized: realtime channel requires a valid token".to_string(),
                    )),
                    403 => Err(CampusLinkError::AuthenticationError(
                        "Forbidden: access to realtime channel denied".to_string(),
                    )),
                    code if body_text.is_empty() => Err(CampusLinkError::WebSocketError(
                        format!("WebSocket HTTP error: {}", code),
                    )),
                    code => Err(CampusLinkError::WebSocketError(format!(
                        "WebSocket HTTP error {}: {}",
                        code, body_text
                    ))),
                }
            },
            Err(e) => Err(CampusLinkError::WebSocketError(format!("Connection failed: {}", e))),
        }
    }
}

struct WsStream {
    inner: WebSocketStream,
}

#[async_trait]
impl TransportStream for WsStream {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| CampusLinkError::WebSocketError(format!("Failed to send frame: {}", e)))
    }

    async fn ping(&mut self) -> Result<()> {
        self.inner
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(|e| CampusLinkError::WebSocketError(format!("Keepalive ping failed: {}", e)))
    }

    async fn next_frame(&mut self) -> Result<TransportFrame> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(TransportFrame::Text(text.to_string())),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data.to_vec())
                        .map(TransportFrame::Text)
                        .map_err(|e| {
                            CampusLinkError::SerializationError(format!(
                                "Binary frame is not UTF-8: {}",
                                e
                            ))
                        });
                },
                Some(Ok(Message::Ping(payload))) => {
                    let _ = self.inner.send(Message::Pong(payload)).await;
                },
                Some(Ok(Message::Pong(_))) => return Ok(TransportFrame::Pong),
                Some(Ok(Message::Close(frame))) => {
                    let reason = match frame {
                        Some(f) => DisconnectReason::with_code(f.reason.to_string(), f.code.into()),
                        None => DisconnectReason::new("Server closed connection"),
                    };
                    return Ok(TransportFrame::Close(reason));
                },
                Some(Ok(Message::Frame(_))) => {},
                Some(Err(e)) => {
                    return Err(CampusLinkError::WebSocketError(e.to_string()));
                },
                None => {
                    return Ok(TransportFrame::Close(DisconnectReason::new(
                        "WebSocket stream ended",
                    )));
                },
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}
