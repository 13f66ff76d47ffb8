//! Text-frame transport for the chat service.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use crate::utils::http_client::install_rustls_provider;
use crate::Result;

/// Opens connections to the chat service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn ChatConnection>>;
}

/// One open chat connection exchanging text frames.
#[async_trait]
pub trait ChatConnection: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next text frame; `Ok(None)` once the peer closed the connection.
    ///
    /// Must be cancel-safe: it is polled inside `select!`.
    async fn recv_text(&mut self) -> Result<Option<String>>;

    async fn close(&mut self);
}

/// WebSocket transport (tokio-tungstenite over rustls).
#[derive(Debug, Clone)]
pub struct WsTransport {
    origin: String,
    user_agent: String,
}

impl WsTransport {
    pub fn new(origin: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl ChatTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn ChatConnection>> {
        install_rustls_provider();

        let mut request = url.into_client_request()?;
        let headers = request.headers_mut();
        if let Ok(origin) = HeaderValue::from_str(&self.origin) {
            headers.insert("Origin", origin);
        }
        if let Ok(ua) = HeaderValue::from_str(&self.user_agent) {
            headers.insert("User-Agent", ua);
        }

        debug!("Connecting to chat WebSocket: {}", url);
        let (stream, response) = connect_async(request).await?;
        trace!(status = %response.status(), "Chat WebSocket handshake complete");

        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ChatConnection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn recv_text(&mut self) -> Result<Option<String>> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(text.to_string())),
                Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => trace!(len = bytes.len(), "Ignoring non-UTF-8 binary frame"),
                },
                Message::Close(frame) => {
                    debug!(?frame, "Chat WebSocket closed by server");
                    return Ok(None);
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(None)
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            trace!(error = %e, "Error closing chat WebSocket");
        }
    }
}
