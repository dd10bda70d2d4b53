//! WebSocket push channel
//!
//! One [`WebSocketPushChannel::connect`] performs one handshake. On success
//! the stream is split into:
//!
//! ```text
//! send() ──→ mpsc ──→ writer task ──→ ws sink
//! ws stream ──→ reader task ──→ IPushObserver (on_frame / on_error / on_close)
//! ```
//!
//! The reader reports the end of the stream exactly once through
//! `on_close`. [`WebSocketPushChannel::disconnect`] aborts the reader first,
//! so a user-initiated close is never reported to the observer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use livesync_core::config::PushConfig;
use livesync_core::domain::OutboundMessage;
use livesync_core::ports::{IPushChannel, IPushObserver};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::TransportError;

/// Handshake timeout used unless configured otherwise
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Connection {
    outgoing: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    fn abort(self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// `IPushChannel` over a WebSocket
pub struct WebSocketPushChannel {
    url: Url,
    connect_timeout: Duration,
    connection: AsyncMutex<Option<Connection>>,
}

impl WebSocketPushChannel {
    /// Creates a channel for a `ws://` or `wss://` URL
    ///
    /// # Errors
    /// `TransportError::InvalidUrl` for anything else
    pub fn new(url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::InvalidUrl(format!(
                "{url}: expected ws or wss"
            )));
        }
        Ok(Self {
            url,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connection: AsyncMutex::new(None),
        })
    }

    /// Builds a channel from the `push` section, if it names a URL
    ///
    /// # Errors
    /// `TransportError::InvalidUrl`
    pub fn from_config(config: &PushConfig) -> Result<Option<Self>, TransportError> {
        config.url.as_deref().map(Self::new).transpose()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn handshake(&self) -> Result<WsStream, TransportError> {
        let connecting = connect_async(self.url.as_str());
        match tokio::time::timeout(self.connect_timeout, connecting).await {
            Ok(Ok((stream, _response))) => Ok(stream),
            Ok(Err(e)) => Err(TransportError::Connect(e.to_string())),
            Err(_) => Err(TransportError::Timeout(self.connect_timeout)),
        }
    }
}

#[async_trait]
impl IPushChannel for WebSocketPushChannel {
    async fn connect(&self, observer: Arc<dyn IPushObserver>) -> Result<()> {
        let mut connection = self.connection.lock().await;
        if let Some(previous) = connection.take() {
            debug!("Replacing previous WebSocket connection");
            previous.abort();
        }

        let stream = self.handshake().await?;
        info!(url = %self.url, "WebSocket connected");

        let (mut sink, stream) = stream.split();
        let (outgoing, mut queued) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(message) = queued.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    debug!(error = %e, "WebSocket writer stopped");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        observer.on_open();
        let reader = tokio::spawn(read_frames(stream, observer));

        *connection = Some(Connection {
            outgoing,
            reader,
            writer,
        });
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let text = message.to_json()?;
        let connection = self.connection.lock().await;
        let Some(connection) = connection.as_ref() else {
            return Err(TransportError::NotConnected.into());
        };
        connection
            .outgoing
            .send(Message::Text(text))
            .map_err(|e| TransportError::Send(e.to_string()))?;
        debug!(event = message.event_name(), "Frame queued");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let Some(connection) = self.connection.lock().await.take() else {
            return Ok(());
        };

        connection.reader.abort();
        // The writer exits after flushing the close frame
        if connection.outgoing.send(Message::Close(None)).is_err() {
            connection.writer.abort();
        }
        info!(url = %self.url, "WebSocket closed");
        Ok(())
    }
}

impl Drop for WebSocketPushChannel {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.get_mut().take() {
            connection.abort();
        }
    }
}

async fn read_frames(mut stream: SplitStream<WsStream>, observer: Arc<dyn IPushObserver>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => observer.on_frame(text),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => observer.on_frame(text),
                Err(e) => observer.on_error(format!("Binary frame is not UTF-8: {e}")),
            },
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.into_owned())
                    .filter(|reason| !reason.is_empty());
                debug!(reason = reason.as_deref().unwrap_or(""), "WebSocket closed by server");
                observer.on_close(reason);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "WebSocket read failed");
                observer.on_error(e.to_string());
                observer.on_close(Some(e.to_string()));
                return;
            }
        }
    }
    observer.on_close(None);
}
