//! Transport seam: persistent bidirectional message channel.
//!
//! The engine only depends on the [`Transport`]/[`TransportFactory`]
//! contract; [`WsConnector`] is the production tokio-tungstenite
//! implementation. Events are delivered over an in-order channel so
//! frame handling never interleaves.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, Result};

/// Reserved close code for "authentication failed".
pub const AUTH_CLOSE_CODE: u16 = 4001;

/// One transport lifecycle or inbound-frame event, delivered in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is open and frames may be sent.
    Opened,
    /// One inbound text frame.
    Frame(String),
    /// A transport-level error. Log-only; recovery is driven by
    /// `Closed`.
    TransportError(String),
    /// The channel closed, with the peer's close code when present.
    Closed { code: Option<u16> },
}

/// Write half of a live connection.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, text: String) -> Result<()>;
    async fn close(&mut self);
}

/// Opens transports. The engine creates at most one live transport at
/// a time through this seam.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn open(
        &self,
        endpoint: &str,
        token: Option<&str>,
    ) -> Result<(Box<dyn Transport>, mpsc::UnboundedReceiver<TransportEvent>)>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Production WebSocket connector.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

/// Build the connection URL, embedding the auth token as a query
/// parameter when present.
pub fn build_endpoint_url(endpoint: &str, token: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(endpoint).map_err(|error| ClientError::InvalidUrl(error.to_string()))?;
    if url.scheme() != "ws" && url.scheme() != "wss" {
        return Err(ClientError::InvalidUrl(format!(
            "URL must use ws:// or wss:// scheme, got: {}",
            url.scheme()
        )));
    }
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

#[async_trait]
impl TransportFactory for WsConnector {
    async fn open(
        &self,
        endpoint: &str,
        token: Option<&str>,
    ) -> Result<(Box<dyn Transport>, mpsc::UnboundedReceiver<TransportEvent>)> {
        let url = build_endpoint_url(endpoint, token)?;

        let (stream, _response) = timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                ClientError::Timeout(format!(
                    "connection timeout after {:?}",
                    self.connect_timeout
                ))
            })?
            .map_err(|error| ClientError::WebSocket(error.to_string()))?;

        let (writer, mut reader) = stream.split();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let endpoint_label = url.origin().ascii_serialization();
        tokio::spawn(async move {
            if event_tx.send(TransportEvent::Opened).is_err() {
                return;
            }

            let mut close_code = None;
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if event_tx
                            .send(TransportEvent::Frame(text.to_string()))
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        debug!(
                            "received ping from {} ({} bytes)",
                            endpoint_label,
                            payload.len()
                        );
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(frame)) => {
                        close_code = frame.map(|f| u16::from(f.code));
                        break;
                    }
                    Ok(Message::Binary(_)) => {}
                    Ok(Message::Frame(_)) => {}
                    Err(error) => {
                        warn!("websocket read error on {}: {}", endpoint_label, error);
                        let _ = event_tx.send(TransportEvent::TransportError(error.to_string()));
                        break;
                    }
                }
            }

            let _ = event_tx.send(TransportEvent::Closed { code: close_code });
        });

        Ok((Box::new(WsTransport { writer }), event_rx))
    }
}

struct WsTransport {
    writer: WsWriter,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|error| ClientError::WebSocket(error.to_string()))
    }

    async fn close(&mut self) {
        if let Err(error) = self.writer.send(Message::Close(None)).await {
            debug!("close frame send failed: {}", error);
        }
    }
}
