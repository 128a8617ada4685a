//! Transport links the gateway channel runs its frames over.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::GatewayError;

/// Something read off a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Text(String),
    /// The link closed, with the peer's reason when one was given.
    Closed(Option<String>),
}

/// An open, bidirectional text link. Dropping `outbound` closes the link.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens links to the gateway endpoint.
///
/// Backed by a WebSocket client in production and by in-memory channels in
/// tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Link, GatewayError>;
}

// ---------------------------------------------------------------------------
// WebSocket implementation
// ---------------------------------------------------------------------------

pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Link, GatewayError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| GatewayError::Connect(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<LinkEvent>();

        // Writer: drains outbound text until every sender is gone.
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    tracing::debug!(?e, "ws write error");
                    return;
                }
            }
            let _ = ws_tx.close().await;
        });

        // Reader: forwards text until the socket or the receiver goes away.
        tokio::spawn(async move {
            let closed = loop {
                match ws_rx.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx.send(LinkEvent::Text(text.as_str().to_owned())).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => {
                            if in_tx.send(LinkEvent::Text(text)).is_err() {
                                return;
                            }
                        }
                        Err(_) => tracing::debug!("dropping non-utf8 binary message"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| f.reason.as_str().to_owned()).filter(|r| !r.is_empty());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(?e, "ws read error");
                        break Some(e.to_string());
                    }
                    None => break None,
                }
            };
            let _ = in_tx.send(LinkEvent::Closed(closed));
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
