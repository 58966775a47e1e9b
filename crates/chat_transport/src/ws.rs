use std::collections::BTreeMap;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::transport::{Connection, Connector};
use crate::url::normalize_ws_url;

/// WebSocket transport: one socket carries both directions.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    headers: BTreeMap<String, String>,
}

impl WsConnector {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        Ok(Self {
            url: normalize_ws_url(&config.base_url)?,
            headers: config.connect_headers(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.url
    }
}

impl Connector for WsConnector {
    fn connect(&self) -> BoxFuture<'static, Result<Connection, TransportError>> {
        let url = self.url.clone();
        let headers = self.headers.clone();
        async move { open_socket(&url, &headers).await }.boxed()
    }
}

async fn open_socket(
    url: &str,
    headers: &BTreeMap<String, String>,
) -> Result<Connection, TransportError> {
    let mut request = url.into_client_request()?;
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| TransportError::InvalidHeader { name: key.clone() })?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader { name: key.clone() })?;
        request.headers_mut().insert(name, value);
    }

    let (socket, _response) = tokio_tungstenite::connect_async(request).await?;
    debug!(url, "websocket open");
    let (mut sink, mut source) = socket.split();

    let (in_tx, incoming) = mpsc::unbounded_channel::<String>();
    let (outgoing, mut out_rx) = mpsc::unbounded_channel::<String>();

    let reader = tokio::spawn(async move {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    if in_tx.send(text).is_err() {
                        break;
                    }
                }
                Ok(WsMessage::Close(reason)) => {
                    debug!(?reason, "websocket closed by server");
                    break;
                }
                Ok(_) => {}
                Err(error) => {
                    debug!(%error, "websocket read failed");
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(error) = sink.send(WsMessage::Text(text)).await {
                warn!(%error, "websocket write failed");
                break;
            }
        }
        let _ = sink.close().await;
        reader.abort();
    });

    Ok(Connection { outgoing, incoming })
}
