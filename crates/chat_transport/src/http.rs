use futures_util::future::{BoxFuture, FutureExt};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::sse::SseFrameParser;
use crate::transport::{Connection, Connector};
use crate::url::{chat_url, events_url, normalize_http_base};

/// HTTP transport: a long-lived SSE `GET` downlink plus one `POST` per message.
#[derive(Debug, Clone)]
pub struct SseConnector {
    http: Client,
    events_url: String,
    chat_url: String,
    headers: HeaderMap,
}

impl SseConnector {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let base = normalize_http_base(&config.base_url)?;
        let mut builder = Client::builder();
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            events_url: events_url(&base),
            chat_url: chat_url(&base),
            headers: header_map(config)?,
        })
    }

    pub fn events_endpoint(&self) -> &str {
        &self.events_url
    }

    pub fn chat_endpoint(&self) -> &str {
        &self.chat_url
    }
}

impl Connector for SseConnector {
    fn connect(&self) -> BoxFuture<'static, Result<Connection, TransportError>> {
        let connector = self.clone();
        async move { connector.open_stream().await }.boxed()
    }
}

impl SseConnector {
    async fn open_stream(self) -> Result<Connection, TransportError> {
        let response = self
            .http
            .get(&self.events_url)
            .headers(self.headers.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = ensure_success(response).await?;
        debug!(url = %self.events_url, "event stream open");

        let (in_tx, incoming) = mpsc::unbounded_channel::<String>();
        let (outgoing, mut out_rx) = mpsc::unbounded_channel::<String>();

        let reader = tokio::spawn(async move {
            let mut parser = SseFrameParser::default();
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        for payload in parser.feed(&bytes) {
                            if in_tx.send(payload).is_err() {
                                return;
                            }
                        }
                    }
                    Err(error) => {
                        debug!(%error, "event stream read failed");
                        return;
                    }
                }
            }
            debug!("event stream ended");
        });

        tokio::spawn(async move {
            while let Some(body) = out_rx.recv().await {
                let posted = self
                    .http
                    .post(&self.chat_url)
                    .headers(self.headers.clone())
                    .header(CONTENT_TYPE, "application/json")
                    .body(body)
                    .send()
                    .await;
                let outcome = match posted {
                    Ok(response) => ensure_success(response).await.map(drop),
                    Err(error) => Err(TransportError::from(error)),
                };
                if let Err(error) = outcome {
                    warn!(%error, "chat POST failed, closing connection");
                    break;
                }
            }
            reader.abort();
        });

        Ok(Connection { outgoing, incoming })
    }
}

fn header_map(config: &ClientConfig) -> Result<HeaderMap, TransportError> {
    let mut out = HeaderMap::new();
    for (key, value) in config.connect_headers() {
        out.insert(
            HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| TransportError::InvalidHeader { name: key.clone() })?,
            HeaderValue::from_str(&value)
                .map_err(|_| TransportError::InvalidHeader { name: key.clone() })?,
        );
    }
    Ok(out)
}

async fn ensure_success(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        message: message.trim().to_owned(),
    })
}
