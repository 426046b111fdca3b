//! One connection to one upstream API server: streaming watch of a kind and
//! one-shot list of a kind.
//!
//! The watch body is a sequence of JSON event objects; chunks are buffered
//! just long enough to decode one complete event at a time and every decoded
//! event is handed to the sink in arrival order.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use url::Url;

use crate::mirror::{Kind, ObjectEvent, RawObject, Resource, WatchEvent};

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("unsupported kind: {0}")]
    UnsupportedKind(Kind),
    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { status: StatusCode, url: String },
    #[error("could not decode watch event: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A client for one configured upstream server.
///
/// `watch` blocks until the stream terminates — clean close, decode error or
/// network error — and the caller decides what to do about it; `list`
/// returns a complete snapshot with each record tagged with the kind.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// The configured server identity used as the cache key.
    fn server(&self) -> &str;

    /// Fire-and-forget reachability probe.
    async fn ping(&self) -> Result<(), UpstreamError>;

    /// Stream watch events for `kind` into `sink` until the stream ends.
    async fn watch(
        &self,
        kind: Kind,
        sink: UnboundedSender<ObjectEvent>,
    ) -> Result<(), UpstreamError>;

    /// One-shot snapshot of all objects of `kind`.
    async fn list(&self, kind: Kind) -> Result<Vec<Resource>, UpstreamError>;
}

/// List response shape on the upstream wire.
#[derive(Debug, serde::Deserialize)]
struct ObjectList {
    #[serde(default)]
    items: Vec<RawObject>,
}

/// HTTP implementation of [`UpstreamClient`].
pub struct HttpUpstreamClient {
    server: String,
    base: Url,
    http: reqwest::Client,
}

impl HttpUpstreamClient {
    /// `http` carries whatever TLS material the kubeconfig provided; the
    /// client itself is agnostic to how it was built.
    pub fn new(base: Url, http: reqwest::Client) -> Self {
        let server = base.as_str().trim_end_matches('/').to_string();
        HttpUpstreamClient { server, base, http }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, UpstreamError> {
        let url = self.base.join(path)?;
        let resp = self.http.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    fn server(&self) -> &str {
        &self.server
    }

    async fn ping(&self) -> Result<(), UpstreamError> {
        self.http.get(self.base.clone()).send().await?;
        Ok(())
    }

    async fn watch(
        &self,
        kind: Kind,
        sink: UnboundedSender<ObjectEvent>,
    ) -> Result<(), UpstreamError> {
        if !kind.watchable() {
            return Err(UpstreamError::UnsupportedKind(kind));
        }

        let url = self.base.join(kind.api_path())?;
        let resp = self
            .http
            .get(url.clone())
            .query(&[("watch", "true")])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status,
                url: url.to_string(),
            });
        }

        let mut decoder = EventDecoder::new();
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            for event in decoder.decode(&chunk?)? {
                debug!(server = %self.server, %kind, event = %event.event, name = %event.object.metadata.name, "received event");
                let applied = ObjectEvent {
                    event: event.event,
                    resource: event.object.into_resource(kind),
                };
                if sink.send(applied).is_err() {
                    // receiver went away, nothing left to deliver to
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn list(&self, kind: Kind) -> Result<Vec<Resource>, UpstreamError> {
        let list: ObjectList = self.get(kind.api_path()).await?.json().await?;
        Ok(list
            .items
            .into_iter()
            .map(|raw| raw.into_resource(kind))
            .collect())
    }
}

/// Incremental decoder for a stream of concatenated JSON watch events.
///
/// Chunks are appended to a pending buffer; every complete event at the
/// front of the buffer is drained out, a trailing partial event stays
/// buffered until the rest of it arrives.
struct EventDecoder {
    pending: Vec<u8>,
}

impl EventDecoder {
    fn new() -> Self {
        EventDecoder {
            pending: Vec::new(),
        }
    }

    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<WatchEvent>, serde_json::Error> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut consumed = 0;
        {
            let mut stream =
                serde_json::Deserializer::from_slice(&self.pending).into_iter::<WatchEvent>();
            loop {
                match stream.next() {
                    Some(Ok(event)) => {
                        events.push(event);
                        consumed = stream.byte_offset();
                    }
                    Some(Err(err)) if err.is_eof() => break,
                    Some(Err(err)) => return Err(err),
                    None => break,
                }
            }
        }
        self.pending.drain(..consumed);

        Ok(events)
    }
}
