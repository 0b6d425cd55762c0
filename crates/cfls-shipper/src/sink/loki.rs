//! Loki push API client
//!
//! Batches are pushed as gzip-compressed JSON to `/loki/api/v1/push`:
//!
//! ```json
//! {"streams":[{"stream":{"namespace":"teamA"},"values":[["1704067200000000000","{...}"]]}]}
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::{write::GzEncoder, Compression};
use reqwest::{
    header::{CONTENT_ENCODING, CONTENT_TYPE},
    Client,
};
use serde::Serialize;
use std::{io::Write, sync::Arc};
use tracing::{debug, instrument};

use super::{Batch, Sink, SinkError};
use crate::labels::LabelSet;

pub const PUSH_PATH: &str = "/loki/api/v1/push";

/// Default number of entries buffered before `add` pushes on its own
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Clone)]
pub struct LokiConfig {
    /// Base URL, e.g. `https://loki.example.com`
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub batch_size: usize,
}

impl LokiConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: None,
            password: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn push_url(&self) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), PUSH_PATH)
    }
}

impl std::fmt::Debug for LokiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LokiConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

struct PushClient {
    http: Client,
    push_url: String,
    user: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    streams: [PushStream<'a>; 1],
}

#[derive(Serialize)]
struct PushStream<'a> {
    stream: &'a LabelSet,
    values: &'a [(String, String)],
}

impl PushClient {
    fn encode(labels: &LabelSet, values: &[(String, String)]) -> Result<Vec<u8>, SinkError> {
        let request = PushRequest {
            streams: [PushStream {
                stream: labels,
                values,
            }],
        };

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        serde_json::to_writer(&mut encoder, &request)?;
        encoder.flush()?;
        Ok(encoder.finish()?)
    }

    #[instrument(skip_all, fields(entries = values.len()))]
    async fn push(&self, labels: &LabelSet, values: &[(String, String)]) -> Result<(), SinkError> {
        let body = Self::encode(labels, values)?;

        let mut request = self
            .http
            .post(&self.push_url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(body);

        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = status.as_u16(), "pushed batch to loki");
        Ok(())
    }
}

/// [`Sink`] that pushes to a Loki-compatible endpoint
#[derive(Clone)]
pub struct LokiSink {
    client: Arc<PushClient>,
    batch_size: usize,
}

impl LokiSink {
    pub fn new(config: LokiConfig) -> Result<Self, SinkError> {
        let http = Client::builder()
            .user_agent(concat!("cfls-shipper/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(http, config))
    }

    pub fn with_client(http: Client, config: LokiConfig) -> Self {
        Self {
            client: Arc::new(PushClient {
                http,
                push_url: config.push_url(),
                user: config.user,
                password: config.password,
            }),
            batch_size: config.batch_size.max(1),
        }
    }
}

impl Sink for LokiSink {
    fn open(&self, labels: LabelSet) -> Box<dyn Batch> {
        Box::new(LokiBatch {
            client: self.client.clone(),
            labels,
            values: Vec::new(),
            batch_size: self.batch_size,
        })
    }
}

/// Entries of one stream awaiting a push
pub struct LokiBatch {
    client: Arc<PushClient>,
    labels: LabelSet,
    values: Vec<(String, String)>,
    batch_size: usize,
}

impl LokiBatch {
    async fn send(&mut self) -> Result<(), SinkError> {
        if self.values.is_empty() {
            return Ok(());
        }
        self.client.push(&self.labels, &self.values).await?;
        self.values.clear();
        Ok(())
    }
}

#[async_trait]
impl Batch for LokiBatch {
    async fn add(&mut self, timestamp: DateTime<Utc>, line: String) -> Result<(), SinkError> {
        let nanos = timestamp.timestamp_nanos_opt().unwrap_or_default();
        self.values.push((nanos.to_string(), line));

        if self.values.len() >= self.batch_size {
            self.send().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.send().await
    }
}
