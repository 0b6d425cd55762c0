//! Log sink interface
//!
//! A [`Sink`] hands out one [`Batch`] per file. Every line added to a batch
//! carries the batch's labels; `flush` pushes whatever is still buffered.
//! Implementations may push early from `add` when their buffer fills up.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::labels::LabelSet;

pub mod loki;

pub use loki::{LokiConfig, LokiSink};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("push rejected with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to encode push body: {0}")]
    Encode(#[from] std::io::Error),

    #[error("failed to serialize push body: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub trait Sink: Send + Sync {
    /// Start a batch whose lines all carry `labels`
    fn open(&self, labels: LabelSet) -> Box<dyn Batch>;
}

#[async_trait]
pub trait Batch: Send {
    async fn add(&mut self, timestamp: DateTime<Utc>, line: String) -> Result<(), SinkError>;

    async fn flush(&mut self) -> Result<(), SinkError>;
}
