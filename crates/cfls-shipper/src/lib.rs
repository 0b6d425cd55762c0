//! CloudFront Logs Shipper Library
//!
//! Polls an S3 bucket for gzip-compressed CloudFront access logs (W3C extended
//! format), decodes every data line into a JSON record and pushes the records
//! to Loki under a per-file label set. Shipped files are deleted from the
//! bucket.
//!
//! # Architecture
//!
//! ```text
//!   poll loop ──scan()──▶ WorkQueue (10 x workers) ──▶ worker 1..N
//!                                                       │
//!                          labels::build_labels ◀───────┤
//!                          decoder::W3cDecoder  ◀───────┤
//!                          Sink (Loki push)     ◀───────┤
//!                          ObjectStore::delete  ◀───────┘
//! ```
//!
//! The poll loop and the workers only share the [`queue::WorkQueue`]. A file
//! that fails to ship stops its worker and stays in the bucket; the process is
//! expected to be restarted by its supervisor and will pick the file up again.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cfls_shipper::{config::PipelineConfig, pipeline::Pipeline};
//! # async fn run(
//! #     store: Arc<dyn cfls_shipper::storage::ObjectStore>,
//! #     sink: Arc<dyn cfls_shipper::sink::Sink>,
//! #     config: PipelineConfig,
//! # ) -> anyhow::Result<()> {
//! let pipeline = Arc::new(Pipeline::new(config, store, sink));
//! let mut workers = cfls_shipper::pipeline::spawn_workers(&pipeline);
//! pipeline.scan().await?;
//! pipeline.stop();
//! while let Some(joined) = workers.join_next().await {
//!     joined??;
//! }
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod decoder;
pub mod error;
pub mod labels;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod sink;
pub mod storage;

// Re-export commonly used types
pub use error::{ShipperError, ShipperResult};
pub use labels::LabelSet;
