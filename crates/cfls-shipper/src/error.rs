//! Shipper error types
//!
//! Every variant other than [`ShipperError::List`] is file-fatal: it aborts the
//! current file, leaves the object in the bucket and stops the worker that hit
//! it.

use thiserror::Error;

use crate::{decoder::DecodeError, sink::SinkError, storage::StorageError};

/// Result type alias for shipper operations
pub type ShipperResult<T> = std::result::Result<T, ShipperError>;

#[derive(Error, Debug)]
pub enum ShipperError {
    #[error("failed to list objects: {0}")]
    List(#[source] StorageError),

    #[error("object key `{0}` does not have <namespace>/<source>/ segments")]
    InvalidKey(String),

    #[error("failed to get object {key}: {source}")]
    Fetch {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to create gzip reader: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("error parsing data line: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to send batch: {0}")]
    Send(#[source] SinkError),

    #[error("failed to flush batch: {0}")]
    Flush(#[source] SinkError),
}

impl ShipperError {
    /// Whether the error was raised by the sink rather than by the input file
    pub fn is_sink_error(&self) -> bool {
        matches!(self, ShipperError::Send(_) | ShipperError::Flush(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_mentions_key() {
        let err = ShipperError::Fetch {
            key: "ns/dist/a.gz".to_string(),
            source: StorageError::Service("access denied".to_string()),
        };
        let message = err.to_string();
        assert!(message.contains("ns/dist/a.gz"));
        assert!(message.contains("access denied"));
    }

    #[test]
    fn test_is_sink_error() {
        let err = ShipperError::Flush(SinkError::Status {
            status: 500,
            body: String::new(),
        });
        assert!(err.is_sink_error());
        assert!(!ShipperError::InvalidKey("x".to_string()).is_sink_error());
    }
}
