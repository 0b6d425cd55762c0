//! Object storage access
//!
//! The pipeline only needs three calls against the source bucket, captured by
//! [`ObjectStore`]. [`S3Store`] is the production implementation.

use async_trait::async_trait;
use thiserror::Error;

pub mod config;
pub mod s3;

pub use config::StorageConfig;
pub use s3::S3Store;

/// Listing page size; remaining objects are picked up by the next poll
pub const LIST_PAGE_SIZE: i32 = 100;

#[derive(Error, Debug)]
pub enum StorageError {
    /// The object does not exist (already processed by another run)
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage request failed: {0}")]
    Service(String),

    #[error("failed to read object body: {0}")]
    Body(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List up to `max_keys` object keys in listing order.
    async fn list(&self, max_keys: i32) -> Result<Vec<String>, StorageError>;

    /// Fetch the whole body of `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
