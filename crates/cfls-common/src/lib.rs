//! CFLS Common Library
//!
//! Pieces shared by the shipper binary and its tests.
//!
//! - **Logging**: tracing subscriber setup (console/file, text/JSON)
//! - **Key/value lists**: parsing of `key=value,key=value` settings
//!
//! # Example
//!
//! ```no_run
//! use cfls_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod kv;
pub mod logging;

pub use kv::{parse_pairs, KvError};
