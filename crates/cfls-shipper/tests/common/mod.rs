//! Common test utilities for shipper integration tests
//!
//! In-memory stand-ins for the bucket and for Loki, so the pipeline can be
//! driven end to end without any external service.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use cfls_shipper::{
    labels::LabelSet,
    sink::{Batch, Sink, SinkError},
    storage::{ObjectStore, StorageError},
};
use chrono::{DateTime, Utc};
use flate2::{write::GzEncoder, Compression};
use std::{
    collections::{BTreeMap, BTreeSet},
    io::Write,
    sync::{Arc, Mutex},
};

/// Gzip `text` the way CloudFront delivers its log files
pub fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

/// Minimal CloudFront log with the given data rows
pub fn cloudfront_log(rows: &[&str]) -> String {
    let mut log = String::from("#Version: 1.0\n#Fields: date time c-ip\n");
    for row in rows {
        log.push_str(row);
        log.push('\n');
    }
    log
}

// ============================================================================
// Object store
// ============================================================================

#[derive(Default)]
struct StoreState {
    objects: BTreeMap<String, Vec<u8>>,
    /// Keys returned by `list` although `get` answers NotFound
    phantoms: BTreeSet<String>,
    deleted: Vec<String>,
    fail_list: bool,
    fail_delete: bool,
    list_calls: usize,
}

/// Bucket kept in memory, listed in key order
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, body: Vec<u8>) {
        self.state.lock().unwrap().objects.insert(key.to_string(), body);
    }

    pub fn put_log(&self, key: &str, text: &str) {
        self.put(key, gzip(text));
    }

    /// A key that shows up in listings but is gone by the time it is fetched
    pub fn put_phantom(&self, key: &str) {
        self.state.lock().unwrap().phantoms.insert(key.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().unwrap().objects.contains_key(key)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    pub fn fail_delete(&self, fail: bool) {
        self.state.lock().unwrap().fail_delete = fail;
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self, max_keys: i32) -> Result<Vec<String>, StorageError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.fail_list {
            return Err(StorageError::Service("AccessDenied".to_string()));
        }

        let mut keys: Vec<String> = state
            .objects
            .keys()
            .chain(state.phantoms.iter())
            .cloned()
            .collect();
        keys.sort();
        keys.truncate(max_keys.max(0) as usize);
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete {
            return Err(StorageError::Service("AccessDenied".to_string()));
        }
        state.objects.remove(key);
        state.phantoms.remove(key);
        state.deleted.push(key.to_string());
        Ok(())
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Everything one batch received
#[derive(Debug, Clone, Default)]
pub struct RecordedBatch {
    pub labels: LabelSet,
    pub lines: Vec<String>,
    pub flushes: usize,
}

#[derive(Default)]
struct SinkState {
    batches: Vec<RecordedBatch>,
    fail_flush: bool,
}

/// Sink that records every batch instead of pushing it anywhere
#[derive(Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<RecordedBatch> {
        self.state.lock().unwrap().batches.clone()
    }

    /// All lines received, in batch order
    pub fn lines(&self) -> Vec<String> {
        self.batches().into_iter().flat_map(|b| b.lines).collect()
    }

    pub fn fail_flush(&self, fail: bool) {
        self.state.lock().unwrap().fail_flush = fail;
    }
}

impl Sink for MemorySink {
    fn open(&self, labels: LabelSet) -> Box<dyn Batch> {
        let mut state = self.state.lock().unwrap();
        state.batches.push(RecordedBatch {
            labels,
            ..Default::default()
        });
        Box::new(MemoryBatch {
            state: self.state.clone(),
            index: state.batches.len() - 1,
        })
    }
}

struct MemoryBatch {
    state: Arc<Mutex<SinkState>>,
    index: usize,
}

#[async_trait]
impl Batch for MemoryBatch {
    async fn add(&mut self, _timestamp: DateTime<Utc>, line: String) -> Result<(), SinkError> {
        self.state.lock().unwrap().batches[self.index].lines.push(line);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_flush {
            return Err(SinkError::Status {
                status: 500,
                body: "ingester unavailable".to_string(),
            });
        }
        state.batches[self.index].flushes += 1;
        Ok(())
    }
}
