//! Discovery, work queue and worker pool
//!
//! [`Pipeline::scan`] lists one page of the bucket into the [`WorkQueue`];
//! workers spawned by [`spawn_workers`] drain it, shipping each file with
//! [`Pipeline::ship_file`] and deleting it afterwards.
//!
//! A worker stops at the first file it fails to ship and leaves that file in
//! the bucket. Lines already pushed for the file are not retracted, so the
//! next run of the process ships them again.

use chrono::Utc;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::{task::JoinSet, time::MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::PipelineConfig,
    decoder::{decompress, Line, W3cDecoder},
    error::{ShipperError, ShipperResult},
    labels::build_labels,
    queue::WorkQueue,
    sink::Sink,
    storage::{ObjectStore, LIST_PAGE_SIZE},
};

/// Result of shipping one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Every data line was pushed and the batch flushed
    Shipped { lines: usize },
    /// The object was already gone
    Missing,
}

pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn Sink>,
    queue: Arc<WorkQueue>,
    stopped: AtomicBool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn ObjectStore>, sink: Arc<dyn Sink>) -> Self {
        let queue = Arc::new(WorkQueue::new(config.queue_capacity()));
        Self {
            config,
            store,
            sink,
            queue,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop accepting work and close the queue.
    ///
    /// Workers finish their current file, drain what is queued and exit.
    /// Returns `true` for the call that actually stopped the pipeline.
    pub fn stop(&self) -> bool {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.queue.close();
        info!(queue = self.queue.len(), "pipeline stopped");
        true
    }

    /// List one page of the bucket and enqueue every key.
    ///
    /// Blocks while the queue is full. Returns the number of keys enqueued.
    #[instrument(skip(self))]
    pub async fn scan(&self) -> ShipperResult<usize> {
        let keys = self
            .store
            .list(LIST_PAGE_SIZE)
            .await
            .map_err(ShipperError::List)?;

        let start = Instant::now();
        let mut queued = 0;

        for key in keys {
            if self.is_stopped() {
                break;
            }
            if key.is_empty() {
                continue;
            }
            if self.queue.push(key).await.is_err() {
                break;
            }
            queued += 1;
        }

        if queued > 0 {
            info!(
                found = queued,
                duration = ?start.elapsed(),
                queue = self.queue.len(),
                "new files"
            );
        }

        Ok(queued)
    }

    /// Call [`Pipeline::scan`] every `interval` until the pipeline stops.
    ///
    /// A failed listing is logged and retried on the next tick.
    pub async fn poll(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.is_stopped() {
                break;
            }
            if let Err(err) = self.scan().await {
                error!(error = %err, "failed to list bucket");
            }
        }

        debug!("poller stopped");
    }

    /// Drain the queue until it is closed and empty.
    ///
    /// Returns the error of the first file that could not be shipped; that
    /// file is not deleted.
    pub async fn worker(&self, id: usize) -> ShipperResult<()> {
        debug!(worker = id, "worker started");

        while let Some(key) = self.queue.pop().await {
            if let Err(err) = self.ship_file(&key).await {
                error!(
                    worker = id,
                    key = %key,
                    sink = err.is_sink_error(),
                    error = %err,
                    "failed to ship file"
                );
                return Err(err);
            }

            if let Err(err) = self.store.delete(&key).await {
                error!(worker = id, key = %key, error = %err, "failed to delete file");
            }
        }

        debug!(worker = id, "worker stopped");
        Ok(())
    }

    /// Fetch, decode and push a single object.
    #[instrument(skip(self), fields(cluster = %self.config.cluster))]
    pub async fn ship_file(&self, key: &str) -> ShipperResult<FileOutcome> {
        let start = Instant::now();
        let labels = build_labels(key, &self.config.cluster, &self.config.static_labels)?;

        let data = match self.store.get(key).await {
            Ok(data) => data,
            Err(err) if err.is_not_found() => {
                debug!(key, "skipping non-existent file");
                return Ok(FileOutcome::Missing);
            },
            Err(source) => {
                return Err(ShipperError::Fetch {
                    key: key.to_string(),
                    source,
                })
            },
        };

        let mut batch = self.sink.open(labels.clone());

        let decompressed = decompress(&data).map_err(ShipperError::Decompress)?;
        let text = String::from_utf8_lossy(&decompressed);

        let mut decoder = W3cDecoder::new();
        let mut lines = 0usize;

        for line in text.lines() {
            let json = match decoder.feed(line)? {
                Line::Record(record) => record.to_json()?,
                Line::Header | Line::Skipped => continue,
            };
            batch
                .add(Utc::now(), json)
                .await
                .map_err(ShipperError::Send)?;
            lines += 1;
        }

        if decoder.header().is_empty() && decoder.lines_seen() > 0 {
            warn!(key, "file has no #Fields: directive, nothing shipped");
        }

        batch.flush().await.map_err(ShipperError::Flush)?;

        let elapsed = start.elapsed();
        let rate = lines as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        debug!(
            key,
            labels = ?labels,
            lines,
            duration = ?elapsed,
            lines_per_sec = %format_args!("{:.2}", rate),
            "shipped file"
        );

        Ok(FileOutcome::Shipped { lines })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Spawn one worker task per configured worker
pub fn spawn_workers(pipeline: &Arc<Pipeline>) -> JoinSet<ShipperResult<()>> {
    let mut workers = JoinSet::new();
    for id in 0..pipeline.config.workers {
        let pipeline = pipeline.clone();
        workers.spawn(async move { pipeline.worker(id).await });
    }
    workers
}
