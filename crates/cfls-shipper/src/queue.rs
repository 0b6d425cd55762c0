//! Bounded multi-consumer work queue of object keys
//!
//! Producers block in [`WorkQueue::push`] while the queue is full. Consumers
//! share one receiver, so each key is handed to exactly one of them.
//! [`WorkQueue::close`] refuses further pushes, including pushes already
//! waiting for a slot; consumers still drain what is buffered and then see
//! `None`.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};

/// Returned by [`WorkQueue::push`] once the queue has been closed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("work queue is closed")]
pub struct QueueClosed;

pub struct WorkQueue {
    sender: Mutex<Option<mpsc::Sender<String>>>,
    receiver: AsyncMutex<mpsc::Receiver<String>>,
    closed: Notify,
    depth: AtomicUsize,
    capacity: usize,
}

impl WorkQueue {
    /// Create a queue holding at most `capacity` keys (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: AsyncMutex::new(receiver),
            closed: Notify::new(),
            depth: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys enqueued but not yet dequeued
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .map(|sender| sender.is_none())
            .unwrap_or(true)
    }

    /// Enqueue `key`, waiting for a free slot if the queue is full.
    ///
    /// Fails with [`QueueClosed`] if the queue is closed before the key is
    /// accepted, even while waiting for a slot.
    pub async fn push(&self, key: String) -> Result<(), QueueClosed> {
        let closed = self.closed.notified();
        tokio::pin!(closed);
        // Registered before the sender is checked so a concurrent close wakes us.
        closed.as_mut().enable();

        let sender = self
            .sender
            .lock()
            .map_err(|_| QueueClosed)?
            .clone()
            .ok_or(QueueClosed)?;

        let permit = tokio::select! {
            permit = sender.reserve() => permit.map_err(|_| QueueClosed)?,
            _ = &mut closed => return Err(QueueClosed),
        };

        // Sending under the sender lock orders this push against close().
        let guard = self.sender.lock().map_err(|_| QueueClosed)?;
        if guard.is_none() {
            return Err(QueueClosed);
        }
        // Counted before the key becomes visible so a consumer can never
        // decrement below zero.
        self.depth.fetch_add(1, Ordering::SeqCst);
        permit.send(key);
        Ok(())
    }

    /// Dequeue the next key, or `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<String> {
        let key = self.receiver.lock().await.recv().await?;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(key)
    }

    /// Close the queue. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        let closed = match self.sender.lock() {
            Ok(mut sender) => sender.take().is_some(),
            Err(_) => false,
        };
        if closed {
            self.closed.notify_waiters();
        }
        closed
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_push_pop_fifo() {
        let queue = WorkQueue::new(4);
        queue.push("a".to_string()).await.unwrap();
        queue.push("b".to_string()).await.unwrap();
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().await.as_deref(), Some("a"));
        assert_eq!(queue.pop().await.as_deref(), Some("b"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_close_rejects_push_and_drains() {
        let queue = WorkQueue::new(4);
        queue.push("a".to_string()).await.unwrap();

        assert!(queue.close());
        assert!(queue.is_closed());
        assert_eq!(queue.push("b".to_string()).await, Err(QueueClosed));

        assert_eq!(queue.pop().await.as_deref(), Some("a"));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let queue = WorkQueue::new(1);
        assert!(queue.close());
        assert!(!queue.close());
        assert!(!queue.close());
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_push_blocks_when_full() {
        let queue = Arc::new(WorkQueue::new(2));
        queue.push("a".to_string()).await.unwrap();
        queue.push("b".to_string()).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push("c".to_string()).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().await.as_deref(), Some("a"));
        timeout(Duration::from_secs(1), producer)
            .await
            .expect("producer should be released")
            .unwrap()
            .unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_close_rejects_waiting_push() {
        let queue = Arc::new(WorkQueue::new(1));
        queue.push("a".to_string()).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push("late".to_string()).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        assert!(queue.close());
        let pushed = timeout(Duration::from_secs(1), producer)
            .await
            .expect("waiting push should be released by close")
            .unwrap();
        assert_eq!(pushed, Err(QueueClosed));

        assert_eq!(queue.pop().await.as_deref(), Some("a"));
        assert_eq!(queue.pop().await, None);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_close_rejects_push_released_by_pop() {
        let queue = Arc::new(WorkQueue::new(1));
        queue.push("a".to_string()).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push("late".to_string()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Free the slot and close before the producer gets to run again
        assert_eq!(queue.pop().await.as_deref(), Some("a"));
        queue.close();

        assert_eq!(producer.await.unwrap(), Err(QueueClosed));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_minimum_capacity() {
        let queue = WorkQueue::new(0);
        assert_eq!(queue.capacity(), 1);
    }

    #[tokio::test]
    async fn test_pop_waits_on_open_empty_queue() {
        let queue = Arc::new(WorkQueue::new(1));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!consumer.is_finished());

        queue.close();
        assert_eq!(consumer.await.unwrap(), None);
    }
}
