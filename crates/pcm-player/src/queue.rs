//! Thread-safe FIFO of raw byte chunks between the caller and the playback worker.
//!
//! The caller side pushes without ever blocking; the worker side blocks in
//! [`StreamQueue::pop_blocking`] until a chunk arrives or the queue is closed.
//! `close()` + draining semantics make shutdown deterministic: chunks pushed before
//! `close()` are still handed out, then the worker sees the end-of-stream sentinel.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

/// One caller write, moved into the queue and consumed exactly once by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamChunk(Vec<u8>);

impl StreamChunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for StreamChunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for StreamChunk {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// Unbounded FIFO of [`StreamChunk`]s.
///
/// ## Design
/// - A single [`Mutex`] guards both the chunk list and the `closed` flag, so a waiter can
///   never miss the transition between "empty" and "closed".
/// - One [`Condvar`] signals "state changed": `push` wakes one waiter, `close` wakes all.
/// - There is no capacity limit and no backpressure. A producer that outpaces the device
///   grows memory without bound and must pace itself.
pub struct StreamQueue {
    inner: Mutex<QueueInner>,
    cv: Condvar,
}

struct QueueInner {
    chunks: VecDeque<StreamChunk>,
    pending_bytes: usize,
    closed: bool,
}

impl Default for StreamQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                chunks: VecDeque::new(),
                pending_bytes: 0,
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a chunk to the tail and wake one waiting consumer.
    ///
    /// Never blocks beyond the lock. Returns `false` (and drops the chunk) if the queue has
    /// already been closed.
    pub fn push(&self, chunk: StreamChunk) -> bool {
        let mut g = self.lock();
        if g.closed {
            return false;
        }
        g.pending_bytes += chunk.len();
        g.chunks.push_back(chunk);
        drop(g);
        self.cv.notify_one();
        true
    }

    /// Block until a chunk is available or the queue is closed.
    ///
    /// Returns the head chunk in insertion order, or `None` once the queue is closed and
    /// fully drained.
    pub fn pop_blocking(&self) -> Option<StreamChunk> {
        let mut g = self.lock();
        while g.chunks.is_empty() && !g.closed {
            g = self.cv.wait(g).unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        let chunk = g.chunks.pop_front()?;
        g.pending_bytes -= chunk.len();
        Some(chunk)
    }

    /// Mark the queue closed and wake every waiter.
    ///
    /// Idempotent. Chunks already queued are still returned by [`Self::pop_blocking`].
    pub fn close(&self) {
        let mut g = self.lock();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of queued chunks (best-effort snapshot).
    pub fn len(&self) -> usize {
        self.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().chunks.is_empty()
    }

    /// Total bytes waiting in the queue (best-effort snapshot).
    pub fn pending_bytes(&self) -> usize {
        self.lock().pending_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn pops_in_insertion_order() {
        let q = StreamQueue::new();
        assert!(q.push(vec![1u8].into()));
        assert!(q.push(vec![2u8, 3].into()));
        assert!(q.push(vec![4u8].into()));
        assert_eq!(q.len(), 3);
        assert_eq!(q.pending_bytes(), 4);

        assert_eq!(q.pop_blocking().unwrap().as_bytes(), &[1]);
        assert_eq!(q.pop_blocking().unwrap().as_bytes(), &[2, 3]);
        assert_eq!(q.pop_blocking().unwrap().as_bytes(), &[4]);
        assert_eq!(q.pending_bytes(), 0);
    }

    #[test]
    fn pop_blocking_wakes_on_push() {
        let q = Arc::new(StreamQueue::new());
        let q_pop = q.clone();
        let barrier = Arc::new(Barrier::new(2));
        let start = barrier.clone();

        let handle = thread::spawn(move || {
            start.wait();
            q_pop.pop_blocking()
        });

        barrier.wait();
        thread::sleep(Duration::from_millis(10));
        q.push(vec![7u8, 8].into());

        let chunk = handle.join().unwrap().unwrap();
        assert_eq!(chunk.into_bytes(), vec![7, 8]);
    }

    #[test]
    fn close_wakes_blocked_consumer_with_sentinel() {
        let q = Arc::new(StreamQueue::new());
        let q_pop = q.clone();
        let (tx, rx) = std::sync::mpsc::channel();

        let handle = thread::spawn(move || {
            let _ = tx.send(());
            q_pop.pop_blocking()
        });

        let _ = rx.recv();
        thread::sleep(Duration::from_millis(10));
        q.close();

        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn drains_backlog_after_close() {
        let q = StreamQueue::new();
        q.push(vec![1u8].into());
        q.push(vec![2u8].into());
        q.close();

        assert_eq!(q.pop_blocking().unwrap().as_bytes(), &[1]);
        assert_eq!(q.pop_blocking().unwrap().as_bytes(), &[2]);
        assert!(q.pop_blocking().is_none());
        assert!(q.pop_blocking().is_none());
    }

    #[test]
    fn close_is_idempotent_and_rejects_late_pushes() {
        let q = StreamQueue::new();
        q.close();
        q.close();
        assert!(q.is_closed());
        assert!(!q.push(vec![1u8].into()));
        assert!(q.is_empty());
        assert!(q.pop_blocking().is_none());
    }

    #[test]
    fn empty_chunks_are_queued() {
        let q = StreamQueue::new();
        q.push(StreamChunk::default());
        q.close();
        assert!(q.pop_blocking().unwrap().is_empty());
        assert!(q.pop_blocking().is_none());
    }
}
