//! # Queue Module
//!
//! Multi-producer, multi-consumer FIFO that connects pipeline stages.
//!
//! ## Shutdown protocol
//! A stage that writes into a queue calls [`Queue::register_producer`]
//! before it starts and [`Queue::producer_done`] when it stops. The queue
//! shuts itself down when the last registered producer leaves, so N hash
//! workers can share one output queue without anyone counting them.
//!
//! Shutdown is monotonic. It wakes every blocked producer (their push
//! fails and hands the item back) and every blocked consumer (they drain
//! what is left, then receive `None`).

use crossbeam_channel::{bounded, unbounded, Receiver, Select, Sender, TrySendError};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Why a push did not enqueue its item. The item is handed back.
#[derive(PartialEq, Eq)]
pub enum PushError<T> {
    /// Non-blocking push found the queue at capacity
    Full(T),
    /// The queue has been shut down
    Shutdown(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Shutdown(item) => item,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, PushError::Shutdown(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => write!(f, "Full(..)"),
            PushError::Shutdown(_) => write!(f, "Shutdown(..)"),
        }
    }
}

/// Cooperative cancellation flag shared by the controller and its stages.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Thread-safe FIFO with optional capacity and producer-counted shutdown.
pub struct Queue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    capacity: Option<usize>,
    closed: AtomicBool,
    // Dropping the sender disconnects `shutdown_rx`, which wakes every select.
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    producers: AtomicUsize,
}

impl<T> Queue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self::with_channel(sender, receiver, Some(capacity))
    }

    pub fn unbounded() -> Self {
        let (sender, receiver) = unbounded();
        Self::with_channel(sender, receiver, None)
    }

    fn with_channel(sender: Sender<T>, receiver: Receiver<T>, capacity: Option<usize>) -> Self {
        let (shutdown_tx, shutdown_rx) = bounded(0);
        Self {
            sender,
            receiver,
            capacity,
            closed: AtomicBool::new(false),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            producers: AtomicUsize::new(0),
        }
    }

    /// Push an item, blocking while the queue is full.
    ///
    /// Fails with [`PushError::Shutdown`] once the queue is shut down,
    /// including when shutdown happens while blocked.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        if self.is_shutdown() {
            return Err(PushError::Shutdown(item));
        }

        let mut select = Select::new();
        let send_index = select.send(&self.sender);
        let shutdown_index = select.recv(&self.shutdown_rx);
        let operation = select.select();

        match operation.index() {
            index if index == send_index => operation
                .send(&self.sender, item)
                .map_err(|error| PushError::Shutdown(error.into_inner())),
            index => {
                debug_assert_eq!(index, shutdown_index);
                let _ = operation.recv(&self.shutdown_rx);
                Err(PushError::Shutdown(item))
            }
        }
    }

    /// Push without blocking.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        if self.is_shutdown() {
            return Err(PushError::Shutdown(item));
        }
        self.sender.try_send(item).map_err(|error| match error {
            TrySendError::Full(item) => PushError::Full(item),
            TrySendError::Disconnected(item) => PushError::Shutdown(item),
        })
    }

    /// Pop the next item, blocking until one arrives.
    ///
    /// After shutdown, items still queued are returned first; `None` means
    /// the queue is shut down and empty.
    pub fn wait_and_pop(&self) -> Option<T> {
        let mut select = Select::new();
        let recv_index = select.recv(&self.receiver);
        select.recv(&self.shutdown_rx);
        let operation = select.select();

        if operation.index() == recv_index {
            return operation.recv(&self.receiver).ok();
        }
        let _ = operation.recv(&self.shutdown_rx);
        self.receiver.try_recv().ok()
    }

    /// Pop without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// `None` for unbounded queues
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn register_producer(&self) {
        self.producers.fetch_add(1, Ordering::SeqCst);
    }

    /// Deregister a producer; the last one out shuts the queue down.
    pub fn producer_done(&self) {
        let previous = self
            .producers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                count.checked_sub(1)
            });

        match previous {
            Ok(1) => self.shutdown(),
            Ok(_) => {}
            Err(_) => warn!("producer_done called with no registered producers"),
        }
    }

    pub fn producer_count(&self) -> usize {
        self.producers.load(Ordering::SeqCst)
    }

    /// Shut the queue down. Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut guard = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.take();
    }

    /// Cancel the caller's token and shut this queue down.
    pub fn request_shutdown(&self, token: &CancellationToken) {
        token.cancel();
        self.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("producers", &self.producer_count())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn preserves_fifo_order() {
        let queue = Queue::unbounded();
        for i in 0..5 {
            queue.push(i).unwrap();
        }

        let popped: Vec<i32> = std::iter::from_fn(|| queue.try_pop()).collect();
        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn try_push_reports_full() {
        let queue = Queue::bounded(1);
        queue.try_push(1).unwrap();

        let error = queue.try_push(2).unwrap_err();
        assert_eq!(error, PushError::Full(2));
    }

    #[test]
    fn zero_capacity_holds_one_item() {
        let queue = Queue::bounded(0);
        assert_eq!(queue.capacity(), Some(1));
        assert!(queue.try_push("a").is_ok());
    }

    #[test]
    fn push_after_shutdown_returns_item() {
        let queue = Queue::bounded(4);
        queue.shutdown();

        let error = queue.push("photo").unwrap_err();
        assert!(error.is_shutdown());
        assert_eq!(error.into_inner(), "photo");
    }

    #[test]
    fn shutdown_drains_remaining_items_first() {
        let queue = Queue::bounded(4);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.shutdown();

        assert_eq!(queue.wait_and_pop(), Some(1));
        assert_eq!(queue.wait_and_pop(), Some(2));
        assert_eq!(queue.wait_and_pop(), None);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let queue: Queue<u8> = Queue::unbounded();
        queue.shutdown();
        queue.shutdown();
        assert!(queue.is_shutdown());
        assert_eq!(queue.wait_and_pop(), None);
    }

    #[test]
    fn last_producer_done_unblocks_waiting_consumer() {
        let queue: Arc<Queue<u32>> = Arc::new(Queue::bounded(1));
        queue.register_producer();

        let (done_tx, done_rx) = mpsc::channel();
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let result = queue.wait_and_pop();
                done_tx.send(result).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(50));
        queue.producer_done();

        let result = done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(result, None);
        consumer.join().unwrap();
    }

    #[test]
    fn queue_stays_open_until_every_producer_is_done() {
        let queue: Queue<u32> = Queue::unbounded();
        queue.register_producer();
        queue.register_producer();

        queue.producer_done();
        assert!(!queue.is_shutdown());

        queue.producer_done();
        assert!(queue.is_shutdown());
    }

    #[test]
    fn unmatched_producer_done_does_not_underflow() {
        let queue: Queue<u32> = Queue::unbounded();
        queue.producer_done();
        assert_eq!(queue.producer_count(), 0);
        assert!(!queue.is_shutdown());
    }

    #[test]
    fn shutdown_unblocks_full_producer() {
        let queue = Arc::new(Queue::bounded(1));
        queue.push(0).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(1))
        };

        thread::sleep(Duration::from_millis(50));
        queue.shutdown();

        let result = producer.join().unwrap();
        assert_eq!(result, Err(PushError::Shutdown(1)));
    }

    #[test]
    fn request_shutdown_cancels_token() {
        let queue: Queue<u32> = Queue::unbounded();
        let token = CancellationToken::new();

        queue.request_shutdown(&token);

        assert!(token.is_cancelled());
        assert!(queue.is_shutdown());
    }

    #[test]
    fn many_producers_one_consumer_sees_every_item() {
        let queue = Arc::new(Queue::bounded(8));
        for _ in 0..4 {
            queue.register_producer();
        }

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..100 {
                        queue.push(p * 100 + i).unwrap();
                    }
                    queue.producer_done();
                })
            })
            .collect();

        let mut seen = Vec::new();
        while let Some(item) = queue.wait_and_pop() {
            seen.push(item);
        }
        for producer in producers {
            producer.join().unwrap();
        }

        seen.sort_unstable();
        assert_eq!(seen, (0..400).collect::<Vec<_>>());
    }
}
