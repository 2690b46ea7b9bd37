//! Bounded tick queue decoupling the external tick source from candle
//! aggregation. `push` never blocks: a full queue drops its oldest entry,
//! favouring recency over completeness.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::domain::candle::Tick;
use crate::domain::error::DaytraderError;
use crate::engine::aggregator::CandleAggregator;

/// How long the consumer parks between polls when the queue is empty;
/// bounds the cancellation latency.
const IDLE_WAIT: Duration = Duration::from_millis(500);

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), DaytraderError>> + Send>>;
type Handler = Arc<dyn Fn(Tick) -> HandlerFuture + Send + Sync>;

pub struct TickQueue {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    buf: Mutex<VecDeque<Tick>>,
    notify: Notify,
    capacity: usize,
    running: AtomicBool,
    handlers: Mutex<Vec<Handler>>,
}

impl TickQueue {
    pub fn new(capacity: usize) -> Self {
        TickQueue {
            inner: Arc::new(Inner {
                buf: Mutex::new(VecDeque::with_capacity(capacity)),
                notify: Notify::new(),
                capacity: capacity.max(1),
                running: AtomicBool::new(false),
                handlers: Mutex::new(Vec::new()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Non-blocking enqueue. Evicts the single oldest queued tick when the
    /// queue is full — intentional, unreported data loss.
    pub fn push(&self, tick: Tick) {
        {
            let mut buf = lock(&self.inner.buf);
            if buf.len() == self.inner.capacity {
                buf.pop_front();
            }
            buf.push_back(tick);
        }
        self.inner.notify.notify_one();
    }

    /// Register a side-effect handler invoked with every consumed tick.
    /// Handler failures are logged and isolated.
    pub fn on_tick<F>(&self, handler: F)
    where
        F: Fn(Tick) -> HandlerFuture + Send + Sync + 'static,
    {
        lock(&self.inner.handlers).push(Arc::new(handler));
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.buf).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Relaxed)
    }

    /// Start the single consumer task: dequeue one tick at a time, ingest
    /// it into the aggregator, then run every registered handler.
    pub fn start(&self, aggregator: Arc<CandleAggregator>) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            log::info!("tick queue consumer started");
            while inner.running.load(Ordering::Relaxed) {
                let next = lock(&inner.buf).pop_front();
                let Some(tick) = next else {
                    let _ = tokio::time::timeout(IDLE_WAIT, inner.notify.notified()).await;
                    continue;
                };

                aggregator.ingest(&tick).await;

                let handlers: Vec<Handler> = lock(&inner.handlers).clone();
                for handler in handlers {
                    if let Err(e) = handler(tick.clone()).await {
                        log::error!("tick handler error: {e}");
                    }
                }
            }
            log::info!("tick queue consumer stopped");
        });
        *lock(&self.task) = Some(handle);
    }

    /// Stop the consumer. In-flight work is abandoned, not awaited.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
        let handle = lock(&self.task).take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
