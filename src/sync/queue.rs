//! Bounded-concurrency sync queue.
//!
//! Jobs are buffered in arrival order. A single dispatcher task pops them
//! one at a time, waits while the queue is paused, takes one of the
//! `concurrency` slots and spawns the worker. The queue starts paused; the
//! adapter resumes it once the cache is ready.
//!
//! A running job may release its slot early (see [`JobContext::release_slot`])
//! and keep awaiting other jobs, which is how a collection read waits for its
//! own record reads without holding a slot they might need.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::sync::error::SyncResult;
use crate::sync::job::{Job, JobHandle};

/// Slots used when nothing else is configured.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Runs dispatched jobs.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    async fn run(&self, job: Job, ctx: JobContext) -> SyncResult<Value>;
}

/// What a running job knows about the queue that runs it.
pub struct JobContext {
    queue: SyncQueue,
    slot: Option<OwnedSemaphorePermit>,
}

impl JobContext {
    /// the queue this job runs on, for pushing follow-up jobs
    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Give the slot back before the job finishes.
    pub fn release_slot(&mut self) {
        self.slot.take();
    }

    pub fn holds_slot(&self) -> bool {
        self.slot.is_some()
    }
}

/// Snapshot of the queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// jobs waiting for dispatch
    pub pending: usize,
    /// slots currently taken
    pub running: usize,
    /// jobs pushed since creation
    pub pushed: usize,
    /// jobs whose worker has returned
    pub completed: usize,
    pub concurrency: usize,
    pub paused: bool,
}

/// Clone this to share the queue - it uses Arc internally.
#[derive(Clone)]
pub struct SyncQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    tx: mpsc::UnboundedSender<Queued>,
    paused: watch::Sender<bool>,
    slots: Arc<Semaphore>,
    concurrency: usize,
    pending: AtomicUsize,
    pushed: AtomicUsize,
    completed: AtomicUsize,
}

struct Queued {
    job: Job,
    tx: oneshot::Sender<SyncResult<Value>>,
}

impl SyncQueue {
    /// Create a paused queue. Must be called inside a tokio runtime.
    pub fn new(concurrency: usize, worker: Arc<dyn Worker>) -> Self {
        let concurrency = concurrency.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let (paused, paused_rx) = watch::channel(true);
        let slots = Arc::new(Semaphore::new(concurrency));

        let inner = Arc::new(QueueInner {
            tx,
            paused,
            slots: Arc::clone(&slots),
            concurrency,
            pending: AtomicUsize::new(0),
            pushed: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        });

        tokio::spawn(dispatch(Arc::downgrade(&inner), rx, paused_rx, slots, worker));
        debug!(concurrency, "sync queue created (paused)");
        Self { inner }
    }

    /// Append a job. The handle resolves with the job's own outcome.
    pub fn push(&self, job: Job) -> JobHandle {
        let (tx, handle) = JobHandle::channel(Some(job.id));
        debug!(job = %job.id, method = %job.method, "job queued");

        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        self.inner.pushed.fetch_add(1, Ordering::SeqCst);
        if self.inner.tx.send(Queued { job, tx }).is_err() {
            // the dispatcher is gone; dropping the sender fails the handle
            self.inner.pending.fetch_sub(1, Ordering::SeqCst);
        }
        handle
    }

    /// Start (or continue) dispatching buffered jobs in arrival order.
    pub fn resume(&self) {
        let was_paused = self.inner.paused.send_replace(false);
        if was_paused {
            info!(pending = self.inner.pending.load(Ordering::SeqCst), "sync queue resumed");
        }
    }

    /// Stop dispatching. Jobs already running are not affected.
    pub fn pause(&self) {
        if !self.inner.paused.send_replace(true) {
            info!("sync queue paused");
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.inner.paused.borrow()
    }

    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.inner.pending.load(Ordering::SeqCst),
            running: self.inner.concurrency - self.inner.slots.available_permits(),
            pushed: self.inner.pushed.load(Ordering::SeqCst),
            completed: self.inner.completed.load(Ordering::SeqCst),
            concurrency: self.inner.concurrency,
            paused: self.is_paused(),
        }
    }
}

async fn dispatch(
    queue: Weak<QueueInner>,
    mut rx: mpsc::UnboundedReceiver<Queued>,
    mut paused: watch::Receiver<bool>,
    slots: Arc<Semaphore>,
    worker: Arc<dyn Worker>,
) {
    while let Some(queued) = rx.recv().await {
        if paused.wait_for(|paused| !*paused).await.is_err() {
            break;
        }
        let Ok(slot) = Arc::clone(&slots).acquire_owned().await else {
            break;
        };
        let Some(inner) = queue.upgrade() else {
            break;
        };
        inner.pending.fetch_sub(1, Ordering::SeqCst);

        let queue = SyncQueue { inner };
        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
            let Queued { job, tx } = queued;
            let id = job.id;
            debug!(job = %id, method = %job.method, "job started");

            let ctx = JobContext {
                queue: queue.clone(),
                slot: Some(slot),
            };
            let result = worker.run(job, ctx).await;

            queue.inner.completed.fetch_add(1, Ordering::SeqCst);
            debug!(job = %id, ok = result.is_ok(), "job finished");
            // the caller may have dropped its handle
            let _ = tx.send(result);
        });
    }
    debug!("sync queue dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use parking_lot::Mutex;

    use crate::handle::HandleBuilder;
    use crate::storage::{GitStore, RepoId};
    use crate::sync::error::SyncError;
    use crate::sync::job::Method;
    use crate::sync::model::Model;
    use crate::sync::options::SyncOptions;
    use tempfile::TempDir;

    /// echoes the record id after a short sleep, tracking overlap
    #[derive(Default)]
    struct EchoWorker {
        running: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<String>>,
        delay: Duration,
    }

    #[async_trait]
    impl Worker for EchoWorker {
        async fn run(&self, job: Job, _ctx: JobContext) -> SyncResult<Value> {
            let id = job.model.id().unwrap_or_default().to_string();
            self.order.lock().push(id.clone());

            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if id == "bad" {
                return Err(SyncError::UnsupportedMethod("bad".into()));
            }
            Ok(Value::String(id))
        }
    }

    fn fixture() -> (TempDir, Model, crate::handle::RepositoryHandle) {
        let dir = TempDir::new().unwrap();
        let git = GitStore::init(dir.path()).unwrap();
        let handle = HandleBuilder::new(RepoId::parse("acme/widgets").unwrap(), Arc::new(git)).build();
        let todos = Model::collection("https://github.com/acme/widgets/todos");
        (dir, todos, handle)
    }

    fn job(collection: &Model, handle: &crate::handle::RepositoryHandle, id: &str) -> Job {
        Job::new(
            Method::Read,
            Model::record(id, collection.clone()),
            handle.clone(),
            SyncOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_paused_queue_runs_nothing_until_resumed() {
        let (_dir, todos, handle) = fixture();
        let worker = Arc::new(EchoWorker::default());
        let queue = SyncQueue::new(DEFAULT_CONCURRENCY, worker.clone());

        let handles: Vec<_> = ["a", "b", "c"].iter().map(|id| queue.push(job(&todos, &handle, id))).collect();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(queue.is_paused());
        assert_eq!(worker.order.lock().len(), 0);
        assert_eq!(queue.stats().pending, 3);

        queue.resume();
        let results = futures::future::join_all(handles).await;
        let values: Vec<Value> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![Value::from("a"), Value::from("b"), Value::from("c")]);

        let stats = queue.stats();
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.pending, 0);
        assert!(!stats.paused);
    }

    #[tokio::test]
    async fn test_concurrency_bound() {
        let (_dir, todos, handle) = fixture();
        let worker = Arc::new(EchoWorker {
            delay: Duration::from_millis(20),
            ..EchoWorker::default()
        });
        let queue = SyncQueue::new(2, worker.clone());
        queue.resume();

        let handles: Vec<_> = (0..6)
            .map(|n| queue.push(job(&todos, &handle, &n.to_string())))
            .collect();
        for result in futures::future::join_all(handles).await {
            result.unwrap();
        }

        assert_eq!(worker.peak.load(Ordering::SeqCst), 2);
        assert_eq!(queue.stats().running, 0);
    }

    #[tokio::test]
    async fn test_dispatch_is_fifo() {
        let (_dir, todos, handle) = fixture();
        let worker = Arc::new(EchoWorker::default());
        let queue = SyncQueue::new(1, worker.clone());

        let ids = ["x", "y", "z", "w"];
        let handles: Vec<_> = ids.iter().map(|id| queue.push(job(&todos, &handle, id))).collect();
        queue.resume();
        futures::future::join_all(handles).await;

        assert_eq!(*worker.order.lock(), ids.to_vec());
    }

    #[tokio::test]
    async fn test_outcomes_reach_their_own_handle() {
        let (_dir, todos, handle) = fixture();
        let queue = SyncQueue::new(4, Arc::new(EchoWorker::default()));
        queue.resume();

        let good = queue.push(job(&todos, &handle, "good"));
        let bad = queue.push(job(&todos, &handle, "bad"));

        assert!(matches!(bad.await, Err(SyncError::UnsupportedMethod(_))));
        assert_eq!(good.await.unwrap(), Value::from("good"));
    }

    #[tokio::test]
    async fn test_pause_holds_new_jobs() {
        let (_dir, todos, handle) = fixture();
        let worker = Arc::new(EchoWorker::default());
        let queue = SyncQueue::new(2, worker.clone());
        queue.resume();
        queue.push(job(&todos, &handle, "first")).await.unwrap();

        queue.pause();
        let held = queue.push(job(&todos, &handle, "second"));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(worker.order.lock().len(), 1);

        queue.resume();
        assert_eq!(held.await.unwrap(), Value::from("second"));
    }

    #[tokio::test]
    async fn test_released_slot_lets_children_run() {
        struct Parent;

        #[async_trait]
        impl Worker for Parent {
            async fn run(&self, job: Job, mut ctx: JobContext) -> SyncResult<Value> {
                if job.model.is_record() {
                    return Ok(Value::Bool(true));
                }
                let child = ctx.queue().push(job.child("leaf"));
                ctx.release_slot();
                assert!(!ctx.holds_slot());
                child.await
            }
        }

        let (_dir, todos, handle) = fixture();
        let queue = SyncQueue::new(1, Arc::new(Parent));
        queue.resume();

        let parent = Job::new(Method::Read, todos, handle, SyncOptions::default());
        let result = tokio::time::timeout(Duration::from_secs(5), queue.push(parent)).await;
        assert_eq!(result.unwrap().unwrap(), Value::Bool(true));
    }
}
