//! Serial dispatch queues.
//!
//! A [`DispatchQueue`] is a named worker thread draining a channel of jobs.
//! Jobs posted to one queue run in submission order on that single thread,
//! which is what serializes status translation and subscriber fan-out for a
//! monitor. Queues are cheap handles and can be shared between monitors; a
//! process-wide default is available through [`DispatchQueue::global`].

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Sender};
use once_cell::sync::Lazy;

type Job = Box<dyn FnOnce() + Send + 'static>;

static GLOBAL: Lazy<DispatchQueue> = Lazy::new(|| DispatchQueue::new("netreach-global"));

/// Handle to a serial executor backed by a dedicated worker thread.
///
/// The worker exits once every handle (and every source attached to the
/// queue) has been dropped.
#[derive(Clone)]
pub struct DispatchQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    label: String,
    tx: Sender<Job>,
}

impl DispatchQueue {
    /// Spawns a new serial queue with the given label.
    pub fn new(label: &str) -> Self {
        let (tx, rx) = unbounded::<Job>();
        thread::spawn(move || {
            for job in rx {
                job();
            }
        });
        DispatchQueue {
            inner: Arc::new(QueueInner {
                label: label.to_string(),
                tx,
            }),
        }
    }

    /// The process-wide default queue, created lazily on first use.
    pub fn global() -> DispatchQueue {
        GLOBAL.clone()
    }

    /// Label the queue was created with.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Posts a job to the back of the queue.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        // The worker outlives every sender, so this only fails during
        // process teardown.
        let _ = self.inner.tx.send(Box::new(job));
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("label", &self.inner.label)
            .finish()
    }
}
