//! Per-device debounce timer.
//!
//! A [`Debouncer`] owns at most one live wait task. Every call to
//! [`Debouncer::arm`] pushes the deadline to `now + quiescence`; the task
//! sleeps until the deadline, re-reads it on each wake, and only fires once a
//! full quiescence window has passed without another `arm`. The action is
//! handed the deadline that closed, not the time it happens to run at.

use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Slot {
    /// When the pending action may fire. Only ever moves forward.
    decide_at: Option<Instant>,

    /// The live wait task, if any.
    task: Option<JoinHandle<()>>,
}

/// Single-slot delayed action with a movable deadline.
#[derive(Debug)]
pub struct Debouncer {
    quiescence: Duration,
    slot: Arc<Mutex<Slot>>,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Debouncer {
    pub fn new(quiescence: Duration) -> Self {
        Self {
            quiescence,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Schedule `fire` to run once `quiescence` has elapsed without another
    /// call to `arm`. It is called with the deadline that passed.
    ///
    /// If an action is already pending only its deadline moves and `fire` is
    /// dropped; the pending action runs at the new deadline. Must be called
    /// from within a tokio runtime.
    pub fn arm<F, Fut>(&self, fire: F)
    where
        F: FnOnce(Instant) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = lock(&self.slot);
        slot.decide_at = Some(Instant::now() + self.quiescence);

        if slot.task.is_none() {
            let shared = self.slot.clone();
            slot.task = Some(tokio::spawn(wait_then_fire(shared, fire)));
        }
    }

    /// Drop the pending action, if any, without running it.
    pub fn cancel(&self) {
        let mut slot = lock(&self.slot);
        slot.decide_at = None;
        if let Some(task) = slot.task.take() {
            task.abort();
        }
    }

    /// Whether an action is waiting for its deadline.
    pub fn is_pending(&self) -> bool {
        lock(&self.slot).task.is_some()
    }

    /// The current deadline of the pending action.
    pub fn deadline(&self) -> Option<Instant> {
        lock(&self.slot).decide_at
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn wait_then_fire<F, Fut>(slot: Arc<Mutex<Slot>>, fire: F)
where
    F: FnOnce(Instant) -> Fut,
    Fut: Future<Output = ()>,
{
    let closed = loop {
        let deadline = {
            let mut guard = lock(&slot);
            match guard.decide_at {
                Some(at) if Instant::now() < at => at,
                Some(at) => {
                    // Free the slot before running so an event arriving while
                    // the action runs can arm a fresh one.
                    guard.decide_at = None;
                    guard.task = None;
                    break at;
                }
                None => return,
            }
        };
        tokio::time::sleep_until(deadline).await;
    };

    fire(closed).await;
}
