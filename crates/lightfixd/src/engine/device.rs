use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use super::debounce::Debouncer;
use super::policy::Policy;
use super::sink::CommandSink;

/// A device tracked by one policy.
///
/// Owns the policy's per-device state and the device's decision timer.
/// Updates and timer firings both go through the same mutex; it is never
/// held across an await.
pub struct Device<P: Policy> {
    id: Arc<str>,
    policy: Arc<Mutex<P>>,
    debouncer: Debouncer,
    sink: Arc<dyn CommandSink>,
}

fn lock<P>(policy: &Mutex<P>) -> MutexGuard<'_, P> {
    policy.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<P: Policy> Device<P> {
    pub fn new(
        id: &str,
        settings: &P::Settings,
        quiescence: Duration,
        sink: Arc<dyn CommandSink>,
    ) -> Self {
        Self {
            id: Arc::from(id),
            policy: Arc::new(Mutex::new(P::new(settings))),
            debouncer: Debouncer::new(quiescence),
            sink,
        }
    }

    /// Whether a decision is waiting for the device to settle.
    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Record an update and, if the policy asks for it, push the decision
    /// back by one quiescence window.
    pub fn handle(&self, update: P::Update) {
        let rearm = lock(&self.policy).observe(&self.id, Instant::now(), update);
        if !rearm {
            return;
        }

        let id = self.id.clone();
        let policy = self.policy.clone();
        let sink = self.sink.clone();
        self.debouncer.arm(move |deadline| async move {
            let command = lock(&policy).decide(&id, deadline);
            let Some(command) = command else {
                debug!(device = %id, policy = P::NAME, "Settled state is fine");
                return;
            };

            let kind = command.kind();
            if let Err(e) = sink.send(&id, command).await {
                warn!(device = %id, command = kind, "Failed to send correction: {}", e);
            }
        });
    }

    /// Drop any pending decision.
    pub fn cancel(&self) {
        self.debouncer.cancel();
    }
}
