//! Trailing-edge debounce.
//!
//! Each [`Postponer::postpone`] replaces the pending action and restarts the
//! quiet period; the action runs once the period elapses with no newer call.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type PendingAction = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Default)]
struct PostponerState {
    generation: u64,
    action: Option<PendingAction>,
}

#[derive(Clone)]
pub struct Postponer {
    delay: Duration,
    state: Arc<Mutex<PostponerState>>,
}

impl std::fmt::Debug for Postponer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Postponer")
            .field("delay", &self.delay)
            .field("pending", &self.has_pending())
            .finish()
    }
}

impl Postponer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: Arc::new(Mutex::new(PostponerState::default())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn has_pending(&self) -> bool {
        self.state.lock().action.is_some()
    }

    /// Replace the pending action and restart the quiet period
    pub fn postpone<F>(&self, action: F)
    where
        F: FnOnce() -> BoxFuture<'static, ()> + Send + 'static,
    {
        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.action = Some(Box::new(action));
            state.generation
        };

        let state = self.state.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let action = {
                let mut state = state.lock();
                if state.generation != generation {
                    return;
                }
                state.action.take()
            };
            if let Some(action) = action {
                debug!(delay_ms = delay.as_millis() as u64, "Running postponed action");
                action().await;
            }
        });
    }

    /// Run the pending action now instead of waiting for the quiet period
    pub async fn flush(&self) {
        let action = self.state.lock().action.take();
        if let Some(action) = action {
            debug!("Flushing postponed action");
            action().await;
        }
    }

    /// Drop the pending action without running it
    pub fn cancel(&self) {
        if self.state.lock().action.take().is_some() {
            debug!("Cancelled postponed action");
        }
    }
}
