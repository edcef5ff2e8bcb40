//! Cancellation context
//!
//! A `Context` exposes a done-signal plus a reason accessor, scoping every
//! blocking operation in the delivery core. Any number of tasks may await
//! `done()` concurrently; cancellation wakes them all.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
enum State {
    #[default]
    Live,
    Cancelled(Option<String>),
}

/// Cancellation scope handed to blocking operations
///
/// Dropping the paired [`Canceller`] without an explicit `cancel` also counts
/// as cancellation (with no reason), so RAII teardown releases waiters.
#[derive(Debug, Clone)]
pub struct Context {
    rx: watch::Receiver<State>,
    // Keeps the sender alive for contexts that can never be cancelled.
    _keep: Option<Arc<watch::Sender<State>>>,
}

/// Cancels the paired [`Context`]; the first `cancel` wins
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<State>,
}

impl Context {
    /// A context that is never cancelled
    pub fn background() -> Self {
        let (tx, rx) = watch::channel(State::Live);
        Self {
            rx,
            _keep: Some(Arc::new(tx)),
        }
    }

    /// A cancellable context and its canceller
    pub fn cancellable() -> (Self, Canceller) {
        let (tx, rx) = watch::channel(State::Live);
        (Self { rx, _keep: None }, Canceller { tx })
    }

    /// Wait until the context is cancelled
    pub async fn done(&self) {
        let mut rx = self.rx.clone();
        // An error means the canceller was dropped, which is cancellation too.
        let _ = rx.wait_for(|state| matches!(state, State::Cancelled(_))).await;
    }

    /// Whether the context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        if self.rx.has_changed().is_err() {
            return true;
        }
        matches!(*self.rx.borrow(), State::Cancelled(_))
    }

    /// The cancellation reason, if one was given
    pub fn reason(&self) -> Option<String> {
        match &*self.rx.borrow() {
            State::Cancelled(reason) => reason.clone(),
            State::Live => None,
        }
    }
}

impl Canceller {
    /// Cancel the context with a reason; later calls have no effect
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_if_modified(|state| {
            if matches!(state, State::Live) {
                *state = State::Cancelled(Some(reason));
                true
            } else {
                false
            }
        });
    }
}
