//! Cooperative cancellation.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

type Callback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct TokenState {
    canceled: AtomicBool,
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback)>>,
}

/// A cloneable flag that runs registered callbacks once when set.
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Creates a token that has not been canceled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and runs every registered callback on this thread.
    ///
    /// Calling this more than once has no further effect.
    pub fn cancel(&self) {
        if self.state.canceled.swap(true, Ordering::SeqCst) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.state.callbacks.lock());
        for (_, callback) in callbacks {
            callback();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_canceled(&self) -> bool {
        self.state.canceled.load(Ordering::SeqCst)
    }

    /// Registers `callback` to run on cancellation.
    ///
    /// If the token is already canceled the callback runs immediately.
    /// Dropping the returned guard unregisters a callback that has not run.
    pub fn register<F>(&self, callback: F) -> CancellationRegistration
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut callbacks = self.state.callbacks.lock();
            if !self.is_canceled() {
                callbacks.push((id, Box::new(callback)));
                return CancellationRegistration {
                    state: Arc::clone(&self.state),
                    id,
                };
            }
        }
        callback();
        CancellationRegistration {
            state: Arc::clone(&self.state),
            id,
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

/// Guard returned by [`CancellationToken::register`].
#[must_use = "dropping the registration unregisters the callback"]
pub struct CancellationRegistration {
    state: Arc<TokenState>,
    id: u64,
}

impl Drop for CancellationRegistration {
    fn drop(&mut self) {
        self.state.callbacks.lock().retain(|(id, _)| *id != self.id);
    }
}
