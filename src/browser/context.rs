//! Scoped ownership of browsing contexts.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use super::BrowsingContext;

/// Owns a [`BrowsingContext`] for the duration of one render and guarantees
/// it is closed.
///
/// Two release paths exist:
/// 1. [`ContextGuard::release`] awaits the close and is used on every normal
///    return, successful or not.
/// 2. `Drop` covers the remaining case where the render future itself is
///    dropped (for example when the client disconnects); the close is spawned
///    on the runtime captured at construction.
///
/// The shared `active` counter is incremented on construction and decremented
/// once the context has actually been closed.
pub struct ContextGuard<C: BrowsingContext> {
    context: Option<C>,
    label: String,
    active: Arc<AtomicUsize>,
    runtime: tokio::runtime::Handle,
}

impl<C: BrowsingContext> ContextGuard<C> {
    pub fn new(context: C, label: impl Into<String>, active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self {
            context: Some(context),
            label: label.into(),
            active,
            runtime: tokio::runtime::Handle::current(),
        }
    }

    /// Close the context now. Close failures are logged, not returned: the
    /// render outcome is already decided by the time this runs.
    pub async fn release(mut self) {
        if let Some(context) = self.context.take() {
            match context.close().await {
                Ok(()) => debug!(url = %self.label, "browsing context closed"),
                Err(e) => warn!(url = %self.label, error = %e, "failed to close browsing context"),
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn context(&self) -> &C {
        // `context` is only taken by `release` (which consumes the guard) and `Drop`.
        match &self.context {
            Some(context) => context,
            None => unreachable!("browsing context accessed after release"),
        }
    }
}

impl<C: BrowsingContext> Deref for ContextGuard<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        self.context()
    }
}

impl<C: BrowsingContext> Drop for ContextGuard<C> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            let label = std::mem::take(&mut self.label);
            let active = Arc::clone(&self.active);
            self.runtime.spawn(async move {
                if let Err(e) = context.close().await {
                    warn!(url = %label, error = %e, "browsing context cleanup on drop failed");
                } else {
                    debug!(url = %label, "browsing context closed on drop");
                }
                active.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }
}
