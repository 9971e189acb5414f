//! Cancellation token for cooperative cancellation.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A callback type for cancellation notifications. Receives the reason.
pub type CancelCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Identifies a callback registered with [`CancellationToken::on_cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// A child's registration with its parent token.
struct ParentLink {
    parent: Weak<TokenState>,
    id: CallbackId,
}

#[derive(Default)]
struct TokenState {
    /// Whether cancellation has been requested.
    cancelled: AtomicBool,
    /// The reason for cancellation (first one wins).
    reason: RwLock<Option<String>>,
    /// Callbacks to invoke on cancellation. Drained when the token trips.
    callbacks: RwLock<Vec<(CallbackId, CancelCallback)>>,
    /// Source of callback ids.
    next_callback: AtomicU64,
    /// Wakes tasks parked in [`CancellationToken::cancelled`].
    notify: Notify,
    /// Set on child tokens; removed from the parent on unlink or drop.
    parent: Mutex<Option<ParentLink>>,
}

impl TokenState {
    fn remove_callback(&self, id: CallbackId) -> bool {
        let mut callbacks = self.callbacks.write();
        let Some(index) = callbacks.iter().position(|(registered, _)| *registered == id) else {
            return false;
        };
        let removed = callbacks.remove(index);
        // Run the callback's destructor outside the lock.
        drop(callbacks);
        drop(removed);
        true
    }

    fn unlink_parent(&self) {
        let Some(link) = self.parent.lock().take() else {
            return;
        };
        if let Some(parent) = link.parent.upgrade() {
            parent.remove_callback(link.id);
        }
    }
}

impl Drop for TokenState {
    fn drop(&mut self) {
        self.unlink_parent();
    }
}

/// A shared token for cooperative cancellation.
///
/// Clones share the same state. Cancellation is idempotent: only the first
/// reason is kept and the token never returns to the uncancelled state.
/// Tokens can be linked so that cancelling a parent cancels its children.
/// A child stays registered with its parent until it is dropped or
/// [`unlink`](Self::unlink)ed.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is cancelled whenever `parent` is.
    ///
    /// Cancelling the child does not affect the parent.
    #[must_use]
    pub fn linked_to(parent: &Self) -> Self {
        parent.child_token()
    }

    /// Creates a child token linked to this one.
    #[must_use]
    pub fn child_token(&self) -> Self {
        let child = Self::new();
        let weak: Weak<TokenState> = Arc::downgrade(&child.inner);
        let id = self.on_cancel(move |reason| {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.cancel(reason);
            }
        });
        *child.inner.parent.lock() = Some(ParentLink {
            parent: Arc::downgrade(&self.inner),
            id,
        });
        child
    }

    /// Stops following the parent token and drops the registration the
    /// parent holds for this token. No-op for tokens without a parent.
    pub fn unlink(&self) {
        self.inner.unlink_parent();
    }

    /// Requests cancellation with a reason.
    ///
    /// Linked children and callbacks are notified before this returns.
    /// Panics in callbacks are logged and suppressed. Returns true only for
    /// the call that cancelled the token.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        match self.trip(&reason) {
            Some(callbacks) => {
                run_callbacks(&callbacks, &reason);
                true
            }
            None => false,
        }
    }

    /// Requests cancellation without waiting for listeners.
    ///
    /// The token itself is cancelled immediately; linked children and
    /// callbacks are notified on a spawned task. Awaiting the returned handle
    /// waits for that propagation. Must be called within a tokio runtime.
    pub fn cancel_async(&self, reason: impl Into<String>) -> JoinHandle<()> {
        let reason = reason.into();
        let callbacks = self.trip(&reason);
        spawn_callbacks(callbacks, reason)
    }

    /// Like [`cancel_async`](Self::cancel_async), but returns `None` without
    /// spawning anything if the token was already cancelled.
    pub fn try_cancel_async(&self, reason: impl Into<String>) -> Option<JoinHandle<()>> {
        let reason = reason.into();
        let callbacks = self.trip(&reason)?;
        Some(spawn_callbacks(Some(callbacks), reason))
    }

    /// Registers a callback to be invoked on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = CallbackId(self.inner.next_callback.fetch_add(1, Ordering::Relaxed));
        let callback: CancelCallback = Arc::new(callback);
        {
            let mut callbacks = self.inner.callbacks.write();
            if !self.is_cancelled() {
                callbacks.push((id, callback));
                return id;
            }
        }
        let reason = self.reason().unwrap_or_default();
        run_callbacks(&[callback], &reason);
        id
    }

    /// Removes a registered callback. Returns false if it already ran or
    /// was removed.
    pub fn remove_callback(&self, id: CallbackId) -> bool {
        self.inner.remove_callback(id)
    }

    /// Number of callbacks (including linked children) waiting for
    /// cancellation.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.inner.callbacks.read().len()
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Completes once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register interest before reading the flag so a concurrent
            // cancel cannot slip between the check and the wait.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Flips the flag once. Returns the callbacks to run if this call won.
    fn trip(&self, reason: &str) -> Option<Vec<CancelCallback>> {
        {
            let mut slot = self.inner.reason.write();
            if self.is_cancelled() {
                return None;
            }
            *slot = Some(reason.to_string());
            self.inner.cancelled.store(true, Ordering::SeqCst);
        }
        debug!(reason = %reason, "Cancellation requested");
        self.inner.notify.notify_waiters();
        let drained = std::mem::take(&mut *self.inner.callbacks.write());
        Some(drained.into_iter().map(|(_, callback)| callback).collect())
    }
}

fn spawn_callbacks(callbacks: Option<Vec<CancelCallback>>, reason: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Some(callbacks) = callbacks {
            run_callbacks(&callbacks, &reason);
        }
    })
}

fn run_callbacks(callbacks: &[CancelCallback], reason: &str) {
    for callback in callbacks {
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            callback(reason);
        })) {
            warn!("Cancellation callback panicked: {:?}", e);
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_token_cancel() {
        let token = CancellationToken::new();
        token.cancel("User requested");

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("User requested".to_string()));
    }

    #[test]
    fn test_token_cancel_idempotent() {
        let token = CancellationToken::new();
        assert!(token.cancel("First reason"));
        assert!(!token.cancel("Second reason"));

        // First reason wins
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some("First reason".to_string()));
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel("from clone");
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_on_cancel_runs_once() {
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        token.on_cancel(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(counter.load(Ordering::SeqCst), 0);

        token.cancel("test");
        token.cancel("again");

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_on_cancel_after_cancellation() {
        let token = CancellationToken::new();
        token.cancel("test");

        let seen = Arc::new(RwLock::new(String::new()));
        let seen_clone = seen.clone();

        // Should invoke immediately
        token.on_cancel(move |reason| {
            *seen_clone.write() = reason.to_string();
        });

        assert_eq!(*seen.read(), "test");
    }

    #[test]
    fn test_callback_panic_suppressed() {
        let token = CancellationToken::new();

        token.on_cancel(|_| {
            panic!("Intentional panic");
        });

        // Should not panic
        token.cancel("test");
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_parent_cancels_child() {
        let parent = CancellationToken::new();
        let child = CancellationToken::linked_to(&parent);
        let grandchild = child.child_token();

        parent.cancel("shutdown");

        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        assert_eq!(grandchild.reason(), Some("shutdown".to_string()));
    }

    #[test]
    fn test_child_does_not_cancel_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();

        child.cancel("local");

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_parent_starts_cancelled() {
        let parent = CancellationToken::new();
        parent.cancel("early");

        let child = parent.child_token();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_dropped_children_leave_parent_clean() {
        let parent = CancellationToken::new();
        for _ in 0..1000 {
            let child = parent.child_token();
            let grandchild = child.child_token();
            assert_eq!(parent.callback_count(), 1);
            drop(grandchild);
            assert_eq!(child.callback_count(), 0);
        }

        assert_eq!(parent.callback_count(), 0);
        assert!(parent.cancel("nobody listening"));
    }

    #[test]
    fn test_unlinked_child_ignores_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        let clone = child.clone();

        child.unlink();
        assert_eq!(parent.callback_count(), 0);

        parent.cancel("shutdown");
        assert!(!clone.is_cancelled());
    }

    #[test]
    fn test_child_dropped_during_parent_cancel() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        let weak = Arc::downgrade(&child.inner);
        drop(child);

        assert!(weak.upgrade().is_none());
        assert!(parent.cancel("late"));
    }

    #[test]
    fn test_remove_callback() {
        let token = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let id = token.on_cancel(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(token.remove_callback(id));
        assert!(!token.remove_callback(id));

        token.cancel("test");
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_try_cancel_async_only_first_wins() {
        let token = CancellationToken::new();
        let first = token.try_cancel_async("first");
        assert!(first.is_some());
        assert!(token.try_cancel_async("second").is_none());

        first.unwrap().await.unwrap();
        assert_eq!(token.reason(), Some("first".to_string()));
    }

    #[tokio::test]
    async fn test_cancel_async_marks_immediately() {
        let parent = CancellationToken::new();
        let child = parent.child_token();

        let propagation = parent.cancel_async("async stop");
        assert!(parent.is_cancelled());

        propagation.await.unwrap();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        token.cancel("wake");

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel("done");
        token.cancelled().await;
    }
}
