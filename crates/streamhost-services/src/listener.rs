//! Listener bus: delivers host events to registered observers.
//!
//! Dispatch copies the registration list under a short lock, releases it,
//! then calls each listener. Listeners may therefore call back into the
//! registry or the bus (including unregistering themselves) from inside a
//! callback. Each registration carries an `active` flag that `unregister`
//! clears and that dispatch checks just before each callback, so a batch
//! already in flight usually skips the listener. A batch that checked the
//! flag before `unregister` cleared it may still make that one call.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::host::Host;

/// Observer of registry changes. Context lives in the implementor.
///
/// Errors and panics from a callback are logged and do not stop delivery
/// to other listeners.
pub trait HostListener: Send + Sync {
    /// A host the registry had not seen before.
    fn added(&self, host: &Host) -> anyhow::Result<()>;

    /// An existing host changed (rediscovered, selected, deselected, paired).
    fn updated(&self, host: &Host) -> anyhow::Result<()>;

    /// A host was removed. Carries the record as it was, unselected.
    fn removed(&self, _host: &Host) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Kind of change delivered to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Added,
    Updated,
    Removed,
}

/// Adapts a closure into a [`HostListener`] that sees every event.
pub struct EventFn<F>(pub F);

impl<F> HostListener for EventFn<F>
where
    F: Fn(HostEvent, &Host) -> anyhow::Result<()> + Send + Sync,
{
    fn added(&self, host: &Host) -> anyhow::Result<()> {
        (self.0)(HostEvent::Added, host)
    }

    fn updated(&self, host: &Host) -> anyhow::Result<()> {
        (self.0)(HostEvent::Updated, host)
    }

    fn removed(&self, host: &Host) -> anyhow::Result<()> {
        (self.0)(HostEvent::Removed, host)
    }
}

/// Opaque handle returned by `register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerToken(u64);

#[derive(Clone)]
struct Registration {
    token: ListenerToken,
    listener: Arc<dyn HostListener>,
    active: Arc<AtomicBool>,
}

/// Per-dispatch delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispatch {
    pub delivered: usize,
    pub failed: usize,
}

/// The listener bus. Shared as `Arc<ListenerBus>`.
pub struct ListenerBus {
    registrations: Mutex<Vec<Registration>>,
    next_token: AtomicU64,
}

impl Default for ListenerBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerBus {
    pub fn new() -> Self {
        Self {
            registrations: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener. It receives every dispatch that starts after
    /// this returns.
    pub fn register(&self, listener: Arc<dyn HostListener>) -> ListenerToken {
        let token = ListenerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Registration {
            token,
            listener,
            active: Arc::new(AtomicBool::new(true)),
        });
        tracing::debug!(token = token.0, "listener registered");
        token
    }

    /// Unregister a listener. Returns false if the token was unknown.
    ///
    /// No dispatch started after this returns will call the listener. A
    /// dispatch already in flight on another thread may still deliver at
    /// most one more event to it, if it checked the listener before this
    /// call cleared it.
    pub fn unregister(&self, token: ListenerToken) -> bool {
        let mut regs = self.lock();
        let Some(pos) = regs.iter().position(|r| r.token == token) else {
            return false;
        };
        let reg = regs.remove(pos);
        reg.active.store(false, Ordering::Release);
        tracing::debug!(token = token.0, "listener unregistered");
        true
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn notify_added(&self, host: &Host) -> Dispatch {
        self.dispatch(HostEvent::Added, host)
    }

    pub fn notify_updated(&self, host: &Host) -> Dispatch {
        self.dispatch(HostEvent::Updated, host)
    }

    pub fn notify_removed(&self, host: &Host) -> Dispatch {
        self.dispatch(HostEvent::Removed, host)
    }

    /// Announce the result of a registry merge.
    pub fn notify_merge(&self, host: &Host, was_new: bool) -> Dispatch {
        if was_new {
            self.notify_added(host)
        } else {
            self.notify_updated(host)
        }
    }

    /// Deliver one event to a snapshot of the current listeners.
    pub fn dispatch(&self, event: HostEvent, host: &Host) -> Dispatch {
        let snapshot: Vec<Registration> = self.lock().clone();
        let mut result = Dispatch::default();

        for reg in snapshot {
            if !reg.active.load(Ordering::Acquire) {
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| match event {
                HostEvent::Added => reg.listener.added(host),
                HostEvent::Updated => reg.listener.updated(host),
                HostEvent::Removed => reg.listener.removed(host),
            }));
            match outcome {
                Ok(Ok(())) => result.delivered += 1,
                Ok(Err(e)) => {
                    result.failed += 1;
                    tracing::warn!(
                        token = reg.token.0,
                        ?event,
                        host = %host.id,
                        error = %e,
                        "listener callback failed"
                    );
                }
                Err(panic) => {
                    result.failed += 1;
                    tracing::warn!(
                        token = reg.token.0,
                        ?event,
                        host = %host.id,
                        panic = panic_message(&panic),
                        "listener callback panicked"
                    );
                }
            }
        }
        result
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
