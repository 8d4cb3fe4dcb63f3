use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

type KillSwitch = Box<dyn Fn() + Send + Sync>;

/// Two-stage stop signal shared by the supervisor and its workers.
///
/// `request` asks workers to stop at their next check point. `force` also
/// fires every registered kill switch, which closes the handles a worker may
/// be blocked on.
#[derive(Clone, Default)]
pub struct Cancellation {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    requested: AtomicBool,
    forced: AtomicBool,
    switches: Mutex<Vec<KillSwitch>>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask workers to stop cooperatively.
    pub fn request(&self) {
        if !self.inner.requested.swap(true, Ordering::SeqCst) {
            debug!("cancellation requested");
        }
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    pub fn is_forced(&self) -> bool {
        self.inner.forced.load(Ordering::SeqCst)
    }

    /// Register a handle-closing action for forced shutdown. Fires
    /// immediately if shutdown has already been forced.
    pub fn register(&self, switch: impl Fn() + Send + Sync + 'static) {
        let mut switches = self
            .inner
            .switches
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_forced() {
            drop(switches);
            switch();
            return;
        }
        switches.push(Box::new(switch));
    }

    /// Request cancellation and fire every registered kill switch.
    pub fn force(&self) {
        self.request();
        let switches = self
            .inner
            .switches
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.forced.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(count = switches.len(), "forcing shutdown");
        for switch in switches.iter() {
            switch();
        }
    }

    /// Sleep for `duration` unless cancelled first. Returns `false` when
    /// cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(10);
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLICE));
        }
    }
}

impl std::fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancellation")
            .field("requested", &self.is_requested())
            .field("forced", &self.is_forced())
            .finish()
    }
}
