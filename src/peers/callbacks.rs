// Callback Registry - Who wants to hear about membership changes
//
// Append-only list of zero-argument callbacks. Notification snapshots the list
// under the read lock and invokes outside it, so a callback registered while a
// notification is running is kept but only sees the next one.

use parking_lot::RwLock;
use std::sync::Arc;

/// Callback fired after the peer set changed
pub type PeersCallback = Box<dyn Fn() + Send + Sync + 'static>;

type SharedCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Ordered, append-only set of callbacks
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: RwLock<Vec<SharedCallback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback. Registering the same closure twice fires it twice.
    pub fn register(&self, callback: PeersCallback) {
        self.callbacks.write().push(Arc::from(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }

    /// Invoke every callback in registration order; returns how many ran.
    ///
    /// Runs on the caller's thread. Callbacks must return quickly or hand the
    /// work to their own task.
    pub fn notify(&self) -> usize {
        let snapshot: Vec<SharedCallback> = self.callbacks.read().clone();
        for callback in &snapshot {
            callback();
        }
        snapshot.len()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("len", &self.len())
            .finish()
    }
}
