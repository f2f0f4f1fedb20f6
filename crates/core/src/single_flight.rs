//! Re-entrancy primitives shared by the driver loops.
//!
//! - [`SingleFlight`]: memoized asynchronous operation keyed by name. The first
//!   caller starts the operation, concurrent callers await the same future,
//!   success is cached for the lifetime of the value, failure clears the slot
//!   so a later call retries.
//! - [`OperationGate`]: rejects (does not queue) a second concurrent entry into
//!   the same operation family.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};

type SharedOp<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Memoized in-flight operations keyed by operation name.
pub struct SingleFlight<T, E> {
    slots: Mutex<HashMap<String, SharedOp<T, E>>>,
}

impl<T, E> Default for SingleFlight<T, E> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, SharedOp<T, E>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` under `key`, or join the operation already registered there.
    ///
    /// `op` is only invoked when no operation is registered under `key`.
    pub async fn memoize<F, Fut>(&self, key: &str, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let shared = {
            let mut slots = self.slots();
            match slots.get(key) {
                Some(existing) => existing.clone(),
                None => {
                    let fut = op().boxed().shared();
                    slots.insert(key.to_string(), fut.clone());
                    fut
                }
            }
        };

        let result = shared.clone().await;

        if result.is_err() {
            let mut slots = self.slots();
            // Only clear our own attempt; a retry may already be registered.
            if slots.get(key).is_some_and(|current| current.ptr_eq(&shared)) {
                slots.remove(key);
            }
        }

        result
    }

    /// Whether `key` holds a successfully completed operation.
    pub fn is_cached(&self, key: &str) -> bool {
        self.slots()
            .get(key)
            .and_then(|op| op.peek().map(|result| result.is_ok()))
            .unwrap_or(false)
    }
}

/// Keyed admission gate: at most one holder per operation name.
#[derive(Debug, Clone, Default)]
pub struct OperationGate {
    active: Arc<Mutex<HashSet<&'static str>>>,
}

impl OperationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `operation`, or return `None` if it is already running.
    pub fn try_enter(&self, operation: &'static str) -> Option<GateTicket> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(operation) {
            return None;
        }
        Some(GateTicket {
            gate: self.clone(),
            operation,
        })
    }

    pub fn is_active(&self, operation: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(operation)
    }
}

/// Proof of entry into an [`OperationGate`]; leaving happens on drop.
#[derive(Debug)]
pub struct GateTicket {
    gate: OperationGate,
    operation: &'static str,
}

impl Drop for GateTicket {
    fn drop(&mut self) {
        self.gate
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.operation);
    }
}
