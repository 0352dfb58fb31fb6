use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Lock a subscription-cache mutex, recovering the guard if a panicking
/// callback poisoned it.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = target,
                lock_kind = "mutex.lock",
                result = "poisoned_recovered",
                hint = "subscription state may be stale after a panicking callback",
                "Recovered from poisoned subscription lock"
            );
            poisoned.into_inner()
        }
    }
}
