use std::sync::{LockResult, Mutex, MutexGuard};

use tracing::warn;

/// Lock `lock`, taking over the guard if a previous holder panicked.
///
/// Cached responses are disposable, so a poisoned store keeps serving rather
/// than taking the request path down with it.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), target, op)
}

fn recover<G>(result: LockResult<G>, target: &'static str, op: &'static str) -> G {
    match result {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = target,
                result = "poisoned_recovered",
                "Recovered from poisoned cache lock"
            );
            poisoned.into_inner()
        }
    }
}
