use std::sync::{LockResult, Mutex, MutexGuard};

use tracing::warn;

/// Acquire `lock`, taking the guard back out of a poisoned lock.
///
/// Cache contents are only ever whole values, so a panic elsewhere cannot leave
/// a half-written entry behind.
pub(crate) fn lock_recovering<'a, T>(lock: &'a Mutex<T>, op: &'static str) -> MutexGuard<'a, T> {
    recover(lock.lock(), op)
}

fn recover<G>(result: LockResult<G>, op: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            op,
            target_module = "cache::store",
            result = "poisoned_recovered",
            "Recovered from poisoned render cache lock"
        );
        poisoned.into_inner()
    })
}
