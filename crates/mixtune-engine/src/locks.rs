//! Per-session mutual exclusion
//!
//! Writers of one session take its mutex for the whole read-modify-write.
//! Sessions never contend with each other. An entry is pruned when the last
//! holder or waiter goes away, including a waiter whose `acquire` future is
//! dropped before it gets the lock.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Registry of per-session async mutexes
#[derive(Default)]
pub struct SessionLocks {
    locks: LockMap,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `session_id`
    pub async fn acquire(&self, session_id: &str) -> SessionGuard<'_> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let entry = LockEntry {
            locks: &self.locks,
            session_id: session_id.to_string(),
            lock: Some(lock.clone()),
        };

        let guard = lock.lock_owned().await;
        SessionGuard {
            _guard: guard,
            _entry: entry,
        }
    }

    /// Number of sessions with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Interest in one registry entry, from the start of `acquire` until release
struct LockEntry<'a> {
    locks: &'a LockMap,
    session_id: String,
    lock: Option<Arc<Mutex<()>>>,
}

impl Drop for LockEntry<'_> {
    fn drop(&mut self) {
        // Our own Arc must not count
        self.lock.take();
        self.locks
            .remove_if(&self.session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Held for the duration of one session write
pub struct SessionGuard<'a> {
    // Fields drop in order: the mutex is released before the entry prunes
    _guard: OwnedMutexGuard<()>,
    _entry: LockEntry<'a>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_pruned_after_release() {
        let locks = SessionLocks::new();
        {
            let _guard = locks.acquire("s1").await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_session_is_exclusive() {
        let locks = Arc::new(SessionLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("s1").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_prunes_entry() {
        let locks = SessionLocks::new();
        let held = locks.acquire("s1").await;

        let mut waiting = Box::pin(locks.acquire("s1"));
        let timed_out = tokio::time::timeout(Duration::from_millis(10), &mut waiting).await;
        assert!(timed_out.is_err());

        // The waiter still counts, so releasing the holder keeps the entry
        drop(held);
        assert_eq!(locks.len(), 1);

        drop(waiting);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_sessions_do_not_block() {
        let locks = SessionLocks::new();
        let _a = locks.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("b")).await;
        assert!(b.is_ok());
    }
}
