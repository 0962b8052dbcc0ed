//! Process-wide keyed locks, acquire-or-fail.
//!
//! Guards duplicate concurrent jobs under the same key. Acquisition never
//! blocks or queues; contention is reported to the caller, who surfaces it
//! as a lock error. The provider is passed into workflows explicitly.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct LockProvider {
    held: Arc<DashMap<String, ()>>,
}

impl LockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the lock for `key`. Returns `None` when another holder
    /// has it. The returned guard releases on drop.
    pub fn try_acquire(&self, key: &str) -> Option<LockGuard> {
        match self.held.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                entry.insert(());
                Some(LockGuard {
                    held: Arc::clone(&self.held),
                    key: key.to_string(),
                })
            }
        }
    }
}

pub struct LockGuard {
    held: Arc<DashMap<String, ()>>,
    key: String,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.held.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let locks = LockProvider::new();
        let guard = locks.try_acquire("job:1");
        assert!(guard.is_some());
        assert!(locks.try_acquire("job:1").is_none());
        assert!(locks.try_acquire("job:2").is_some());
    }

    #[test]
    fn dropping_the_guard_releases_the_key() {
        let locks = LockProvider::new();
        drop(locks.try_acquire("job:1"));
        assert!(locks.try_acquire("job:1").is_some());
    }

    #[test]
    fn clones_share_the_same_registry() {
        let locks = LockProvider::new();
        let _guard = locks.try_acquire("job:1").unwrap();
        assert!(locks.clone().try_acquire("job:1").is_none());
    }
}
