//! Per-node class cache with single-writer slots.
//!
//! Each class name owns a slot. The first loader locks the slot and performs
//! resolve/parse/rewrite; concurrent loaders of the same name block on the
//! slot and observe the published class. A failed load leaves the slot empty.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::loaded::LoadedClass;

type Slot = Arc<Mutex<Option<Arc<LoadedClass>>>>;

#[derive(Default)]
pub(crate) struct ClassCache {
    slots: DashMap<String, Slot>,
}

impl ClassCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published class for `name`, waiting for an in-flight load to finish.
    pub fn get(&self, name: &str) -> Option<Arc<LoadedClass>> {
        let slot = self.slots.get(name).map(|s| s.value().clone())?;
        let guard = slot.lock();
        guard.clone()
    }

    /// Return the cached class or run `load` exactly once per name.
    /// Returns the class and whether this call defined it.
    pub fn get_or_try_load<E, F>(&self, name: &str, load: F) -> Result<(Arc<LoadedClass>, bool), E>
    where
        F: FnOnce() -> Result<Arc<LoadedClass>, E>,
    {
        // Clone the slot out so the map shard is not held during the load.
        let slot = self.slots.entry(name.to_string()).or_default().value().clone();
        let mut guard = slot.lock();
        if let Some(existing) = guard.as_ref() {
            return Ok((existing.clone(), false));
        }
        let loaded = load()?;
        *guard = Some(loaded.clone());
        Ok((loaded, true))
    }

    /// Number of published classes.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| is_published(entry.value()))
            .count()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .iter()
            .filter(|entry| is_published(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn clear(&self) {
        self.slots.clear();
    }
}

/// In-flight slots count as unpublished.
fn is_published(slot: &Slot) -> bool {
    slot.try_lock().map(|guard| guard.is_some()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::ClassBuilder;
    use crate::rewrite::RewriteStats;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn class(name: &str) -> Arc<LoadedClass> {
        let descriptor = ClassBuilder::new(name).build();
        Arc::new(LoadedClass::new(
            descriptor,
            name.to_string(),
            Uuid::new_v4(),
            name.as_bytes(),
            false,
            RewriteStats::default(),
        ))
    }

    #[test]
    fn test_failed_load_not_cached() {
        let cache = ClassCache::new();
        let result: Result<_, &str> = cache.get_or_try_load("a/B", || Err("boom"));
        assert!(result.is_err());
        assert!(cache.get("a/B").is_none());
        assert_eq!(cache.len(), 0);

        let (loaded, defined) = cache.get_or_try_load::<&str, _>("a/B", || Ok(class("a/B"))).unwrap();
        assert!(defined);
        assert_eq!(loaded.name(), "a/B");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_loads_define_once() {
        let cache = Arc::new(ClassCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                std::thread::spawn(move || {
                    cache
                        .get_or_try_load::<(), _>("a/B", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(10));
                            Ok(class("a/B"))
                        })
                        .unwrap()
                        .0
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
