//! Single-flight memoization for run-scoped lookups.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

/// Memoizes one value per key. Concurrent callers for the same key share a
/// single in-flight computation; a failed computation is not stored, so the
/// next caller tries again.
pub struct SingleFlight<V> {
    slots: Mutex<HashMap<String, Arc<OnceCell<V>>>>,
}

impl<V> Default for SingleFlight<V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> SingleFlight<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_try_init<E, F, Fut>(&self, key: &str, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = {
            let mut slots = self.slots.lock().expect("single-flight table poisoned");
            Arc::clone(slots.entry(key.to_owned()).or_default())
        };

        cell.get_or_try_init(init).await.cloned()
    }

    /// The stored value for `key`, if one has completed.
    #[cfg(test)]
    fn get(&self, key: &str) -> Option<V> {
        let slots = self.slots.lock().expect("single-flight table poisoned");
        slots.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of keys holding a completed value.
    #[cfg(test)]
    fn len(&self) -> usize {
        let slots = self.slots.lock().expect("single-flight table poisoned");
        slots.values().filter(|cell| cell.initialized()).count()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
