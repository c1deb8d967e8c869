use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

/// Per-collection request tickets.
///
/// Requests are never cancelled, so a slow response can land after a newer
/// one. Each load takes a ticket before it is issued and applies its result
/// only if that ticket is still the newest for the collection: the last
/// request issued wins, not the last response received.
#[derive(Debug)]
pub struct RequestSequence<K> {
    latest: Mutex<HashMap<K, u64>>,
}

impl<K> Default for RequestSequence<K> {
    fn default() -> Self {
        Self {
            latest: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash> RequestSequence<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, key: K) -> u64 {
        let mut latest = self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let ticket = latest.get(&key).copied().unwrap_or(0) + 1;
        latest.insert(key, ticket);
        ticket
    }

    pub fn is_current(&self, key: &K, ticket: u64) -> bool {
        let latest = self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        latest.get(key) == Some(&ticket)
    }
}
