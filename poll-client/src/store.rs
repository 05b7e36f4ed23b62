//! Off-chain per-poll preferences: cached options and gasless flags.
//!
//! Every entry carries a version. Writers name the version they read and
//! the write only lands if nobody wrote in between.

use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollPreferences {
    /// options as last read from chain
    pub options: Option<Vec<String>>,
    /// creator opted into gasless voting
    pub gasless_enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("poll {poll_id}: expected version {expected:?}, found {found:?}")]
    Conflict {
        poll_id: u64,
        expected: Option<u64>,
        found: Option<u64>,
    },
}

#[derive(Debug, Default)]
pub struct PreferenceStore {
    entries: RwLock<HashMap<u64, Versioned<PollPreferences>>>,
}

/// Attempts of `modify` before giving up on a contended entry.
const MODIFY_ATTEMPTS: usize = 16;

impl PreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, poll_id: u64) -> Option<Versioned<PollPreferences>> {
        match self.entries.read() {
            Ok(entries) => entries.get(&poll_id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&poll_id).cloned(),
        }
    }

    /// Compare-and-swap. `expected` is the version the caller read, `None`
    /// when the entry did not exist. Returns the new version.
    pub fn update(
        &self,
        poll_id: u64,
        expected: Option<u64>,
        value: PollPreferences,
    ) -> Result<u64, StoreError> {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        let found = entries.get(&poll_id).map(|e| e.version);
        if found != expected {
            return Err(StoreError::Conflict {
                poll_id,
                expected,
                found,
            });
        }
        let version = found.map_or(1, |v| v + 1);
        entries.insert(poll_id, Versioned { version, value });
        Ok(version)
    }

    /// Read, apply `f`, write back; retried when another writer got in first.
    pub fn modify<F>(&self, poll_id: u64, mut f: F) -> Result<u64, StoreError>
    where
        F: FnMut(&mut PollPreferences),
    {
        let mut last = None;
        for _ in 0..MODIFY_ATTEMPTS {
            let current = self.get(poll_id);
            let expected = current.as_ref().map(|c| c.version);
            let mut value = current.map(|c| c.value).unwrap_or_default();
            f(&mut value);
            match self.update(poll_id, expected, value) {
                Ok(version) => return Ok(version),
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap_or(StoreError::Conflict {
            poll_id,
            expected: None,
            found: None,
        }))
    }

    pub fn gasless_enabled(&self, poll_id: u64) -> Option<bool> {
        self.get(poll_id).and_then(|e| e.value.gasless_enabled)
    }

    pub fn cached_options(&self, poll_id: u64) -> Option<Vec<String>> {
        self.get(poll_id).and_then(|e| e.value.options)
    }

    pub fn remove(&self, poll_id: u64) -> Option<Versioned<PollPreferences>> {
        match self.entries.write() {
            Ok(mut entries) => entries.remove(&poll_id),
            Err(poisoned) => poisoned.into_inner().remove(&poll_id),
        }
    }

    pub fn clear(&self) {
        match self.entries.write() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn stale_writer_is_refused() {
        let store = PreferenceStore::new();
        let v1 = store.update(1, None, PollPreferences::default()).unwrap();
        assert_eq!(v1, 1);
        let fresh = PollPreferences {
            gasless_enabled: Some(true),
            ..Default::default()
        };
        assert_eq!(store.update(1, Some(v1), fresh).unwrap(), 2);
        assert_eq!(
            store.update(1, Some(v1), PollPreferences::default()),
            Err(StoreError::Conflict {
                poll_id: 1,
                expected: Some(1),
                found: Some(2)
            })
        );
        assert_eq!(store.gasless_enabled(1), Some(true));
        assert!(store.update(1, None, PollPreferences::default()).is_err());
    }

    #[test]
    fn concurrent_modifications_are_not_lost() {
        let store = Arc::new(PreferenceStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    store
                        .modify(7, |p| {
                            p.options
                                .get_or_insert_with(Vec::new)
                                .push(format!("writer {}", i))
                        })
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let entry = store.get(7).unwrap();
        assert_eq!(entry.version, 8);
        assert_eq!(entry.value.options.unwrap().len(), 8);
    }

    #[test]
    fn removal() {
        let store = PreferenceStore::new();
        store
            .modify(3, |p| p.options = Some(vec!["a".to_string(), "b".to_string()]))
            .unwrap();
        assert_eq!(store.cached_options(3).unwrap().len(), 2);
        assert!(store.remove(3).is_some());
        assert!(store.get(3).is_none());
        store.clear();
    }
}
