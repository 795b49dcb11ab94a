//! A `dashmap`-backed zone for tests and embedded use without a
//! filesystem.

use crate::Zone;
use dagstore_core::Result;
use dashmap::DashMap;

/// In-memory zone, keyed by `(key, commit_id)`. Never persists anything;
/// dropped when the process exits.
#[derive(Default)]
pub struct InMemoryZone {
    entries: DashMap<(String, String), Vec<u8>>,
}

impl InMemoryZone {
    /// An empty zone.
    pub fn new() -> Self {
        InMemoryZone::default()
    }
}

impl Zone for InMemoryZone {
    fn store(&self, key: &str, commit_id: &str, data: &[u8]) -> Result<()> {
        self.entries.insert((key.to_string(), commit_id.to_string()), data.to_vec());
        Ok(())
    }

    fn get(&self, key: &str, commit_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .get(&(key.to_string(), commit_id.to_string()))
            .map(|entry| entry.value().clone()))
    }

    fn list_commit_ids_for_key(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().0 == key)
            .map(|e| e.key().1.clone())
            .collect())
    }

    fn remove(&self, key: &str, commit_id: &str) -> Result<()> {
        self.entries.remove(&(key.to_string(), commit_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_get_round_trips() {
        let z = InMemoryZone::new();
        z.store("k", "c1", b"hello").unwrap();
        assert_eq!(z.get("k", "c1").unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn get_missing_is_none_not_error() {
        let z = InMemoryZone::new();
        assert_eq!(z.get("k", "missing").unwrap(), None);
    }

    #[test]
    fn list_commit_ids_only_returns_matching_key() {
        let z = InMemoryZone::new();
        z.store("k1", "c1", b"a").unwrap();
        z.store("k1", "c2", b"b").unwrap();
        z.store("k2", "c1", b"c").unwrap();
        let mut ids = z.list_commit_ids_for_key("k1").unwrap();
        ids.sort();
        assert_eq!(ids, vec!["c1".to_string(), "c2".to_string()]);
    }

    #[test]
    fn remove_drops_the_entry() {
        let z = InMemoryZone::new();
        z.store("k", "c1", b"a").unwrap();
        z.remove("k", "c1").unwrap();
        assert_eq!(z.get("k", "c1").unwrap(), None);
    }

    #[test]
    fn store_many_and_get_many_default_impls() {
        let z = InMemoryZone::new();
        z.store_many(&[("k", "c1", b"a".as_slice()), ("k", "c2", b"b".as_slice())])
            .unwrap();
        let got = z.get_many(&[("k", "c1"), ("k", "c2"), ("k", "missing")]).unwrap();
        assert_eq!(got, vec![Some(b"a".to_vec()), Some(b"b".to_vec()), None]);
    }
}
