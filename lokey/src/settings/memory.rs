use super::SettingsStore;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::convert::Infallible;

/// An in-memory [`SettingsStore`], for host-side tests.
///
/// Stands in for a flash-backed store so persistence tests don't need to
/// fake a `NorFlash` device; behavior is otherwise identical (no ordering
/// guarantees are assumed by callers beyond "the last `save` wins").
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    type Error = Infallible;

    async fn save(&mut self, key: &str, value: &[u8]) -> Result<(), Self::Error> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn load(&mut self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.entries.get(key).cloned())
    }

    async fn delete(&mut self, key: &str) -> Result<(), Self::Error> {
        self.entries.remove(key);
        Ok(())
    }

    async fn load_subtree(&mut self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, Self::Error> {
        Ok(self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
