use super::SettingsStore;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::ops::Range;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_storage_async::nor_flash::MultiwriteNorFlash;
use sequential_storage::cache::NoCache;
use sequential_storage::map::{
    fetch_all_items, fetch_item, remove_item, store_item, Key, SerializationError,
};

/// The longest key this store will accept, e.g. `"keymap/l/31/255"`.
const MAX_KEY_LEN: usize = 48;
/// The longest value this store will accept (a full, untrimmed
/// `BehaviorBindingSetting` record is 10 bytes).
const MAX_VALUE_LEN: usize = 32;
const BUFFER_LEN: usize = 2 * (MAX_KEY_LEN + MAX_VALUE_LEN + 16);

/// A [`Key`] implementation for the hierarchical string names this store
/// addresses records by.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordKey(String);

impl Key for RecordKey {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        let bytes = self.0.as_bytes();
        if buffer.len() < bytes.len() {
            return Err(SerializationError::BufferTooSmall);
        }
        buffer[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    fn deserialize_from(buffer: &[u8]) -> Result<(Self, usize), SerializationError> {
        let name = core::str::from_utf8(buffer).map_err(|_| SerializationError::InvalidFormat)?;
        Ok((RecordKey(name.to_string()), buffer.len()))
    }

    fn get_len(buffer: &[u8]) -> Result<usize, SerializationError> {
        Ok(buffer.len())
    }
}

/// A [`SettingsStore`] backed by flash via `sequential-storage`.
///
/// This plays the role the teacher's `lokey::mcu::storage::Storage` played
/// for fixed-size, type-tagged records, generalized to the hierarchical
/// string keys the keymap engine's persistence layer needs (§6 of the
/// keymap-engine spec): behavior local-ID mappings, per-cell keymap
/// bindings, and the selected physical layout all share one flash region,
/// distinguished by key prefix rather than by record type.
pub struct FlashSettingsStore<F> {
    flash: Mutex<CriticalSectionRawMutex, F>,
    flash_range: Range<u32>,
}

impl<F: MultiwriteNorFlash> FlashSettingsStore<F> {
    pub fn new(flash: F, flash_range: Range<u32>) -> Self {
        Self {
            flash: Mutex::new(flash),
            flash_range,
        }
    }
}

impl<F: MultiwriteNorFlash> SettingsStore for FlashSettingsStore<F> {
    type Error = sequential_storage::Error<F::Error>;

    async fn save(&mut self, key: &str, value: &[u8]) -> Result<(), Self::Error> {
        let mut buf = vec![0u8; BUFFER_LEN];
        store_item(
            &mut *self.flash.lock().await,
            self.flash_range.clone(),
            &mut NoCache::new(),
            &mut buf,
            &RecordKey(key.to_string()),
            &value,
        )
        .await
    }

    async fn load(&mut self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut buf = vec![0u8; BUFFER_LEN];
        let data: Option<&[u8]> = fetch_item(
            &mut *self.flash.lock().await,
            self.flash_range.clone(),
            &mut NoCache::new(),
            &mut buf,
            &RecordKey(key.to_string()),
        )
        .await?;
        Ok(data.map(|data| data.to_vec()))
    }

    async fn delete(&mut self, key: &str) -> Result<(), Self::Error> {
        let mut buf = vec![0u8; BUFFER_LEN];
        remove_item(
            &mut *self.flash.lock().await,
            self.flash_range.clone(),
            &mut NoCache::new(),
            &mut buf,
            &RecordKey(key.to_string()),
        )
        .await
    }

    async fn load_subtree(&mut self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, Self::Error> {
        let mut flash = self.flash.lock().await;
        let mut buf = vec![0u8; BUFFER_LEN];
        let mut iter =
            fetch_all_items::<RecordKey, _, _>(&mut *flash, self.flash_range.clone(), &mut NoCache::new())
                .await?;
        let mut out = Vec::new();
        while let Some((key, value)) = iter.next::<&[u8]>(&mut buf).await? {
            if key.0.starts_with(prefix) {
                out.push((key.0, value.to_vec()));
            }
        }
        Ok(out)
    }
}
