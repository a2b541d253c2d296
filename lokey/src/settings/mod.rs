//! A hierarchical, string-keyed key-value store, backed by flash.
//!
//! This plays the role Zephyr's `settings` subsystem plays in C firmware:
//! callers address values by a `/`-separated name (`"keymap/l/1/3"`,
//! `"physical_layouts/selected"`, ...) and the store takes care of mapping
//! that name onto whatever the underlying flash map actually indexes by.
//! The specific on-flash record format is intentionally not specified here
//! (it belongs to whatever settings backend a device ships); this module
//! only defines the interface the keymap engine needs from it.

mod flash;
mod memory;

pub use flash::FlashSettingsStore;
pub use memory::MemorySettingsStore;

use alloc::string::String;
use alloc::vec::Vec;
use core::future::Future;

/// A hierarchical key-value store keyed by `/`-separated string names.
pub trait SettingsStore {
    type Error;

    /// Writes `value` under `key`, replacing any previous value.
    fn save(&mut self, key: &str, value: &[u8]) -> impl Future<Output = Result<(), Self::Error>>;

    /// Reads the value stored under `key`, if any.
    fn load(
        &mut self,
        key: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>>;

    /// Removes the value stored under `key`, if any.
    fn delete(&mut self, key: &str) -> impl Future<Output = Result<(), Self::Error>>;

    /// Returns every `(key, value)` pair whose key starts with `prefix`.
    ///
    /// Used to reload an entire subtree (e.g. `"keymap/l"`) at once, the way
    /// a settings-load pass walks every persisted record under a handler's
    /// registered prefix.
    fn load_subtree(
        &mut self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<(String, Vec<u8>)>, Self::Error>>;
}
