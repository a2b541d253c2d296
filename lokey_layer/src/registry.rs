//! The behavior registry: name/local-ID resolution and startup ID
//! assignment.

use crate::behavior::Behavior;
use alloc::format;
use lokey::settings::SettingsStore;
use lokey::util::{error, warn};

/// Which of the two supported local-ID assignment policies is active.
///
/// An implementation picks one at configuration time; the choice is
/// implicitly persisted by which settings subtree gets written
/// (`behavior/local_id/*` only exists under [`RegistryPolicy::Monotonic`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryPolicy {
    /// `id = CRC16(name)`. Deterministic, no persistence needed, but a name
    /// collision (unexpected in practice) is a configuration error.
    Crc16,
    /// Persisted `behavior/local_id/<id> ↔ name` mapping, extended with a
    /// fresh ID above the current maximum for any behavior left unmapped.
    Monotonic,
}

/// Owns the table of known behaviors and resolves between names, local
/// IDs, and [`Behavior`] handles.
pub struct BehaviorRegistry {
    behaviors: &'static [Behavior],
    policy: RegistryPolicy,
}

impl BehaviorRegistry {
    pub const fn new(behaviors: &'static [Behavior], policy: RegistryPolicy) -> Self {
        Self { behaviors, policy }
    }

    pub fn policy(&self) -> RegistryPolicy {
        self.policy
    }

    /// Resolves a behavior name to its handle.
    ///
    /// Tries a pointer-identity comparison first — cheap, and succeeds for
    /// any caller holding a `&'static str` that shares storage with this
    /// registry's compile-time table — before falling back to a byte-wise
    /// comparison for names built at runtime.
    pub fn resolve_by_name(&self, name: &str) -> Option<&'static Behavior> {
        self.behaviors
            .iter()
            .find(|b| {
                b.is_ready() && core::ptr::eq(b.name.as_ptr(), name.as_ptr()) && b.name.len() == name.len()
            })
            .or_else(|| self.behaviors.iter().find(|b| b.is_ready() && b.name == name))
    }

    pub fn resolve_by_local_id(&self, local_id: u16) -> Option<&'static Behavior> {
        self.behaviors
            .iter()
            .find(|b| b.is_ready() && b.local_id() == Some(local_id))
    }

    pub fn local_id_of(&self, name: &str) -> Option<u16> {
        self.resolve_by_name(name).and_then(Behavior::local_id)
    }

    pub fn behaviors(&self) -> &'static [Behavior] {
        self.behaviors
    }

    /// Assigns every behavior's local ID. Must run once, at startup, before
    /// any `resolve_*` call is expected to succeed.
    ///
    /// Duplicate-name detection is a startup diagnostic only: it is logged,
    /// never fails initialization (§7 "Startup diagnostics ... never
    /// prevent boot").
    pub async fn assign_local_ids<S: SettingsStore>(&self, settings: &mut S) {
        self.log_duplicate_names();
        match self.policy {
            RegistryPolicy::Crc16 => self.assign_crc16(),
            RegistryPolicy::Monotonic => self.assign_monotonic(settings).await,
        }
        for behavior in self.behaviors {
            behavior.mark_ready();
        }
    }

    fn log_duplicate_names(&self) {
        for (i, a) in self.behaviors.iter().enumerate() {
            for b in &self.behaviors[i + 1..] {
                if a.name == b.name {
                    error!("duplicate behavior name registered");
                }
            }
        }
    }

    fn assign_crc16(&self) {
        for behavior in self.behaviors {
            behavior.assign_local_id(crc16(behavior.name));
        }
        for (i, a) in self.behaviors.iter().enumerate() {
            for b in &self.behaviors[i + 1..] {
                if a.local_id() == b.local_id() {
                    error!("CRC16 local-ID collision between behaviors");
                }
            }
        }
    }

    async fn assign_monotonic<S: SettingsStore>(&self, settings: &mut S) {
        let mut max_id: i32 = -1;
        match settings.load_subtree("behavior/local_id/").await {
            Ok(entries) => {
                for (key, value) in entries {
                    let Some(id_str) = key.strip_prefix("behavior/local_id/") else {
                        continue;
                    };
                    let Ok(id) = id_str.parse::<u16>() else {
                        continue;
                    };
                    max_id = max_id.max(id as i32);
                    let Ok(name) = core::str::from_utf8(&value) else {
                        continue;
                    };
                    if let Some(behavior) = self.behaviors.iter().find(|b| b.name == name) {
                        behavior.assign_local_id(id);
                    }
                    // A persisted ID with no matching behavior is "dead" —
                    // left untouched, never reused within this session.
                }
            }
            Err(_) => warn!("failed to load persisted behavior local-id mappings"),
        }

        for behavior in self.behaviors {
            if behavior.local_id().is_none() {
                max_id += 1;
                let id = max_id as u16;
                behavior.assign_local_id(id);
                let key = format!("behavior/local_id/{id}");
                if settings.save(&key, behavior.name.as_bytes()).await.is_err() {
                    error!("failed to persist newly assigned behavior local id");
                }
            }
        }
    }
}

/// CRC-16/ARC (poly `0xA001`, init `0x0000`, no final XOR) over `name`'s
/// UTF-8 bytes.
fn crc16(name: &str) -> u16 {
    let mut crc: u16 = 0x0000;
    for &byte in name.as_bytes() {
        crc ^= byte as u16;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xA001
            } else {
                crc >> 1
            };
        }
    }
    crc
}
