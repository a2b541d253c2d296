//! Wire-facing message shapes for the keymap management/inspection RPC.
//!
//! No transport is implemented here — the actual RPC core (mirroring
//! `studio/keymap_subsystem.c`, which layers these same message shapes over
//! Zephyr's own RPC core) is out of scope. This module only defines the
//! plain data types a transport built elsewhere can encode, plus the
//! request handlers that act on them, matching upstream's practice of
//! hand-rolling (de)serialization rather than reaching for `serde`.

use crate::keymap::{BehaviorBinding as InternalBinding, Keymap};
use crate::persistence;
use crate::registry::BehaviorRegistry;
use crate::validator::validate_binding;
use alloc::string::String;
use alloc::vec::Vec;
use lokey::settings::SettingsStore;
use lokey::Error;

/// A binding as exchanged over the wire: the behavior named by a 32-bit
/// local ID plus its two parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireBinding {
    pub behavior_local_id: u32,
    pub param1: u32,
    pub param2: u32,
}

/// A snapshot of one layer's name and bindings, for inspection.
#[derive(Debug, Clone)]
pub struct LayerSnapshot {
    pub name: String,
    pub bindings: Vec<WireBinding>,
}

/// A full keymap snapshot: every layer in order, plus the layer names.
#[derive(Debug, Clone)]
pub struct KeymapSnapshot {
    pub layers: Vec<LayerSnapshot>,
}

/// Request to override one `(layer, position)` binding.
#[derive(Debug, Clone, Copy)]
pub struct SetLayerBindingRequest {
    pub layer: u32,
    pub position: u32,
    pub binding: WireBinding,
}

/// Response to [`SetLayerBindingRequest`]. Mirrors
/// `studio/keymap_subsystem.c`'s `SET_LAYER_BINDING` response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetLayerBindingResponse {
    Ok,
    InvalidLayer,
    InvalidPosition,
    InvalidBehavior,
    InvalidParameters,
}

/// Validates and applies a [`SetLayerBindingRequest`] against `keymap`,
/// resolving the wire-level local ID through `registry`.
///
/// This only mutates the in-memory overlay; callers that want the edit to
/// survive a reboot must still call
/// [`crate::persistence::save_changes`] themselves.
pub fn handle_set_layer_binding(
    keymap: &Keymap,
    registry: &BehaviorRegistry,
    request: SetLayerBindingRequest,
) -> SetLayerBindingResponse {
    if request.layer as usize >= keymap.layer_count() {
        return SetLayerBindingResponse::InvalidLayer;
    }
    if request.position as usize >= keymap.position_count() {
        return SetLayerBindingResponse::InvalidPosition;
    }
    let Some(behavior) = registry.resolve_by_local_id(request.binding.behavior_local_id as u16) else {
        return SetLayerBindingResponse::InvalidBehavior;
    };
    if let Err(err) = validate_binding(
        registry,
        behavior.name,
        request.binding.param1,
        request.binding.param2,
        keymap.layer_count() as u32,
    ) {
        return match err {
            Error::InvalidParameters => SetLayerBindingResponse::InvalidParameters,
            _ => SetLayerBindingResponse::InvalidBehavior,
        };
    }
    let _ = keymap.set_layer_binding(
        request.layer as usize,
        request.position as usize,
        InternalBinding {
            behavior_name: behavior.name,
            param1: request.binding.param1,
            param2: request.binding.param2,
        },
    );
    SetLayerBindingResponse::Ok
}

/// Handles a `SaveChanges` RPC call: persists every dirty overlay cell and
/// reports whether every cell was written successfully.
pub async fn handle_save_changes<S: SettingsStore>(
    keymap: &Keymap,
    registry: &BehaviorRegistry,
    settings: &mut S,
) -> bool {
    persistence::save_changes(keymap, registry, settings).await
}

/// Handles a `DiscardChanges` RPC call: reverts unsaved overlay edits that
/// have a persisted value to restore, and reports whether the persisted
/// subtree could be read at all.
pub async fn handle_discard_changes<S: SettingsStore>(
    keymap: &Keymap,
    registry: &BehaviorRegistry,
    settings: &mut S,
) -> bool {
    persistence::discard_changes(keymap, registry, settings).await
}

/// Builds a full [`KeymapSnapshot`] for inspection, resolving each binding's
/// behavior name back to its wire-level local ID.
pub fn snapshot(keymap: &Keymap, registry: &BehaviorRegistry) -> KeymapSnapshot {
    let layers = (0..keymap.layer_count())
        .map(|layer| {
            let bindings = (0..keymap.position_count())
                .map(|position| {
                    let binding = keymap
                        .get_binding(layer, position)
                        .expect("position within position_count always resolves");
                    WireBinding {
                        behavior_local_id: registry.local_id_of(binding.behavior_name).unwrap_or(0) as u32,
                        param1: binding.param1,
                        param2: binding.param2,
                    }
                })
                .collect();
            LayerSnapshot {
                name: keymap.layer_name(layer).unwrap_or_default().into(),
                bindings,
            }
        })
        .collect();
    KeymapSnapshot { layers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{tests_support::StubBehavior, Behavior, BehaviorResponse, ParameterMetadata, StandardDomain};
    use crate::keymap::LayerDef;
    use crate::registry::RegistryPolicy;
    use lokey::settings::MemorySettingsStore;
    use lokey::split::Locality;

    static STUB: StubBehavior = StubBehavior {
        press_response: BehaviorResponse::Opaque,
        release_response: BehaviorResponse::Opaque,
    };
    static METADATA: ParameterMetadata = ParameterMetadata::Standard {
        param1: StandardDomain::Null,
        param2: StandardDomain::Null,
    };
    static BEHAVIORS: [Behavior; 1] = [Behavior::new("mo", &STUB, &METADATA, Locality::Central)];
    static LAYER0: [InternalBinding; 1] = [InternalBinding { behavior_name: "mo", param1: 0, param2: 0 }];
    static LAYERS: [LayerDef; 1] = [LayerDef { name: "default", bindings: &LAYER0, sensor_bindings: &[] }];

    async fn ready_registry() -> BehaviorRegistry {
        let registry = BehaviorRegistry::new(&BEHAVIORS, RegistryPolicy::Crc16);
        let mut store = MemorySettingsStore::new();
        registry.assign_local_ids(&mut store).await;
        registry
    }

    #[test]
    fn set_layer_binding_rejects_invalid_coordinates() {
        embassy_futures::block_on(async {
            let registry = ready_registry().await;
            let keymap = Keymap::new(&LAYERS, 1);
            let id = registry.local_id_of("mo").unwrap() as u32;
            let request = SetLayerBindingRequest {
                layer: 5,
                position: 0,
                binding: WireBinding { behavior_local_id: id, param1: 0, param2: 0 },
            };
            assert_eq!(handle_set_layer_binding(&keymap, &registry, request), SetLayerBindingResponse::InvalidLayer);
        });
    }

    #[test]
    fn set_layer_binding_rejects_invalid_parameters() {
        embassy_futures::block_on(async {
            let registry = ready_registry().await;
            let keymap = Keymap::new(&LAYERS, 1);
            let id = registry.local_id_of("mo").unwrap() as u32;
            let request = SetLayerBindingRequest {
                layer: 0,
                position: 0,
                binding: WireBinding { behavior_local_id: id, param1: 1, param2: 0 },
            };
            assert_eq!(
                handle_set_layer_binding(&keymap, &registry, request),
                SetLayerBindingResponse::InvalidParameters
            );
            assert!(!keymap.is_dirty(0, 0));
        });
    }

    #[test]
    fn set_layer_binding_applies_a_valid_edit() {
        embassy_futures::block_on(async {
            let registry = ready_registry().await;
            let keymap = Keymap::new(&LAYERS, 1);
            let id = registry.local_id_of("mo").unwrap() as u32;
            let request = SetLayerBindingRequest {
                layer: 0,
                position: 0,
                binding: WireBinding { behavior_local_id: id, param1: 0, param2: 0 },
            };
            assert_eq!(handle_set_layer_binding(&keymap, &registry, request), SetLayerBindingResponse::Ok);
            assert!(keymap.is_dirty(0, 0));
        });
    }

    #[test]
    fn save_then_discard_round_trips_over_rpc() {
        embassy_futures::block_on(async {
            let registry = ready_registry().await;
            let mut store = MemorySettingsStore::new();
            let keymap = Keymap::new(&LAYERS, 1);
            let id = registry.local_id_of("mo").unwrap() as u32;

            let request = SetLayerBindingRequest {
                layer: 0,
                position: 0,
                binding: WireBinding { behavior_local_id: id, param1: 7, param2: 0 },
            };
            assert_eq!(handle_set_layer_binding(&keymap, &registry, request), SetLayerBindingResponse::Ok);

            assert!(handle_save_changes(&keymap, &registry, &mut store).await);
            assert!(!keymap.is_dirty(0, 0));

            keymap.set_layer_binding(0, 0, InternalBinding { behavior_name: "mo", param1: 9, param2: 0 }).unwrap();
            assert!(handle_discard_changes(&keymap, &registry, &mut store).await);
            assert_eq!(
                keymap.get_binding(0, 0),
                Some(InternalBinding { behavior_name: "mo", param1: 7, param2: 0 })
            );
        });
    }

    #[test]
    fn snapshot_reports_every_layer_and_position() {
        embassy_futures::block_on(async {
            let registry = ready_registry().await;
            let keymap = Keymap::new(&LAYERS, 1);
            let snap = snapshot(&keymap, &registry);
            assert_eq!(snap.layers.len(), 1);
            assert_eq!(snap.layers[0].bindings.len(), 1);
            assert_eq!(snap.layers[0].bindings[0].behavior_local_id, registry.local_id_of("mo").unwrap() as u32);
        });
    }
}
