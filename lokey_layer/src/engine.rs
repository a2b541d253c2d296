//! Ties the keymap engine's pieces together and drives the startup
//! sequence spec.md §2 requires: persistence load, registry ID assignment,
//! keymap reconciliation, physical layout select, then scan enable.

use crate::config::KeymapConfig;
use crate::keymap::Keymap;
use crate::persistence::{self, load_selected_layout};
use crate::physical_layout::PhysicalLayoutManager;
use crate::registry::BehaviorRegistry;
use crate::scan::ScanPipeline;
use lokey::settings::SettingsStore;
use lokey::util::warn;

/// Owns the keymap engine's runtime state, built once from a
/// [`KeymapConfig`] and kept for the device's lifetime.
pub struct KeymapEngine {
    pub keymap: Keymap,
    pub registry: BehaviorRegistry,
    pub physical_layouts: PhysicalLayoutManager,
    pub scan: ScanPipeline,
}

impl KeymapEngine {
    pub fn new(config: &KeymapConfig) -> Self {
        Self {
            keymap: Keymap::new(config.layers, config.position_count),
            registry: BehaviorRegistry::new(config.behaviors, config.registry_policy),
            physical_layouts: PhysicalLayoutManager::new(config.physical_layouts, config.initial_physical_layout),
            scan: ScanPipeline::new(config.scan_queue_capacity),
        }
    }

    /// Runs the fixed startup sequence. Must be called exactly once, before
    /// any scan event is dispatched.
    ///
    /// Persisted keymap bindings are fetched *before* `assign_local_ids`
    /// runs (their local IDs can't be resolved against not-yet-ready
    /// behaviors) and reconciled only afterwards, once
    /// [`BehaviorRegistry::resolve_by_local_id`] can actually succeed —
    /// running both in one pass would silently drop every persisted
    /// binding on a fresh boot.
    pub async fn start<S: SettingsStore>(&self, settings: &mut S) {
        let persisted_bindings = persistence::fetch_persisted_bindings(settings).await;
        let selected_layout = load_selected_layout(settings).await;

        self.registry.assign_local_ids(settings).await;

        persistence::reconcile(&self.keymap, &self.registry, &persisted_bindings);

        if let Some(index) = selected_layout {
            if self.physical_layouts.select(index).is_err() {
                warn!("persisted physical layout index is out of range, staying on the default");
            }
        }

        if let Some(source) = self.physical_layouts.active_layout().scan_source {
            source.set_enabled(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{tests_support::StubBehavior, Behavior, BehaviorResponse, ParameterMetadata, StandardDomain};
    use crate::keymap::BehaviorBinding;
    use crate::keymap::LayerDef;
    use crate::matrix::MatrixTransform;
    use crate::physical_layout::PhysicalLayout;
    use crate::registry::RegistryPolicy;
    use lokey::settings::{MemorySettingsStore, SettingsStore};

    static STUB: StubBehavior = StubBehavior {
        press_response: BehaviorResponse::Opaque,
        release_response: BehaviorResponse::Opaque,
    };
    static METADATA: ParameterMetadata = ParameterMetadata::Standard {
        param1: StandardDomain::Null,
        param2: StandardDomain::Null,
    };
    static BEHAVIORS: [Behavior; 1] = [Behavior::new("mo", &STUB, &METADATA, lokey::split::Locality::Central)];
    static LAYER0: [BehaviorBinding; 1] = [BehaviorBinding { behavior_name: "mo", param1: 0, param2: 0 }];
    static LAYERS: [LayerDef; 1] = [LayerDef { name: "default", bindings: &LAYER0, sensor_bindings: &[] }];
    static LAYOUTS: [PhysicalLayout; 1] = [PhysicalLayout {
        name: "default",
        transform: MatrixTransform::new(&[0], 1),
        scan_source: None,
    }];

    #[test]
    fn startup_reconciles_a_persisted_binding_assigned_before_boot() {
        embassy_futures::block_on(async {
            let mut store = MemorySettingsStore::new();

            // Simulate a prior session that already resolved "mo"'s CRC16
            // ID and persisted an override at (0, 0).
            let probe = BehaviorRegistry::new(&BEHAVIORS, RegistryPolicy::Crc16);
            probe.assign_local_ids(&mut store).await;
            let id = probe.local_id_of("mo").unwrap();
            let setting = crate::persistence::BehaviorBindingSetting {
                behavior_local_id: id as u32,
                param1: 5,
                param2: 0,
            };
            store.save("keymap/l/0/0", &setting.pack()).await.unwrap();

            let config = KeymapConfig::new(&BEHAVIORS, RegistryPolicy::Crc16, &LAYERS, 1, &LAYOUTS);
            let engine = KeymapEngine::new(&config);
            engine.start(&mut store).await;

            assert_eq!(
                engine.keymap.get_binding(0, 0),
                Some(BehaviorBinding { behavior_name: "mo", param1: 5, param2: 0 })
            );
        });
    }
}
