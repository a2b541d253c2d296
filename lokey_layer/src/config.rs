//! Declarative startup configuration for the keymap engine.
//!
//! A `KeymapConfig` is built once, normally by a `const fn` builder (or a
//! build script, matching `lokey_keyboard_macros::layout!`'s role upstream)
//! and handed to [`crate::engine::KeymapEngine::start`] as `'static` data.
//! There is no runtime parsing: every field here is either a `'static`
//! slice or a small `Copy` value baked in at compile time.

use crate::behavior::Behavior;
use crate::keymap::LayerDef;
use crate::physical_layout::PhysicalLayout;
use crate::registry::RegistryPolicy;

/// Everything [`crate::engine::KeymapEngine::start`] needs to wire up the
/// keymap engine.
#[derive(Clone, Copy)]
pub struct KeymapConfig {
    pub behaviors: &'static [Behavior],
    pub registry_policy: RegistryPolicy,
    pub layers: &'static [LayerDef],
    pub position_count: usize,
    pub physical_layouts: &'static [PhysicalLayout],
    pub initial_physical_layout: usize,
    /// Capacity of the ISR→worker scan event queue; see
    /// [`crate::scan::ScanPipeline`].
    pub scan_queue_capacity: usize,
}

impl KeymapConfig {
    pub const fn new(
        behaviors: &'static [Behavior],
        registry_policy: RegistryPolicy,
        layers: &'static [LayerDef],
        position_count: usize,
        physical_layouts: &'static [PhysicalLayout],
    ) -> Self {
        Self {
            behaviors,
            registry_policy,
            layers,
            position_count,
            physical_layouts,
            initial_physical_layout: 0,
            scan_queue_capacity: 16,
        }
    }

    pub const fn with_initial_physical_layout(mut self, index: usize) -> Self {
        self.initial_physical_layout = index;
        self
    }

    pub const fn with_scan_queue_capacity(mut self, capacity: usize) -> Self {
        self.scan_queue_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{tests_support::StubBehavior, BehaviorResponse, ParameterMetadata, StandardDomain};
    use crate::keymap::BehaviorBinding;
    use crate::matrix::MatrixTransform;
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
    static LAYER0: [BehaviorBinding; 1] = [BehaviorBinding { behavior_name: "mo", param1: 0, param2: 0 }];
    static LAYERS: [LayerDef; 1] = [LayerDef { name: "default", bindings: &LAYER0, sensor_bindings: &[] }];
    static LAYOUTS: [PhysicalLayout; 1] = [PhysicalLayout {
        name: "default",
        transform: MatrixTransform::new(&[0], 1),
        scan_source: None,
    }];

    #[test]
    fn builder_defaults_and_overrides() {
        const CONFIG: KeymapConfig = KeymapConfig::new(&BEHAVIORS, RegistryPolicy::Crc16, &LAYERS, 1, &LAYOUTS)
            .with_scan_queue_capacity(32);
        assert_eq!(CONFIG.initial_physical_layout, 0);
        assert_eq!(CONFIG.scan_queue_capacity, 32);
        assert_eq!(CONFIG.position_count, 1);
    }
}
