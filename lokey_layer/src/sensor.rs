//! Sensor-channel dispatch: unlike a key press, every layer's sensor binding
//! is visited on every sample, active or not, since accumulator-style
//! behaviors (e.g. an encoder's acceleration filter) need to see samples even
//! on layers a higher layer has already claimed the "real" response for, or
//! that aren't active at all right now.

use crate::behavior::{BehaviorResponse, SensorProcessMode};
use crate::keymap::Keymap;
use crate::registry::BehaviorRegistry;
use lokey::util::warn;

/// Drives one sensor channel's behaviors across every active layer.
pub struct SensorDispatch<'a> {
    keymap: &'a Keymap,
    registry: &'a BehaviorRegistry,
}

impl<'a> SensorDispatch<'a> {
    pub fn new(keymap: &'a Keymap, registry: &'a BehaviorRegistry) -> Self {
        Self { keymap, registry }
    }

    /// Offers `channel_data` to every layer's sensor binding for
    /// `sensor_index` that accepts it, from the top layer down to the
    /// default layer, regardless of whether that layer is currently active.
    ///
    /// The first *active* layer whose bound behavior accepts the data *and*
    /// has not already been preceded by an opaque-consuming active layer
    /// above it is processed in [`SensorProcessMode::Trigger`]; every other
    /// accepting layer — inactive ones, and active ones after the trigger
    /// has fired — still gets a [`SensorProcessMode::Discard`] pass, so its
    /// internal accumulator stays in sync even though its result is
    /// discarded.
    pub async fn dispatch(&self, sensor_index: usize, channel_data: &[i32]) {
        let mask = self.keymap.state().snapshot();
        let mut opaque_seen = false;

        for layer in (0..self.keymap.layer_count()).rev() {
            let Some(binding) = self.keymap.sensor_binding(layer, sensor_index) else {
                continue;
            };
            let Some(behavior) = self.registry.resolve_by_name(binding.behavior_name) else {
                warn!("sensor binding references an unknown behavior");
                continue;
            };
            if behavior.accept_sensor_data(channel_data).is_err() {
                continue;
            }

            let active = mask & (1 << layer) != 0;
            let mode = if active && !opaque_seen {
                SensorProcessMode::Trigger
            } else {
                SensorProcessMode::Discard
            };
            let response = behavior.process_sensor(mode).await;
            if mode == SensorProcessMode::Trigger && response == BehaviorResponse::Opaque {
                opaque_seen = true;
            }
        }
    }
}
