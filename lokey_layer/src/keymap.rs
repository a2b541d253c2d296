//! Layer activation state and the mutable keymap overlay over the
//! compile-time default bindings.

use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use lokey::util::pubsub::{PubSubChannel, Subscriber};
use lokey::Error;
use portable_atomic::{AtomicU32, Ordering};

/// Layer 0 is always the default layer (§3 data model).
pub const DEFAULT_LAYER: u8 = 0;

/// Largest layer count this keymap supports; the layer-state bitmask is a
/// `u32`, matching ZMK's `zmk_keymap_layers_state_t`.
pub const MAX_LAYERS: usize = 32;

/// The value stored at one keymap cell: a behavior reference by name plus
/// two opaque parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BehaviorBinding {
    pub behavior_name: &'static str,
    pub param1: u32,
    pub param2: u32,
}

/// One compile-time layer: a display name and its `K`-length bindings
/// array, plus an optional sensor-bindings array.
pub struct LayerDef {
    pub name: &'static str,
    pub bindings: &'static [BehaviorBinding],
    pub sensor_bindings: &'static [BehaviorBinding],
}

/// Emitted by [`LayerState`]'s guarded setter, only on an actual mask
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerStateChanged {
    pub layer: u8,
    pub active: bool,
}

/// The layer-activation bitmask. Bit `DEFAULT_LAYER` is always set; every
/// mutation goes through [`LayerState::activate`], [`LayerState::deactivate`],
/// or [`LayerState::toggle`], which all fall through to one guarded setter.
pub struct LayerState {
    bits: AtomicU32,
    notifications: PubSubChannel<CriticalSectionRawMutex, LayerStateChanged>,
}

impl LayerState {
    pub fn new() -> Self {
        Self {
            bits: AtomicU32::new(1 << DEFAULT_LAYER),
            notifications: PubSubChannel::new(),
        }
    }

    pub fn snapshot(&self) -> u32 {
        self.bits.load(Ordering::Acquire)
    }

    pub fn is_active(&self, layer: u8) -> bool {
        self.snapshot() & (1 << layer) != 0
    }

    pub fn subscriber(&self) -> Subscriber<'_, CriticalSectionRawMutex, LayerStateChanged> {
        self.notifications.subscriber()
    }

    /// The single guarded setter. Refuses to clear the default layer's bit
    /// (a no-op, no notification); otherwise emits [`LayerStateChanged`]
    /// only when the mask actually changes.
    fn set(&self, layer: u8, active: bool) {
        if layer == DEFAULT_LAYER && !active {
            return;
        }
        let mask = 1u32 << layer;
        let previous = if active {
            self.bits.fetch_or(mask, Ordering::AcqRel)
        } else {
            self.bits.fetch_and(!mask, Ordering::AcqRel)
        };
        let changed = if active {
            previous & mask == 0
        } else {
            previous & mask != 0
        };
        if changed {
            self.notifications.publish(LayerStateChanged { layer, active });
        }
    }

    pub fn activate(&self, layer: u8) {
        self.set(layer, true);
    }

    pub fn deactivate(&self, layer: u8) {
        self.set(layer, false);
    }

    pub fn toggle(&self, layer: u8) {
        let active = self.is_active(layer);
        self.set(layer, !active);
    }
}

impl Default for LayerState {
    fn default() -> Self {
        Self::new()
    }
}

type Overlay = Mutex<CriticalSectionRawMutex, RefCell<Vec<Vec<Option<BehaviorBinding>>>>>;
type DirtyBitmap = Mutex<CriticalSectionRawMutex, RefCell<Vec<u8>>>;
type PressMemory = Mutex<CriticalSectionRawMutex, RefCell<Vec<u32>>>;

/// The live keymap: compile-time layer defaults, a mutable overlay
/// persistence writes into, per-position press memory, and the dirty
/// bitmap that tracks unsaved overlay edits.
pub struct Keymap {
    layers: &'static [LayerDef],
    position_count: usize,
    state: LayerState,
    overlay: Overlay,
    sensor_overlay: Overlay,
    dirty: DirtyBitmap,
    press_memory: PressMemory,
}

impl Keymap {
    pub fn new(layers: &'static [LayerDef], position_count: usize) -> Self {
        assert!(
            layers.len() <= MAX_LAYERS,
            "layer count exceeds the 32-bit layer-state mask"
        );
        for layer in layers {
            assert_eq!(
                layer.bindings.len(),
                position_count,
                "layer binding count must equal the physical layout's key count"
            );
        }

        let overlay = vec![vec![None; position_count]; layers.len()];
        let sensor_overlay = layers
            .iter()
            .map(|l| vec![None; l.sensor_bindings.len()])
            .collect();
        let bytes_per_layer = position_count.div_ceil(8);
        let dirty = vec![0u8; layers.len() * bytes_per_layer];

        Self {
            layers,
            position_count,
            state: LayerState::new(),
            overlay: Mutex::new(RefCell::new(overlay)),
            sensor_overlay: Mutex::new(RefCell::new(sensor_overlay)),
            dirty: Mutex::new(RefCell::new(dirty)),
            press_memory: Mutex::new(RefCell::new(vec![0u32; position_count])),
        }
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn position_count(&self) -> usize {
        self.position_count
    }

    pub fn layer_name(&self, layer: usize) -> Option<&'static str> {
        self.layers.get(layer).map(|l| l.name)
    }

    pub fn state(&self) -> &LayerState {
        &self.state
    }

    fn bytes_per_layer(&self) -> usize {
        self.position_count.div_ceil(8)
    }

    /// The binding effective at `(layer, position)`: the overlay value if
    /// one was set, otherwise the compile-time default. `None` iff the
    /// coordinate is out of range.
    pub fn get_binding(&self, layer: usize, position: usize) -> Option<BehaviorBinding> {
        if layer >= self.layers.len() || position >= self.position_count {
            return None;
        }
        let overridden = self.overlay.lock(|o| o.borrow()[layer][position]);
        Some(overridden.unwrap_or(self.layers[layer].bindings[position]))
    }

    pub fn set_layer_binding(
        &self,
        layer: usize,
        position: usize,
        binding: BehaviorBinding,
    ) -> Result<(), Error> {
        if layer >= self.layers.len() {
            return Err(Error::domain_range(layer as u32, self.layers.len() as u32));
        }
        if position >= self.position_count {
            return Err(Error::domain_range(position as u32, self.position_count as u32));
        }
        self.overlay
            .lock(|o| o.borrow_mut()[layer][position] = Some(binding));
        self.mark_dirty(layer, position);
        Ok(())
    }

    fn mark_dirty(&self, layer: usize, position: usize) {
        let bpl = self.bytes_per_layer();
        self.dirty.lock(|d| {
            d.borrow_mut()[layer * bpl + position / 8] |= 1 << (position % 8);
        });
    }

    pub(crate) fn clear_dirty_bit(&self, layer: usize, position: usize) {
        let bpl = self.bytes_per_layer();
        self.dirty.lock(|d| {
            d.borrow_mut()[layer * bpl + position / 8] &= !(1 << (position % 8));
        });
    }

    /// Clears every dirty bit for `layer` (all `ceil(K/8)` bytes — the
    /// upstream implementation this is grounded on only clears the first
    /// byte, a bug fixed here per spec).
    pub(crate) fn clear_dirty_layer(&self, layer: usize) {
        let bpl = self.bytes_per_layer();
        self.dirty.lock(|d| {
            let mut d = d.borrow_mut();
            for byte in &mut d[layer * bpl..(layer + 1) * bpl] {
                *byte = 0;
            }
        });
    }

    pub(crate) fn is_dirty(&self, layer: usize, position: usize) -> bool {
        let bpl = self.bytes_per_layer();
        self.dirty
            .lock(|d| d.borrow()[layer * bpl + position / 8] & (1 << (position % 8)) != 0)
    }

    /// Every `(layer, position)` whose dirty bit is currently set.
    pub(crate) fn dirty_positions(&self) -> Vec<(usize, usize)> {
        let mut positions = Vec::new();
        for layer in 0..self.layers.len() {
            for position in 0..self.position_count {
                if self.is_dirty(layer, position) {
                    positions.push((layer, position));
                }
            }
        }
        positions
    }

    /// Applies a binding loaded from persistence without marking it dirty
    /// (it is, by construction, already what's on flash).
    pub(crate) fn apply_loaded_binding(&self, layer: usize, position: usize, binding: BehaviorBinding) {
        self.overlay
            .lock(|o| o.borrow_mut()[layer][position] = Some(binding));
    }

    pub fn sensor_binding(&self, layer: usize, sensor_index: usize) -> Option<BehaviorBinding> {
        let def = self.layers.get(layer)?;
        let overridden = self.sensor_overlay.lock(|o| {
            o.borrow()
                .get(layer)
                .and_then(|l| l.get(sensor_index).copied())
                .flatten()
        });
        overridden.or_else(|| def.sensor_bindings.get(sensor_index).copied())
    }

    pub(crate) fn record_press(&self, position: usize) {
        let snapshot = self.state.snapshot();
        self.press_memory.lock(|m| m.borrow_mut()[position] = snapshot);
    }

    pub(crate) fn press_memory(&self, position: usize) -> u32 {
        self.press_memory.lock(|m| m.borrow()[position])
    }
}
