//! Cascades a press/release through the active layer stack and invokes the
//! resolved behavior.

use crate::behavior::{BehaviorEvent, BehaviorResponse};
use crate::keymap::Keymap;
use crate::registry::BehaviorRegistry;
use derive_more::{Display, Error, From};
use lokey::split::{Locality, Source, Transport};
use lokey::util::warn;

/// How far a dispatch actually went, for callers that want to observe
/// cascade behavior (tests, diagnostics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A behavior consumed the event at this layer.
    Consumed { layer: usize },
    /// Every layer down to and including the default layer was transparent;
    /// there is nothing left to fall through to.
    FellThrough,
    /// The event was handed off to a peripheral and is not this
    /// dispatcher's concern any further.
    RoutedToPeripheral,
}

/// Failure modes specific to dispatch; kept separate from [`lokey::Error`]
/// since neither of its variants fits "a behavior errored" or "a
/// central-state parameter failed to convert".
#[derive(Debug, Display, Error, From)]
pub enum DispatchError {
    /// The position or layer coordinate was invalid.
    #[display("{_0}")]
    Keymap(lokey::Error),
    /// [`crate::behavior::BehaviorImpl::convert_param`] rejected a
    /// parameter.
    #[display("parameter conversion failed")]
    ParamConversion,
    /// The behavior itself reported [`BehaviorResponse::Error`].
    #[display("behavior reported an error response")]
    BehaviorError,
}

/// Wires together the keymap, registry, and split transport to turn a
/// position event into a behavior invocation.
pub struct KeyDispatch<'a, T: Transport> {
    keymap: &'a Keymap,
    registry: &'a BehaviorRegistry,
    transport: &'a T,
}

impl<'a, T: Transport> KeyDispatch<'a, T> {
    pub fn new(keymap: &'a Keymap, registry: &'a BehaviorRegistry, transport: &'a T) -> Self {
        Self {
            keymap,
            registry,
            transport,
        }
    }

    /// Dispatches a key press at `position`, sourced from `source`.
    ///
    /// Walks the active layer stack from the highest active layer down to
    /// the default layer, stopping at the first behavior that does not
    /// return [`BehaviorResponse::Transparent`]. The layer set consulted is
    /// snapshotted once at press time and replayed unchanged on release
    /// ([`Keymap::press_memory`]), so a layer change between press and
    /// release can never split the pair across different cascades.
    pub async fn dispatch_press(
        &self,
        source: Source,
        position: usize,
        timestamp: u64,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.keymap.record_press(position);
        let mask = self.keymap.press_memory(position);
        self.run_cascade(source, position, timestamp, mask, true).await
    }

    /// Dispatches a key release at `position`, replaying the layer mask
    /// captured by the matching [`dispatch_press`](Self::dispatch_press).
    pub async fn dispatch_release(
        &self,
        source: Source,
        position: usize,
        timestamp: u64,
    ) -> Result<DispatchOutcome, DispatchError> {
        let mask = self.keymap.press_memory(position);
        self.run_cascade(source, position, timestamp, mask, false).await
    }

    async fn run_cascade(
        &self,
        source: Source,
        position: usize,
        timestamp: u64,
        layer_mask: u32,
        pressed: bool,
    ) -> Result<DispatchOutcome, DispatchError> {
        for layer in (0..self.keymap.layer_count()).rev() {
            if layer_mask & (1 << layer) == 0 {
                continue;
            }
            let binding = self
                .keymap
                .get_binding(layer, position)
                .ok_or_else(|| DispatchError::Keymap(lokey::Error::domain_range(position as u32, self.keymap.position_count() as u32)))?;

            let behavior = self
                .registry
                .resolve_by_name(binding.behavior_name)
                .ok_or(DispatchError::Keymap(lokey::Error::UnknownBehavior))?;

            if behavior.locality == Locality::Global {
                let message = encode_invocation(position as u16, pressed, timestamp, binding);
                self.transport.broadcast(&message);
            }

            if !self.should_run_here(behavior.locality, source) {
                self.route_to_peripheral(source, position, pressed, timestamp, binding);
                return Ok(DispatchOutcome::RoutedToPeripheral);
            }

            let param1 = behavior
                .convert_param(0, binding.param1)
                .map_err(|_| DispatchError::ParamConversion)?;
            let param2 = behavior
                .convert_param(1, binding.param2)
                .map_err(|_| DispatchError::ParamConversion)?;
            let event = BehaviorEvent { position: position as u16, timestamp, param1, param2 };

            let response = if pressed {
                behavior.on_press(event).await
            } else {
                behavior.on_release(event).await
            };

            match response {
                BehaviorResponse::Transparent => continue,
                BehaviorResponse::Opaque => return Ok(DispatchOutcome::Consumed { layer }),
                BehaviorResponse::Error => return Err(DispatchError::BehaviorError),
            }
        }
        Ok(DispatchOutcome::FellThrough)
    }

    /// Whether a behavior with `locality` should actually execute on this
    /// device given the event's `source`.
    fn should_run_here(&self, locality: Locality, source: Source) -> bool {
        match locality {
            Locality::Central => true,
            Locality::Global => true,
            Locality::EventSource => source.is_local(),
        }
    }

    /// Fire-and-forget handoff to the peripheral the event came from. Only
    /// reached for [`Locality::EventSource`] (the only locality
    /// [`should_run_here`](Self::should_run_here) can return `false` for),
    /// so `source` is always a peripheral here. The local dispatcher has no
    /// channel back for the remote verdict, so the cascade always reports
    /// [`DispatchOutcome::RoutedToPeripheral`] and stops here regardless of
    /// what the peripheral ultimately does.
    fn route_to_peripheral(
        &self,
        source: Source,
        position: usize,
        pressed: bool,
        timestamp: u64,
        binding: crate::keymap::BehaviorBinding,
    ) {
        let message = encode_invocation(position as u16, pressed, timestamp, binding);
        match source {
            Source::Peripheral(id) => self.transport.send_to(id, &message),
            Source::Local => warn!("no route for peripheral-bound dispatch"),
        }
    }
}

/// Packs a behavior invocation for the split wire: `position(2) | flags(1) |
/// timestamp(8) | param1(4) | param2(4)`, behavior name length-prefixed and
/// appended.
fn encode_invocation(position: u16, pressed: bool, timestamp: u64, binding: crate::keymap::BehaviorBinding) -> alloc::vec::Vec<u8> {
    let mut buf = alloc::vec::Vec::with_capacity(15 + binding.behavior_name.len());
    buf.extend_from_slice(&position.to_le_bytes());
    buf.push(pressed as u8);
    buf.extend_from_slice(&timestamp.to_le_bytes());
    buf.extend_from_slice(&binding.param1.to_le_bytes());
    buf.extend_from_slice(&binding.param2.to_le_bytes());
    buf.push(binding.behavior_name.len() as u8);
    buf.extend_from_slice(binding.behavior_name.as_bytes());
    buf
}
