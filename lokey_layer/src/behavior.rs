//! Dispatchable behavior endpoints.
//!
//! A [`Behavior`] is the late-bound target a [`crate::keymap::BehaviorBinding`]
//! names. The binding itself only carries the behavior's name (at runtime)
//! or its stable [local ID](Behavior::local_id) (when persisted); this
//! module owns the trait object behind that name and the identity
//! bookkeeping that keeps it stable across rebuilds.

use alloc::boxed::Box;
use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::Ordering;
use lokey::split::Locality;
use portable_atomic::{AtomicBool, AtomicU16};

/// Sentinel stored in [`Behavior`]'s local-ID cell before
/// [`crate::registry::BehaviorRegistry::assign_local_ids`] has run.
pub const UNASSIGNED_LOCAL_ID: u16 = u16::MAX;

/// How a layer's cascade should continue after a behavior handles an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorResponse {
    /// Negative return: the event is fatal, surfaced to the caller.
    Error,
    /// Zero or positive-opaque: the event is consumed, cascading stops.
    Opaque,
    /// Positive-transparent: keep cascading to the next lower layer.
    Transparent,
}

/// The process mode a sensor behavior is invoked with; see
/// [`crate::sensor::SensorDispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorProcessMode {
    /// This layer is live and no higher layer has claimed the event yet.
    Trigger,
    /// Let the behavior update any internal accumulator without side effect.
    Discard,
}

/// The event handed to a behavior on press/release.
#[derive(Debug, Clone, Copy)]
pub struct BehaviorEvent {
    pub position: u16,
    pub timestamp: u64,
    pub param1: u32,
    pub param2: u32,
}

/// The typed interface a behavior implementation provides.
///
/// Mirrors the `Action`/`DynAction` split in [`lokey::key::action`]: callers
/// never name `Self`, they go through the type-erased [`DynBehaviorImpl`]
/// a blanket impl derives from this trait.
pub trait BehaviorImpl: Send + Sync + 'static {
    fn on_press(&'static self, event: BehaviorEvent) -> impl Future<Output = BehaviorResponse> + Send;
    fn on_release(&'static self, event: BehaviorEvent) -> impl Future<Output = BehaviorResponse> + Send;

    /// Converts a central-state-dependent parameter to an absolute value
    /// before dispatch. Behaviors that declare no such parameter can rely
    /// on the identity default.
    fn convert_param(&'static self, _param_index: u8, value: u32) -> Result<u32, ()> {
        Ok(value)
    }

    /// Offers raw sensor-channel data to the behavior. Behaviors that never
    /// appear in a `sensor_bindings` array can rely on the default, which
    /// rejects every sample.
    fn accept_sensor_data(&'static self, _channel_data: &[i32]) -> Result<(), ()> {
        Err(())
    }

    fn process_sensor(&'static self, mode: SensorProcessMode) -> impl Future<Output = BehaviorResponse> + Send;
}

/// Type-erased counterpart of [`BehaviorImpl`], stored behind the trait
/// object the registry hands out.
pub trait DynBehaviorImpl: Send + Sync + 'static {
    fn on_press(&'static self, event: BehaviorEvent) -> Pin<Box<dyn Future<Output = BehaviorResponse> + Send>>;
    fn on_release(&'static self, event: BehaviorEvent) -> Pin<Box<dyn Future<Output = BehaviorResponse> + Send>>;
    fn convert_param(&'static self, param_index: u8, value: u32) -> Result<u32, ()>;
    fn accept_sensor_data(&'static self, channel_data: &[i32]) -> Result<(), ()>;
    fn process_sensor(
        &'static self,
        mode: SensorProcessMode,
    ) -> Pin<Box<dyn Future<Output = BehaviorResponse> + Send>>;
}

impl<T: BehaviorImpl> DynBehaviorImpl for T {
    fn on_press(&'static self, event: BehaviorEvent) -> Pin<Box<dyn Future<Output = BehaviorResponse> + Send>> {
        Box::pin(BehaviorImpl::on_press(self, event))
    }

    fn on_release(&'static self, event: BehaviorEvent) -> Pin<Box<dyn Future<Output = BehaviorResponse> + Send>> {
        Box::pin(BehaviorImpl::on_release(self, event))
    }

    fn convert_param(&'static self, param_index: u8, value: u32) -> Result<u32, ()> {
        BehaviorImpl::convert_param(self, param_index, value)
    }

    fn accept_sensor_data(&'static self, channel_data: &[i32]) -> Result<(), ()> {
        BehaviorImpl::accept_sensor_data(self, channel_data)
    }

    fn process_sensor(
        &'static self,
        mode: SensorProcessMode,
    ) -> Pin<Box<dyn Future<Output = BehaviorResponse> + Send>> {
        Box::pin(BehaviorImpl::process_sensor(self, mode))
    }
}

/// A declared domain one parameter's value is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardDomain {
    /// Must be exactly `0`.
    Null,
    /// Must be `< layer_count`.
    LayerIndex,
    /// A packed HID usage page/ID; see [`crate::validator`].
    HidUsage,
    /// Always accepted.
    Hsv,
}

/// One acceptable value, range, or domain for a parameter position within a
/// [`CustomParamSet`].
#[derive(Debug, Clone, Copy)]
pub enum ParamMatcher {
    Literal(u32),
    /// Inclusive range.
    Range(u32, u32),
    Standard(StandardDomain),
}

/// One admissible `(param1, param2)` combination in a custom parameter
/// descriptor. A parameter position with no entries must be zero.
#[derive(Debug, Clone, Copy)]
pub struct CustomParamSet {
    pub param1: &'static [ParamMatcher],
    pub param2: &'static [ParamMatcher],
}

/// A behavior's declared acceptable parameters.
#[derive(Debug, Clone, Copy)]
pub enum ParameterMetadata {
    Standard {
        param1: StandardDomain,
        param2: StandardDomain,
    },
    /// At least one set must match both parameters.
    Custom(&'static [CustomParamSet]),
}

/// A named, late-bound dispatch target.
///
/// Registered once at startup (see [`crate::registry::BehaviorRegistry`])
/// and never destroyed. `local_id` is written exactly once, at startup;
/// `ready` gates [`crate::registry::BehaviorRegistry::resolve_by_name`] and
/// [`resolve_by_local_id`](crate::registry::BehaviorRegistry::resolve_by_local_id)
/// so partially-initialized behaviors never match.
pub struct Behavior {
    pub name: &'static str,
    handle: &'static dyn DynBehaviorImpl,
    pub parameter_metadata: &'static ParameterMetadata,
    pub locality: Locality,
    local_id: AtomicU16,
    ready: AtomicBool,
}

impl Behavior {
    pub const fn new(
        name: &'static str,
        handle: &'static dyn DynBehaviorImpl,
        parameter_metadata: &'static ParameterMetadata,
        locality: Locality,
    ) -> Self {
        Self {
            name,
            handle,
            parameter_metadata,
            locality,
            local_id: AtomicU16::new(UNASSIGNED_LOCAL_ID),
            ready: AtomicBool::new(false),
        }
    }

    pub fn local_id(&self) -> Option<u16> {
        let id = self.local_id.load(Ordering::Acquire);
        (id != UNASSIGNED_LOCAL_ID).then_some(id)
    }

    pub(crate) fn assign_local_id(&self, id: u16) {
        self.local_id.store(id, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub async fn on_press(&'static self, event: BehaviorEvent) -> BehaviorResponse {
        self.handle.on_press(event).await
    }

    pub async fn on_release(&'static self, event: BehaviorEvent) -> BehaviorResponse {
        self.handle.on_release(event).await
    }

    pub fn convert_param(&'static self, param_index: u8, value: u32) -> Result<u32, ()> {
        self.handle.convert_param(param_index, value)
    }

    pub fn accept_sensor_data(&'static self, channel_data: &[i32]) -> Result<(), ()> {
        self.handle.accept_sensor_data(channel_data)
    }

    pub async fn process_sensor(&'static self, mode: SensorProcessMode) -> BehaviorResponse {
        self.handle.process_sensor(mode).await
    }
}
