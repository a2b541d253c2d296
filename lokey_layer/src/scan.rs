//! ISR-safe queue from the scan callback to the cooperative dispatch
//! worker.

use crate::matrix::MatrixTransform;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use lokey::split::Source;
use lokey::util::channel::Channel;
use lokey::util::{error, warn};

/// A raw matrix-scan event, as reported by a scan device's interrupt
/// handler.
#[derive(Debug, Clone, Copy)]
pub struct ScanEvent {
    pub device_id: u8,
    pub row: u16,
    pub col: u16,
    pub pressed: bool,
    pub timestamp: u64,
}

/// A normalized position event, ready for [`crate::dispatch::KeyDispatch`].
#[derive(Debug, Clone, Copy)]
pub struct PositionEvent {
    pub source: Source,
    pub position: u16,
    pub pressed: bool,
    pub timestamp: u64,
}

/// The bounded ISR-to-worker queue. The producer side never blocks or
/// allocates; when full, the oldest queued events are kept and the new one
/// is dropped (and logged).
pub struct ScanPipeline {
    queue: Channel<CriticalSectionRawMutex, ScanEvent>,
}

impl ScanPipeline {
    pub const fn new(capacity: usize) -> Self {
        Self {
            queue: Channel::new(capacity),
        }
    }

    /// Called from interrupt context. `active_device_id` identifies the
    /// currently active layout's scan source; callbacks from any other
    /// device (a stray wake from a device the layout switch just
    /// suspended) are silently ignored rather than queued.
    pub fn on_scan(&self, active_device_id: u8, event: ScanEvent) {
        if event.device_id != active_device_id {
            return;
        }
        if !self.queue.try_send(event) {
            warn!("scan queue full, dropping oldest-preserved event");
        }
    }

    pub async fn wait_for_work(&self) {
        // A worker that wants to block until there is something to drain
        // can `receive()` once and then `drain()`; this helper exists so
        // callers don't have to reach into the queue's receiver directly.
        let _ = self.queue.receiver().receive().await;
    }

    /// Drains every queued scan event, translating each through `transform`
    /// and handing the resulting [`PositionEvent`] to `on_position`.
    /// Events that land on no key (`transform` returns `None`) are logged
    /// and discarded.
    pub fn drain(&self, transform: &MatrixTransform, mut on_position: impl FnMut(PositionEvent)) {
        self.queue.receiver().drain(|event| match transform.resolve(event.row, event.col) {
            Some(position) => on_position(PositionEvent {
                source: Source::Local,
                position,
                pressed: event.pressed,
                timestamp: event.timestamp,
            }),
            None => {
                error!("scan event at unmapped row/col, discarding");
            }
        });
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
