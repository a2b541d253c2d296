//! Locality and split-transport plumbing.
//!
//! A split keyboard has a central half (the one connected to the host) and
//! zero or more peripheral halves. Some behaviors only make sense executing
//! on the central half (e.g. anything touching the HID report), some must
//! run wherever the key physically lives (e.g. an LED toggle local to one
//! half), and some must run everywhere. [`Locality`] names which; the
//! [`Transport`] trait is how a dispatcher reaches a peripheral without this
//! crate knowing anything about keymaps, behaviors, or HID.

use alloc::vec::Vec;

/// Where a behavior must execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    /// Always runs on the central half, regardless of where the key event
    /// originated.
    Central,
    /// Runs on whichever half the key event originated from.
    EventSource,
    /// Runs on the central half *and* is broadcast to every peripheral.
    Global,
}

/// Identifies one physical half of a split keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PeripheralId(pub u8);

/// Which physical half an event or dispatch originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The device running the dispatcher itself (always the central half
    /// for dispatch purposes).
    Local,
    /// A peripheral half, identified by [`PeripheralId`].
    Peripheral(PeripheralId),
}

impl Source {
    pub fn is_local(self) -> bool {
        matches!(self, Source::Local)
    }
}

/// Sends an already-encoded behavior invocation to one or all peripherals.
///
/// Encoding/decoding the invocation itself (which behavior, which
/// parameters, press or release) is a `lokey_layer` concern; this trait only
/// knows how to get bytes to the other side of the split link. A
/// single-device (non-split) build can implement this with both methods as
/// no-ops.
pub trait Transport {
    /// Sends `message` to exactly one peripheral.
    fn send_to(&self, peripheral: PeripheralId, message: &[u8]);
    /// Sends `message` to every known peripheral.
    fn broadcast(&self, message: &[u8]);
}

/// A [`Transport`] that has no peripherals: `send_to`/`broadcast` are no-ops.
///
/// Useful for unibody boards and for tests that don't exercise the split
/// path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSplit;

impl Transport for NoSplit {
    fn send_to(&self, _peripheral: PeripheralId, _message: &[u8]) {}
    fn broadcast(&self, _message: &[u8]) {}
}

/// A [`Transport`] that records every call, for use in tests.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub sent_to: core::cell::RefCell<Vec<(PeripheralId, Vec<u8>)>>,
    pub broadcasts: core::cell::RefCell<Vec<Vec<u8>>>,
}

impl Transport for RecordingTransport {
    fn send_to(&self, peripheral: PeripheralId, message: &[u8]) {
        self.sent_to
            .borrow_mut()
            .push((peripheral, message.to_vec()));
    }

    fn broadcast(&self, message: &[u8]) {
        self.broadcasts.borrow_mut().push(message.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_transport_tracks_calls() {
        let transport = RecordingTransport::default();
        transport.send_to(PeripheralId(1), &[1, 2, 3]);
        transport.broadcast(&[9]);
        assert_eq!(transport.sent_to.borrow().len(), 1);
        assert_eq!(transport.broadcasts.borrow().len(), 1);
    }

    #[test]
    fn source_is_local() {
        assert!(Source::Local.is_local());
        assert!(!Source::Peripheral(PeripheralId(0)).is_local());
    }
}
