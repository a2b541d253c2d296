//! Tracks the active physical layout and wires/unwires its scan source.

use crate::matrix::MatrixTransform;
use core::sync::atomic::Ordering;
use lokey::Error;
use portable_atomic::AtomicUsize;

/// A scan device a [`PhysicalLayout`] can bind to. Power-management
/// suspend/resume is optional: devices that don't support it can rely on
/// the default `Ok(())` implementations.
pub trait ScanSource: Send + Sync + 'static {
    /// Enables or disables the device's scan callback.
    fn set_enabled(&'static self, enabled: bool);

    fn suspend(&'static self) -> Result<(), Error> {
        Ok(())
    }

    fn resume(&'static self) -> Result<(), Error> {
        Ok(())
    }
}

/// A display name, a matrix transform, and an optional scan source.
pub struct PhysicalLayout {
    pub name: &'static str,
    pub transform: MatrixTransform,
    pub scan_source: Option<&'static dyn ScanSource>,
}

/// Holds the single "active" physical layout pointer and switches between
/// layouts, wiring/unwiring scan sources along the way.
pub struct PhysicalLayoutManager {
    layouts: &'static [PhysicalLayout],
    active_index: AtomicUsize,
}

impl PhysicalLayoutManager {
    pub fn new(layouts: &'static [PhysicalLayout], initial: usize) -> Self {
        assert!(!layouts.is_empty(), "at least one physical layout is required");
        let initial = if initial < layouts.len() { initial } else { 0 };
        Self {
            layouts,
            active_index: AtomicUsize::new(initial),
        }
    }

    pub fn layouts(&self) -> &'static [PhysicalLayout] {
        self.layouts
    }

    pub fn get_selected(&self) -> usize {
        self.active_index.load(Ordering::Acquire)
    }

    pub fn active_layout(&self) -> &'static PhysicalLayout {
        &self.layouts[self.get_selected()]
    }

    /// Switches the active layout. Idempotent when `index` is already
    /// active.
    ///
    /// On change: disable + suspend the previous scan source, install the
    /// new pointer, then resume + enable the new scan source. If resume
    /// fails, the new layout is left installed (so `get_selected` already
    /// reports it) but its scan source stays disabled — the caller gets the
    /// error back and decides whether to retry.
    pub fn select(&self, index: usize) -> Result<(), Error> {
        if index >= self.layouts.len() {
            return Err(Error::domain_range(index as u32, self.layouts.len() as u32));
        }
        let current = self.get_selected();
        if current == index {
            return Ok(());
        }

        if let Some(source) = self.layouts[current].scan_source {
            source.set_enabled(false);
            let _ = source.suspend();
        }

        self.active_index.store(index, Ordering::Release);

        if let Some(source) = self.layouts[index].scan_source {
            source.resume()?;
            source.set_enabled(true);
        }
        Ok(())
    }

    /// Selects a layout by its handle; must be one of this manager's own
    /// `layouts` entries.
    pub fn select_by_handle(&self, layout: &'static PhysicalLayout) -> Result<(), Error> {
        let index = self
            .layouts
            .iter()
            .position(|candidate| core::ptr::eq(candidate, layout))
            .ok_or_else(|| Error::domain_range(u32::MAX, self.layouts.len() as u32))?;
        self.select(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use core::cell::RefCell;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::blocking_mutex::Mutex;

    struct RecordingSource {
        events: Mutex<CriticalSectionRawMutex, RefCell<Vec<&'static str>>>,
    }

    impl RecordingSource {
        const fn new() -> Self {
            Self {
                events: Mutex::new(RefCell::new(Vec::new())),
            }
        }

        fn events(&self) -> Vec<&'static str> {
            self.events.lock(|e| e.borrow().clone())
        }
    }

    impl ScanSource for RecordingSource {
        fn set_enabled(&'static self, enabled: bool) {
            self.events
                .lock(|e| e.borrow_mut().push(if enabled { "enable" } else { "disable" }));
        }
        fn suspend(&'static self) -> Result<(), Error> {
            self.events.lock(|e| e.borrow_mut().push("suspend"));
            Ok(())
        }
        fn resume(&'static self) -> Result<(), Error> {
            self.events.lock(|e| e.borrow_mut().push("resume"));
            Ok(())
        }
    }

    macro_rules! layouts_fixture {
        ($source_a:ident, $source_b:ident, $layouts:ident) => {
            static $source_a: RecordingSource = RecordingSource::new();
            static $source_b: RecordingSource = RecordingSource::new();
            static $layouts: [PhysicalLayout; 2] = [
                PhysicalLayout {
                    name: "a",
                    transform: MatrixTransform::new(&[0], 1),
                    scan_source: Some(&$source_a),
                },
                PhysicalLayout {
                    name: "b",
                    transform: MatrixTransform::new(&[0], 1),
                    scan_source: Some(&$source_b),
                },
            ];
        };
    }

    #[test]
    fn select_is_idempotent() {
        layouts_fixture!(SOURCE_A, SOURCE_B, LAYOUTS);
        let manager = PhysicalLayoutManager::new(&LAYOUTS, 0);
        manager.select(0).unwrap();
        assert!(SOURCE_A.events().is_empty());
    }

    #[test]
    fn select_wires_and_unwires_scan_sources() {
        layouts_fixture!(SOURCE_A, SOURCE_B, LAYOUTS);
        let manager = PhysicalLayoutManager::new(&LAYOUTS, 0);
        manager.select(1).unwrap();
        assert_eq!(manager.get_selected(), 1);
        assert_eq!(SOURCE_A.events(), alloc::vec!["disable", "suspend"]);
        assert_eq!(SOURCE_B.events(), alloc::vec!["resume", "enable"]);
    }

    #[test]
    fn select_out_of_range_errs() {
        layouts_fixture!(SOURCE_A, SOURCE_B, LAYOUTS);
        let manager = PhysicalLayoutManager::new(&LAYOUTS, 0);
        assert!(manager.select(5).is_err());
    }
}
