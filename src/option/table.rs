//! Option table of the open device.
//!
//! The table is rebuilt from scratch after every successful write, since one
//! option's value can change another's constraint, capabilities or value.
//! Tables are immutable once built and are shared as `Arc<OptionTable>`
//! snapshots.

use super::{OptionDescriptor, OptionValue};
use crate::adapter::{DeviceHandle, RawOption, RawValue, ScanAdapter, Unit, ValueType};
use crate::error::{AdapterError, AppResult, ScanError};
use log::{debug, warn};

/// One adapter-reported option: its descriptor, or why it couldn't be read.
#[derive(Debug)]
pub struct OptionEntry {
    /// Position in the adapter's option list
    pub index: usize,
    /// Descriptor, or the error reading it
    pub option: AppResult<OptionDescriptor>,
}

impl OptionEntry {
    /// Descriptor, if the option could be read.
    pub fn descriptor(&self) -> Option<&OptionDescriptor> {
        self.option.as_ref().ok()
    }

    /// Error, if the option couldn't be read.
    pub fn error(&self) -> Option<&ScanError> {
        self.option.as_ref().err()
    }
}

/// Every option of one device, in adapter order.
#[derive(Debug, Default)]
pub struct OptionTable {
    device: String,
    entries: Vec<OptionEntry>,
}

/// Scan rectangle in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanArea {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width
    pub width: i32,
    /// Height
    pub height: i32,
}

/// Result of a successful option write.
#[derive(Debug)]
pub struct SetOutcome {
    /// Freshly reloaded table
    pub table: OptionTable,
    /// Device stored a value other than the one written
    pub inexact: bool,
    /// Scan geometry may have changed
    pub reload_parameters: bool,
}

impl OptionTable {
    /// Table of a closed device.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read every option of `device` in adapter order.
    ///
    /// Failures of single options are kept in their entry; only a failure to
    /// list the options at all fails the load.
    pub fn load(
        adapter: &mut dyn ScanAdapter,
        handle: DeviceHandle,
        device: &str,
    ) -> AppResult<Self> {
        let raw_options = adapter.option_descriptors(handle).map_err(|e| {
            ScanError::adapter(format!("can't get options of device \"{}\"", device), e)
        })?;

        let entries: Vec<OptionEntry> = raw_options
            .into_iter()
            .enumerate()
            .map(|(index, raw)| OptionEntry {
                index,
                option: load_entry(adapter, handle, index, raw),
            })
            .collect();

        for entry in &entries {
            if let Some(err) = entry.error() {
                warn!("Option #{} of '{}' unavailable: {}", entry.index, device, err);
            }
        }
        debug!("Loaded {} options of '{}'", entries.len(), device);

        Ok(Self {
            device: device.to_string(),
            entries,
        })
    }

    /// Validate and write one option, then reload the whole table.
    ///
    /// `self` is left untouched. If the write itself fails the caller keeps
    /// serving it; if only the reload fails the error is
    /// [`ScanError::OptionsStale`] and `self` no longer matches the device.
    pub fn set_option(
        &self,
        adapter: &mut dyn ScanAdapter,
        handle: DeviceHandle,
        name: &str,
        value: OptionValue,
    ) -> AppResult<SetOutcome> {
        let descriptor = self
            .find(name)
            .ok_or_else(|| ScanError::UnknownOption(name.to_string()))?;
        let raw = descriptor.prepare(value)?;
        debug!("Writing option '{}' = {:?}", name, raw);

        let info = adapter
            .set_option(handle, name, raw)
            .map_err(|e| ScanError::adapter(format!("can't set option \"{}\"", name), e))?;
        if info.inexact {
            debug!("Device adjusted the value of option '{}'", name);
        }

        let table = Self::load(adapter, handle, &self.device).map_err(|e| {
            ScanError::OptionsStale {
                option: name.to_string(),
                source: Box::new(e),
            }
        })?;

        Ok(SetOutcome {
            table,
            inexact: info.inexact,
            reload_parameters: info.reload_parameters,
        })
    }

    /// Table of an open device whose options couldn't be read.
    pub fn unloaded(device: &str) -> Self {
        Self {
            device: device.to_string(),
            entries: Vec::new(),
        }
    }

    /// Name of the device the table belongs to.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Number of adapter-reported options, failed ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the device reported no options.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry, failed ones included.
    pub fn entries(&self) -> &[OptionEntry] {
        &self.entries
    }

    /// Readable options in adapter order.
    pub fn descriptors(&self) -> impl Iterator<Item = &OptionDescriptor> {
        self.entries.iter().filter_map(OptionEntry::descriptor)
    }

    /// Readable, non-group option named `name`.
    pub fn find(&self, name: &str) -> Option<&OptionDescriptor> {
        self.descriptors()
            .find(|d| !d.is_group() && d.name == name)
    }

    /// Scan rectangle from the `tl-x`, `tl-y`, `br-x` and `br-y` options.
    ///
    /// Millimetre coordinates are converted with the `resolution` option;
    /// the origin is rounded down and the size up.
    pub fn scan_area_px(&self) -> Option<ScanArea> {
        let corners = ["tl-x", "tl-y", "br-x", "br-y"]
            .iter()
            .map(|name| self.find(name))
            .collect::<Option<Vec<_>>>()?;

        let unit = corners[0].unit;
        if corners.iter().any(|d| d.unit != unit) {
            return None;
        }
        let v = corners
            .iter()
            .map(|d| d.scalar())
            .collect::<Option<Vec<f64>>>()?;
        let (tl_x, tl_y, br_x, br_y) = (v[0], v[1], v[2], v[3]);

        match unit {
            Unit::Pixel => Some(ScanArea {
                x: tl_x as i32,
                y: tl_y as i32,
                width: (br_x - tl_x) as i32,
                height: (br_y - tl_y) as i32,
            }),
            Unit::Millimeter => {
                let dpi = self
                    .find("resolution")
                    .filter(|d| d.unit == Unit::Dpi)
                    .and_then(|d| d.scalar())
                    .filter(|dpi| *dpi > 0.0)?;
                let px = |mm: f64| mm * dpi / 25.4;
                Some(ScanArea {
                    x: px(tl_x).floor() as i32,
                    y: px(tl_y).floor() as i32,
                    width: px(br_x - tl_x).ceil() as i32,
                    height: px(br_y - tl_y).ceil() as i32,
                })
            }
            _ => None,
        }
    }
}

fn load_entry(
    adapter: &mut dyn ScanAdapter,
    handle: DeviceHandle,
    index: usize,
    raw: Result<RawOption, AdapterError>,
) -> AppResult<OptionDescriptor> {
    let raw = raw.map_err(|e| {
        ScanError::adapter(format!("can't get description of option #{}", index), e)
    })?;

    let value = match raw.value_type {
        ValueType::Button | ValueType::Group => RawValue::None,
        _ => adapter.get_option(handle, &raw.name).map_err(|e| {
            ScanError::adapter(format!("can't get value of option \"{}\"", raw.name), e)
        })?,
    };
    OptionDescriptor::from_raw(raw, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{MockAdapter, MockDevice, MockOption, OptionCaps, RawValue};
    use crate::error::{CapabilityReason, DeviceStatus};

    fn open(device: MockDevice) -> (MockAdapter, DeviceHandle) {
        let mut adapter = MockAdapter::new();
        adapter.add_device(device);
        let handle = adapter.open("test").unwrap();
        (adapter, handle)
    }

    #[test]
    fn test_failing_option_keeps_table_length() {
        let (mut adapter, handle) = open(
            MockDevice::new("test")
                .with_option(MockOption::int("a", 1))
                .with_option(MockOption::broken(AdapterError::Unknown))
                .with_option(MockOption::int("c", 3).failing_read(DeviceStatus::IoError.into())),
        );

        let table = OptionTable::load(&mut adapter, handle, "test").unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.descriptors().count(), 1);
        assert_eq!(
            table.entries()[1].error().unwrap().to_string(),
            "can't get description of option #1; no additional info"
        );
        assert_eq!(
            table.entries()[2].error().unwrap().to_string(),
            "can't get value of option \"c\":\nError during device I/O"
        );
        assert!(table.find("c").is_none());
    }

    #[test]
    fn test_list_failure_fails_load() {
        let (mut adapter, handle) = open(
            MockDevice::new("test").failing_option_list(AdapterError::Reported("gone".into())),
        );
        let err = OptionTable::load(&mut adapter, handle, "test").unwrap_err();
        assert_eq!(err.to_string(), "can't get options of device \"test\":\ngone");
    }

    #[test]
    fn test_reload_failure_after_write_is_stale() {
        let (mut adapter, handle) = open(
            MockDevice::new("test").with_option(MockOption::int("gamma", 10)),
        );
        let table = OptionTable::load(&mut adapter, handle, "test").unwrap();
        adapter.set_option_list_error("test", Some(AdapterError::Reported("gone".into())));

        let err = table
            .set_option(&mut adapter, handle, "gamma", 12.into())
            .unwrap_err();
        assert!(matches!(err, ScanError::OptionsStale { ref option, .. } if option == "gamma"));
        assert_eq!(
            err.to_string(),
            "option \"gamma\" was written but the options couldn't be reloaded: \
             can't get options of device \"test\":\ngone"
        );
        assert_eq!(
            adapter.writes(),
            vec![("gamma".to_string(), RawValue::Words(vec![12]))]
        );
    }

    #[test]
    fn test_inverted_range_option_is_unavailable() {
        let (mut adapter, handle) = open(
            MockDevice::new("test")
                .with_option(MockOption::int("resolution", 300).with_range(1200, 50, 0))
                .with_option(MockOption::int("gamma", 10)),
        );
        let table = OptionTable::load(&mut adapter, handle, "test").unwrap();
        assert_eq!(table.len(), 2);
        assert!(matches!(
            table.entries()[0].error(),
            Some(ScanError::Validation { .. })
        ));
        assert!(matches!(
            table.set_option(&mut adapter, handle, "resolution", 600.into()),
            Err(ScanError::UnknownOption(_))
        ));
        assert!(adapter.writes().is_empty());
    }

    #[test]
    fn test_range_write_is_clamped_and_reloaded() {
        let (mut adapter, handle) = open(
            MockDevice::new("test").with_option(
                MockOption::int("resolution", 300)
                    .with_unit(Unit::Dpi)
                    .with_range(50, 1200, 0),
            ),
        );
        let table = OptionTable::load(&mut adapter, handle, "test").unwrap();

        let outcome = table
            .set_option(&mut adapter, handle, "resolution", 9999.into())
            .unwrap();
        assert_eq!(
            adapter.writes(),
            vec![("resolution".to_string(), RawValue::Words(vec![1200]))]
        );
        assert_eq!(outcome.table.find("resolution").unwrap().scalar(), Some(1200.0));
        // the old snapshot is not touched
        assert_eq!(table.find("resolution").unwrap().scalar(), Some(300.0));
    }

    #[test]
    fn test_choice_violation_never_reaches_adapter() {
        let (mut adapter, handle) = open(
            MockDevice::new("test")
                .with_option(MockOption::int("resolution", 300).with_words(vec![150, 300, 600]))
                .with_option(MockOption::text("mode", "Gray", 16).with_strings(&["Gray", "Color"])),
        );
        let table = OptionTable::load(&mut adapter, handle, "test").unwrap();

        let err = table
            .set_option(&mut adapter, handle, "resolution", 200.into())
            .unwrap_err();
        assert!(matches!(err, ScanError::Validation { .. }));
        let err = table
            .set_option(&mut adapter, handle, "mode", "Halftone".into())
            .unwrap_err();
        assert!(matches!(err, ScanError::Validation { .. }));
        assert!(adapter.writes().is_empty());
    }

    #[test]
    fn test_capability_errors_before_adapter() {
        let (mut adapter, handle) = open(
            MockDevice::new("test")
                .with_option(MockOption::int("lamp", 5).with_caps(OptionCaps::read_only()))
                .with_option(MockOption::int("gamma", 5).with_caps(OptionCaps::inactive())),
        );
        let table = OptionTable::load(&mut adapter, handle, "test").unwrap();

        let err = table
            .set_option(&mut adapter, handle, "lamp", 1.into())
            .unwrap_err();
        assert!(matches!(
            err,
            ScanError::Capability {
                reason: CapabilityReason::ReadOnly,
                ..
            }
        ));
        let err = table
            .set_option(&mut adapter, handle, "gamma", 1.into())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "option \"gamma\" is inactive and can't be changed"
        );
        assert!(adapter.writes().is_empty());
    }

    #[test]
    fn test_write_failure_keeps_cached_value() {
        let (mut adapter, handle) = open(MockDevice::new("test").with_option(
            MockOption::int("speed", 2).failing_write(AdapterError::Reported("motor stalled".into())),
        ));
        let table = OptionTable::load(&mut adapter, handle, "test").unwrap();

        let err = table
            .set_option(&mut adapter, handle, "speed", 3.into())
            .unwrap_err();
        assert_eq!(err.to_string(), "can't set option \"speed\":\nmotor stalled");
        assert_eq!(table.find("speed").unwrap().scalar(), Some(2.0));
    }

    #[test]
    fn test_unknown_option() {
        let (mut adapter, handle) = open(MockDevice::new("test"));
        let table = OptionTable::load(&mut adapter, handle, "test").unwrap();
        assert!(matches!(
            table.set_option(&mut adapter, handle, "nope", true.into()),
            Err(ScanError::UnknownOption(_))
        ));
    }

    #[test]
    fn test_scan_area_from_millimetres() {
        let mut adapter = MockAdapter::demo();
        let handle = adapter.open("dev 1").unwrap();
        let table = OptionTable::load(&mut adapter, handle, "dev 1").unwrap();

        assert_eq!(
            table.scan_area_px(),
            Some(ScanArea {
                x: 0,
                y: 0,
                width: 2550,
                height: 3508,
            })
        );
    }

    #[test]
    fn test_scan_area_from_pixels() {
        let (mut adapter, handle) = open(
            MockDevice::new("test")
                .with_option(MockOption::int("tl-x", 10).with_unit(Unit::Pixel))
                .with_option(MockOption::int("tl-y", 20).with_unit(Unit::Pixel))
                .with_option(MockOption::int("br-x", 110).with_unit(Unit::Pixel))
                .with_option(MockOption::int("br-y", 220).with_unit(Unit::Pixel)),
        );
        let table = OptionTable::load(&mut adapter, handle, "test").unwrap();
        assert_eq!(
            table.scan_area_px(),
            Some(ScanArea {
                x: 10,
                y: 20,
                width: 100,
                height: 200,
            })
        );
    }

    #[test]
    fn test_scan_area_needs_resolution_for_millimetres() {
        let (mut adapter, handle) = open(
            MockDevice::new("test")
                .with_option(MockOption::fixed("tl-x", 0.0).with_unit(Unit::Millimeter))
                .with_option(MockOption::fixed("tl-y", 0.0).with_unit(Unit::Millimeter))
                .with_option(MockOption::fixed("br-x", 10.0).with_unit(Unit::Millimeter))
                .with_option(MockOption::fixed("br-y", 10.0).with_unit(Unit::Millimeter)),
        );
        let table = OptionTable::load(&mut adapter, handle, "test").unwrap();
        assert_eq!(table.scan_area_px(), None);
    }
}
