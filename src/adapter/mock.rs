//! In-memory scanner for tests and the demo front end.
//!
//! `MockAdapter` is cheap to clone; every clone shares the same device state, so
//! a test can hand one clone to the scan worker and keep another to script
//! failures and inspect what the worker did.

use super::{
    fixed_from_f64, Chunk, DeviceHandle, DeviceInfo, OptionCaps, RawConstraint, RawOption,
    RawValue, ScanAdapter, ScanParameters, SetOptionInfo, Unit, ValueType,
};
use crate::error::{AdapterError, DeviceStatus};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Runs after a write to the named option; may rewrite any option of the device.
pub type WriteHook = Box<dyn FnMut(&RawValue, &mut [MockOption]) + Send>;

/// Runs after every chunk read with the 1-based read count of the frame.
pub type ReadHook = Box<dyn FnMut(usize) + Send>;

// ============================================================================
// Scripted options
// ============================================================================

/// Scripted option: a description (or the error reading it) plus its value.
#[derive(Debug, Clone)]
pub struct MockOption {
    descriptor: Result<RawOption, AdapterError>,
    value: RawValue,
    read_error: Option<AdapterError>,
    write_error: Option<AdapterError>,
    inexact: bool,
}

impl MockOption {
    fn with_type(
        name: &str,
        value_type: ValueType,
        size: usize,
        value: RawValue,
    ) -> Self {
        Self {
            descriptor: Ok(RawOption {
                name: name.to_string(),
                title: name.to_string(),
                description: String::new(),
                value_type,
                unit: Unit::None,
                size,
                constraint: RawConstraint::None,
                caps: OptionCaps::default(),
            }),
            value,
            read_error: None,
            write_error: None,
            inexact: false,
        }
    }

    /// Integer option.
    pub fn int(name: &str, value: i32) -> Self {
        Self::int_array(name, vec![value])
    }

    /// Integer array option.
    pub fn int_array(name: &str, values: Vec<i32>) -> Self {
        Self::with_type(name, ValueType::Int, values.len(), RawValue::Words(values))
    }

    /// Fixed-point option.
    pub fn fixed(name: &str, value: f64) -> Self {
        Self::fixed_array(name, vec![value])
    }

    /// Fixed-point array option.
    pub fn fixed_array(name: &str, values: Vec<f64>) -> Self {
        let words: Vec<i32> = values.into_iter().map(fixed_from_f64).collect();
        Self::with_type(name, ValueType::Fixed, words.len(), RawValue::Words(words))
    }

    /// String option; `max_len` counts the terminator.
    pub fn text(name: &str, value: &str, max_len: usize) -> Self {
        Self::with_type(
            name,
            ValueType::String,
            max_len,
            RawValue::Text(value.to_string()),
        )
    }

    /// Boolean option.
    pub fn boolean(name: &str, value: bool) -> Self {
        Self::with_type(name, ValueType::Bool, 1, RawValue::Bool(value))
    }

    /// Button option.
    pub fn button(name: &str) -> Self {
        Self::with_type(name, ValueType::Button, 0, RawValue::None)
    }

    /// Group header; the title doubles as its name.
    pub fn group(title: &str) -> Self {
        let mut option = Self::with_type("", ValueType::Group, 0, RawValue::None);
        option.describe(|raw| {
            raw.title = title.to_string();
            raw.caps = OptionCaps::read_only();
        });
        option
    }

    /// Option whose description itself can't be read.
    pub fn broken(err: AdapterError) -> Self {
        Self {
            descriptor: Err(err),
            value: RawValue::None,
            read_error: None,
            write_error: None,
            inexact: false,
        }
    }

    fn describe(&mut self, f: impl FnOnce(&mut RawOption)) {
        if let Ok(raw) = self.descriptor.as_mut() {
            f(raw);
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: &str) -> Self {
        self.describe(|raw| raw.title = title.to_string());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: &str) -> Self {
        self.describe(|raw| raw.description = description.to_string());
        self
    }

    /// Set the unit.
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.describe(|raw| raw.unit = unit);
        self
    }

    /// Set the capabilities.
    pub fn with_caps(mut self, caps: OptionCaps) -> Self {
        self.describe(|raw| raw.caps = caps);
        self
    }

    /// Integer range constraint.
    pub fn with_range(mut self, min: i32, max: i32, quant: i32) -> Self {
        self.describe(|raw| raw.constraint = RawConstraint::Range { min, max, quant });
        self
    }

    /// Fixed-point range given in real units.
    pub fn with_fixed_range(self, min: f64, max: f64, quant: f64) -> Self {
        self.with_range(
            fixed_from_f64(min),
            fixed_from_f64(max),
            fixed_from_f64(quant),
        )
    }

    /// Word-list constraint.
    pub fn with_words(mut self, words: Vec<i32>) -> Self {
        self.describe(|raw| raw.constraint = RawConstraint::WordList(words));
        self
    }

    /// String-list constraint.
    pub fn with_strings(mut self, values: &[&str]) -> Self {
        let values = values.iter().map(|v| v.to_string()).collect();
        self.describe(|raw| raw.constraint = RawConstraint::StringList(values));
        self
    }

    /// Fail every read of the value.
    pub fn failing_read(mut self, err: AdapterError) -> Self {
        self.read_error = Some(err);
        self
    }

    /// Fail every write.
    pub fn failing_write(mut self, err: AdapterError) -> Self {
        self.write_error = Some(err);
        self
    }

    /// Writes succeed but report that the stored value differs.
    pub fn inexact(mut self) -> Self {
        self.inexact = true;
        self
    }

    /// Option name, or `None` for a broken description.
    pub fn name(&self) -> Option<&str> {
        self.descriptor.as_ref().ok().map(|raw| raw.name.as_str())
    }

    /// Current value.
    pub fn value(&self) -> &RawValue {
        &self.value
    }

    /// Replace the value without recording a write.
    pub fn set_value(&mut self, value: RawValue) {
        self.value = value;
    }

    /// Replace the capabilities.
    pub fn set_caps(&mut self, caps: OptionCaps) {
        self.describe(|raw| raw.caps = caps);
    }

    /// Replace the constraint.
    pub fn set_constraint(&mut self, constraint: RawConstraint) {
        self.describe(|raw| raw.constraint = constraint);
    }
}

// ============================================================================
// Scripted frames
// ============================================================================

#[derive(Debug, Clone)]
enum MockStep {
    Data(Vec<u8>),
    Fail(AdapterError),
}

/// One frame: its geometry and the chunk reads that deliver it.
///
/// Once the scripted steps run out every read reports end-of-frame.
#[derive(Debug, Clone)]
pub struct MockFrame {
    parameters: ScanParameters,
    steps: VecDeque<MockStep>,
}

impl MockFrame {
    /// Frame with the given geometry and no data yet.
    pub fn new(parameters: ScanParameters) -> Self {
        Self {
            parameters,
            steps: VecDeque::new(),
        }
    }

    /// Append one chunk, served as is (split when longer than the read size).
    pub fn chunk(mut self, bytes: Vec<u8>) -> Self {
        self.steps.push_back(MockStep::Data(bytes));
        self
    }

    /// Chunk of `len` bytes, all set to `fill`.
    pub fn filled_chunk(self, len: usize, fill: u8) -> Self {
        self.chunk(vec![fill; len])
    }

    /// Fail the read after the chunks queued so far.
    pub fn fail(mut self, err: AdapterError) -> Self {
        self.steps.push_back(MockStep::Fail(err));
        self
    }

    /// Geometry reported for this frame.
    pub fn parameters(&self) -> &ScanParameters {
        &self.parameters
    }
}

// ============================================================================
// Scripted devices
// ============================================================================

/// Scripted device: identity, options, queued frames and failures.
pub struct MockDevice {
    info: DeviceInfo,
    options: Vec<MockOption>,
    frames: VecDeque<MockFrame>,
    repeat_frame: Option<MockFrame>,
    open_error: Option<AdapterError>,
    list_error: Option<AdapterError>,
    start_error: Option<AdapterError>,
    parameters_error: Option<AdapterError>,
    write_hooks: Vec<(String, WriteHook)>,
}

impl MockDevice {
    /// Device with no options and no frames.
    pub fn new(name: &str) -> Self {
        Self {
            info: DeviceInfo::new(name, "Mock", "Virtual scanner", "flatbed scanner"),
            options: Vec::new(),
            frames: VecDeque::new(),
            repeat_frame: None,
            open_error: None,
            list_error: None,
            start_error: None,
            parameters_error: None,
            write_hooks: Vec::new(),
        }
    }

    /// Set vendor, model and type.
    pub fn with_info(mut self, vendor: &str, model: &str, kind: &str) -> Self {
        self.info = DeviceInfo::new(self.info.name.clone(), vendor, model, kind);
        self
    }

    /// Append an option.
    pub fn with_option(mut self, option: MockOption) -> Self {
        self.options.push(option);
        self
    }

    /// Frame served by the next `start_scan`.
    pub fn with_frame(mut self, frame: MockFrame) -> Self {
        self.frames.push_back(frame);
        self
    }

    /// Frame served whenever no scripted frame is queued.
    pub fn with_repeating_frame(mut self, frame: MockFrame) -> Self {
        self.repeat_frame = Some(frame);
        self
    }

    /// Fail `open` with `err`.
    pub fn failing_open(mut self, err: AdapterError) -> Self {
        self.open_error = Some(err);
        self
    }

    /// Fail listing the options with `err`.
    pub fn failing_option_list(mut self, err: AdapterError) -> Self {
        self.list_error = Some(err);
        self
    }

    /// Fail every `start_scan` with `err`.
    pub fn failing_start(mut self, err: AdapterError) -> Self {
        self.start_error = Some(err);
        self
    }

    /// Fail every geometry request with `err`.
    pub fn failing_parameters(mut self, err: AdapterError) -> Self {
        self.parameters_error = Some(err);
        self
    }

    /// Run `hook` after each successful write of `option`.
    pub fn on_write(
        mut self,
        option: &str,
        hook: impl FnMut(&RawValue, &mut [MockOption]) + Send + 'static,
    ) -> Self {
        self.write_hooks.push((option.to_string(), Box::new(hook)));
        self
    }

    fn option_mut(&mut self, name: &str) -> Result<&mut MockOption, AdapterError> {
        self.options
            .iter_mut()
            .find(|o| o.name() == Some(name))
            .ok_or_else(|| AdapterError::Reported(format!("no option named \"{}\"", name)))
    }
}

// ============================================================================
// Mock adapter
// ============================================================================

struct OpenDevice {
    handle: DeviceHandle,
    index: usize,
}

#[derive(Default)]
struct MockState {
    devices: Vec<MockDevice>,
    enumerate_error: Option<AdapterError>,
    open: Option<OpenDevice>,
    next_handle: u32,
    frame: Option<MockFrame>,
    frame_reads: usize,
    chunk_reads: usize,
    read_hook: Option<ReadHook>,
    writes: Vec<(String, RawValue)>,
    calls: Vec<String>,
}

impl MockState {
    fn device_mut(&mut self, handle: DeviceHandle) -> Result<&mut MockDevice, AdapterError> {
        match &self.open {
            Some(open) if open.handle == handle => self
                .devices
                .get_mut(open.index)
                .ok_or(AdapterError::Status(DeviceStatus::IoError)),
            _ => Err(AdapterError::Status(DeviceStatus::Invalid)),
        }
    }
}

/// Scanner adapter backed by scripted devices.
#[derive(Clone, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    /// Adapter with no devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Two sample devices: "dev 1" exposes one option of every kind and scans
    /// a 16×16 one-bit gray pattern; "dev 2" has no options and no documents.
    pub fn demo() -> Self {
        let adapter = Self::new();
        adapter.add_device(demo_scanner());
        adapter.add_device(
            MockDevice::new("dev 2").with_info("factory zzz", "not so super dev", "printer"),
        );
        adapter
    }

    /// Register a device.
    pub fn add_device(&self, device: MockDevice) {
        self.state.lock().devices.push(device);
    }

    /// Unregister a device.
    pub fn remove_device(&self, name: &str) {
        self.state.lock().devices.retain(|d| d.info.name != name);
    }

    /// Make enumeration fail, or succeed again with `None`.
    pub fn set_enumerate_error(&self, err: Option<AdapterError>) {
        self.state.lock().enumerate_error = err;
    }

    /// Make listing the options of a registered device fail, or succeed again
    /// with `None`. Takes effect on the next listing, even while it is open.
    pub fn set_option_list_error(&self, device: &str, err: Option<AdapterError>) {
        let mut state = self.state.lock();
        if let Some(d) = state.devices.iter_mut().find(|d| d.info.name == device) {
            d.list_error = err;
        }
    }

    /// Queue a frame on an already registered device.
    pub fn push_frame(&self, device: &str, frame: MockFrame) {
        let mut state = self.state.lock();
        if let Some(d) = state.devices.iter_mut().find(|d| d.info.name == device) {
            d.frames.push_back(frame);
        }
    }

    /// Rewrite an option of a registered device, e.g. to change its value
    /// between two sessions.
    pub fn update_option(&self, device: &str, option: &str, f: impl FnOnce(&mut MockOption)) {
        let mut state = self.state.lock();
        if let Some(d) = state.devices.iter_mut().find(|d| d.info.name == device) {
            if let Ok(o) = d.option_mut(option) {
                f(o);
            }
        }
    }

    /// Install a hook called after every chunk read.
    pub fn on_chunk_read(&self, hook: impl FnMut(usize) + Send + 'static) {
        self.state.lock().read_hook = Some(Box::new(hook));
    }

    /// Every successful write in order: option name and the value received.
    pub fn writes(&self) -> Vec<(String, RawValue)> {
        self.state.lock().writes.clone()
    }

    /// Adapter calls in order, e.g. `"open dev 1"`, `"read_chunk"`, `"cancel"`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Chunk reads since the adapter was created.
    pub fn chunk_reads(&self) -> usize {
        self.state.lock().chunk_reads
    }

    /// Whether a device is currently open.
    pub fn is_open(&self) -> bool {
        self.state.lock().open.is_some()
    }

    /// Current value of an option of a registered device.
    pub fn value_of(&self, device: &str, option: &str) -> Option<RawValue> {
        let mut state = self.state.lock();
        let d = state.devices.iter_mut().find(|d| d.info.name == device)?;
        d.option_mut(option).ok().map(|o| o.value.clone())
    }
}

impl ScanAdapter for MockAdapter {
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceInfo>, AdapterError> {
        let mut state = self.state.lock();
        state.calls.push("enumerate_devices".to_string());
        if let Some(err) = state.enumerate_error.clone() {
            return Err(err);
        }
        Ok(state.devices.iter().map(|d| d.info.clone()).collect())
    }

    fn open(&mut self, name: &str) -> Result<DeviceHandle, AdapterError> {
        let mut state = self.state.lock();
        state.calls.push(format!("open {}", name));
        if state.open.is_some() {
            return Err(AdapterError::Status(DeviceStatus::DeviceBusy));
        }
        let index = state
            .devices
            .iter()
            .position(|d| d.info.name == name)
            .ok_or(AdapterError::Status(DeviceStatus::Invalid))?;
        if let Some(err) = state.devices[index].open_error.clone() {
            return Err(err);
        }

        state.next_handle += 1;
        let handle = DeviceHandle(state.next_handle);
        state.open = Some(OpenDevice { handle, index });
        log::info!("Mock device '{}' opened with handle {:?}", name, handle);
        Ok(handle)
    }

    fn close(&mut self, handle: DeviceHandle) {
        let mut state = self.state.lock();
        state.calls.push("close".to_string());
        if matches!(&state.open, Some(open) if open.handle == handle) {
            state.open = None;
            state.frame = None;
            log::info!("Mock device {:?} closed", handle);
        }
    }

    fn option_descriptors(
        &mut self,
        handle: DeviceHandle,
    ) -> Result<Vec<Result<RawOption, AdapterError>>, AdapterError> {
        let mut state = self.state.lock();
        state.calls.push("option_descriptors".to_string());
        let device = state.device_mut(handle)?;
        if let Some(err) = device.list_error.clone() {
            return Err(err);
        }
        Ok(device.options.iter().map(|o| o.descriptor.clone()).collect())
    }

    fn get_option(&mut self, handle: DeviceHandle, name: &str) -> Result<RawValue, AdapterError> {
        let mut state = self.state.lock();
        let option = state.device_mut(handle)?.option_mut(name)?;
        match &option.read_error {
            Some(err) => Err(err.clone()),
            None => Ok(option.value.clone()),
        }
    }

    fn set_option(
        &mut self,
        handle: DeviceHandle,
        name: &str,
        value: RawValue,
    ) -> Result<SetOptionInfo, AdapterError> {
        let mut state = self.state.lock();
        state.calls.push(format!("set_option {}", name));
        let device = state.device_mut(handle)?;
        let option = device.option_mut(name)?;
        if let Some(err) = option.write_error.clone() {
            return Err(err);
        }
        let inexact = option.inexact;
        if !matches!(value, RawValue::None) {
            option.value = value.clone();
        }
        for (target, hook) in device.write_hooks.iter_mut() {
            if target == name {
                hook(&value, &mut device.options);
            }
        }
        log::debug!("Set option '{}' to {:?} for {:?}", name, value, handle);
        state.writes.push((name.to_string(), value));

        Ok(SetOptionInfo {
            inexact,
            reload_options: true,
            reload_parameters: true,
        })
    }

    fn start_scan(&mut self, handle: DeviceHandle) -> Result<(), AdapterError> {
        let mut state = self.state.lock();
        state.calls.push("start_scan".to_string());
        let device = state.device_mut(handle)?;
        if let Some(err) = device.start_error.clone() {
            return Err(err);
        }
        let frame = device
            .frames
            .pop_front()
            .or_else(|| device.repeat_frame.clone())
            .ok_or(AdapterError::Status(DeviceStatus::NoDocuments))?;
        state.frame = Some(frame);
        state.frame_reads = 0;
        log::info!("Mock scan started for {:?}", handle);
        Ok(())
    }

    fn scan_parameters(&mut self, handle: DeviceHandle) -> Result<ScanParameters, AdapterError> {
        let mut state = self.state.lock();
        state.calls.push("scan_parameters".to_string());
        if let Some(err) = state.device_mut(handle)?.parameters_error.clone() {
            return Err(err);
        }
        state
            .frame
            .as_ref()
            .map(|f| f.parameters)
            .ok_or(AdapterError::Status(DeviceStatus::Invalid))
    }

    fn read_chunk(&mut self, handle: DeviceHandle, max_len: usize) -> Result<Chunk, AdapterError> {
        let (result, hook, reads) = {
            let mut state = self.state.lock();
            state.calls.push("read_chunk".to_string());
            state.device_mut(handle)?;
            let Some(frame) = state.frame.as_mut() else {
                return Err(AdapterError::Status(DeviceStatus::Invalid));
            };

            let result = match frame.steps.pop_front() {
                Some(MockStep::Data(mut bytes)) => {
                    if bytes.len() > max_len {
                        let rest = bytes.split_off(max_len);
                        frame.steps.push_front(MockStep::Data(rest));
                    }
                    Ok(Chunk::Data(bytes))
                }
                Some(MockStep::Fail(err)) => Err(err),
                None => Ok(Chunk::EndOfFrame),
            };
            state.chunk_reads += 1;
            state.frame_reads += 1;
            (result, state.read_hook.take(), state.frame_reads)
        };

        // The hook runs unlocked so it may call back into this adapter.
        if let Some(mut hook) = hook {
            hook(reads);
            let mut state = self.state.lock();
            if state.read_hook.is_none() {
                state.read_hook = Some(hook);
            }
        }
        result
    }

    fn cancel(&mut self, handle: DeviceHandle) {
        let mut state = self.state.lock();
        state.calls.push("cancel".to_string());
        if state.device_mut(handle).is_ok() {
            state.frame = None;
            log::info!("Mock scan cancelled for {:?}", handle);
        }
    }
}

fn demo_scanner() -> MockDevice {
    MockDevice::new("dev 1")
        .with_info("factory 1", "dev super rk1", "mfu")
        .with_option(MockOption::group("Scan Mode"))
        .with_option(
            MockOption::text("mode", "Gray", 16)
                .with_title("Scan mode")
                .with_description("Selects the scan mode (e.g., lineart, monochrome, or color).")
                .with_strings(&["Lineart", "Gray", "Color"]),
        )
        .with_option(
            MockOption::int("resolution", 300)
                .with_title("Scan resolution")
                .with_description("Sets the resolution of the scanned image.")
                .with_unit(Unit::Dpi)
                .with_words(vec![75, 150, 300, 600, 1200]),
        )
        .with_option(
            MockOption::boolean("preview", false)
                .with_title("Preview")
                .with_description("Request a preview-quality scan."),
        )
        .with_option(MockOption::group("Geometry"))
        .with_option(geometry("tl-x", "Top-left x", 0.0, 215.9))
        .with_option(geometry("tl-y", "Top-left y", 0.0, 297.0))
        .with_option(geometry("br-x", "Bottom-right x", 215.9, 215.9))
        .with_option(geometry("br-y", "Bottom-right y", 297.0, 297.0))
        .with_option(MockOption::group("Enhancement"))
        .with_option(
            MockOption::int("brightness", 0)
                .with_title("Brightness")
                .with_unit(Unit::Percent)
                .with_range(-100, 100, 1),
        )
        .with_option(
            MockOption::int("exposure", 1000)
                .with_title("Exposure time")
                .with_unit(Unit::Microsecond)
                .with_range(100, 100_000, 0),
        )
        .with_option(MockOption::group("Sample values"))
        .with_option(MockOption::int("int-sample", 2).with_range(-6, 6000, 2))
        .with_option(MockOption::int_array("int-array", vec![1, 2, 3]).with_range(-10, 10, 1))
        .with_option(MockOption::fixed("fixed-sample", 1.0).with_fixed_range(0.0, 10.0, 0.5))
        .with_option(MockOption::fixed_array("fixed-array", vec![1.0, 2.0, 2.5]))
        .with_option(MockOption::text("string-sample", "test string", 32))
        .with_option(
            MockOption::int("lamp-hours", 1234)
                .with_title("Lamp hours")
                .with_caps(OptionCaps::read_only()),
        )
        .with_option(MockOption::button("calibrate").with_title("Calibrate"))
        .with_repeating_frame(MockFrame::new(ScanParameters::gray(16, Some(16), 1)).chunk(sample_pattern()))
}

fn geometry(name: &str, title: &str, value: f64, max: f64) -> MockOption {
    MockOption::fixed(name, value)
        .with_title(title)
        .with_unit(Unit::Millimeter)
        .with_fixed_range(0.0, max, 0.0)
}

/// Diagonal stripes, two bytes per line.
fn sample_pattern() -> Vec<u8> {
    let mut line: u16 = 0x9249;
    let mut data = Vec::with_capacity(32);
    for _ in 0..16 {
        data.extend_from_slice(&line.to_le_bytes());
        line = line.rotate_right(1);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_devices() {
        let mut adapter = MockAdapter::demo();
        let devices = adapter.enumerate_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "dev 1");
        assert_eq!(devices[1].kind, "printer");
    }

    #[test]
    fn test_open_twice_is_busy() {
        let mut adapter = MockAdapter::demo();
        let handle = adapter.open("dev 1").unwrap();
        assert_eq!(
            adapter.open("dev 2"),
            Err(AdapterError::Status(DeviceStatus::DeviceBusy))
        );
        adapter.close(handle);
        assert!(adapter.open("dev 2").is_ok());
    }

    #[test]
    fn test_unknown_device() {
        let mut adapter = MockAdapter::demo();
        assert!(adapter.open("dev 9").is_err());
        assert!(!adapter.is_open());
    }

    #[test]
    fn test_demo_scan_delivers_pattern() {
        let mut adapter = MockAdapter::demo();
        let handle = adapter.open("dev 1").unwrap();
        adapter.start_scan(handle).unwrap();

        let params = adapter.scan_parameters(handle).unwrap();
        assert_eq!(params.expected_bytes(), Some(32));

        let Chunk::Data(first) = adapter.read_chunk(handle, 20).unwrap() else {
            panic!("expected data");
        };
        let Chunk::Data(second) = adapter.read_chunk(handle, 20).unwrap() else {
            panic!("expected data");
        };
        assert_eq!(first.len(), 20);
        assert_eq!(second.len(), 12);
        assert_eq!(&first[..2], &[0x49, 0x92]);
        assert_eq!(adapter.read_chunk(handle, 20).unwrap(), Chunk::EndOfFrame);
    }

    #[test]
    fn test_write_hook_updates_other_options() {
        let mut adapter = MockAdapter::new();
        adapter.add_device(
            MockDevice::new("hook")
                .with_option(MockOption::boolean("custom-gamma", false))
                .with_option(MockOption::int("gamma", 10).with_caps(OptionCaps::inactive()))
                .on_write("custom-gamma", |value, options| {
                    let enabled = matches!(value, RawValue::Bool(true));
                    for option in options.iter_mut().filter(|o| o.name() == Some("gamma")) {
                        option.set_caps(OptionCaps {
                            active: enabled,
                            ..OptionCaps::default()
                        });
                    }
                }),
        );

        let handle = adapter.open("hook").unwrap();
        adapter
            .set_option(handle, "custom-gamma", RawValue::Bool(true))
            .unwrap();
        let descriptors = adapter.option_descriptors(handle).unwrap();
        let gamma = descriptors[1].as_ref().unwrap();
        assert!(gamma.caps.active);
        assert_eq!(adapter.writes().len(), 1);
    }

    #[test]
    fn test_scripted_failure() {
        let mut adapter = MockAdapter::new();
        adapter.add_device(
            MockDevice::new("flaky").with_frame(
                MockFrame::new(ScanParameters::gray(8, Some(2), 8))
                    .filled_chunk(8, 0xff)
                    .fail(DeviceStatus::Jammed.into()),
            ),
        );
        let handle = adapter.open("flaky").unwrap();
        adapter.start_scan(handle).unwrap();
        assert!(matches!(adapter.read_chunk(handle, 64), Ok(Chunk::Data(_))));
        assert_eq!(
            adapter.read_chunk(handle, 64),
            Err(AdapterError::Status(DeviceStatus::Jammed))
        );
        // queue exhausted, no repeating frame
        assert!(adapter.start_scan(handle).is_err());
    }
}
