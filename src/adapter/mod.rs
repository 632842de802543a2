//! Device access layer boundary.
//!
//! [`ScanAdapter`] is the vendor-neutral interface the scan worker drives. Every
//! call blocks until the hardware answers, so an adapter is owned by exactly one
//! worker thread and is never called concurrently.
//!
//! The raw types in this module mirror the hardware representation: numeric
//! option values are 32-bit words, and fixed-point words carry a 16-bit
//! fractional part. Typed, validated views live in [`crate::option`].

pub mod mock;

pub use mock::{MockAdapter, MockDevice, MockFrame, MockOption};

use crate::error::AdapterError;
use serde::{Deserialize, Serialize};

/// Number of fractional bits in a fixed-point word.
pub const FIXED_SHIFT: u32 = 16;

const FIXED_SCALE: f64 = (1u32 << FIXED_SHIFT) as f64;

/// Converts a real number to a fixed-point word, saturating at the word bounds.
pub fn fixed_from_f64(value: f64) -> i32 {
    (value * FIXED_SCALE).round() as i32
}

/// Converts a fixed-point word to a real number.
pub fn fixed_to_f64(word: i32) -> f64 {
    word as f64 / FIXED_SCALE
}

/// Opaque handle of an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u32);

/// Identity of an attached device, as enumerated by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Stable identifier used to open the device
    pub name: String,
    /// Manufacturer
    pub vendor: String,
    /// Model name
    pub model: String,
    /// Device type, e.g. "flatbed scanner"
    #[serde(rename = "type")]
    pub kind: String,
}

impl DeviceInfo {
    /// Device info from its four fields.
    pub fn new(
        name: impl Into<String>,
        vendor: impl Into<String>,
        model: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            vendor: vendor.into(),
            model: model.into(),
            kind: kind.into(),
        }
    }
}

/// Value type of an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    /// True or false
    Bool,
    /// 32-bit integers
    Int,
    /// 16.16 fixed-point words
    Fixed,
    /// NUL-terminated text
    String,
    /// Has no value; writing it triggers an action
    Button,
    /// Section header; carries no value
    Group,
}

/// Physical unit of an option value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Unit {
    /// Unitless
    #[default]
    None,
    /// Pixels
    Pixel,
    /// Bits
    Bit,
    /// Millimetres
    Millimeter,
    /// Dots per inch
    Dpi,
    /// Percent
    Percent,
    /// Microseconds
    Microsecond,
}

/// Capability flags of an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionCaps {
    /// Value can be changed by software
    pub settable: bool,
    /// Option currently applies to the device configuration
    pub active: bool,
    /// Option is meant for expert users
    pub advanced: bool,
}

impl Default for OptionCaps {
    fn default() -> Self {
        Self {
            settable: true,
            active: true,
            advanced: false,
        }
    }
}

impl OptionCaps {
    /// Caps of a value the device reports but won't accept.
    pub fn read_only() -> Self {
        Self {
            settable: false,
            ..Self::default()
        }
    }

    /// Caps of an option that doesn't apply right now.
    pub fn inactive() -> Self {
        Self {
            active: false,
            ..Self::default()
        }
    }
}

/// Constraint exactly as the adapter reports it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RawConstraint {
    /// Any value of the type
    #[default]
    None,
    /// Inclusive range; `quant == 0` means no step
    Range {
        /// Smallest allowed word
        min: i32,
        /// Largest allowed word
        max: i32,
        /// Step between allowed words
        quant: i32,
    },
    /// Allowed words; compare fixed-point options as words
    WordList(Vec<i32>),
    /// Allowed strings
    StringList(Vec<String>),
}

/// Option description exactly as the adapter reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOption {
    /// Identifier used for reads and writes
    pub name: String,
    /// Human-readable name; may be empty
    pub title: String,
    /// Long description; may be empty
    pub description: String,
    /// Value type
    pub value_type: ValueType,
    /// Unit of the value
    pub unit: Unit,
    /// Element count for int/fixed arrays, maximum length for strings
    pub size: usize,
    /// Allowed values
    pub constraint: RawConstraint,
    /// Capability flags
    pub caps: OptionCaps,
}

/// Option value exactly as the adapter transfers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Buttons and groups
    None,
    /// Boolean value
    Bool(bool),
    /// Int and fixed-point values, one word per element
    Words(Vec<i32>),
    /// String value
    Text(String),
}

/// Side effects the adapter reports after a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetOptionInfo {
    /// The device stored a value different from the one written
    pub inexact: bool,
    /// Other options' descriptions may have changed
    pub reload_options: bool,
    /// Scan parameters may have changed
    pub reload_parameters: bool,
}

/// Channel layout of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Single-channel gray samples
    Gray,
    /// Interleaved red, green and blue samples
    Rgb,
    /// Red channel of a three-pass scan
    Red,
    /// Green channel of a three-pass scan
    Green,
    /// Blue channel of a three-pass scan
    Blue,
    /// Format id the core does not know
    Other(u32),
}

impl FrameFormat {
    /// True for the single-channel frames of a three-pass color scan.
    pub fn is_single_channel(&self) -> bool {
        matches!(self, FrameFormat::Red | FrameFormat::Green | FrameFormat::Blue)
    }
}

/// Geometry of the frame that is about to be transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanParameters {
    /// Channel layout
    pub format: FrameFormat,
    /// No further frame follows this one
    pub last_frame: bool,
    /// Bytes per scan line, padding included
    pub bytes_per_line: usize,
    /// Pixels per scan line
    pub pixels_per_line: usize,
    /// `None` when the device can't tell in advance (hand-held scanners)
    pub lines: Option<usize>,
    /// Bits per sample
    pub depth: u8,
}

impl ScanParameters {
    /// Single gray frame with tightly packed lines.
    pub fn gray(pixels_per_line: usize, lines: Option<usize>, depth: u8) -> Self {
        Self {
            format: FrameFormat::Gray,
            last_frame: true,
            bytes_per_line: (pixels_per_line * depth as usize).div_ceil(8),
            pixels_per_line,
            lines,
            depth,
        }
    }

    /// Bytes this frame will carry, if the line count is known.
    pub fn expected_bytes(&self) -> Option<usize> {
        self.lines.map(|lines| lines * self.bytes_per_line)
    }
}

/// Result of one chunk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Pixel data; may be empty when the device has nothing ready yet
    Data(Vec<u8>),
    /// No more data in this frame
    EndOfFrame,
}

/// Vendor-neutral scanner access.
pub trait ScanAdapter: Send + 'static {
    /// List attached devices.
    fn enumerate_devices(&mut self) -> Result<Vec<DeviceInfo>, AdapterError>;

    /// Open a device by name.
    fn open(&mut self, name: &str) -> Result<DeviceHandle, AdapterError>;

    /// Close a device. Unknown handles are ignored.
    fn close(&mut self, handle: DeviceHandle);

    /// Describe every option in adapter order.
    ///
    /// The outer error means the list itself is unavailable; an inner error
    /// affects only that option.
    fn option_descriptors(
        &mut self,
        handle: DeviceHandle,
    ) -> Result<Vec<Result<RawOption, AdapterError>>, AdapterError>;

    /// Read the current value of an option.
    fn get_option(&mut self, handle: DeviceHandle, name: &str) -> Result<RawValue, AdapterError>;

    /// Write an option and report its side effects.
    fn set_option(
        &mut self,
        handle: DeviceHandle,
        name: &str,
        value: RawValue,
    ) -> Result<SetOptionInfo, AdapterError>;

    /// Start the next frame.
    fn start_scan(&mut self, handle: DeviceHandle) -> Result<(), AdapterError>;

    /// Geometry of the frame that was just started.
    fn scan_parameters(&mut self, handle: DeviceHandle) -> Result<ScanParameters, AdapterError>;

    /// Read at most `max_len` bytes of the current frame.
    fn read_chunk(&mut self, handle: DeviceHandle, max_len: usize) -> Result<Chunk, AdapterError>;

    /// Abort the running scan. Safe to call when nothing is running.
    fn cancel(&mut self, handle: DeviceHandle);
}
