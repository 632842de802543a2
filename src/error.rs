//! Error types for the scanning core.
//!
//! Two layers of errors exist:
//!
//! - **`AdapterError`**: what the device access layer reports for a single call.
//!   It either carries a backend message, a vendor-neutral [`DeviceStatus`], or
//!   nothing at all (`Unknown`).
//! - **`ScanError`**: the caller-visible taxonomy. Every adapter failure is
//!   wrapped with a short summary of the operation that failed, so the user sees
//!   what was attempted as well as what the hardware said.
//!
//! Adapter errors that carry detail render as `"<summary>:\n<detail>"`. Errors
//! without detail render as `"<summary>; no additional info"` so that the
//! message is never empty.

use thiserror::Error;

/// Convenience alias for results using the scanning error type.
pub type AppResult<T> = std::result::Result<T, ScanError>;

/// Status codes a device backend can return instead of a free-form message.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Not supported
    #[error("Operation not supported")]
    Unsupported,
    /// Cancelled
    #[error("Operation was cancelled")]
    Cancelled,
    /// Busy
    #[error("Device busy")]
    DeviceBusy,
    /// Invalid argument or handle
    #[error("Invalid argument")]
    Invalid,
    /// No more data
    #[error("End of file reached")]
    Eof,
    /// Feeder jammed
    #[error("Document feeder jammed")]
    Jammed,
    /// Feeder empty
    #[error("Document feeder out of documents")]
    NoDocuments,
    /// Cover open
    #[error("Scanner cover is open")]
    CoverOpen,
    /// I/O failure
    #[error("Error during device I/O")]
    IoError,
    /// Out of memory
    #[error("Out of memory")]
    NoMemory,
    /// Access denied
    #[error("Access to resource has been denied")]
    AccessDenied,
}

/// Failure of a single call into the device access layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// Backend supplied a human-readable message.
    #[error("{0}")]
    Reported(String),

    /// Backend supplied a status code.
    #[error("{0}")]
    Status(#[from] DeviceStatus),

    /// Backend failed without any detail.
    #[error("unknown adapter error")]
    Unknown,
}

impl AdapterError {
    /// Human-readable detail, or `None` if the backend gave nothing.
    pub fn detail(&self) -> Option<String> {
        match self {
            AdapterError::Reported(msg) if !msg.trim().is_empty() => Some(msg.clone()),
            AdapterError::Reported(_) | AdapterError::Unknown => None,
            AdapterError::Status(status) => Some(status.to_string()),
        }
    }
}

/// Renders an error summary with optional detail.
pub(crate) fn render(summary: &str, detail: Option<&str>) -> String {
    match detail {
        Some(detail) => format!("{}:\n{}", summary, detail),
        None => format!("{}; no additional info", summary),
    }
}

/// Why an option refused a write before the adapter was contacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityReason {
    /// Option can't be set by software
    ReadOnly,
    /// Option doesn't apply in the current configuration
    Inactive,
}

impl std::fmt::Display for CapabilityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityReason::ReadOnly => write!(f, "read-only"),
            CapabilityReason::Inactive => write!(f, "inactive"),
        }
    }
}

/// Caller-visible error taxonomy.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Adapter failed with a message.
    #[error("{context}:\n{message}")]
    Adapter {
        /// Summary of the failed operation
        context: String,
        /// Adapter-provided detail
        message: String,
    },

    /// Adapter failed without any detail.
    #[error("{context}; no additional info")]
    UnknownAdapter {
        /// Summary of the failed operation
        context: String,
    },

    /// Option refused the write because of its capabilities.
    #[error("option \"{option}\" is {reason} and can't be changed")]
    Capability {
        /// Option name
        option: String,
        /// Which capability refused
        reason: CapabilityReason,
    },

    /// Value doesn't fit the option's type or constraint.
    #[error("invalid value for option \"{option}\": {reason}")]
    Validation {
        /// Option name
        option: String,
        /// What is wrong with the value
        reason: String,
    },

    /// The write reached the device but re-reading the options failed, so
    /// no cached table reflects the device any more.
    #[error("option \"{option}\" was written but the options couldn't be reloaded: {source}")]
    OptionsStale {
        /// Option that was written
        option: String,
        /// Why the reload failed
        source: Box<ScanError>,
    },

    /// Geometry of a started frame couldn't be read.
    #[error("{}", render("can't get actual scanning parameters", .detail.as_deref()))]
    GeometryUnavailable {
        /// Adapter-provided detail, if any
        detail: Option<String>,
    },

    /// Frame geometry or data was rejected.
    #[error("can't accept new image frame: {reason}")]
    FrameAccept {
        /// Why the frame was rejected
        reason: String,
    },

    /// A chunk read failed without detail.
    #[error("{}", render("can't get another captured image data", .detail.as_deref()))]
    FrameData {
        /// Adapter-provided detail, if any
        detail: Option<String>,
    },

    /// The session ended without a single byte.
    #[error("scanner returned no image data")]
    NoData,

    /// Caller asked to stop the scan. Never reported as a failure.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation needs an open device.
    #[error("no device is open")]
    NotOpen,

    /// The open device has no such option.
    #[error("device has no option named \"{0}\"")]
    UnknownOption(String),

    /// The worker thread has stopped.
    #[error("scan worker is not running")]
    WorkerUnavailable,

    /// Settings couldn't be loaded.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// Taxonomy tag of a [`ScanError`], cheap to copy into events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// See [`ScanError::Adapter`]
    AdapterReported,
    /// See [`ScanError::UnknownAdapter`]
    UnknownAdapter,
    /// See [`ScanError::Capability`]
    Capability,
    /// See [`ScanError::Validation`]
    Validation,
    /// See [`ScanError::OptionsStale`]
    OptionsStale,
    /// See [`ScanError::GeometryUnavailable`]
    GeometryUnavailable,
    /// See [`ScanError::FrameAccept`]
    FrameAccept,
    /// See [`ScanError::FrameData`]
    FrameData,
    /// See [`ScanError::NoData`]
    NoData,
    /// See [`ScanError::Cancelled`]
    CancelledByUser,
    /// See [`ScanError::NotOpen`]
    NotOpen,
    /// See [`ScanError::UnknownOption`]
    UnknownOption,
    /// See [`ScanError::WorkerUnavailable`]
    WorkerUnavailable,
    /// See [`ScanError::Config`]
    Config,
}

impl ScanError {
    /// Wraps an adapter failure with a summary of the failed operation.
    pub fn adapter(context: impl Into<String>, err: AdapterError) -> Self {
        let context = context.into();
        match err.detail() {
            Some(message) => ScanError::Adapter { context, message },
            None => ScanError::UnknownAdapter { context },
        }
    }

    /// Invalid value for `option`.
    pub fn validation(option: impl Into<String>, reason: impl Into<String>) -> Self {
        ScanError::Validation {
            option: option.into(),
            reason: reason.into(),
        }
    }

    /// Taxonomy tag of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            ScanError::Adapter { .. } => FailureKind::AdapterReported,
            ScanError::UnknownAdapter { .. } => FailureKind::UnknownAdapter,
            ScanError::Capability { .. } => FailureKind::Capability,
            ScanError::Validation { .. } => FailureKind::Validation,
            ScanError::OptionsStale { .. } => FailureKind::OptionsStale,
            ScanError::GeometryUnavailable { .. } => FailureKind::GeometryUnavailable,
            ScanError::FrameAccept { .. } => FailureKind::FrameAccept,
            ScanError::FrameData { .. } => FailureKind::FrameData,
            ScanError::NoData => FailureKind::NoData,
            ScanError::Cancelled => FailureKind::CancelledByUser,
            ScanError::NotOpen => FailureKind::NotOpen,
            ScanError::UnknownOption(_) => FailureKind::UnknownOption,
            ScanError::WorkerUnavailable => FailureKind::WorkerUnavailable,
            ScanError::Config(_) => FailureKind::Config,
        }
    }

    /// True for caller-initiated cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanError::Cancelled)
    }
}
