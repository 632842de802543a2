//! Scanner capture core.
//!
//! Drives image scanners through a vendor-neutral device access layer
//! ([`adapter::ScanAdapter`]): enumerating devices, reading and writing their
//! options, and running chunked acquisitions on a dedicated worker so callers
//! never block.
//!
//! ```rust,ignore
//! use rust_scan::{adapter::MockAdapter, capture::CapturerHandle, config::Settings};
//!
//! let settings = Settings::load()?;
//! let capturer = CapturerHandle::spawn(MockAdapter::demo(), &settings.worker)?;
//! capturer.open("dev 1").await?;
//! capturer.set_option("resolution", 600).await?;
//! let image = capturer.start_scan().await?.wait().await?;
//! ```

pub mod adapter;
pub mod capture;
pub mod config;
pub mod devices;
pub mod error;
pub mod logging;
pub mod option;

pub use capture::{CaptureState, CapturedImage, CapturerHandle, PendingScan, ScanEvent};
pub use devices::DeviceListModel;
pub use error::{AppResult, ScanError};
