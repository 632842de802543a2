//! Message types between capturer handles and the scan worker.
//!
//! Commands carry a oneshot responder; events fan out to every subscriber
//! over a broadcast channel.

use super::session::CapturedImage;
use super::{CancelToken, CaptureState};
use crate::adapter::{DeviceInfo, ScanParameters};
use crate::error::{AppResult, FailureKind};
use crate::option::{OptionTable, OptionValue};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Scan progress of the running frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Share of the frame received, when its size is known
    Percent(u8),
    /// Bytes received so far, when it isn't
    Bytes(usize),
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Progress::Percent(p) => write!(f, "{}%", p),
            Progress::Bytes(b) => write!(f, "{} bytes", b),
        }
    }
}

/// Notifications published by the scan worker.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// Capture state moved
    StateChanged(CaptureState),
    /// Result of a successful enumeration
    DevicesChanged(Arc<Vec<DeviceInfo>>),
    /// Full replacement of the option table
    OptionsReloaded(Arc<OptionTable>),
    /// First frame geometry is known
    Started {
        /// Geometry of the first frame
        geometry: ScanParameters,
    },
    /// Data received
    Progress(Progress),
    /// Cancellation requested; the scan stops at the next chunk boundary
    Cancelling,
    /// Session ended with all data received
    Completed {
        /// Bytes received over all frames
        bytes: usize,
        /// Lines received
        lines: usize,
    },
    /// Session ended after a cancel request
    Cancelled,
    /// Session ended with an error
    Failed {
        /// Taxonomy tag of the error
        kind: FailureKind,
        /// Rendered error message
        message: String,
    },
}

/// Reply to an option write.
#[derive(Debug, Clone)]
pub struct SetOptionReport {
    /// Table after the write
    pub table: Arc<OptionTable>,
    /// Device stored a value other than the one written
    pub inexact: bool,
    /// Scan geometry may have changed
    pub reload_parameters: bool,
}

/// Commands processed by the scan worker, strictly in submission order.
#[derive(Debug)]
pub enum ScanCommand {
    /// List attached devices
    EnumerateDevices {
        /// Reply channel
        response: oneshot::Sender<AppResult<Vec<DeviceInfo>>>,
    },

    /// Open a device, closing the current one first
    Open {
        /// Adapter name of the device
        device: String,
        /// Reply channel
        response: oneshot::Sender<AppResult<Arc<OptionTable>>>,
    },

    /// Close the open device, if any
    Close {
        /// Reply channel
        response: oneshot::Sender<()>,
    },

    /// Read every option of the open device again
    ReloadOptions {
        /// Reply channel
        response: oneshot::Sender<AppResult<Arc<OptionTable>>>,
    },

    /// Validate and write one option
    SetOption {
        /// Option name
        name: String,
        /// Value to write
        value: OptionValue,
        /// Reply channel
        response: oneshot::Sender<AppResult<SetOptionReport>>,
    },

    /// Run one capture session
    StartScan {
        /// Cancel flag shared with the caller
        cancel: CancelToken,
        /// Reply channel
        response: oneshot::Sender<AppResult<CapturedImage>>,
    },

    /// Close the device and stop the worker
    Shutdown {
        /// Reply channel
        response: oneshot::Sender<()>,
    },
}

impl ScanCommand {
    /// Command and reply receiver for an enumeration.
    pub fn enumerate_devices() -> (Self, oneshot::Receiver<AppResult<Vec<DeviceInfo>>>) {
        let (tx, rx) = oneshot::channel();
        (Self::EnumerateDevices { response: tx }, rx)
    }

    /// Command and reply receiver for an open.
    pub fn open(device: String) -> (Self, oneshot::Receiver<AppResult<Arc<OptionTable>>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::Open {
                device,
                response: tx,
            },
            rx,
        )
    }

    /// Command and reply receiver for a close.
    pub fn close() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Close { response: tx }, rx)
    }

    /// Command and reply receiver for an option reload.
    pub fn reload_options() -> (Self, oneshot::Receiver<AppResult<Arc<OptionTable>>>) {
        let (tx, rx) = oneshot::channel();
        (Self::ReloadOptions { response: tx }, rx)
    }

    /// Command and reply receiver for an option write.
    pub fn set_option(
        name: String,
        value: OptionValue,
    ) -> (Self, oneshot::Receiver<AppResult<SetOptionReport>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::SetOption {
                name,
                value,
                response: tx,
            },
            rx,
        )
    }

    /// Command and reply receiver for a scan.
    pub fn start_scan(cancel: CancelToken) -> (Self, oneshot::Receiver<AppResult<CapturedImage>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::StartScan {
                cancel,
                response: tx,
            },
            rx,
        )
    }

    /// Command and reply receiver for a shutdown.
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { response: tx }, rx)
    }
}
