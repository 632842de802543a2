//! Capturer: asynchronous front of the scan worker.
//!
//! [`CapturerHandle::spawn`] moves an adapter onto a dedicated worker thread
//! and returns a cheap, cloneable handle. Every handle method is either
//! non-blocking or async; the adapter is only ever touched by the worker.
//!
//! ```text
//!  Idle ──open──▶ Opening ──▶ Ready ──start──▶ Starting ──▶ Scanning ──▶ Completing
//!   ▲               │           ▲                 │             │             │
//!   └──── failed ───┘           └── Completed / Cancelled / Failed ◀──────────┘
//! ```
//!
//! Cancellation is cooperative: [`PendingScan::cancel`] raises a flag that
//! the worker checks between chunk reads, so it takes effect after the chunk
//! in flight.

mod actor;
pub mod messages;
pub mod session;

pub use messages::{Progress, ScanCommand, ScanEvent, SetOptionReport};
pub use session::CapturedImage;

use crate::adapter::{DeviceInfo, ScanAdapter};
use crate::config::WorkerConfig;
use crate::error::{AppResult, ScanError};
use crate::option::{OptionTable, OptionValue};
use actor::ScanWorker;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Lifecycle state of the capturer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No device open
    Idle,
    /// Device being opened and its options loaded
    Opening,
    /// Device open and waiting for commands
    Ready,
    /// Adapter asked to start a frame
    Starting,
    /// Receiving data
    Scanning,
    /// Last frame received; assembling the image
    Completing,
    /// Scan finished; returns to `Ready`
    Completed,
    /// Scan cancelled; returns to `Ready`
    Cancelled,
    /// Scan failed; returns to `Ready`
    Failed,
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CaptureState::Idle => "idle",
            CaptureState::Opening => "opening",
            CaptureState::Ready => "ready",
            CaptureState::Starting => "starting",
            CaptureState::Scanning => "scanning",
            CaptureState::Completing => "completing",
            CaptureState::Completed => "completed",
            CaptureState::Cancelled => "cancelled",
            CaptureState::Failed => "failed",
        };
        f.write_str(name)
    }
}

const CANCELLED: u8 = 0b01;
const FINISHED: u8 = 0b10;

/// Cancellation flag of one scan, shared by the caller and the worker.
///
/// Cancel and finish race on one atomic word, so exactly one of them wins:
/// a successful [`cancel`](Self::cancel) always ends the scan as cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<AtomicU8>,
}

impl CancelToken {
    /// Token of a scan that is neither cancelled nor finished.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns false if the scan already ended or was
    /// already cancelled.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(0, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// True once a cancel request was accepted.
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) & CANCELLED != 0
    }

    /// True once the worker has ended the scan, however it ended.
    pub fn is_finished(&self) -> bool {
        self.state.load(Ordering::Acquire) & FINISHED != 0
    }

    /// Mark the scan as ended. Returns false if a cancel request got in first.
    pub(crate) fn finish(&self) -> bool {
        self.state.fetch_or(FINISHED, Ordering::AcqRel) & CANCELLED == 0
    }
}

/// Cancels the most recently submitted scan.
///
/// Holds no command sender, so it doesn't keep the worker alive.
#[derive(Debug, Clone)]
pub struct Canceller {
    latest: Arc<Mutex<Option<CancelToken>>>,
    events: broadcast::Sender<ScanEvent>,
}

impl Canceller {
    /// Returns true if a running or queued scan was signalled.
    pub fn cancel(&self) -> bool {
        match self.latest.lock().as_ref() {
            Some(token) => signal_cancel(token, &self.events),
            None => false,
        }
    }
}

fn signal_cancel(token: &CancelToken, events: &broadcast::Sender<ScanEvent>) -> bool {
    if token.cancel() {
        let _ = events.send(ScanEvent::Cancelling);
        true
    } else {
        false
    }
}

/// A submitted scan.
#[derive(Debug)]
pub struct PendingScan {
    token: CancelToken,
    events: broadcast::Sender<ScanEvent>,
    result: oneshot::Receiver<AppResult<CapturedImage>>,
}

impl PendingScan {
    /// Request cancellation at the next chunk boundary.
    pub fn cancel(&self) -> bool {
        signal_cancel(&self.token, &self.events)
    }

    /// Wait for the scan to end. The buffer is only handed over on success.
    pub async fn wait(self) -> AppResult<CapturedImage> {
        self.result.await.map_err(|_| ScanError::WorkerUnavailable)?
    }
}

/// Handle to the scan worker.
#[derive(Debug, Clone)]
pub struct CapturerHandle {
    commands: mpsc::Sender<ScanCommand>,
    events: broadcast::Sender<ScanEvent>,
    state: watch::Receiver<CaptureState>,
    options: watch::Receiver<Arc<OptionTable>>,
    latest_scan: Arc<Mutex<Option<CancelToken>>>,
}

impl CapturerHandle {
    /// Start a worker thread that owns `adapter`.
    ///
    /// The worker closes the open device and exits after [`shutdown`] or
    /// once every handle is dropped.
    ///
    /// [`shutdown`]: CapturerHandle::shutdown
    pub fn spawn<A: ScanAdapter>(adapter: A, config: &WorkerConfig) -> AppResult<Self> {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let (state_tx, state_rx) = watch::channel(CaptureState::Idle);
        let (options_tx, options_rx) = watch::channel(Arc::new(OptionTable::empty()));

        let worker = ScanWorker::new(
            Box::new(adapter),
            config,
            event_tx.clone(),
            state_tx,
            options_tx,
        );
        std::thread::Builder::new()
            .name("scan-worker".to_string())
            .spawn(move || worker.run(command_rx))
            .map_err(|e| {
                log::error!("Failed to spawn scan worker: {}", e);
                ScanError::WorkerUnavailable
            })?;

        Ok(Self {
            commands: command_tx,
            events: event_tx,
            state: state_rx,
            options: options_rx,
            latest_scan: Arc::new(Mutex::new(None)),
        })
    }

    async fn submit(&self, command: ScanCommand) -> AppResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ScanError::WorkerUnavailable)
    }

    async fn request<T>(
        &self,
        (command, response): (ScanCommand, oneshot::Receiver<T>),
    ) -> AppResult<T> {
        self.submit(command).await?;
        response.await.map_err(|_| ScanError::WorkerUnavailable)
    }

    /// List attached devices and publish the list to subscribers.
    pub async fn enumerate_devices(&self) -> AppResult<Vec<DeviceInfo>> {
        self.request(ScanCommand::enumerate_devices()).await?
    }

    /// Open a device and load its options. An open device is closed first.
    pub async fn open(&self, device: &str) -> AppResult<Arc<OptionTable>> {
        self.request(ScanCommand::open(device.to_string())).await?
    }

    /// Close the open device. Does nothing when none is open.
    pub async fn close(&self) -> AppResult<()> {
        self.request(ScanCommand::close()).await
    }

    /// Read the options of the open device again.
    pub async fn reload_options(&self) -> AppResult<Arc<OptionTable>> {
        self.request(ScanCommand::reload_options()).await?
    }

    /// Validate and write an option; the table is reloaded afterwards.
    pub async fn set_option(
        &self,
        name: &str,
        value: impl Into<OptionValue>,
    ) -> AppResult<SetOptionReport> {
        self.request(ScanCommand::set_option(name.to_string(), value.into()))
            .await?
    }

    /// Press a button option.
    pub async fn press_button(&self, name: &str) -> AppResult<SetOptionReport> {
        self.set_option(name, OptionValue::Press).await
    }

    /// Queue a scan of the open device.
    ///
    /// Returns once the worker has accepted the command; the scan itself is
    /// awaited with [`PendingScan::wait`].
    pub async fn start_scan(&self) -> AppResult<PendingScan> {
        let token = CancelToken::new();
        let (command, result) = ScanCommand::start_scan(token.clone());
        *self.latest_scan.lock() = Some(token.clone());
        self.submit(command).await?;

        Ok(PendingScan {
            token,
            events: self.events.clone(),
            result,
        })
    }

    /// Cancel the most recently submitted scan, if it is still running.
    pub fn cancel(&self) -> bool {
        self.canceller().cancel()
    }

    /// Cancel handle that doesn't keep the worker alive.
    pub fn canceller(&self) -> Canceller {
        Canceller {
            latest: self.latest_scan.clone(),
            events: self.events.clone(),
        }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Current capture state.
    pub fn state(&self) -> CaptureState {
        *self.state.borrow()
    }

    /// Watch the capture state.
    pub fn watch_state(&self) -> watch::Receiver<CaptureState> {
        self.state.clone()
    }

    /// Latest option table snapshot; empty while no device is open.
    pub fn options(&self) -> Arc<OptionTable> {
        self.options.borrow().clone()
    }

    /// Watch the option table snapshots.
    pub fn watch_options(&self) -> watch::Receiver<Arc<OptionTable>> {
        self.options.clone()
    }

    /// Close the device and stop the worker. Later requests fail with
    /// [`ScanError::WorkerUnavailable`].
    pub async fn shutdown(&self) -> AppResult<()> {
        self.request(ScanCommand::shutdown()).await
    }
}
