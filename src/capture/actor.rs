//! Scan worker: owns the adapter and the open device.
//!
//! The worker runs on its own OS thread because every adapter call blocks.
//! It processes one command at a time; a scan occupies it until the session
//! ends, and commands sent meanwhile wait in the queue.

use super::messages::{Progress, ScanCommand, ScanEvent, SetOptionReport};
use super::session::{CaptureSession, CapturedImage};
use super::{CancelToken, CaptureState};
use crate::adapter::{Chunk, DeviceHandle, DeviceInfo, ScanAdapter};
use crate::config::WorkerConfig;
use crate::error::{AppResult, ScanError};
use crate::option::{OptionTable, OptionValue};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, info_span, warn};

struct OpenDevice {
    name: String,
    handle: DeviceHandle,
}

pub(crate) struct ScanWorker {
    adapter: Box<dyn ScanAdapter>,
    chunk_size: usize,
    device: Option<OpenDevice>,
    table: Arc<OptionTable>,
    events: broadcast::Sender<ScanEvent>,
    state: watch::Sender<CaptureState>,
    options: watch::Sender<Arc<OptionTable>>,
}

impl ScanWorker {
    pub(crate) fn new(
        adapter: Box<dyn ScanAdapter>,
        config: &WorkerConfig,
        events: broadcast::Sender<ScanEvent>,
        state: watch::Sender<CaptureState>,
        options: watch::Sender<Arc<OptionTable>>,
    ) -> Self {
        Self {
            adapter,
            chunk_size: config.chunk_size,
            device: None,
            table: Arc::new(OptionTable::empty()),
            events,
            state,
            options,
        }
    }

    /// Process commands until shutdown or until every handle is dropped.
    pub(crate) fn run(mut self, mut commands: mpsc::Receiver<ScanCommand>) {
        info!("Scan worker started");

        while let Some(command) = commands.blocking_recv() {
            match command {
                ScanCommand::EnumerateDevices { response } => {
                    let result = self.enumerate_devices();
                    let _ = response.send(result);
                }

                ScanCommand::Open { device, response } => {
                    let result = self.open(&device);
                    let _ = response.send(result);
                }

                ScanCommand::Close { response } => {
                    self.close();
                    let _ = response.send(());
                }

                ScanCommand::ReloadOptions { response } => {
                    let result = self.reload_options();
                    let _ = response.send(result);
                }

                ScanCommand::SetOption {
                    name,
                    value,
                    response,
                } => {
                    let result = self.set_option(&name, value);
                    let _ = response.send(result);
                }

                ScanCommand::StartScan { cancel, response } => {
                    let result = self.scan(&cancel);
                    let _ = response.send(result);
                }

                ScanCommand::Shutdown { response } => {
                    self.close();
                    let _ = response.send(());
                    break;
                }
            }
        }

        self.close();
        info!("Scan worker stopped");
    }

    fn emit(&self, event: ScanEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: CaptureState) {
        self.state.send_replace(state);
        self.emit(ScanEvent::StateChanged(state));
    }

    fn publish_table(&mut self, table: OptionTable) -> Arc<OptionTable> {
        let table = Arc::new(table);
        self.table = table.clone();
        self.options.send_replace(table.clone());
        self.emit(ScanEvent::OptionsReloaded(table.clone()));
        table
    }

    fn open_device(&self) -> AppResult<(String, DeviceHandle)> {
        self.device
            .as_ref()
            .map(|d| (d.name.clone(), d.handle))
            .ok_or(ScanError::NotOpen)
    }

    fn enumerate_devices(&mut self) -> AppResult<Vec<DeviceInfo>> {
        let devices = self
            .adapter
            .enumerate_devices()
            .map_err(|e| ScanError::adapter("can't get list of devices", e))?;
        debug!(count = devices.len(), "Enumerated devices");
        self.emit(ScanEvent::DevicesChanged(Arc::new(devices.clone())));
        Ok(devices)
    }

    fn open(&mut self, name: &str) -> AppResult<Arc<OptionTable>> {
        if self.device.is_some() {
            self.close();
        }

        self.set_state(CaptureState::Opening);
        let handle = match self.adapter.open(name) {
            Ok(handle) => handle,
            Err(e) => {
                self.set_state(CaptureState::Idle);
                return Err(ScanError::adapter(
                    format!("can't open device \"{}\"", name),
                    e,
                ));
            }
        };

        let table = match OptionTable::load(self.adapter.as_mut(), handle, name) {
            Ok(table) => table,
            Err(e) => {
                warn!(device = name, error = %e, "Closing device without readable options");
                self.adapter.close(handle);
                self.set_state(CaptureState::Idle);
                return Err(e);
            }
        };

        info!(device = name, options = table.len(), "Device opened");
        self.device = Some(OpenDevice {
            name: name.to_string(),
            handle,
        });
        let table = self.publish_table(table);
        self.set_state(CaptureState::Ready);
        Ok(table)
    }

    fn close(&mut self) {
        if let Some(device) = self.device.take() {
            self.adapter.close(device.handle);
            info!(device = %device.name, "Device closed");
            self.publish_table(OptionTable::empty());
            self.set_state(CaptureState::Idle);
        }
    }

    fn reload_options(&mut self) -> AppResult<Arc<OptionTable>> {
        let (name, handle) = self.open_device()?;
        let table = OptionTable::load(self.adapter.as_mut(), handle, &name)?;
        Ok(self.publish_table(table))
    }

    fn set_option(&mut self, name: &str, value: OptionValue) -> AppResult<SetOptionReport> {
        let (device, handle) = self.open_device()?;
        let outcome = match self
            .table
            .clone()
            .set_option(self.adapter.as_mut(), handle, name, value)
        {
            Ok(outcome) => outcome,
            Err(e @ ScanError::OptionsStale { .. }) => {
                warn!(device = %device, error = %e, "Dropping option table after failed reload");
                self.publish_table(OptionTable::unloaded(&device));
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        Ok(SetOptionReport {
            table: self.publish_table(outcome.table),
            inexact: outcome.inexact,
            reload_parameters: outcome.reload_parameters,
        })
    }

    /// Run one capture session and report how it ended.
    fn scan(&mut self, cancel: &CancelToken) -> AppResult<CapturedImage> {
        let (name, handle) = match self.open_device() {
            Ok(device) => device,
            Err(e) => {
                cancel.finish();
                return Err(e);
            }
        };

        let session = CaptureSession::new(&name);
        let span = info_span!("capture", session = %session.id, device = %name);
        let _entered = span.enter();

        let mut result = self.acquire(session, &name, handle, cancel);
        if !cancel.finish() {
            // cancel won the race against the end of the session
            result = Err(ScanError::Cancelled);
        }

        match &result {
            Ok(image) => {
                info!(bytes = image.data.len(), frames = image.frames, "Scan completed");
                self.emit(ScanEvent::Completed {
                    bytes: image.data.len(),
                    lines: image.lines(),
                });
                self.set_state(CaptureState::Completed);
            }
            Err(ScanError::Cancelled) => {
                info!("Scan cancelled");
                self.emit(ScanEvent::Cancelled);
                self.set_state(CaptureState::Cancelled);
            }
            Err(e) => {
                error!(error = %e, "Scan failed");
                self.emit(ScanEvent::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                });
                self.set_state(CaptureState::Failed);
            }
        }
        self.set_state(CaptureState::Ready);
        result
    }

    /// Acquisition loop: start, geometry, chunks; repeated per frame.
    ///
    /// The cancel token is checked before every chunk request only; an
    /// in-flight adapter call always runs to completion.
    fn acquire(
        &mut self,
        mut session: CaptureSession,
        device: &str,
        handle: DeviceHandle,
        cancel: &CancelToken,
    ) -> AppResult<CapturedImage> {
        loop {
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }

            self.set_state(CaptureState::Starting);
            self.adapter.start_scan(handle).map_err(|e| {
                ScanError::adapter(format!("can't start scanning on device \"{}\"", device), e)
            })?;

            let params = match self.adapter.scan_parameters(handle) {
                Ok(params) => params,
                Err(e) => {
                    self.adapter.cancel(handle);
                    return Err(ScanError::GeometryUnavailable { detail: e.detail() });
                }
            };
            let first_frame = session.frames() == 0;
            if let Err(e) = session.begin_frame(params) {
                self.adapter.cancel(handle);
                return Err(e);
            }
            debug!(
                format = ?params.format,
                width = params.pixels_per_line,
                lines = ?params.lines,
                depth = params.depth,
                "Frame started"
            );
            if first_frame {
                self.emit(ScanEvent::Started { geometry: params });
                self.set_state(CaptureState::Scanning);
            }

            loop {
                if cancel.is_cancelled() {
                    self.adapter.cancel(handle);
                    return Err(ScanError::Cancelled);
                }

                match self.adapter.read_chunk(handle, self.chunk_size) {
                    Ok(Chunk::Data(bytes)) => {
                        if bytes.is_empty() {
                            continue;
                        }
                        let progress = session.append(&bytes);
                        self.emit(ScanEvent::Progress(progress));
                    }
                    Ok(Chunk::EndOfFrame) => break,
                    Err(e) => {
                        self.adapter.cancel(handle);
                        return Err(match e.detail() {
                            Some(reason) => ScanError::FrameAccept { reason },
                            None => ScanError::FrameData { detail: None },
                        });
                    }
                }
            }

            debug!(total = session.total_bytes(), "Frame finished");
            if params.last_frame {
                break;
            }
        }

        self.set_state(CaptureState::Completing);
        let image = session.finish()?;
        self.emit(ScanEvent::Progress(Progress::Percent(100)));
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{MockAdapter, MockDevice, MockFrame, ScanParameters};
    use crate::error::AdapterError;
    use tracing_test::traced_test;

    fn worker(adapter: MockAdapter) -> (ScanWorker, broadcast::Receiver<ScanEvent>) {
        let (events, rx) = broadcast::channel(64);
        let (state, _) = watch::channel(CaptureState::Idle);
        let (options, _) = watch::channel(Arc::new(OptionTable::empty()));
        let worker = ScanWorker::new(
            Box::new(adapter),
            &WorkerConfig::default(),
            events,
            state,
            options,
        );
        (worker, rx)
    }

    #[test]
    #[traced_test]
    fn test_scan_logs_session() {
        let (mut worker, _events) = worker(MockAdapter::demo());
        worker.open("dev 1").unwrap();

        let token = CancelToken::new();
        let image = worker.scan(&token).unwrap();
        assert_eq!(image.data.len(), 32);
        assert!(token.is_finished());
        assert!(!token.cancel());

        assert!(logs_contain("Device opened"));
        assert!(logs_contain("Scan completed"));
    }

    #[test]
    #[traced_test]
    fn test_failed_scan_is_logged() {
        let (mut worker, mut events) = worker(MockAdapter::demo());
        worker.open("dev 2").unwrap();

        assert!(worker.scan(&CancelToken::new()).is_err());
        assert!(logs_contain("Scan failed"));

        let mut failed = false;
        while let Ok(event) = events.try_recv() {
            failed |= matches!(event, ScanEvent::Failed { .. });
        }
        assert!(failed);
        assert_eq!(*worker.state.borrow(), CaptureState::Ready);
    }

    #[test]
    fn test_cancelled_before_start() {
        let adapter = MockAdapter::demo();
        let (mut worker, _events) = worker(adapter.clone());
        worker.open("dev 1").unwrap();

        let token = CancelToken::new();
        assert!(token.cancel());
        assert!(matches!(worker.scan(&token), Err(ScanError::Cancelled)));
        assert!(!adapter.calls().iter().any(|c| c == "start_scan"));
    }

    #[test]
    fn test_cancel_on_last_read_ends_cancelled() {
        let adapter = MockAdapter::new();
        adapter.add_device(
            MockDevice::new("one-chunk")
                .with_frame(MockFrame::new(ScanParameters::gray(8, Some(2), 8)).chunk(vec![7; 16])),
        );
        let (mut worker, mut events) = worker(adapter.clone());
        worker.open("one-chunk").unwrap();

        let token = CancelToken::new();
        let caller = token.clone();
        // the second read returns the end of the frame
        adapter.on_chunk_read(move |reads| {
            if reads == 2 {
                assert!(caller.cancel());
            }
        });

        assert!(matches!(worker.scan(&token), Err(ScanError::Cancelled)));
        let mut outcomes = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                ScanEvent::Completed { .. } => outcomes.push("completed"),
                ScanEvent::Cancelled => outcomes.push("cancelled"),
                _ => {}
            }
        }
        assert_eq!(outcomes, vec!["cancelled"]);
        assert_eq!(*worker.state.borrow(), CaptureState::Ready);
    }

    #[test]
    fn test_reload_failure_drops_table() {
        let adapter = MockAdapter::demo();
        let (mut worker, _events) = worker(adapter.clone());
        worker.open("dev 1").unwrap();
        adapter.set_option_list_error("dev 1", Some(AdapterError::Unknown));

        let err = worker.set_option("resolution", 600.into()).unwrap_err();
        assert!(matches!(err, ScanError::OptionsStale { .. }));
        assert!(worker.table.is_empty());
        assert_eq!(worker.table.device(), "dev 1");
        assert!(worker.options.borrow().is_empty());
    }

    #[test]
    fn test_open_replaces_device() {
        let adapter = MockAdapter::demo();
        let (mut worker, _events) = worker(adapter.clone());
        worker.open("dev 1").unwrap();
        let table = worker.open("dev 2").unwrap();

        assert_eq!(table.device(), "dev 2");
        assert_eq!(worker.device.as_ref().map(|d| d.name.as_str()), Some("dev 2"));
        assert!(adapter.calls().contains(&"close".to_string()));
    }
}
