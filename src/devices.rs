//! List of attached devices.

use crate::adapter::DeviceInfo;
use crate::capture::CapturerHandle;
use crate::error::AppResult;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Device list kept in sync with the adapter on demand.
///
/// A successful refresh replaces the whole list and notifies watchers; a
/// failed one leaves the previous list in place.
pub struct DeviceListModel {
    capturer: CapturerHandle,
    refresh_lock: Mutex<()>,
    devices: watch::Sender<Arc<Vec<DeviceInfo>>>,
}

impl DeviceListModel {
    /// Model with an empty list; call [`refresh`](Self::refresh) to fill it.
    pub fn new(capturer: CapturerHandle) -> Self {
        let (devices, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            capturer,
            refresh_lock: Mutex::new(()),
            devices,
        }
    }

    /// Query the adapter again. Concurrent refreshes run one after another.
    pub async fn refresh(&self) -> AppResult<Arc<Vec<DeviceInfo>>> {
        let _guard = self.refresh_lock.lock().await;

        match self.capturer.enumerate_devices().await {
            Ok(devices) => {
                info!("Found {} device(s)", devices.len());
                let devices = Arc::new(devices);
                self.devices.send_replace(devices.clone());
                Ok(devices)
            }
            Err(e) => {
                warn!("Device list refresh failed: {}", e);
                Err(e)
            }
        }
    }

    /// Last successfully loaded list.
    pub fn devices(&self) -> Arc<Vec<DeviceInfo>> {
        self.devices.borrow().clone()
    }

    /// Device with this adapter name, if listed.
    pub fn find(&self, name: &str) -> Option<DeviceInfo> {
        self.devices.borrow().iter().find(|d| d.name == name).cloned()
    }

    /// Watch the list; the value changes on every successful refresh.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<DeviceInfo>>> {
        self.devices.subscribe()
    }
}
