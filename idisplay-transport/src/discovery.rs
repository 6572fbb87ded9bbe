//! Device discovery for iDisplay panels

use std::ffi::CString;
use std::sync::Arc;

use hidapi::HidApi;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::hid::HidTransport;
use crate::printer::{MonitorConfig, MonitorTransport};
use crate::protocol::device;
use crate::types::TransportDeviceInfo;
use crate::Transport;

/// HID device discovery by VID/PID
pub struct HidDiscovery {
    /// Optional monitor config - wraps opened transports automatically
    monitor_config: Option<MonitorConfig>,
}

impl Default for HidDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl HidDiscovery {
    /// Create a discovery instance for the iDisplay VID/PID
    pub fn new() -> Self {
        Self {
            monitor_config: None,
        }
    }

    /// Create with monitor config; every transport opened is wrapped
    pub fn with_monitor_config(config: MonitorConfig) -> Self {
        Self {
            monitor_config: Some(config),
        }
    }

    fn is_panel(vid: u16, pid: u16) -> bool {
        vid == device::VENDOR_ID && pid == device::PRODUCT_ID
    }

    /// List currently attached panels
    pub fn list_devices(&self) -> Result<Vec<TransportDeviceInfo>, TransportError> {
        let api = HidApi::new()?;
        Ok(self.scan(&api))
    }

    fn scan(&self, api: &HidApi) -> Vec<TransportDeviceInfo> {
        let mut devices: Vec<TransportDeviceInfo> = Vec::new();

        for device_info in api.device_list() {
            let vid = device_info.vendor_id();
            let pid = device_info.product_id();
            if !Self::is_panel(vid, pid) {
                continue;
            }

            let path = device_info.path().to_string_lossy().to_string();
            if devices.iter().any(|d| d.device_path == path) {
                continue;
            }

            debug!("Found device: VID={:04X} PID={:04X} path={}", vid, pid, path);
            devices.push(TransportDeviceInfo {
                vid,
                pid,
                device_path: path,
                serial: device_info.serial_number().map(|s| s.to_string()),
                product_name: device_info.product_string().map(|s| s.to_string()),
            });
        }

        devices
    }

    /// Open the first attached panel
    pub fn open_first(&self) -> Result<Arc<dyn Transport>, TransportError> {
        let api = HidApi::new()?;
        let info = self
            .scan(&api)
            .into_iter()
            .next()
            .ok_or(TransportError::DeviceNotFound {
                vid: device::VENDOR_ID,
                pid: device::PRODUCT_ID,
            })?;
        self.open_with(&api, info)
    }

    fn open_with(
        &self,
        api: &HidApi,
        info: TransportDeviceInfo,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let path = CString::new(info.device_path.clone())
            .map_err(|e| TransportError::Internal(format!("invalid device path: {e}")))?;

        let device = api.open_path(&path)?;
        let input_device = match api.open_path(&path) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!("Could not open input handle, button presses disabled: {}", e);
                None
            }
        };

        info!(
            "Opened {} (VID={:04X} PID={:04X}) at {}",
            info.product_name.as_deref().unwrap_or("iDisplay"),
            info.vid,
            info.pid,
            info.device_path
        );

        let transport: Arc<dyn Transport> = Arc::new(HidTransport::new(device, input_device, info));
        Ok(match &self.monitor_config {
            Some(config) => MonitorTransport::wrap(transport, config.clone()),
            None => transport,
        })
    }
}
