//! hidapi transport for a USB-connected panel

use async_trait::async_trait;
use hidapi::HidDevice;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::TransportError;
use crate::event_parser::{InputReaderConfig, InputSubsystem};
use crate::types::{InputReport, TransportDeviceInfo};
use crate::Transport;

/// HID transport for one panel
///
/// Output and feature reports go through `device`. Input reports are read on
/// a dedicated thread from a second handle to the same interface and fanned
/// out through a broadcast channel.
pub struct HidTransport {
    /// Handle for output and feature reports; None once closed
    device: Mutex<Option<HidDevice>>,
    /// Device information
    info: TransportDeviceInfo,
    /// Input reader thread and channel
    input: InputSubsystem,
}

impl HidTransport {
    /// Create a transport from opened HID handles
    ///
    /// # Arguments
    /// * `device` - handle used for output and feature reports
    /// * `input_device` - optional second handle for the input reader thread
    /// * `info` - device information
    pub fn new(
        device: HidDevice,
        input_device: Option<HidDevice>,
        info: TransportDeviceInfo,
    ) -> Self {
        Self {
            device: Mutex::new(Some(device)),
            info,
            input: InputSubsystem::new(input_device, InputReaderConfig::default()),
        }
    }

    fn with_device<T>(
        &self,
        f: impl FnOnce(&HidDevice) -> Result<T, hidapi::HidError>,
    ) -> Result<T, TransportError> {
        let guard = self.device.lock();
        let device = guard.as_ref().ok_or(TransportError::Closed)?;
        Ok(f(device)?)
    }
}

#[async_trait]
impl Transport for HidTransport {
    async fn write_output_report(&self, data: &[u8]) -> Result<(), TransportError> {
        let written = self.with_device(|d| d.write(data))?;
        debug!("Wrote output report: {}/{} bytes", written, data.len());
        Ok(())
    }

    async fn send_feature_report(&self, data: &[u8]) -> Result<(), TransportError> {
        self.with_device(|d| d.send_feature_report(data))?;
        debug!(
            "Sent feature report 0x{:02X}: {:02X?}",
            data.first().copied().unwrap_or(0),
            &data[..data.len().min(8)]
        );
        Ok(())
    }

    fn subscribe_input(&self) -> Option<broadcast::Receiver<InputReport>> {
        self.input.subscribe()
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.input.stop();
        if self.device.lock().take().is_some() {
            debug!("Closed HID device {}", self.info.device_path);
        }
        Ok(())
    }
}

impl Drop for HidTransport {
    fn drop(&mut self) {
        self.input.stop();
        debug!("HidTransport dropped, signaling input reader shutdown");
    }
}
