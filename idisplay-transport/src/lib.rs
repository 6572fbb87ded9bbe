//! Transport layer for Infinitton iDisplay button panels
//!
//! This crate owns everything that touches the wire:
//!
//! - the `Transport` trait and its hidapi backend (`HidTransport`)
//! - device discovery by vendor/product id
//! - report framing for image uploads, commits and brightness (`protocol`)
//! - input report decoding and press debounce (`event_parser`)
//! - a monitoring middleware and an in-memory recording transport

pub mod error;
pub mod event_parser;
pub mod printer;
pub mod protocol;
pub mod recording;
pub mod types;

mod discovery;
mod hid;

pub use error::{ButtonIndexError, PixelBufferError, TransportError};
pub use event_parser::{decode_button, ButtonDecoder, PressDebouncer};
pub use printer::{MonitorConfig, MonitorTransport};
pub use protocol::{build_brightness_report, build_commit_report, build_image_reports, ImageReports};
pub use recording::{RecordedReport, RecordingTransport, UploadedImage};
pub use types::{ButtonIndex, ButtonPress, InputReport, PixelBuffer, Rgb, TransportDeviceInfo};

pub use discovery::HidDiscovery;
pub use hid::HidTransport;

use async_trait::async_trait;
use tokio::sync::broadcast;

/// Raw report I/O with one panel
///
/// Implementations do not retry and do not serialize multi-report sequences;
/// callers that need atomic uploads hold their own lock around the calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a variable-length output report (first byte is the report id)
    async fn write_output_report(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Send a fixed-size feature report (first byte is the command)
    async fn send_feature_report(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Subscribe to raw input reports
    ///
    /// Returns None if the transport has no input endpoint.
    fn subscribe_input(&self) -> Option<broadcast::Receiver<InputReport>> {
        None
    }

    /// Get device information
    fn device_info(&self) -> &TransportDeviceInfo;

    /// Release the device. Calling it again is a no-op.
    async fn close(&self) -> Result<(), TransportError>;
}
