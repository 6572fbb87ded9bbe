//! Transport error types

use thiserror::Error;

/// Errors that can occur during transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: no HID device with VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Transport closed")]
    Closed,

    // HID-specific errors
    #[error("HID error: {0}")]
    HidError(String),

    #[error("HID permission denied: {0}")]
    HidPermissionDenied(String),

    #[error("Invalid report: {0}")]
    InvalidReport(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            TransportError::HidPermissionDenied(msg)
        } else {
            TransportError::HidError(msg)
        }
    }
}

/// A pixel buffer was built from the wrong number of bytes
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Pixel buffer must be exactly {expected} bytes, got {actual}")]
pub struct PixelBufferError {
    pub expected: usize,
    pub actual: usize,
}

/// A button index outside 1..=15
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Button index {0} out of range (1-15)")]
pub struct ButtonIndexError(pub u8);
