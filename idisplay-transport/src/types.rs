//! Common types for transport layer

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{ButtonIndexError, PixelBufferError};
use crate::protocol::{BUTTON_COUNT, PIXEL_BYTES};

/// Physical button on the panel, numbered 1..=15
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ButtonIndex(u8);

impl ButtonIndex {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = BUTTON_COUNT as u8;

    /// Create a button index, rejecting anything outside 1..=15
    pub fn new(index: u8) -> Result<Self, ButtonIndexError> {
        if (Self::MIN..=Self::MAX).contains(&index) {
            Ok(Self(index))
        } else {
            Err(ButtonIndexError(index))
        }
    }

    /// 1-based index as sent on the wire
    pub fn get(self) -> u8 {
        self.0
    }

    /// Iterate over every button in order
    pub fn all() -> impl Iterator<Item = ButtonIndex> {
        (Self::MIN..=Self::MAX).map(ButtonIndex)
    }
}

impl TryFrom<u8> for ButtonIndex {
    type Error = ButtonIndexError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for ButtonIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 24-bit color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// One button's worth of raw pixels in device order
///
/// Exactly 72*72*3 bytes, BGR per pixel, row-major, no padding. The storage is
/// shared, so cloning a buffer to hand it to a write task does not copy pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer(Arc<[u8]>);

impl PixelBuffer {
    /// Wrap BGR bytes, rejecting anything that is not exactly one button image
    pub fn from_bgr(bytes: Vec<u8>) -> Result<Self, PixelBufferError> {
        if bytes.len() != PIXEL_BYTES {
            return Err(PixelBufferError {
                expected: PIXEL_BYTES,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes.into()))
    }

    /// Buffer with every pixel set to `color`
    pub fn solid(color: Rgb) -> Self {
        let bytes: Vec<u8> = [color.b, color.g, color.r]
            .iter()
            .copied()
            .cycle()
            .take(PIXEL_BYTES)
            .collect();
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PixelBuffer({} bytes)", self.0.len())
    }
}

impl AsRef<[u8]> for PixelBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Device identification information
#[derive(Debug, Clone)]
pub struct TransportDeviceInfo {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// Device path or identifier (transport-specific)
    pub device_path: String,
    /// Serial number if available
    pub serial: Option<String>,
    /// Product name if available
    pub product_name: Option<String>,
}

/// Raw input report as read from the device
#[derive(Debug, Clone)]
pub struct InputReport {
    pub data: Vec<u8>,
    /// Captured immediately after the read returned
    pub received_at: Instant,
}

impl InputReport {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            received_at: Instant::now(),
        }
    }
}

/// Accepted (decoded and debounced) button press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPress {
    pub button: ButtonIndex,
    pub at: Instant,
}
