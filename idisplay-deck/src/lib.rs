//! High-level interface for Infinitton iDisplay button panels
//!
//! `Deck` turns the raw report I/O of a `Transport` into panel operations
//! (brightness, per-button images and colors) and serializes every device
//! write through a single gate, so the three reports of an image upload are
//! never interleaved with another write.

pub mod error;
pub mod sync;

pub use error::DeckError;
pub use sync::list_decks;

pub use idisplay_transport::{ButtonIndex, ButtonPress, InputReport, PixelBuffer, Rgb};

use std::sync::Arc;
use std::time::Duration;

use idisplay_transport::protocol::{
    build_brightness_report, build_commit_report, build_image_reports, timing,
};
use idisplay_transport::{HidDiscovery, Transport, TransportDeviceInfo};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

/// Highest accepted brightness percentage
pub const MAX_BRIGHTNESS: u8 = 100;

/// High-level panel interface over any transport
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Deck {
    transport: Arc<dyn Transport>,
    /// Held for the full duration of each device write sequence
    write_gate: Mutex<()>,
    write_pause: Duration,
}

impl Deck {
    /// Create a deck interface on an open transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            write_gate: Mutex::new(()),
            write_pause: timing::WRITE_PAUSE,
        }
    }

    /// Override the pause between the reports of an image upload
    pub fn with_write_pause(mut self, pause: Duration) -> Self {
        self.write_pause = pause;
        self
    }

    /// Open the first attached panel
    pub fn open() -> Result<Self, DeckError> {
        Self::open_with(&HidDiscovery::new())
    }

    /// Open the first panel found by `discovery`
    pub fn open_with(discovery: &HidDiscovery) -> Result<Self, DeckError> {
        Ok(Self::new(discovery.open_first()?))
    }

    pub fn device_info(&self) -> &TransportDeviceInfo {
        self.transport.device_info()
    }

    // === Display ===

    /// Set backlight brightness (0-100 percent)
    pub async fn set_brightness(&self, percent: u8) -> Result<(), DeckError> {
        if percent > MAX_BRIGHTNESS {
            return Err(DeckError::InvalidParameter(format!(
                "Brightness must be 0-{MAX_BRIGHTNESS}, got {percent}"
            )));
        }
        let report = build_brightness_report(percent);
        let _gate = self.write_gate.lock().await;
        self.transport.send_feature_report(&report).await?;
        debug!("Brightness set to {}%", percent);
        Ok(())
    }

    /// Upload an image to one button
    ///
    /// Writes both image reports and the commit while holding the write gate.
    /// A failure at any step aborts the rest of the sequence and releases the
    /// gate.
    pub async fn set_button_image(
        &self,
        button: ButtonIndex,
        pixels: &PixelBuffer,
    ) -> Result<(), DeckError> {
        let reports = build_image_reports(pixels);
        let commit = build_commit_report(button);

        let _gate = self.write_gate.lock().await;
        self.transport.write_output_report(reports.first()).await?;
        pause(self.write_pause).await;
        self.transport.write_output_report(reports.second()).await?;
        pause(self.write_pause).await;
        self.transport.send_feature_report(&commit).await?;
        debug!("Image committed to button {}", button);
        Ok(())
    }

    /// Fill one button with a solid color
    pub async fn set_button_color(&self, button: ButtonIndex, color: Rgb) -> Result<(), DeckError> {
        self.set_button_image(button, &PixelBuffer::solid(color)).await
    }

    /// Blank one button
    pub async fn clear_button(&self, button: ButtonIndex) -> Result<(), DeckError> {
        self.set_button_color(button, Rgb::BLACK).await
    }

    /// Blank every button, stopping at the first failure
    pub async fn clear_all(&self) -> Result<(), DeckError> {
        let black = PixelBuffer::solid(Rgb::BLACK);
        for button in ButtonIndex::all() {
            self.set_button_image(button, &black).await?;
        }
        Ok(())
    }

    // === Input ===

    /// Subscribe to raw input reports from the panel
    pub fn subscribe_input(&self) -> Option<broadcast::Receiver<InputReport>> {
        self.transport.subscribe_input()
    }

    /// Close the device after any write in progress has finished
    pub async fn close(&self) -> Result<(), DeckError> {
        let _gate = self.write_gate.lock().await;
        self.transport.close().await?;
        Ok(())
    }
}

/// Pause between reports; sub-millisecond pauses only yield
async fn pause(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    if duration < Duration::from_millis(1) {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(duration).await;
    }
}
