//! In-memory transport that records every report
//!
//! Stands in for a panel in tests. Input reports can be injected to simulate
//! button presses.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::protocol::{cmd, device, extract_pixels, is_image_report, COMMIT_REPORT_SIZE};
use crate::types::{InputReport, TransportDeviceInfo};
use crate::{Transport, TransportError};

/// One report sent through a RecordingTransport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedReport {
    Output(Vec<u8>),
    Feature(Vec<u8>),
}

impl RecordedReport {
    pub fn bytes(&self) -> &[u8] {
        match self {
            RecordedReport::Output(b) | RecordedReport::Feature(b) => b,
        }
    }
}

/// A complete upload reconstructed from recorded reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    /// Button byte from the commit report
    pub button: u8,
    pub pixels: Vec<u8>,
}

pub struct RecordingTransport {
    info: TransportDeviceInfo,
    reports: Mutex<Vec<RecordedReport>>,
    fail_writes: AtomicUsize,
    write_delay: Mutex<Option<Duration>>,
    input_tx: broadcast::Sender<InputReport>,
    closed: AtomicBool,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        let (input_tx, _) = broadcast::channel(64);
        Self {
            info: TransportDeviceInfo {
                vid: device::VENDOR_ID,
                pid: device::PRODUCT_ID,
                device_path: "recording".to_string(),
                serial: None,
                product_name: Some("Recording iDisplay".to_string()),
            },
            reports: Mutex::new(Vec::new()),
            fail_writes: AtomicUsize::new(0),
            write_delay: Mutex::new(None),
            input_tx,
            closed: AtomicBool::new(false),
        }
    }

    /// Make the next `n` writes (output or feature) fail without recording
    pub fn fail_next_writes(&self, n: usize) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    /// Sleep for `delay` inside every write
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.lock() = delay;
    }

    /// Deliver a raw input report to subscribers
    pub fn inject_input(&self, data: &[u8]) {
        let _ = self.input_tx.send(InputReport::new(data.to_vec()));
    }

    pub fn reports(&self) -> Vec<RecordedReport> {
        self.reports.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Reassemble image uploads from output/output/commit sequences
    ///
    /// A commit only counts if the two reports right before it are the two
    /// halves of an image upload.
    pub fn uploaded_images(&self) -> Vec<UploadedImage> {
        let reports = self.reports.lock();
        let mut images = Vec::new();
        for window in reports.windows(3) {
            let (RecordedReport::Output(first), RecordedReport::Output(second), RecordedReport::Feature(commit)) =
                (&window[0], &window[1], &window[2])
            else {
                continue;
            };
            if commit.len() != COMMIT_REPORT_SIZE || commit[0] != cmd::COMMIT_IMAGE {
                continue;
            }
            if let Some(pixels) = extract_pixels(first, second) {
                images.push(UploadedImage {
                    button: commit[4],
                    pixels,
                });
            }
        }
        images
    }

    /// Number of feature reports carrying `command`
    pub fn feature_count(&self, command: u8) -> usize {
        self.reports
            .lock()
            .iter()
            .filter(|r| matches!(r, RecordedReport::Feature(b) if b.first() == Some(&command)))
            .count()
    }

    /// True if every image report is part of an uninterrupted upload triple
    pub fn uploads_are_contiguous(&self) -> bool {
        let reports = self.reports.lock();
        let mut i = 0;
        while i < reports.len() {
            match &reports[i] {
                RecordedReport::Output(b) if is_image_report(b, 1) => {
                    let ok = matches!(reports.get(i + 1), Some(RecordedReport::Output(b)) if is_image_report(b, 2))
                        && matches!(reports.get(i + 2), Some(RecordedReport::Feature(b)) if b.first() == Some(&cmd::COMMIT_IMAGE));
                    if !ok {
                        return false;
                    }
                    i += 3;
                }
                RecordedReport::Output(_) => return false,
                RecordedReport::Feature(b) if b.first() == Some(&cmd::COMMIT_IMAGE) => return false,
                RecordedReport::Feature(_) => i += 1,
            }
        }
        true
    }

    async fn record(&self, report: RecordedReport) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let delay = *self.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failed = self
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(TransportError::HidError("injected write failure".to_string()));
        }
        self.reports.lock().push(report);
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn write_output_report(&self, data: &[u8]) -> Result<(), TransportError> {
        self.record(RecordedReport::Output(data.to_vec())).await
    }

    async fn send_feature_report(&self, data: &[u8]) -> Result<(), TransportError> {
        self.record(RecordedReport::Feature(data.to_vec())).await
    }

    fn subscribe_input(&self) -> Option<broadcast::Receiver<InputReport>> {
        Some(self.input_tx.subscribe())
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_brightness_report, build_commit_report, build_image_reports};
    use crate::types::{ButtonIndex, PixelBuffer, Rgb};

    async fn upload(t: &RecordingTransport, button: u8, color: Rgb) {
        let reports = build_image_reports(&PixelBuffer::solid(color));
        t.write_output_report(reports.first()).await.unwrap();
        t.write_output_report(reports.second()).await.unwrap();
        t.send_feature_report(&build_commit_report(ButtonIndex::new(button).unwrap()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reassembles_uploads() {
        let t = RecordingTransport::new();
        upload(&t, 3, Rgb::new(255, 0, 0)).await;
        t.send_feature_report(&build_brightness_report(40)).await.unwrap();
        upload(&t, 7, Rgb::new(0, 0, 255)).await;

        let images = t.uploaded_images();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].button, 3);
        assert_eq!(&images[0].pixels[..3], &[0, 0, 255]);
        assert_eq!(images[1].button, 7);
        assert_eq!(&images[1].pixels[..3], &[255, 0, 0]);
        assert!(t.uploads_are_contiguous());
        assert_eq!(t.feature_count(cmd::SET_BRIGHTNESS), 1);
    }

    #[tokio::test]
    async fn interleaved_reports_are_detected() {
        let t = RecordingTransport::new();
        let reports = build_image_reports(&PixelBuffer::solid(Rgb::BLACK));
        t.write_output_report(reports.first()).await.unwrap();
        t.write_output_report(reports.first()).await.unwrap();
        assert!(!t.uploads_are_contiguous());
        assert!(t.uploaded_images().is_empty());
    }

    #[tokio::test]
    async fn injected_failures_are_not_recorded() {
        let t = RecordingTransport::new();
        t.fail_next_writes(1);
        assert!(t.write_output_report(&[1]).await.is_err());
        assert!(t.write_output_report(&[2]).await.is_ok());
        assert_eq!(t.reports(), vec![RecordedReport::Output(vec![2])]);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_writes() {
        let t = RecordingTransport::new();
        t.close().await.unwrap();
        t.close().await.unwrap();
        assert!(matches!(
            t.send_feature_report(&[0x11]).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn injected_input_reaches_subscribers() {
        let t = RecordingTransport::new();
        let mut rx = t.subscribe_input().unwrap();
        t.inject_input(&[0, 0x01, 0x00]);
        let report = rx.recv().await.unwrap();
        assert_eq!(report.data, vec![0, 0x01, 0x00]);
    }
}
