//! Input report decoding and the shared reader thread
//!
//! The panel reports presses as HID input reports whose bytes 1-2 carry a
//! big-endian bitmask, one bit per button (see `protocol::BUTTON_CODES`).
//! Reports that do not match a single known bit (releases, idle reports)
//! decode to no button.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hidapi::HidDevice;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::protocol::BUTTON_CODES;
use crate::types::{ButtonIndex, ButtonPress, InputReport};

/// Default window in which a repeat of the same button is dropped
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1);

/// Map a raw input report to the button it reports
pub fn decode_button(report: &[u8]) -> Option<ButtonIndex> {
    if report.len() < 3 {
        return None;
    }
    let value = u16::from_be_bytes([report[1], report[2]]);
    BUTTON_CODES
        .iter()
        .position(|&code| code == value)
        .and_then(|pos| ButtonIndex::new(pos as u8 + 1).ok())
}

/// Drops back-to-back repeats of the same button
///
/// A press is accepted if it is for a different button than the last accepted
/// one, or if at least `window` has passed since that press.
#[derive(Debug, Clone)]
pub struct PressDebouncer {
    window: Duration,
    last: Option<(ButtonIndex, Instant)>,
}

impl Default for PressDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl PressDebouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Returns true and records the press if it should be acted on
    pub fn accept(&mut self, button: ButtonIndex, now: Instant) -> bool {
        let accepted = match self.last {
            Some((last_button, last_time)) => {
                button != last_button || now.saturating_duration_since(last_time) >= self.window
            }
            None => true,
        };
        if accepted {
            self.last = Some((button, now));
        }
        accepted
    }

    pub fn last_button(&self) -> Option<ButtonIndex> {
        self.last.map(|(b, _)| b)
    }
}

/// Turns raw input reports into debounced button presses
#[derive(Debug, Clone, Default)]
pub struct ButtonDecoder {
    debouncer: PressDebouncer,
}

impl ButtonDecoder {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debouncer: PressDebouncer::new(debounce),
        }
    }

    pub fn decode(&mut self, report: &InputReport) -> Option<ButtonPress> {
        let button = decode_button(&report.data)?;
        if self.debouncer.accept(button, report.received_at) {
            Some(ButtonPress {
                button,
                at: report.received_at,
            })
        } else {
            debug!("Debounced repeat press of button {}", button);
            None
        }
    }
}

/// Broadcast channel capacity for input reports
const INPUT_CHANNEL_CAPACITY: usize = 64;

/// Input report fan-out for a transport backend
///
/// Owns the broadcast channel and the reader thread's shutdown flag.
pub struct InputSubsystem {
    input_tx: Option<broadcast::Sender<InputReport>>,
    shutdown: Arc<AtomicBool>,
}

impl InputSubsystem {
    /// Spawn a reader thread on `input_device`, if one is given
    pub fn new(input_device: Option<HidDevice>, config: InputReaderConfig) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let input_tx = input_device.and_then(|input| {
            let (tx, _) = broadcast::channel(INPUT_CHANNEL_CAPACITY);
            let tx_clone = tx.clone();
            let shutdown_clone = shutdown.clone();

            let spawned = std::thread::Builder::new()
                .name(format!("{}-input-reader", config.name))
                .spawn(move || run_input_reader_loop(input, tx_clone, shutdown_clone, config));

            match spawned {
                Ok(_) => Some(tx),
                Err(e) => {
                    warn!("Failed to spawn input reader thread: {}", e);
                    None
                }
            }
        });

        Self { input_tx, shutdown }
    }

    /// Subscribe to raw input reports
    pub fn subscribe(&self) -> Option<broadcast::Receiver<InputReport>> {
        self.input_tx.as_ref().map(|tx| tx.subscribe())
    }

    /// Ask the reader thread to exit
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Drop for InputSubsystem {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Configuration for the input reader loop
#[derive(Clone)]
pub struct InputReaderConfig {
    /// Read timeout in milliseconds (for checking shutdown flag when idle)
    pub read_timeout_ms: i32,
    /// Sleep duration on error before retrying
    pub error_sleep_ms: u64,
    /// Name prefix for the thread and debug logging
    pub name: &'static str,
}

impl Default for InputReaderConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 5,
            error_sleep_ms: 100,
            name: "idisplay",
        }
    }
}

/// Blocking reader loop: reads input reports and broadcasts them until shutdown
pub fn run_input_reader_loop(
    input_device: HidDevice,
    tx: broadcast::Sender<InputReport>,
    shutdown: Arc<AtomicBool>,
    config: InputReaderConfig,
) {
    debug!("{} input reader thread started", config.name);
    let mut buf = [0u8; 64];

    while !shutdown.load(Ordering::Relaxed) {
        // Timeout only affects how often we check shutdown flag when idle
        match input_device.read_timeout(&mut buf, config.read_timeout_ms) {
            Ok(len) if len > 0 => {
                let report = InputReport::new(buf[..len].to_vec());
                debug!(
                    "{} input report ({} bytes): {:02X?}",
                    config.name,
                    len,
                    &buf[..len.min(8)]
                );
                // Ignore send errors when nobody is subscribed
                let _ = tx.send(report);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("{} input reader error: {}", config.name, e);
                std::thread::sleep(Duration::from_millis(config.error_sleep_ms));
            }
        }
    }

    debug!("{} input reader thread exiting", config.name);
}
