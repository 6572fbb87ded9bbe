//! Button press handling.
//!
//! The listener decodes raw input reports into debounced presses, publishes
//! them to subscribers and, when enabled, runs the press override: playback
//! pauses, the pressed button's animation is dropped and the button is
//! painted a random color, then the remaining animations resume.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use idisplay_deck::{Deck, DeckError};
use idisplay_transport::event_parser::DEFAULT_DEBOUNCE;
use idisplay_transport::{ButtonDecoder, ButtonIndex, ButtonPress, Rgb};

use crate::animation::AnimationScheduler;
use crate::color::{random_color, to_hex};

/// Default wait on each side of the override write
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(10);

const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy)]
pub struct PressSettings {
    pub debounce: Duration,
    pub settle: Duration,
    /// Run the random-color override on each press
    pub override_enabled: bool,
}

impl Default for PressSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            settle: DEFAULT_SETTLE,
            override_enabled: true,
        }
    }
}

/// Pause playback, replace `button` with a random color, resume
///
/// Playback resumes even when the write fails. Returns the color written.
pub async fn handle_press(
    deck: &Deck,
    scheduler: &AnimationScheduler,
    button: ButtonIndex,
    settle: Duration,
) -> Result<Rgb, DeckError> {
    scheduler.pause_all();
    tokio::time::sleep(settle).await;

    scheduler.stop(button);
    let color = random_color();
    let result = deck.set_button_color(button, color).await;

    tokio::time::sleep(settle).await;
    scheduler.resume_all();
    result.map(|()| color)
}

/// Background task turning input reports into presses
pub struct PressListener {
    events: broadcast::Sender<ButtonPress>,
    task: JoinHandle<()>,
}

impl PressListener {
    /// Start listening; returns None if the panel has no input endpoint
    pub fn spawn(
        deck: Arc<Deck>,
        scheduler: Arc<AnimationScheduler>,
        settings: PressSettings,
    ) -> Option<Self> {
        let input = deck.subscribe_input()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let task = tokio::spawn(run_listener(
            input,
            events.clone(),
            deck,
            scheduler,
            settings,
        ));
        Some(Self { events, task })
    }

    /// Subscribe to accepted presses
    pub fn subscribe(&self) -> broadcast::Receiver<ButtonPress> {
        self.events.subscribe()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for PressListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_listener(
    mut input: broadcast::Receiver<idisplay_transport::InputReport>,
    events: broadcast::Sender<ButtonPress>,
    deck: Arc<Deck>,
    scheduler: Arc<AnimationScheduler>,
    settings: PressSettings,
) {
    let mut decoder = ButtonDecoder::new(settings.debounce);
    loop {
        let report = match input.recv().await {
            Ok(report) => report,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Press listener lagged, {} input reports dropped", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let Some(press) = decoder.decode(&report) else {
            continue;
        };
        info!("Button {} pressed", press.button);
        let _ = events.send(press);

        if settings.override_enabled {
            match handle_press(&deck, &scheduler, press.button, settings.settle).await {
                Ok(color) => debug!("Button {} set to {}", press.button, to_hex(color)),
                Err(e) => warn!("Press override on button {} failed: {}", press.button, e),
            }
        }
    }
    debug!("Press listener exiting");
}
