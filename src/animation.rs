//! Per-button animation playback.
//!
//! An `AnimationRegistry` holds at most one looping frame sequence per button.
//! The `AnimationScheduler` owns the registry and a single tick task. On each
//! tick, every playing entry whose deadline has passed gets its current frame
//! written to the panel by a spawned task. The cursor then advances
//! cyclically and the next deadline is set from that frame's delay.
//!
//! Writes go through `Deck::set_button_image`, so scheduled frames share the
//! deck's write gate with every other device write. A button whose previous
//! frame is still waiting on the gate is skipped until that write finishes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use idisplay_deck::Deck;
use idisplay_transport::{ButtonIndex, PixelBuffer};

use crate::pipeline::Frame;

/// Default scheduler resolution
pub const DEFAULT_TICK: Duration = Duration::from_millis(1);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnimationError {
    #[error("Animation for button {0} has no frames")]
    NoFrames(ButtonIndex),
}

/// Looping frame sequence bound to one button
#[derive(Debug, Clone)]
pub struct AnimationEntry {
    pub button: ButtonIndex,
    frames: Arc<[Frame]>,
    cursor: usize,
    next_fire: Instant,
    playing: bool,
    in_flight: bool,
    /// Distinguishes this entry from a later replacement on the same button
    generation: u64,
}

impl AnimationEntry {
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }
}

/// A frame whose deadline has passed and must be written
#[derive(Debug, Clone)]
pub struct DueFrame {
    pub button: ButtonIndex,
    pub pixels: PixelBuffer,
    /// Index of the frame within its sequence
    pub index: usize,
    generation: u64,
}

/// Animation state for all buttons
#[derive(Debug, Default)]
pub struct AnimationRegistry {
    entries: BTreeMap<ButtonIndex, AnimationEntry>,
    next_generation: u64,
}

impl AnimationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the animation on `button`; the first frame is due now
    pub fn start(
        &mut self,
        button: ButtonIndex,
        frames: Vec<Frame>,
        now: Instant,
    ) -> Result<(), AnimationError> {
        if frames.is_empty() {
            return Err(AnimationError::NoFrames(button));
        }
        self.next_generation += 1;
        let entry = AnimationEntry {
            button,
            frames: frames.into(),
            cursor: 0,
            next_fire: now,
            playing: true,
            in_flight: false,
            generation: self.next_generation,
        };
        if self.entries.insert(button, entry).is_some() {
            debug!("Replaced animation on button {}", button);
        }
        Ok(())
    }

    /// Remove the animation on `button`; returns whether one existed
    pub fn stop(&mut self, button: ButtonIndex) -> bool {
        self.entries.remove(&button).is_some()
    }

    pub fn pause_all(&mut self) {
        for entry in self.entries.values_mut() {
            entry.playing = false;
        }
    }

    pub fn resume_all(&mut self) {
        for entry in self.entries.values_mut() {
            entry.playing = true;
        }
    }

    /// Collect frames to write at `now` and advance their entries
    ///
    /// Each returned frame marks its entry in flight; call `finish` once the
    /// write has completed, successfully or not.
    pub fn due(&mut self, now: Instant) -> Vec<DueFrame> {
        let mut due = Vec::new();
        for entry in self.entries.values_mut() {
            if !entry.playing || entry.in_flight || now < entry.next_fire {
                continue;
            }
            let index = entry.cursor;
            let frame = &entry.frames[index];
            due.push(DueFrame {
                button: entry.button,
                pixels: frame.pixels.clone(),
                index,
                generation: entry.generation,
            });
            entry.cursor = (index + 1) % entry.frames.len();
            entry.next_fire = now + Duration::from_millis(u64::from(frame.delay_ms));
            entry.in_flight = true;
        }
        due
    }

    /// Mark the write for `frame` as complete
    pub fn finish(&mut self, frame: &DueFrame) {
        if let Some(entry) = self.entries.get_mut(&frame.button) {
            if entry.generation == frame.generation {
                entry.in_flight = false;
            }
        }
    }

    pub fn get(&self, button: ButtonIndex) -> Option<&AnimationEntry> {
        self.entries.get(&button)
    }

    pub fn cursor(&self, button: ButtonIndex) -> Option<usize> {
        self.entries.get(&button).map(|e| e.cursor)
    }

    pub fn buttons(&self) -> Vec<ButtonIndex> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Drives the registry on a tokio task
///
/// Must be created inside a tokio runtime. Dropping the scheduler aborts the
/// tick task; `shutdown()` stops it and waits for it to exit.
pub struct AnimationScheduler {
    registry: Arc<Mutex<AnimationRegistry>>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AnimationScheduler {
    /// Spawn the tick task for `deck`
    pub fn spawn(deck: Arc<Deck>, tick: Duration) -> Self {
        let registry = Arc::new(Mutex::new(AnimationRegistry::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_tick_loop(
            deck,
            Arc::clone(&registry),
            tick,
            shutdown_rx,
        ));
        debug!("Animation scheduler started (tick {:?})", tick);
        Self {
            registry,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn start(&self, button: ButtonIndex, frames: Vec<Frame>) -> Result<(), AnimationError> {
        let count = frames.len();
        self.registry.lock().start(button, frames, Instant::now())?;
        info!("Animation started on button {} ({} frames)", button, count);
        Ok(())
    }

    pub fn stop(&self, button: ButtonIndex) -> bool {
        let stopped = self.registry.lock().stop(button);
        if stopped {
            info!("Animation stopped on button {}", button);
        }
        stopped
    }

    pub fn pause_all(&self) {
        self.registry.lock().pause_all();
    }

    pub fn resume_all(&self) {
        self.registry.lock().resume_all();
    }

    pub fn cursor(&self, button: ButtonIndex) -> Option<usize> {
        self.registry.lock().cursor(button)
    }

    pub fn is_animating(&self, button: ButtonIndex) -> bool {
        self.registry.lock().get(button).is_some()
    }

    pub fn active_buttons(&self) -> Vec<ButtonIndex> {
        self.registry.lock().buttons()
    }

    /// Stop the tick task and wait for it to exit
    ///
    /// Frame writes already spawned run to completion.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Animation tick task failed: {}", e);
                }
            }
            debug!("Animation scheduler stopped");
        }
    }
}

impl Drop for AnimationScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

async fn run_tick_loop(
    deck: Arc<Deck>,
    registry: Arc<Mutex<AnimationRegistry>>,
    tick: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // Only ever set to true; an error means the scheduler is gone
            _ = shutdown_rx.changed() => break,
            _ = interval.tick() => {
                let due = registry.lock().due(Instant::now());
                for frame in due {
                    let deck = Arc::clone(&deck);
                    let registry = Arc::clone(&registry);
                    tokio::spawn(async move {
                        if let Err(e) = deck.set_button_image(frame.button, &frame.pixels).await {
                            warn!(
                                "Frame {} on button {} failed: {}",
                                frame.index, frame.button, e
                            );
                        }
                        registry.lock().finish(&frame);
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idisplay_transport::Rgb;

    fn button(n: u8) -> ButtonIndex {
        ButtonIndex::new(n).unwrap()
    }

    fn frames(delays: &[u32]) -> Vec<Frame> {
        delays
            .iter()
            .enumerate()
            .map(|(i, &delay_ms)| Frame {
                pixels: PixelBuffer::solid(Rgb::new(i as u8, 0, 0)),
                delay_ms,
            })
            .collect()
    }

    fn fire(reg: &mut AnimationRegistry, now: Instant) -> Vec<usize> {
        let due = reg.due(now);
        for f in &due {
            reg.finish(f);
        }
        due.iter().map(|f| f.index).collect()
    }

    #[test]
    fn cursor_wraps_after_last_frame() {
        let mut reg = AnimationRegistry::new();
        let t0 = Instant::now();
        reg.start(button(1), frames(&[100, 100, 100]), t0).unwrap();

        let mut shown = Vec::new();
        for i in 0..4u64 {
            shown.extend(fire(&mut reg, t0 + Duration::from_millis(100 * i)));
        }
        assert_eq!(shown, vec![0, 1, 2, 0]);
        assert_eq!(reg.cursor(button(1)), Some(1));
    }

    #[test]
    fn frames_respect_their_delay() {
        let mut reg = AnimationRegistry::new();
        let t0 = Instant::now();
        reg.start(button(2), frames(&[500, 100]), t0).unwrap();

        assert_eq!(fire(&mut reg, t0), vec![0]);
        assert!(fire(&mut reg, t0 + Duration::from_millis(499)).is_empty());
        assert_eq!(fire(&mut reg, t0 + Duration::from_millis(500)), vec![1]);
        assert!(fire(&mut reg, t0 + Duration::from_millis(599)).is_empty());
        assert_eq!(fire(&mut reg, t0 + Duration::from_millis(600)), vec![0]);
    }

    #[test]
    fn in_flight_entry_is_not_advanced() {
        let mut reg = AnimationRegistry::new();
        let t0 = Instant::now();
        reg.start(button(3), frames(&[100, 100]), t0).unwrap();

        let first = reg.due(t0);
        assert_eq!(first.len(), 1);
        assert!(reg.due(t0 + Duration::from_secs(5)).is_empty());
        assert_eq!(reg.cursor(button(3)), Some(1));

        reg.finish(&first[0]);
        assert_eq!(reg.due(t0 + Duration::from_secs(5)).len(), 1);
    }

    #[test]
    fn replacement_ignores_stale_completion() {
        let mut reg = AnimationRegistry::new();
        let t0 = Instant::now();
        reg.start(button(4), frames(&[100]), t0).unwrap();
        let stale = reg.due(t0);

        reg.start(button(4), frames(&[100, 100]), t0).unwrap();
        assert_eq!(reg.len(), 1);
        let fresh = reg.due(t0);
        assert_eq!(fresh.len(), 1);

        reg.finish(&stale[0]);
        assert!(reg.due(t0 + Duration::from_secs(1)).is_empty());
        reg.finish(&fresh[0]);
        assert_eq!(reg.due(t0 + Duration::from_secs(1)).len(), 1);
    }

    #[test]
    fn pause_and_resume_keep_cursor() {
        let mut reg = AnimationRegistry::new();
        let t0 = Instant::now();
        reg.start(button(5), frames(&[100, 100, 100]), t0).unwrap();
        reg.start(button(6), frames(&[100, 100]), t0).unwrap();
        fire(&mut reg, t0);

        reg.pause_all();
        assert!(fire(&mut reg, t0 + Duration::from_secs(1)).is_empty());
        assert!(!reg.get(button(5)).unwrap().is_playing());

        reg.resume_all();
        assert_eq!(fire(&mut reg, t0 + Duration::from_secs(1)), vec![1, 1]);
    }

    #[test]
    fn empty_and_stop() {
        let mut reg = AnimationRegistry::new();
        let t0 = Instant::now();
        assert_eq!(
            reg.start(button(7), Vec::new(), t0),
            Err(AnimationError::NoFrames(button(7)))
        );
        assert!(reg.is_empty());

        reg.start(button(7), frames(&[100]), t0).unwrap();
        assert!(reg.stop(button(7)));
        assert!(!reg.stop(button(7)));
        assert!(reg.due(t0).is_empty());
    }
}
