//! Animation command handlers.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use super::{CommandResult, Context};
use idisplay_deck::Deck;
use idisplay_driver::animation::AnimationScheduler;
use idisplay_driver::loader::load_gif_frames;
use idisplay_driver::pipeline::TransformOptions;
use idisplay_driver::press::PressListener;
use idisplay_transport::{ButtonIndex, ButtonPress};

/// Play a GIF on one button until Ctrl+C
pub async fn gif(
    ctx: &Context,
    button: ButtonIndex,
    path: &Path,
    options: TransformOptions,
    no_cache: bool,
) -> CommandResult {
    let config = ctx.load_config()?;
    let cache = (!no_cache).then(|| config.frame_cache());

    println!("Loading GIF: {}", path.display());
    let Some(frames) = load_gif_frames(path, options, cache.as_ref())
        .await
        .map_err(|e| format!("Failed to load GIF: {e}"))?
    else {
        return Err(format!("GIF not found: {}", path.display()).into());
    };
    let total_ms: u64 = frames.iter().map(|f| u64::from(f.delay_ms)).sum();
    println!("  Frames: {}", frames.len());
    println!("  Loop duration: {total_ms}ms");

    let deck = ctx.open_deck()?;
    let scheduler = Arc::new(AnimationScheduler::spawn(Arc::clone(&deck), config.tick()));
    scheduler.start(button, frames)?;

    let listener = PressListener::spawn(Arc::clone(&deck), Arc::clone(&scheduler), config.press_settings());
    println!("\nPlaying on button {button} (Ctrl+C to stop)...");
    wait_for_interrupt(listener.as_ref()).await;

    shutdown(&deck, &scheduler, listener).await
}

/// Apply the configured layout and serve presses until Ctrl+C
pub async fn run(ctx: &Context) -> CommandResult {
    let config = ctx.load_config()?;
    info!("Loaded config from {}", ctx.config_path.display());

    let deck = ctx.open_deck()?;
    let info = deck.device_info();
    info!(
        "Driving {} at {}",
        info.product_name.as_deref().unwrap_or("iDisplay"),
        info.device_path
    );

    let scheduler = Arc::new(AnimationScheduler::spawn(Arc::clone(&deck), config.tick()));
    let cache = config.frame_cache();
    let report = config
        .apply_layout(&deck, &scheduler, Some(&cache), &ctx.config_dir())
        .await?;
    println!(
        "Layout: {} set, {} skipped, {} failed; {} animations playing",
        report.applied,
        report.skipped,
        report.failed,
        scheduler.active_buttons().len()
    );

    let listener = PressListener::spawn(Arc::clone(&deck), Arc::clone(&scheduler), config.press_settings());
    if listener.is_none() {
        warn!("Panel has no input endpoint; presses will not be handled");
    }
    println!("Running (Ctrl+C to stop)...");
    wait_for_interrupt(listener.as_ref()).await;

    shutdown(&deck, &scheduler, listener).await
}

/// Block until Ctrl+C, printing presses as they arrive
async fn wait_for_interrupt(listener: Option<&PressListener>) {
    let mut presses = listener.map(PressListener::subscribe);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        let closed = tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Cannot listen for Ctrl+C: {}", e);
                }
                return;
            }
            press = next_press(presses.as_mut()) => match press {
                Ok(press) => {
                    println!("Button {} pressed", press.button);
                    false
                }
                Err(broadcast::error::RecvError::Lagged(_)) => false,
                Err(broadcast::error::RecvError::Closed) => true,
            },
        };
        if closed {
            presses = None;
        }
    }
}

async fn next_press(
    presses: Option<&mut broadcast::Receiver<ButtonPress>>,
) -> Result<ButtonPress, broadcast::error::RecvError> {
    match presses {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn shutdown(
    deck: &Deck,
    scheduler: &AnimationScheduler,
    listener: Option<PressListener>,
) -> CommandResult {
    println!("\nStopping...");
    if let Some(listener) = listener {
        listener.stop();
    }
    scheduler.shutdown().await;
    deck.close().await?;
    Ok(())
}
