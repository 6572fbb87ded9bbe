//! One-shot panel command handlers.

use super::{CommandResult, Context};
use idisplay_deck::list_decks;
use idisplay_driver::color::legacy_black_fixup;
use idisplay_driver::pipeline::{from_image_file, TransformOptions};
use idisplay_transport::{ButtonIndex, Rgb};

/// List connected panels
pub fn list() -> CommandResult {
    let devices = list_decks()?;
    if devices.is_empty() {
        println!("No iDisplay panels found.");
        return Ok(());
    }
    println!("iDisplay panels:");
    for info in devices {
        println!(
            "  VID={:04x} PID={:04x} product={} serial={} path={}",
            info.vid,
            info.pid,
            info.product_name.as_deref().unwrap_or("-"),
            info.serial.as_deref().unwrap_or("-"),
            info.device_path
        );
    }
    Ok(())
}

pub async fn brightness(ctx: &Context, percent: u8) -> CommandResult {
    let deck = ctx.open_deck()?;
    deck.set_brightness(percent).await?;
    println!("Brightness set to {percent}%");
    deck.close().await?;
    Ok(())
}

pub async fn color(ctx: &Context, button: ButtonIndex, color: Rgb) -> CommandResult {
    let deck = ctx.open_deck()?;
    deck.set_button_color(button, legacy_black_fixup(color)).await?;
    println!("Button {button} filled");
    deck.close().await?;
    Ok(())
}

pub async fn image(
    ctx: &Context,
    button: ButtonIndex,
    path: &std::path::Path,
    options: TransformOptions,
) -> CommandResult {
    let pixels = from_image_file(path, &options)
        .map_err(|e| format!("Failed to load {}: {e}", path.display()))?;
    let deck = ctx.open_deck()?;
    deck.set_button_image(button, &pixels).await?;
    println!("Button {button} set to {}", path.display());
    deck.close().await?;
    Ok(())
}

pub async fn clear(ctx: &Context, button: Option<ButtonIndex>) -> CommandResult {
    let deck = ctx.open_deck()?;
    match button {
        Some(button) => {
            deck.clear_button(button).await?;
            println!("Button {button} cleared");
        }
        None => {
            deck.clear_all().await?;
            println!("All buttons cleared");
        }
    }
    deck.close().await?;
    Ok(())
}
