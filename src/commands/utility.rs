//! Utility command handlers.

use super::{CommandResult, Context};
use idisplay_driver::config::DriverConfig;

/// List cached frame sequences
pub fn cache_list(ctx: &Context) -> CommandResult {
    let cache = ctx.load_config()?.frame_cache();
    let entries = cache.entries()?;
    println!("Frame cache: {}", cache.dir().display());
    if entries.is_empty() {
        println!("  (empty)");
        return Ok(());
    }
    let mut total = 0u64;
    for entry in &entries {
        total += entry.size;
        let name = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("  {:>10} KiB  {}", entry.size / 1024, name);
    }
    println!("{} entries, {} KiB total", entries.len(), total / 1024);
    Ok(())
}

/// Delete every cached frame sequence
pub fn cache_clear(ctx: &Context) -> CommandResult {
    let cache = ctx.load_config()?.frame_cache();
    let removed = cache.clear()?;
    println!("Removed {removed} cache entries from {}", cache.dir().display());
    Ok(())
}

/// Write the default config file
pub fn init_config(ctx: &Context, force: bool) -> CommandResult {
    let path = &ctx.config_path;
    if path.exists() && !force {
        eprintln!("{} already exists (use --force to overwrite)", path.display());
        return Ok(());
    }
    DriverConfig::default().save(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
