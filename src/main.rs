//! Infinitton iDisplay Driver CLI
//!
//! A command-line interface for driving iDisplay button panels.

use clap::Parser;
use idisplay_driver::config::DriverConfig;

// CLI definitions
mod cli;
use cli::{CacheCommands, Cli, Commands};

// Command handlers
mod commands;
use commands::Context;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let ctx = Context {
        config_path: cli.config.unwrap_or_else(DriverConfig::default_path),
        monitor: commands::create_monitor_config(cli.monitor, cli.hex),
    };

    match cli.command {
        // === One-shot Commands ===
        Commands::List => {
            commands::device::list()?;
        }
        Commands::Brightness { percent } => {
            commands::device::brightness(&ctx, percent).await?;
        }
        Commands::Color { button, color } => {
            commands::device::color(&ctx, button, color.0).await?;
        }
        Commands::Image {
            button,
            path,
            transform,
        } => {
            commands::device::image(&ctx, button, &path, transform.into()).await?;
        }
        Commands::Clear { button, all } => {
            commands::device::clear(&ctx, if all { None } else { button }).await?;
        }

        // === Animation Commands ===
        Commands::Gif {
            button,
            path,
            transform,
            no_cache,
        } => {
            commands::animations::gif(&ctx, button, &path, transform.into(), no_cache).await?;
        }
        Commands::Run => {
            commands::animations::run(&ctx).await?;
        }

        // === Utility Commands ===
        Commands::Cache(CacheCommands::List) => {
            commands::utility::cache_list(&ctx)?;
        }
        Commands::Cache(CacheCommands::Clear) => {
            commands::utility::cache_clear(&ctx)?;
        }
        Commands::InitConfig { force } => {
            commands::utility::init_config(&ctx, force)?;
        }
    }

    Ok(())
}
