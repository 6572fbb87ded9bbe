// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use idisplay_driver::color::HexColor;
use idisplay_driver::pipeline::{Rotation, TransformOptions};
use idisplay_transport::ButtonIndex;

#[derive(Parser)]
#[command(name = "idisplay_driver")]
#[command(author, version, about = "Infinitton iDisplay Linux Driver")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/idisplay/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable transport monitoring (logs every report sent to the panel)
    #[arg(long, global = true)]
    pub monitor: bool,

    /// Show raw hex dump alongside decoded output
    #[arg(long, global = true)]
    pub hex: bool,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List connected iDisplay panels
    #[command(visible_alias = "ls")]
    List,

    /// Set backlight brightness
    #[command(visible_alias = "b")]
    Brightness {
        /// Percent (0-100)
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
    },

    /// Fill a button with a solid color
    Color {
        /// Button (1-15)
        #[arg(value_parser = parse_button)]
        button: ButtonIndex,
        /// Color as #rrggbb or a name (red, blue, ...)
        color: HexColor,
    },

    /// Show an image on a button
    #[command(visible_alias = "img")]
    Image {
        /// Button (1-15)
        #[arg(value_parser = parse_button)]
        button: ButtonIndex,
        /// Image file (png, jpeg, bmp, gif)
        path: PathBuf,
        #[command(flatten)]
        transform: TransformArgs,
    },

    /// Blank one button, or all of them
    Clear {
        /// Button (1-15)
        #[arg(value_parser = parse_button, required_unless_present = "all")]
        button: Option<ButtonIndex>,
        /// Clear every button
        #[arg(long, conflicts_with = "button")]
        all: bool,
    },

    /// Play a GIF on a button until Ctrl+C
    Gif {
        /// Button (1-15)
        #[arg(value_parser = parse_button)]
        button: ButtonIndex,
        /// GIF file
        path: PathBuf,
        #[command(flatten)]
        transform: TransformArgs,
        /// Always decode from source and do not write the frame cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Apply the configured layout and handle presses until Ctrl+C
    Run,

    /// Frame cache maintenance
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Write the default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List cached frame sequences
    List,
    /// Remove all cached frame sequences
    Clear,
}

/// Image geometry flags shared by `image` and `gif`
#[derive(clap::Args, Clone, Copy, Default)]
pub struct TransformArgs {
    /// Rotate clockwise by 0, 90, 180 or 270 degrees
    #[arg(long, default_value = "0", value_parser = parse_rotation)]
    pub rotate: Rotation,
    /// Flip vertically after rotating
    #[arg(long)]
    pub flip_vertical: bool,
    /// Use nearest-neighbour resampling
    #[arg(long)]
    pub nearest: bool,
}

impl From<TransformArgs> for TransformOptions {
    fn from(args: TransformArgs) -> Self {
        TransformOptions {
            rotate: args.rotate,
            flip_vertical: args.flip_vertical,
            nearest: args.nearest,
        }
    }
}

fn parse_button(s: &str) -> Result<ButtonIndex, String> {
    let n: u8 = s.parse().map_err(|_| format!("invalid button: {s}"))?;
    ButtonIndex::new(n).map_err(|e| e.to_string())
}

fn parse_rotation(s: &str) -> Result<Rotation, String> {
    let degrees: u16 = s.parse().map_err(|_| format!("invalid rotation: {s}"))?;
    Rotation::try_from(degrees)
}
