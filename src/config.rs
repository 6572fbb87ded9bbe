//! Driver configuration
//!
//! TOML file describing startup brightness, scheduler timing and what each
//! button shows. Stored at `~/.config/idisplay/config.toml` by default.

use anyhow::{bail, Context};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use idisplay_deck::Deck;
use idisplay_transport::ButtonIndex;

use crate::animation::AnimationScheduler;
use crate::color::{legacy_black_fixup, HexColor, PLACEHOLDER};
use crate::frame_cache::FrameCache;
use crate::loader::load_gif_frames;
use crate::pipeline::{from_image_file, from_static_image, Rotation, TransformOptions};
use crate::press::PressSettings;

/// What one button shows at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ButtonConfig {
    Color {
        id: u8,
        color: HexColor,
    },
    Image {
        id: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
        /// Base64 PNG, optionally as a `data:image/png;base64,` URL
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
        #[serde(default)]
        rotate: Rotation,
        #[serde(default)]
        flip_vertical: bool,
        #[serde(default)]
        nearest: bool,
    },
    Gif {
        id: u8,
        path: PathBuf,
        #[serde(default)]
        rotate: Rotation,
        #[serde(default)]
        flip_vertical: bool,
        #[serde(default)]
        nearest: bool,
    },
}

impl ButtonConfig {
    pub fn id(&self) -> u8 {
        match self {
            ButtonConfig::Color { id, .. }
            | ButtonConfig::Image { id, .. }
            | ButtonConfig::Gif { id, .. } => *id,
        }
    }

    /// Transform options for image and GIF buttons
    pub fn transform(&self) -> TransformOptions {
        match self {
            ButtonConfig::Color { .. } => TransformOptions::default(),
            ButtonConfig::Image {
                rotate,
                flip_vertical,
                nearest,
                ..
            }
            | ButtonConfig::Gif {
                rotate,
                flip_vertical,
                nearest,
                ..
            } => TransformOptions {
                rotate: *rotate,
                flip_vertical: *flip_vertical,
                nearest: *nearest,
            },
        }
    }
}

/// Driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Backlight level (0-100)
    #[serde(default = "default_brightness")]
    pub brightness: u8,
    /// Animation scheduler tick in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Wait before and after the press override write
    #[serde(default = "default_settle_ms")]
    pub press_settle_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Paint a random color and cancel the animation on press
    #[serde(default = "default_true")]
    pub press_override: bool,
    /// Frame cache directory (default: ~/.cache/idisplay)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub buttons: Vec<ButtonConfig>,
}

fn default_brightness() -> u8 {
    100
}
fn default_tick_ms() -> u64 {
    1
}
fn default_settle_ms() -> u64 {
    10
}
fn default_debounce_ms() -> u64 {
    1
}
fn default_true() -> bool {
    true
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            brightness: default_brightness(),
            tick_ms: default_tick_ms(),
            press_settle_ms: default_settle_ms(),
            debounce_ms: default_debounce_ms(),
            press_override: true,
            cache_dir: None,
            buttons: ButtonIndex::all()
                .map(|b| ButtonConfig::Color {
                    id: b.get(),
                    color: HexColor(PLACEHOLDER),
                })
                .collect(),
        }
    }
}

/// Outcome of applying a layout
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LayoutReport {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DriverConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("idisplay")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: DriverConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.brightness > idisplay_deck::MAX_BRIGHTNESS {
            bail!("brightness must be 0-100, got {}", self.brightness);
        }
        if self.tick_ms == 0 {
            bail!("tick_ms must be at least 1");
        }
        let mut seen = HashSet::new();
        for button in &self.buttons {
            let id = button.id();
            ButtonIndex::new(id)?;
            if !seen.insert(id) {
                bail!("button {id} is configured more than once");
            }
            if let ButtonConfig::Image { path, data, .. } = button {
                if path.is_some() == data.is_some() {
                    bail!("image button {id} needs exactly one of path or data");
                }
            }
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn press_settings(&self) -> PressSettings {
        PressSettings {
            debounce: Duration::from_millis(self.debounce_ms),
            settle: Duration::from_millis(self.press_settle_ms),
            override_enabled: self.press_override,
        }
    }

    pub fn frame_cache(&self) -> FrameCache {
        FrameCache::new(self.cache_dir.clone().unwrap_or_else(FrameCache::default_dir))
    }

    /// Push the layout to the panel
    ///
    /// Relative paths resolve against `base_dir`. Each button is applied in
    /// order; a failing button is logged and the rest still run. Only the
    /// brightness write aborts the layout.
    pub async fn apply_layout(
        &self,
        deck: &Deck,
        scheduler: &AnimationScheduler,
        cache: Option<&FrameCache>,
        base_dir: &Path,
    ) -> anyhow::Result<LayoutReport> {
        deck.set_brightness(self.brightness)
            .await
            .context("setting brightness")?;

        let mut report = LayoutReport::default();
        for button in &self.buttons {
            match apply_button(button, deck, scheduler, cache, base_dir).await {
                Ok(true) => report.applied += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!("Button {}: {:#}", button.id(), e);
                    report.failed += 1;
                }
            }
        }
        info!(
            "Layout applied: {} buttons set, {} skipped, {} failed",
            report.applied, report.skipped, report.failed
        );
        Ok(report)
    }
}

/// Returns Ok(false) when the button is intentionally left alone
async fn apply_button(
    button: &ButtonConfig,
    deck: &Deck,
    scheduler: &AnimationScheduler,
    cache: Option<&FrameCache>,
    base_dir: &Path,
) -> anyhow::Result<bool> {
    let index = ButtonIndex::new(button.id())?;
    match button {
        ButtonConfig::Color { color, .. } => {
            if color.0 == PLACEHOLDER {
                return Ok(false);
            }
            deck.set_button_color(index, legacy_black_fixup(color.0))
                .await?;
        }
        ButtonConfig::Image { path, data, .. } => {
            let options = button.transform();
            let pixels = match (data, path) {
                (Some(data), _) => {
                    let bytes = decode_image_data(data)?;
                    tokio::task::spawn_blocking(move || from_static_image(&bytes, &options)).await??
                }
                (None, Some(path)) => {
                    let path = base_dir.join(path);
                    tokio::task::spawn_blocking(move || from_image_file(&path, &options)).await??
                }
                (None, None) => bail!("image button has neither path nor data"),
            };
            deck.set_button_image(index, &pixels).await?;
        }
        ButtonConfig::Gif { path, .. } => {
            let path = base_dir.join(path);
            match load_gif_frames(&path, button.transform(), cache).await? {
                Some(frames) => scheduler.start(index, frames)?,
                None => return Ok(false),
            }
        }
    }
    Ok(true)
}

/// Decode base64 image data, accepting a `data:<mime>;base64,` prefix
fn decode_image_data(data: &str) -> anyhow::Result<Vec<u8>> {
    let encoded = match data.strip_prefix("data:") {
        Some(url) => url
            .split_once(";base64,")
            .map(|(_, payload)| payload)
            .context("data URL is not base64")?,
        None => data,
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .context("decoding image data")
}

#[cfg(test)]
mod tests {
    use super::*;
    use idisplay_transport::Rgb;

    #[test]
    fn default_config_round_trips() {
        let config = DriverConfig::default();
        assert_eq!(config.buttons.len(), 15);
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("type = \"color\""));
        assert!(toml_str.contains("color = \"#2a2a2a\""));
        let parsed: DriverConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn parses_mixed_layout() {
        let text = r##"
            brightness = 60
            press_override = false

            [[buttons]]
            id = 1
            type = "color"
            color = "#ff0000"

            [[buttons]]
            id = 2
            type = "image"
            path = "icon.png"
            rotate = 90
            flip_vertical = true

            [[buttons]]
            id = 15
            type = "gif"
            path = "back-arrow.gif"
        "##;
        let config: DriverConfig = toml::from_str(text).unwrap();
        config.validate().unwrap();
        assert_eq!(config.brightness, 60);
        assert_eq!(config.tick_ms, 1);
        assert!(!config.press_override);
        assert_eq!(
            config.buttons[0],
            ButtonConfig::Color {
                id: 1,
                color: HexColor(Rgb::new(255, 0, 0))
            }
        );
        assert_eq!(config.buttons[1].transform().rotate, Rotation::Cw90);
        assert!(config.buttons[1].transform().flip_vertical);
        assert_eq!(config.buttons[2].transform(), TransformOptions::default());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = DriverConfig {
            brightness: 101,
            ..DriverConfig::default()
        };
        assert!(config.validate().is_err());

        config.brightness = 50;
        config.buttons.push(ButtonConfig::Color {
            id: 3,
            color: HexColor(Rgb::BLACK),
        });
        assert!(config.validate().is_err());

        config.buttons = vec![ButtonConfig::Color {
            id: 16,
            color: HexColor(Rgb::BLACK),
        }];
        assert!(config.validate().is_err());

        assert!(toml::from_str::<DriverConfig>("[[buttons]]\nid = 1\ntype = \"color\"\ncolor = \"nope\"").is_err());
        assert!(toml::from_str::<DriverConfig>("[[buttons]]\nid = 1\ntype = \"gif\"\npath = \"a.gif\"\nrotate = 45").is_err());
    }

    fn png_data_url(color: [u8; 3]) -> String {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb(color));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        )
    }

    #[test]
    fn image_button_needs_path_or_data() {
        let text = "[[buttons]]\nid = 4\ntype = \"image\"\n";
        let config: DriverConfig = toml::from_str(text).unwrap();
        assert!(config.validate().is_err());

        let both = format!("{text}path = \"a.png\"\ndata = \"AAAA\"\n");
        let config: DriverConfig = toml::from_str(&both).unwrap();
        assert!(config.validate().is_err());

        let embedded = format!("{text}data = \"{}\"\n", png_data_url([0, 0, 255]));
        let config: DriverConfig = toml::from_str(&embedded).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn image_data_accepts_plain_and_url_forms() {
        let url = png_data_url([1, 2, 3]);
        let plain = url.split_once(',').unwrap().1;
        let from_url = decode_image_data(&url).unwrap();
        assert_eq!(from_url, decode_image_data(plain).unwrap());
        assert!(from_url.starts_with(b"\x89PNG"));

        assert!(decode_image_data("data:image/png,rawbytes").is_err());
        assert!(decode_image_data("not base64!").is_err());
    }

    #[tokio::test]
    async fn embedded_image_is_written_to_its_button() {
        use idisplay_transport::RecordingTransport;
        use std::sync::Arc;

        let recorder = Arc::new(RecordingTransport::new());
        let deck = Arc::new(Deck::new(recorder.clone()));
        let scheduler = AnimationScheduler::spawn(Arc::clone(&deck), Duration::from_secs(3600));
        let config = DriverConfig {
            buttons: vec![ButtonConfig::Image {
                id: 9,
                path: None,
                data: Some(png_data_url([0, 0, 255])),
                rotate: Rotation::None,
                flip_vertical: false,
                nearest: false,
            }],
            ..DriverConfig::default()
        };

        let report = config
            .apply_layout(&deck, &scheduler, None, Path::new("."))
            .await
            .unwrap();
        assert_eq!(report.applied, 1);
        let images = recorder.uploaded_images();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].button, 9);
        // Blue in BGR order
        assert_eq!(&images[0].pixels[..3], &[255, 0, 0]);
        scheduler.shutdown().await;
    }

    #[test]
    fn missing_file_gives_defaults_and_save_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert_eq!(DriverConfig::load(&path).unwrap(), DriverConfig::default());

        let config = DriverConfig {
            brightness: 42,
            ..DriverConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(DriverConfig::load(&path).unwrap().brightness, 42);
    }
}
