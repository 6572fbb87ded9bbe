//! Command handlers for the CLI application.
//!
//! This module organizes command handlers by category:
//! - `device`: One-shot panel writes (list, brightness, color, image, clear)
//! - `animations`: Long-running playback (gif, run)
//! - `utility`: Local housekeeping (cache, init-config)

pub mod animations;
pub mod device;
pub mod utility;

use std::path::PathBuf;
use std::sync::Arc;

use idisplay_deck::Deck;
use idisplay_driver::config::DriverConfig;
use idisplay_transport::{HidDiscovery, MonitorConfig};

/// Result type for command handlers
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Settings shared by every command
pub struct Context {
    pub config_path: PathBuf,
    pub monitor: Option<MonitorConfig>,
}

impl Context {
    /// Load and validate the driver config (defaults if the file is missing)
    pub fn load_config(&self) -> Result<DriverConfig, Box<dyn std::error::Error>> {
        Ok(DriverConfig::load(&self.config_path)?)
    }

    /// Directory that relative layout paths resolve against
    pub fn config_dir(&self) -> PathBuf {
        self.config_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Open the first panel, wrapped for monitoring when requested
    pub fn open_deck(&self) -> Result<Arc<Deck>, Box<dyn std::error::Error>> {
        let discovery = match &self.monitor {
            Some(config) => HidDiscovery::with_monitor_config(config.clone()),
            None => HidDiscovery::new(),
        };
        let deck = Deck::open_with(&discovery).map_err(|e| format!("Failed to open device: {e}"))?;
        Ok(Arc::new(deck))
    }
}

/// Create monitor config from CLI flags
pub fn create_monitor_config(monitor: bool, hex: bool) -> Option<MonitorConfig> {
    monitor.then(|| MonitorConfig::default().with_hex(hex))
}
