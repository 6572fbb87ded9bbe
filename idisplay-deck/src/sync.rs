//! Synchronous helpers for panel discovery.

use crate::error::DeckError;
use idisplay_transport::{HidDiscovery, TransportDeviceInfo};

/// List all connected panels
pub fn list_decks() -> Result<Vec<TransportDeviceInfo>, DeckError> {
    Ok(HidDiscovery::new().list_devices()?)
}
