//! Deck interface error types

use idisplay_transport::TransportError;
use thiserror::Error;

/// Errors from deck operations
#[derive(Error, Debug)]
pub enum DeckError {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
