// Error types for the playback engine
use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the transport engine.
///
/// Nothing here is fatal: a `Decode` error leaves the previously loaded
/// track in place, and `InvalidLoopRegion` leaves the loop state untouched.
/// Out-of-range seek/skip/speed/gain inputs are clamped or ignored rather
/// than reported.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// File missing, unreadable, or in an unsupported format.
    /// Raised only by `Player::load_file`.
    #[error("failed to open {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// A-B loop enable requested with point A unset or point B not after A.
    #[error("invalid A-B loop region (a = {a}, b = {b})")]
    InvalidLoopRegion { a: f64, b: f64 },

    /// The output device or stream could not be set up.
    #[error("audio output error: {0}")]
    Output(String),
}
