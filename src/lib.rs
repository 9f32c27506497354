// Playhead - playback transport engine for a desktop audio player
//
// The library owns the decode-to-callback pipeline and the transport state
// machine (play/pause/stop, seek and skip, A-B and whole-track looping,
// speed via resampling, gain/mute). The GUI shell drives it through the
// Player operations and polls `Player::snapshot` on its own timer; nothing
// in here knows about windows, widgets, or timers.
mod audio;
mod error;
mod player;
mod playlist;
mod track;
mod transport;

pub use error::PlayerError;
pub use player::Player;
pub use playlist::Playlist;
pub use track::{format_duration, is_supported, TrackInfo, SUPPORTED_EXTENSIONS};
pub use transport::PlaybackSnapshot;
