// Player: the public transport surface
//
// All operations are issued from the control thread (UI/command handler) and
// are safe to call while the decode worker and output callback run. Slow work
// (opening files, building the output stream) happens here, never on the
// audio path.
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::decoder::SourceReader;
use crate::audio::engine::Engine;
use crate::audio::output::AudioOutput;
use crate::error::PlayerError;
use crate::track::TrackInfo;
use crate::transport::{PlaybackSnapshot, TransportState};

pub struct Player {
    state: Arc<TransportState>,
    /// Created lazily on first play so a Player can be constructed (and a
    /// file loaded) on machines without an output device.
    output: Mutex<Option<Arc<AudioOutput>>>,
    engine: Mutex<Option<Engine>>,
    /// Source opened by `load_file`, waiting for the first play to spawn
    /// its worker.
    pending_source: Mutex<Option<SourceReader>>,
    current: Mutex<Option<TrackInfo>>,
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

impl Player {
    pub fn new() -> Self {
        Self {
            state: Arc::new(TransportState::new()),
            output: Mutex::new(None),
            engine: Mutex::new(None),
            pending_source: Mutex::new(None),
            current: Mutex::new(None),
        }
    }

    /// Load an audio file, replacing any current source.
    ///
    /// The new source is opened and prepared completely before the old one
    /// is touched, so on failure the previously loaded track (its length,
    /// metadata, and stopped state) stays exactly as it was.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<TrackInfo, PlayerError> {
        let path = path.as_ref();
        let decoder = SourceReader::open(path)?;

        // New source is good: retire the old worker. Joining it releases
        // the old reader, and only then is the new state installed.
        self.state.set_playing(false);
        if let Some(engine) = self.engine.lock().take() {
            engine.stop();
        }
        if let Some(output) = self.output.lock().as_ref() {
            output.clear();
        }

        let sample_rate = decoder.sample_rate() as f64;
        let length_samples = decoder.length_samples().unwrap_or(0);
        let info = TrackInfo::for_file(path, decoder.length_seconds(), sample_rate);

        self.state.install_source(length_samples, sample_rate);
        *self.pending_source.lock() = Some(decoder);
        *self.current.lock() = Some(info.clone());

        log::debug!(
            "loaded {:?}: {} ({})",
            path,
            info.title,
            info.duration_string
        );
        Ok(info)
    }

    /// Start pulling audio at the current position. No-op if nothing is
    /// loaded; output-device failures are logged, not surfaced.
    pub fn play(&self) {
        if !self.state.is_loaded() {
            return;
        }
        if let Err(e) = self.ensure_engine() {
            log::warn!("cannot start playback: {}", e);
            return;
        }
        self.state.set_finished(false);
        self.state.set_playing(true);
    }

    /// Stop pulling frames; the position is preserved.
    pub fn pause(&self) {
        self.state.set_playing(false);
    }

    /// Stop pulling frames and rewind to the start.
    pub fn stop(&self) {
        self.state.set_playing(false);
        self.state.set_position_safe(0.0);
    }

    /// Rewind and play as one step. The worker consumes the seek before it
    /// produces the next block, so no pre-seek frame slips out.
    pub fn restart(&self) {
        self.state.set_position_safe(0.0);
        self.play();
    }

    /// Move the cursor to 0 without changing the play/pause mode.
    pub fn go_to_start(&self) {
        self.state.go_to_start();
    }

    /// Move the cursor to the end, recomputed from the source's own sample
    /// count and rate rather than any cached duration.
    pub fn go_to_end(&self) {
        self.state.go_to_end();
    }

    /// Clamp `seconds` into the track and seek there. No-op without a track.
    pub fn set_position_safe(&self, seconds: f64) {
        self.state.set_position_safe(seconds);
    }

    /// Skip forward; non-positive deltas do nothing.
    pub fn skip_forward(&self, seconds: f64) {
        self.state.skip_forward(seconds);
    }

    /// Skip backward; non-positive deltas do nothing.
    pub fn skip_backward(&self, seconds: f64) {
        self.state.skip_backward(seconds);
    }

    pub fn toggle_mute(&self) {
        self.state.toggle_mute();
    }

    pub fn is_muted(&self) -> bool {
        self.state.is_muted()
    }

    pub fn set_gain(&self, gain: f32) {
        self.state.set_gain(gain);
    }

    pub fn gain(&self) -> f32 {
        self.state.gain()
    }

    /// Playback speed as a resampling ratio; non-positive values are
    /// ignored. Pitch shifts with speed.
    pub fn set_speed(&self, ratio: f64) {
        self.state.set_speed(ratio);
    }

    pub fn speed(&self) -> f64 {
        self.state.speed()
    }

    /// Whole-track loop: at end-of-stream playback wraps to 0 and keeps
    /// going without a stop transition.
    pub fn set_looping(&self, enabled: bool) {
        self.state.set_loop_whole(enabled);
    }

    pub fn is_looping(&self) -> bool {
        self.state.loop_whole()
    }

    /// Capture the current position as loop point A.
    pub fn set_point_a(&self) {
        self.state.set_point_a();
    }

    /// Capture the current position as loop point B.
    pub fn set_point_b(&self) {
        self.state.set_point_b();
    }

    /// Arm the A-B loop; fails with `InvalidLoopRegion` unless A is set and
    /// B lies after it.
    pub fn enable_ab_loop(&self) -> Result<(), PlayerError> {
        self.state.enable_ab_loop()
    }

    pub fn disable_ab_loop(&self) {
        self.state.disable_ab_loop();
    }

    pub fn ab_loop_enabled(&self) -> bool {
        self.state.ab_enabled()
    }

    pub fn current_position(&self) -> f64 {
        self.state.position()
    }

    pub fn length_in_seconds(&self) -> f64 {
        self.state.length_seconds()
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    /// True once the current source played to its natural end. Cleared by
    /// play/seek/load. The playlist layer polls this to auto-advance.
    pub fn has_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Metadata summary of the loaded track, if any.
    pub fn current_track(&self) -> Option<TrackInfo> {
        self.current.lock().clone()
    }

    /// Field-wise read of the transport for the presentation layer's poll
    /// loop. Each field is its own atomic load, so a snapshot taken while an
    /// operation runs on another thread may mix values from before and after
    /// it; at poll cadence the next snapshot settles.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.state.snapshot()
    }

    /// Make sure the output stream exists and the pending source has a
    /// running worker.
    fn ensure_engine(&self) -> Result<(), PlayerError> {
        let mut pending = self.pending_source.lock();
        if pending.is_none() {
            // Worker already running for the installed source. If an earlier
            // spawn failed the source went with it; the file must be
            // reloaded before play can do anything.
            return if self.engine.lock().is_some() {
                Ok(())
            } else {
                Err(PlayerError::Output(
                    "no decode worker for the loaded source".to_string(),
                ))
            };
        }

        let output = {
            let mut slot = self.output.lock();
            match slot.as_ref() {
                Some(output) => output.clone(),
                None => {
                    let output = Arc::new(AudioOutput::new(self.state.clone())?);
                    *slot = Some(output.clone());
                    output
                }
            }
        };

        if let Some(decoder) = pending.take() {
            let engine = Engine::spawn(decoder, self.state.clone(), output)?;
            *self.engine.lock() = Some(engine);
        }
        Ok(())
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.state.set_playing(false);
        if let Some(engine) = self.engine.lock().take() {
            engine.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    /// Write a minimal mono 16-bit PCM WAV file of the given length.
    fn write_test_wav(path: &PathBuf, seconds: f64, sample_rate: u32) {
        let frames = (seconds * sample_rate as f64) as u32;
        let data_len = frames * 2;
        let mut f = std::fs::File::create(path).unwrap();

        f.write_all(b"RIFF").unwrap();
        f.write_all(&(36 + data_len).to_le_bytes()).unwrap();
        f.write_all(b"WAVE").unwrap();
        f.write_all(b"fmt ").unwrap();
        f.write_all(&16u32.to_le_bytes()).unwrap();
        f.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
        f.write_all(&1u16.to_le_bytes()).unwrap(); // mono
        f.write_all(&sample_rate.to_le_bytes()).unwrap();
        f.write_all(&(sample_rate * 2).to_le_bytes()).unwrap();
        f.write_all(&2u16.to_le_bytes()).unwrap();
        f.write_all(&16u16.to_le_bytes()).unwrap();
        f.write_all(b"data").unwrap();
        f.write_all(&data_len.to_le_bytes()).unwrap();

        // Quiet ramp so the payload is not all zeros
        for i in 0..frames {
            let sample = ((i % 100) as i16 - 50) * 16;
            f.write_all(&sample.to_le_bytes()).unwrap();
        }
    }

    #[test]
    fn test_operations_are_noops_without_a_track() {
        let player = Player::new();
        player.play();
        assert!(!player.is_playing());
        player.set_position_safe(10.0);
        assert_eq!(player.current_position(), 0.0);
        assert_eq!(player.length_in_seconds(), 0.0);
        player.stop();
        player.restart();
        assert!(!player.is_playing());
    }

    #[test]
    fn test_load_file_missing_path_is_decode_error() {
        let player = Player::new();
        let err = player.load_file("/no/such/file.mp3").unwrap_err();
        assert!(matches!(err, PlayerError::Decode { .. }));
        assert_eq!(player.length_in_seconds(), 0.0);
        assert!(player.current_track().is_none());
    }

    #[test]
    fn test_load_file_reads_length_and_metadata_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("morning drone.wav");
        write_test_wav(&path, 2.0, 44100);

        let player = Player::new();
        let info = player.load_file(&path).unwrap();
        assert_eq!(info.title, "morning drone");
        assert_eq!(info.artist, "Unknown Artist");
        assert_eq!(info.album, "Unknown Album");
        assert_eq!(info.duration_string, "00:02");
        assert!((player.length_in_seconds() - 2.0).abs() < 0.05);
        assert_eq!(player.current_position(), 0.0);
        assert!(!player.is_playing());
    }

    #[test]
    fn test_failed_load_preserves_previous_track() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keeper.wav");
        write_test_wav(&path, 3.0, 44100);

        let player = Player::new();
        player.load_file(&path).unwrap();
        let length_before = player.length_in_seconds();

        let err = player.load_file(dir.path().join("gone.wav")).unwrap_err();
        assert!(matches!(err, PlayerError::Decode { .. }));
        assert_eq!(player.length_in_seconds(), length_before);
        assert_eq!(player.current_track().unwrap().title, "keeper");
    }

    #[test]
    fn test_transport_navigation_without_device() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nav.wav");
        write_test_wav(&path, 10.0, 44100);

        let player = Player::new();
        player.load_file(&path).unwrap();

        player.set_position_safe(4.0);
        assert_eq!(player.current_position(), 4.0);
        player.skip_forward(3.0);
        assert_eq!(player.current_position(), 7.0);
        player.skip_backward(-1.0);
        assert_eq!(player.current_position(), 7.0);
        player.go_to_end();
        assert!((player.current_position() - 10.0).abs() < 0.05);
        player.go_to_start();
        assert_eq!(player.current_position(), 0.0);
    }

    #[test]
    fn test_ab_loop_setup_through_player() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abloop.wav");
        write_test_wav(&path, 10.0, 44100);

        let player = Player::new();
        player.load_file(&path).unwrap();

        // Inverted region is refused
        player.set_position_safe(5.0);
        player.set_point_a();
        player.set_position_safe(2.0);
        player.set_point_b();
        assert!(player.enable_ab_loop().is_err());
        assert!(!player.ab_loop_enabled());

        // Forward region arms
        player.set_point_a();
        player.set_position_safe(6.0);
        player.set_point_b();
        player.enable_ab_loop().unwrap();
        assert!(player.ab_loop_enabled());

        player.disable_ab_loop();
        assert!(!player.ab_loop_enabled());
    }

    #[test]
    fn test_mute_speed_and_snapshot() {
        let player = Player::new();
        player.set_gain(0.8);
        player.toggle_mute();
        player.toggle_mute();
        assert_eq!(player.gain(), 0.8);

        player.set_speed(2.0);
        player.set_speed(-1.0);
        assert_eq!(player.speed(), 2.0);

        let snap = player.snapshot();
        assert_eq!(snap.gain, 0.8);
        assert_eq!(snap.speed, 2.0);
        assert!(!snap.playing);
        assert!(!snap.ab_enabled);
        assert_eq!(snap.point_a, None);
    }
}
