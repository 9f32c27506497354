// Transport state shared between the control thread and the audio path.
//
// Every field is an atomic scalar (floats stored as bit patterns), so the
// decode worker and the output callback read a consistent value without ever
// waiting on a lock held by the control thread. The control thread is the
// single writer for everything except `position`, which the decode worker
// advances while playing.
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use serde::Serialize;

use crate::error::PlayerError;

/// Bit pattern meaning "no seek requested". This is a NaN pattern, so it can
/// never collide with a real seek target.
const NO_SEEK: u64 = u64::MAX;

/// Seconds value marking an unset A/B point.
const UNSET_MARKER: f64 = -1.0;

/// Read-only view of the transport, polled by the presentation layer at its
/// own cadence.
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackSnapshot {
    pub position: f64,
    pub length: f64,
    pub playing: bool,
    /// True once the source reached its natural end without a loop active.
    pub finished: bool,
    pub gain: f32,
    pub muted: bool,
    pub speed: f64,
    pub loop_whole: bool,
    pub ab_enabled: bool,
    pub point_a: Option<f64>,
    pub point_b: Option<f64>,
}

pub struct TransportState {
    loaded: AtomicBool,
    playing: AtomicBool,
    finished: AtomicBool,
    position_bits: AtomicU64,
    length_samples: AtomicU64,
    sample_rate_bits: AtomicU64,
    gain_bits: AtomicU32,
    muted: AtomicBool,
    pre_mute_gain_bits: AtomicU32,
    speed_bits: AtomicU64,
    loop_whole: AtomicBool,
    ab_enabled: AtomicBool,
    point_a_bits: AtomicU64,
    point_b_bits: AtomicU64,
    seek_request_bits: AtomicU64,
}

impl Default for TransportState {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportState {
    pub fn new() -> Self {
        Self {
            loaded: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            position_bits: AtomicU64::new(0.0f64.to_bits()),
            length_samples: AtomicU64::new(0),
            sample_rate_bits: AtomicU64::new(0.0f64.to_bits()),
            gain_bits: AtomicU32::new(1.0f32.to_bits()),
            muted: AtomicBool::new(false),
            pre_mute_gain_bits: AtomicU32::new(1.0f32.to_bits()),
            speed_bits: AtomicU64::new(1.0f64.to_bits()),
            loop_whole: AtomicBool::new(false),
            ab_enabled: AtomicBool::new(false),
            point_a_bits: AtomicU64::new(UNSET_MARKER.to_bits()),
            point_b_bits: AtomicU64::new(UNSET_MARKER.to_bits()),
            seek_request_bits: AtomicU64::new(NO_SEEK),
        }
    }

    /// Install a fully prepared source. Called by `load_file` after the
    /// decoder opened successfully and the previous worker was shut down,
    /// so the pull path only ever observes the old or the new source.
    pub fn install_source(&self, length_samples: u64, sample_rate: f64) {
        self.playing.store(false, Ordering::SeqCst);
        self.finished.store(false, Ordering::SeqCst);
        self.length_samples.store(length_samples, Ordering::SeqCst);
        self.sample_rate_bits
            .store(sample_rate.to_bits(), Ordering::SeqCst);
        self.position_bits.store(0.0f64.to_bits(), Ordering::SeqCst);
        self.seek_request_bits.store(NO_SEEK, Ordering::SeqCst);
        // A-B points refer to the previous source's timeline
        self.ab_enabled.store(false, Ordering::SeqCst);
        self.point_a_bits
            .store(UNSET_MARKER.to_bits(), Ordering::SeqCst);
        self.point_b_bits
            .store(UNSET_MARKER.to_bits(), Ordering::SeqCst);
        self.loaded.store(true, Ordering::SeqCst);
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    // ---- play / pause -------------------------------------------------

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn set_finished(&self, finished: bool) {
        self.finished.store(finished, Ordering::SeqCst);
    }

    // ---- position -----------------------------------------------------

    pub fn position(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::SeqCst))
    }

    /// Direct position update from the decode worker; no clamping beyond
    /// the track length, no decoder seek.
    pub fn store_position(&self, seconds: f64) {
        let length = self.length_seconds();
        let clamped = if length > 0.0 {
            seconds.clamp(0.0, length)
        } else {
            seconds.max(0.0)
        };
        self.position_bits
            .store(clamped.to_bits(), Ordering::SeqCst);
    }

    /// Track length derived from the source's own sample count and rate,
    /// recomputed at call time rather than cached.
    pub fn length_seconds(&self) -> f64 {
        let rate = f64::from_bits(self.sample_rate_bits.load(Ordering::SeqCst));
        if rate > 0.0 {
            self.length_samples.load(Ordering::SeqCst) as f64 / rate
        } else {
            0.0
        }
    }

    /// Clamp `seconds` into `[0, length]` and move the cursor there. With a
    /// zero-length source the position is forced to 0; with no source loaded
    /// this is a no-op.
    pub fn set_position_safe(&self, seconds: f64) {
        if !self.is_loaded() || !seconds.is_finite() {
            return;
        }
        let length = self.length_seconds();
        let target = if length > 0.0 {
            seconds.clamp(0.0, length)
        } else {
            0.0
        };
        self.position_bits.store(target.to_bits(), Ordering::SeqCst);
        self.finished.store(false, Ordering::SeqCst);
        self.seek_request_bits
            .store(target.to_bits(), Ordering::SeqCst);
    }

    pub fn go_to_start(&self) {
        self.set_position_safe(0.0);
    }

    pub fn go_to_end(&self) {
        self.set_position_safe(self.length_seconds());
    }

    /// Skip forward by `delta` seconds; non-positive deltas are a no-op.
    pub fn skip_forward(&self, delta: f64) {
        if !(delta > 0.0) {
            return;
        }
        self.set_position_safe(self.position() + delta);
    }

    /// Skip backward by `delta` seconds; non-positive deltas are a no-op.
    pub fn skip_backward(&self, delta: f64) {
        if !(delta > 0.0) {
            return;
        }
        self.set_position_safe(self.position() - delta);
    }

    /// Consume a pending seek request, if any. Called once per worker
    /// iteration before producing audio.
    pub fn take_seek_request(&self) -> Option<f64> {
        let bits = self.seek_request_bits.swap(NO_SEEK, Ordering::SeqCst);
        if bits == NO_SEEK {
            None
        } else {
            Some(f64::from_bits(bits))
        }
    }

    pub fn has_seek_request(&self) -> bool {
        self.seek_request_bits.load(Ordering::SeqCst) != NO_SEEK
    }

    // ---- gain / mute --------------------------------------------------

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    /// Negative gains are clamped to 0.
    pub fn set_gain(&self, gain: f32) {
        let gain = if gain.is_finite() { gain.max(0.0) } else { 0.0 };
        self.gain_bits.store(gain.to_bits(), Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Mute saves the current gain and drops it to 0; unmute restores the
    /// saved value exactly.
    pub fn toggle_mute(&self) {
        if self.is_muted() {
            let saved = self.pre_mute_gain_bits.load(Ordering::SeqCst);
            self.gain_bits.store(saved, Ordering::SeqCst);
            self.muted.store(false, Ordering::SeqCst);
        } else {
            let current = self.gain_bits.load(Ordering::SeqCst);
            self.pre_mute_gain_bits.store(current, Ordering::SeqCst);
            self.gain_bits.store(0.0f32.to_bits(), Ordering::SeqCst);
            self.muted.store(true, Ordering::SeqCst);
        }
    }

    // ---- speed --------------------------------------------------------

    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::SeqCst))
    }

    /// Update the resampling ratio. Zero, negative, or non-finite ratios
    /// are ignored; the change takes effect on the next pulled block.
    pub fn set_speed(&self, ratio: f64) {
        if !(ratio > 0.0) || !ratio.is_finite() {
            return;
        }
        self.speed_bits.store(ratio.to_bits(), Ordering::SeqCst);
    }

    // ---- looping ------------------------------------------------------

    pub fn loop_whole(&self) -> bool {
        self.loop_whole.load(Ordering::SeqCst)
    }

    pub fn set_loop_whole(&self, enabled: bool) {
        self.loop_whole.store(enabled, Ordering::SeqCst);
    }

    pub fn point_a(&self) -> Option<f64> {
        let v = f64::from_bits(self.point_a_bits.load(Ordering::SeqCst));
        (v >= 0.0).then_some(v)
    }

    pub fn point_b(&self) -> Option<f64> {
        let v = f64::from_bits(self.point_b_bits.load(Ordering::SeqCst));
        (v >= 0.0).then_some(v)
    }

    /// Capture the current position as loop point A.
    pub fn set_point_a(&self) {
        self.point_a_bits
            .store(self.position().to_bits(), Ordering::SeqCst);
    }

    /// Capture the current position as loop point B.
    pub fn set_point_b(&self) {
        self.point_b_bits
            .store(self.position().to_bits(), Ordering::SeqCst);
    }

    pub fn ab_enabled(&self) -> bool {
        self.ab_enabled.load(Ordering::SeqCst)
    }

    /// Enable the A-B loop. Requires `a >= 0` and `b > a`; otherwise the
    /// enabled flag is left untouched and the caller gets
    /// `PlayerError::InvalidLoopRegion`.
    pub fn enable_ab_loop(&self) -> Result<(), PlayerError> {
        let a = f64::from_bits(self.point_a_bits.load(Ordering::SeqCst));
        let b = f64::from_bits(self.point_b_bits.load(Ordering::SeqCst));
        if a >= 0.0 && b > a {
            self.ab_enabled.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(PlayerError::InvalidLoopRegion { a, b })
        }
    }

    pub fn disable_ab_loop(&self) {
        self.ab_enabled.store(false, Ordering::SeqCst);
    }

    /// If the A-B loop is armed and `position` has reached point B, returns
    /// point A as the wrap target. Checked every worker iteration before
    /// end-of-stream handling, so an A-B region ending exactly at the track
    /// end wins over the whole-track loop.
    pub fn ab_wrap_target(&self, position: f64) -> Option<f64> {
        if !self.ab_enabled() {
            return None;
        }
        let a = f64::from_bits(self.point_a_bits.load(Ordering::SeqCst));
        let b = f64::from_bits(self.point_b_bits.load(Ordering::SeqCst));
        (a >= 0.0 && b > a && position >= b).then_some(a)
    }

    // ---- snapshot -----------------------------------------------------

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            position: self.position(),
            length: self.length_seconds(),
            playing: self.is_playing(),
            finished: self.is_finished(),
            gain: self.gain(),
            muted: self.is_muted(),
            speed: self.speed(),
            loop_whole: self.loop_whole(),
            ab_enabled: self.ab_enabled(),
            point_a: self.point_a(),
            point_b: self.point_b(),
        }
    }
}
