// Decode worker: the periodic pull that feeds the output ring buffer
//
// One worker per installed source. Each iteration consumes any pending seek,
// evaluates the A-B wrap, then decodes, resamples, and pushes one block,
// advancing the shared position cursor. Pausing parks the worker; the output
// callback keeps running and emits silence.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::decoder::SourceReader;
use crate::audio::output::AudioOutput;
use crate::audio::resampler::SpeedResampler;
use crate::error::PlayerError;
use crate::transport::TransportState;

const IDLE_SLEEP: Duration = Duration::from_millis(5);

/// Where the worker pulls decoded frames from. `SourceReader` in production;
/// the indirection lets the step logic run against canned sources.
pub(crate) trait PcmSource {
    fn decode_next(&mut self) -> Result<Option<Vec<f32>>, PlayerError>;
    fn seek(&mut self, seconds: f64) -> Result<f64, PlayerError>;
}

impl PcmSource for SourceReader {
    fn decode_next(&mut self) -> Result<Option<Vec<f32>>, PlayerError> {
        SourceReader::decode_next(self)
    }

    fn seek(&mut self, seconds: f64) -> Result<f64, PlayerError> {
        SourceReader::seek(self, seconds)
    }
}

/// Where the worker pushes resampled frames to.
pub(crate) trait SampleSink {
    /// Block until every sample is queued or `keep_going` turns false.
    fn push(&self, samples: &[f32], keep_going: &dyn Fn() -> bool);
    /// Throw away queued samples a seek or stop made stale.
    fn discard_queued(&self);
    /// Block until the queue has played out or `keep_going` turns false.
    fn drain(&self, keep_going: &dyn Fn() -> bool);
}

impl SampleSink for AudioOutput {
    fn push(&self, samples: &[f32], keep_going: &dyn Fn() -> bool) {
        self.write_all(samples, keep_going);
    }

    fn discard_queued(&self) {
        self.clear();
    }

    fn drain(&self, keep_going: &dyn Fn() -> bool) {
        while self.queued() > 0 && keep_going() {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

/// What a single worker iteration did, so the loop knows when to back off.
#[derive(Debug, PartialEq, Eq)]
enum StepOutcome {
    /// Paused, nothing to do.
    Idle,
    /// Decoded and queued a block.
    Played,
    /// End of stream with the whole-track loop on; wrapped to 0 and kept
    /// playing.
    Looped,
    /// End of stream (or a decode failure) stopped playback.
    Finished,
}

pub struct Engine {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Engine {
    /// Spawn the worker for a fully opened source. The source is moved in,
    /// so the control thread can never observe it half-swapped.
    pub fn spawn(
        decoder: SourceReader,
        state: Arc<TransportState>,
        output: Arc<AudioOutput>,
    ) -> Result<Self, PlayerError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let thread = thread::Builder::new()
            .name("playhead-decode".to_string())
            .spawn(move || run_worker(decoder, state, output, flag))
            .map_err(|e| PlayerError::Output(format!("failed to spawn decode thread: {}", e)))?;

        Ok(Self {
            shutdown,
            thread: Some(thread),
        })
    }

    /// Signal the worker and wait for it to exit. The joined worker holds
    /// the only reference to the old source, so after this returns the
    /// source is released.
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker(
    mut decoder: SourceReader,
    state: Arc<TransportState>,
    output: Arc<AudioOutput>,
    shutdown: Arc<AtomicBool>,
) {
    let source_rate = decoder.sample_rate() as f64;
    let source_channels = decoder.channels();
    let device_channels = output.channels() as usize;

    let mut resampler = match SpeedResampler::new(
        source_rate,
        output.sample_rate() as f64,
        device_channels,
    ) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("cannot start playback worker: {}", e);
            state.set_playing(false);
            return;
        }
    };

    while !shutdown.load(Ordering::SeqCst) {
        let keep_going = || !shutdown.load(Ordering::SeqCst) && !state.has_seek_request();
        let outcome = worker_step(
            &mut decoder,
            &state,
            output.as_ref(),
            &mut resampler,
            source_rate,
            source_channels,
            device_channels,
            &keep_going,
        );
        if outcome == StepOutcome::Idle {
            thread::sleep(IDLE_SLEEP);
        }
    }
}

/// One worker iteration: seek intake, pause gate, A-B wrap, then one
/// decode-resample-push round or the end-of-stream transition.
#[allow(clippy::too_many_arguments)]
fn worker_step<S: PcmSource>(
    decoder: &mut S,
    state: &TransportState,
    sink: &dyn SampleSink,
    resampler: &mut SpeedResampler,
    source_rate: f64,
    source_channels: usize,
    device_channels: usize,
    keep_going: &dyn Fn() -> bool,
) -> StepOutcome {
    // Seeks are honored even while paused so the cursor lands before
    // the next play.
    if let Some(target) = state.take_seek_request() {
        match decoder.seek(target) {
            // Coarse seeks land on a packet boundary; the cursor keeps
            // the requested value so the UI shows what was asked for.
            Ok(_) => state.store_position(target),
            Err(e) => log::warn!("seek to {:.3}s failed: {}", target, e),
        }
        resampler.reset();
        sink.discard_queued();
    }

    if !state.is_playing() {
        return StepOutcome::Idle;
    }

    // A-B wrap is checked before decoding, so it beats the whole-track
    // loop when point B sits at the very end of the source.
    if let Some(target) = state.ab_wrap_target(state.position()) {
        if let Err(e) = decoder.seek(target) {
            log::warn!("A-B wrap seek failed: {}", e);
        }
        // Force the cursor to point A exactly; the coarse decoder seek
        // may land slightly earlier. No queue discard: the region repeats
        // without an audible gap or a stop transition.
        state.store_position(target);
    }

    resampler.set_speed(state.speed());

    match decoder.decode_next() {
        Ok(Some(block)) => {
            if block.is_empty() {
                return StepOutcome::Played;
            }
            let frames = block.len() / source_channels;
            let adapted = adapt_channels(&block, source_channels, device_channels);
            match resampler.process(&adapted) {
                Ok(resampled) => sink.push(&resampled, keep_going),
                Err(e) => log::warn!("resampling block failed: {}", e),
            }
            state.store_position(state.position() + frames as f64 / source_rate);
            StepOutcome::Played
        }
        Ok(None) => {
            // True end of stream
            if state.loop_whole() {
                match decoder.seek(0.0) {
                    Ok(_) => {
                        state.store_position(0.0);
                        StepOutcome::Looped
                    }
                    Err(e) => {
                        log::warn!("loop restart seek failed: {}", e);
                        state.set_playing(false);
                        state.set_finished(true);
                        StepOutcome::Finished
                    }
                }
            } else {
                state.store_position(state.length_seconds());
                // Let the queued tail play out before the stop transition;
                // a pause, seek, or shutdown aborts the wait.
                sink.drain(&|| state.is_playing() && keep_going());
                state.set_playing(false);
                state.set_finished(true);
                StepOutcome::Finished
            }
        }
        Err(e) => {
            log::warn!("decoding stopped: {}", e);
            state.set_playing(false);
            state.set_finished(true);
            StepOutcome::Finished
        }
    }
}

/// Map source frames onto the device channel layout with a simple
/// copy/repeat strategy (mono to stereo duplicates, extra channels drop).
fn adapt_channels(input: &[f32], in_channels: usize, out_channels: usize) -> Vec<f32> {
    if in_channels == out_channels || in_channels == 0 || out_channels == 0 {
        return input.to_vec();
    }

    let frames = input.len() / in_channels;
    let mut out = vec![0.0f32; frames * out_channels];
    for frame in 0..frames {
        for ch in 0..out_channels {
            out[frame * out_channels + ch] = input[frame * in_channels + (ch % in_channels)];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicBool;

    /// Mono source producing fixed-size blocks until exhausted; a seek
    /// rewinds it to a full supply again.
    struct CannedSource {
        total_blocks: usize,
        remaining: usize,
        block_frames: usize,
        seeks: Vec<f64>,
    }

    impl CannedSource {
        fn new(blocks: usize, block_frames: usize) -> Self {
            Self {
                total_blocks: blocks,
                remaining: blocks,
                block_frames,
                seeks: Vec::new(),
            }
        }
    }

    impl PcmSource for CannedSource {
        fn decode_next(&mut self) -> Result<Option<Vec<f32>>, PlayerError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(vec![0.1; self.block_frames]))
        }

        fn seek(&mut self, seconds: f64) -> Result<f64, PlayerError> {
            self.seeks.push(seconds);
            self.remaining = self.total_blocks;
            Ok(seconds)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        pushed_samples: Mutex<usize>,
        discarded: AtomicBool,
        drained: AtomicBool,
    }

    impl SampleSink for RecordingSink {
        fn push(&self, samples: &[f32], _keep_going: &dyn Fn() -> bool) {
            *self.pushed_samples.lock() += samples.len();
        }

        fn discard_queued(&self) {
            self.discarded.store(true, Ordering::SeqCst);
        }

        fn drain(&self, _keep_going: &dyn Fn() -> bool) {
            self.drained.store(true, Ordering::SeqCst);
        }
    }

    const RATE: f64 = 44100.0;

    fn loaded_state(length_seconds: f64) -> TransportState {
        let state = TransportState::new();
        state.install_source((length_seconds * RATE) as u64, RATE);
        state
    }

    fn step(
        source: &mut CannedSource,
        state: &TransportState,
        sink: &RecordingSink,
        resampler: &mut SpeedResampler,
    ) -> StepOutcome {
        worker_step(source, state, sink, resampler, RATE, 1, 1, &|| true)
    }

    #[test]
    fn test_end_of_stream_with_whole_loop_wraps_and_keeps_playing() {
        let state = loaded_state(1.0);
        state.set_loop_whole(true);
        state.set_playing(true);

        let mut source = CannedSource::new(2, 22050);
        let sink = RecordingSink::default();
        let mut resampler = SpeedResampler::new(RATE, RATE, 1).unwrap();

        assert_eq!(step(&mut source, &state, &sink, &mut resampler), StepOutcome::Played);
        assert_eq!(step(&mut source, &state, &sink, &mut resampler), StepOutcome::Played);
        assert!((state.position() - 1.0).abs() < 1e-9);

        assert_eq!(step(&mut source, &state, &sink, &mut resampler), StepOutcome::Looped);
        assert_eq!(state.position(), 0.0);
        assert!(state.is_playing());
        assert!(!state.is_finished());
        assert_eq!(source.seeks, vec![0.0]);

        // No stop transition: the next iteration decodes straight on
        assert_eq!(step(&mut source, &state, &sink, &mut resampler), StepOutcome::Played);
    }

    #[test]
    fn test_end_of_stream_without_loop_finishes_at_length() {
        let state = loaded_state(1.0);
        state.set_playing(true);

        let mut source = CannedSource::new(1, 4410);
        let sink = RecordingSink::default();
        let mut resampler = SpeedResampler::new(RATE, RATE, 1).unwrap();

        assert_eq!(step(&mut source, &state, &sink, &mut resampler), StepOutcome::Played);
        assert_eq!(step(&mut source, &state, &sink, &mut resampler), StepOutcome::Finished);

        assert_eq!(state.position(), 1.0);
        assert!(!state.is_playing());
        assert!(state.is_finished());
        // The queued tail plays out before the stop transition
        assert!(sink.drained.load(Ordering::SeqCst));
        assert!(source.seeks.is_empty());
    }

    #[test]
    fn test_ab_region_ending_at_track_end_beats_whole_loop() {
        let state = loaded_state(1.0);
        state.store_position(0.2);
        state.set_point_a();
        state.store_position(1.0);
        state.set_point_b();
        state.enable_ab_loop().unwrap();
        state.set_loop_whole(true);
        state.set_playing(true);

        // Exhausted decoder with the cursor at point B == track end: without
        // the wrap this iteration would hit end of stream.
        let mut source = CannedSource::new(1, 4410);
        source.remaining = 0;
        let sink = RecordingSink::default();
        let mut resampler = SpeedResampler::new(RATE, RATE, 1).unwrap();

        assert_eq!(step(&mut source, &state, &sink, &mut resampler), StepOutcome::Played);
        assert_eq!(source.seeks, vec![0.2]);
        assert!((state.position() - (0.2 + 4410.0 / RATE)).abs() < 1e-9);
        assert!(state.is_playing());
        assert!(!state.is_finished());
        // Gapless: the wrap must not throw queued audio away
        assert!(!sink.discarded.load(Ordering::SeqCst));
    }

    #[test]
    fn test_pending_seek_moves_decoder_and_flushes_queue() {
        let state = loaded_state(10.0);
        state.set_position_safe(4.0);

        let mut source = CannedSource::new(3, 4410);
        let sink = RecordingSink::default();
        let mut resampler = SpeedResampler::new(RATE, RATE, 1).unwrap();

        // Paused: the seek is consumed, stale audio dropped, nothing decoded
        assert_eq!(step(&mut source, &state, &sink, &mut resampler), StepOutcome::Idle);
        assert_eq!(source.seeks, vec![4.0]);
        assert_eq!(state.position(), 4.0);
        assert!(sink.discarded.load(Ordering::SeqCst));
        assert_eq!(*sink.pushed_samples.lock(), 0);
    }

    #[test]
    fn test_adapt_channels_mono_to_stereo() {
        let out = adapt_channels(&[0.1, 0.2, 0.3], 1, 2);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_adapt_channels_stereo_to_mono() {
        let out = adapt_channels(&[0.1, 0.2, 0.3, 0.4], 2, 1);
        assert_eq!(out, vec![0.1, 0.3]);
    }

    #[test]
    fn test_adapt_channels_identity() {
        let input = [0.5, -0.5, 0.25, -0.25];
        assert_eq!(adapt_channels(&input, 2, 2), input.to_vec());
    }
}
