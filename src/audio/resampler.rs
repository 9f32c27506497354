// Speed and device-rate conversion using rubato
//
// One FastFixedIn instance covers both concerns: the base ratio converts the
// source rate to the device rate, and the playback speed divides into it.
// Linear interpolation is intentional: speed changes shift pitch, there is
// no pitch correction.
use std::collections::VecDeque;

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::error::PlayerError;

const CHUNK_FRAMES: usize = 1024;

/// Supported playback speed range.
const MIN_SPEED: f64 = 1.0 / 16.0;
const MAX_SPEED: f64 = 16.0;

/// rubato only accepts ratio updates within this factor of the construction
/// ratio; kept wider than the speed range so the extremes stay valid.
const MAX_RATIO_RELATIVE: f64 = 32.0;

pub struct SpeedResampler {
    inner: FastFixedIn<f32>,
    base_ratio: f64,
    speed: f64,
    channels: usize,
    /// Interleaved input waiting for a full resampler chunk.
    pending: VecDeque<f32>,
}

impl SpeedResampler {
    pub fn new(source_rate: f64, device_rate: f64, channels: usize) -> Result<Self, PlayerError> {
        if source_rate <= 0.0 || device_rate <= 0.0 || channels == 0 {
            return Err(PlayerError::Output(format!(
                "invalid resampler config: {} Hz -> {} Hz, {} channels",
                source_rate, device_rate, channels
            )));
        }

        let base_ratio = device_rate / source_rate;
        let inner = FastFixedIn::new(
            base_ratio,
            MAX_RATIO_RELATIVE,
            PolynomialDegree::Linear,
            CHUNK_FRAMES,
            channels,
        )
        .map_err(|e| PlayerError::Output(format!("failed to create resampler: {}", e)))?;

        Ok(Self {
            inner,
            base_ratio,
            speed: 1.0,
            channels,
            pending: VecDeque::new(),
        })
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Apply a new playback speed. Takes effect on the next processed chunk.
    /// The value is clamped to the range the resampler was built for.
    pub fn set_speed(&mut self, speed: f64) {
        let clamped = speed.clamp(MIN_SPEED, MAX_SPEED);
        if (clamped - self.speed).abs() < f64::EPSILON {
            return;
        }
        // Faster playback consumes source frames quicker, so the output
        // ratio shrinks as speed grows.
        let ratio = self.base_ratio / clamped;
        if let Err(e) = self.inner.set_resample_ratio(ratio, true) {
            log::warn!("resampler rejected ratio {}: {}", ratio, e);
            return;
        }
        self.speed = clamped;
    }

    /// Feed interleaved source samples, returning interleaved output at the
    /// device rate and current speed. Input that does not fill a whole chunk
    /// is buffered until the next call.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, PlayerError> {
        if input.len() % self.channels != 0 {
            return Err(PlayerError::Output(format!(
                "input of {} samples is not a multiple of {} channels",
                input.len(),
                self.channels
            )));
        }

        self.pending.extend(input.iter().copied());

        let mut output = Vec::new();
        loop {
            let needed_frames = self.inner.input_frames_next();
            let needed_samples = needed_frames * self.channels;
            if self.pending.len() < needed_samples {
                break;
            }

            let chunk: Vec<f32> = self.pending.drain(..needed_samples).collect();
            let planar = deinterleave(&chunk, self.channels, needed_frames);

            let resampled = self
                .inner
                .process(&planar, None)
                .map_err(|e| PlayerError::Output(format!("resampling failed: {}", e)))?;

            interleave_into(&resampled, &mut output);
        }

        Ok(output)
    }

    /// Drop buffered input and filter state. Called after a discontinuous
    /// seek; loop wraps skip this so the seam stays gapless.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.inner.reset();
    }
}

fn deinterleave(interleaved: &[f32], channels: usize, frames: usize) -> Vec<Vec<f32>> {
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in 0..frames {
        for ch in 0..channels {
            planar[ch].push(interleaved[frame * channels + ch]);
        }
    }
    planar
}

fn interleave_into(planar: &[Vec<f32>], out: &mut Vec<f32>) {
    if planar.is_empty() {
        return;
    }
    let frames = planar[0].len();
    out.reserve(frames * planar.len());
    for frame in 0..frames {
        for plane in planar {
            out.push(plane[frame]);
        }
    }
}
