// Audio output using cpal
// The device callback pops samples from a ring buffer, applies the shared
// gain scalar, and falls back to silence when the transport is not playing.
// It never locks, allocates, or waits on the control thread.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

use crate::error::PlayerError;
use crate::transport::TransportState;

// ~100ms of stereo audio at 48kHz. The position cursor advances as blocks
// are queued, so the buffer depth bounds how far it can run ahead of what
// is audible.
const RING_BUFFER_SIZE: usize = 48000 * 2 / 10;

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

pub struct AudioOutput {
    _stream: Stream,
    // Only the decode worker writes; the mutex just keeps AudioOutput Sync.
    producer: Mutex<RingProducer>,
    sample_rate: u32,
    channels: u16,
    clear_flag: Arc<AtomicBool>,
}

// SAFETY: `_stream` is the only !Send/!Sync field; it is never accessed after
// construction and is held only to keep the device stream alive. Every other
// field is Send + Sync (the producer sits behind a mutex).
unsafe impl Send for AudioOutput {}
unsafe impl Sync for AudioOutput {}

impl AudioOutput {
    /// Open the default output device and start its stream. The stream runs
    /// for the lifetime of the AudioOutput and survives track changes.
    pub fn new(state: Arc<TransportState>) -> Result<Self, PlayerError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::Output("no output device available".to_string()))?;

        let config = device
            .default_output_config()
            .map_err(|e| PlayerError::Output(format!("failed to get output config: {}", e)))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        let rb = HeapRb::<f32>::new(RING_BUFFER_SIZE);
        let (producer, consumer) = rb.split();

        let clear_flag = Arc::new(AtomicBool::new(false));
        let clear_flag_cb = clear_flag.clone();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.into(), consumer, state, clear_flag_cb)?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.into(), consumer, state, clear_flag_cb)?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.into(), consumer, state, clear_flag_cb)?
            }
            format => {
                return Err(PlayerError::Output(format!(
                    "unsupported sample format: {:?}",
                    format
                )))
            }
        };

        stream
            .play()
            .map_err(|e| PlayerError::Output(format!("failed to start stream: {}", e)))?;

        Ok(Self {
            _stream: stream,
            producer: Mutex::new(producer),
            sample_rate,
            channels,
            clear_flag,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        mut consumer: RingConsumer,
        state: Arc<TransportState>,
        clear_flag: Arc<AtomicBool>,
    ) -> Result<Stream, PlayerError> {
        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // Drop queued audio that a seek or stop made stale.
                    // Checked before the playing gate so a seek issued while
                    // paused still flushes the buffer.
                    if clear_flag.swap(false, Ordering::SeqCst) {
                        while consumer.try_pop().is_some() {}
                    }

                    if !state.is_playing() {
                        for sample in data.iter_mut() {
                            *sample = T::from_sample(0.0f32);
                        }
                        return;
                    }

                    let gain = state.gain();
                    for sample in data.iter_mut() {
                        let value = consumer.try_pop().unwrap_or(0.0) * gain;
                        *sample = T::from_sample(value);
                    }
                },
                move |err| {
                    log::warn!("audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::Output(format!("failed to build output stream: {}", e)))?;

        Ok(stream)
    }

    /// Write samples to the output buffer, returning how many fit.
    pub fn write(&self, samples: &[f32]) -> usize {
        let mut producer = self.producer.lock();
        let mut written = 0;

        for &sample in samples {
            if producer.try_push(sample).is_ok() {
                written += 1;
            } else {
                break;
            }
        }

        written
    }

    /// Write all samples, waiting for the callback to drain the buffer.
    /// Gives up when `keep_going` turns false (shutdown or a pending seek
    /// that makes these samples stale).
    pub fn write_all(&self, samples: &[f32], keep_going: impl Fn() -> bool) {
        let mut remaining = samples;

        while !remaining.is_empty() {
            let written = self.write(remaining);
            remaining = &remaining[written..];
            if !remaining.is_empty() {
                if !keep_going() {
                    return;
                }
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        }
    }

    /// Flag the buffer for draining on the next callback (used on seek/stop).
    pub fn clear(&self) {
        self.clear_flag.store(true, Ordering::SeqCst);
    }

    /// Samples queued but not yet consumed by the callback.
    pub fn queued(&self) -> usize {
        self.producer.lock().occupied_len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}
