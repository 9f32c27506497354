// Sample-accurate source reader built on Symphonia
// Decodes audio files to interleaved f32 PCM
use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::{AudioBufferRef, AudioPlanes, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use symphonia::core::units::Time;

use crate::error::PlayerError;

pub struct SourceReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    path: PathBuf,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    length_samples: Option<u64>,
}

impl std::fmt::Debug for SourceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceReader")
            .field("path", &self.path)
            .field("track_id", &self.track_id)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("length_samples", &self.length_samples)
            .finish_non_exhaustive()
    }
}

impl SourceReader {
    /// Open an audio file and prepare for decoding. The reader is fully
    /// constructed before it is handed to the playback worker, so a failure
    /// here never disturbs a source that is already installed.
    pub fn open(path: &Path) -> Result<Self, PlayerError> {
        let file = File::open(path).map_err(|e| PlayerError::Decode {
            path: path.to_path_buf(),
            reason: format!("failed to open file: {}", e),
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint using the file extension
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        // Probe the media source
        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| PlayerError::Decode {
                path: path.to_path_buf(),
                reason: format!("unsupported or corrupt format: {}", e),
            })?;

        let format = probed.format;

        // Find the first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| PlayerError::Decode {
                path: path.to_path_buf(),
                reason: "no audio track found".to_string(),
            })?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);
        let length_samples = track.codec_params.n_frames;

        // Create decoder for the track
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| PlayerError::Decode {
                path: path.to_path_buf(),
                reason: format!("failed to create decoder: {}", e),
            })?;

        Ok(Self {
            format,
            decoder,
            path: path.to_path_buf(),
            track_id,
            sample_rate,
            channels,
            length_samples,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total frame count as reported by the container, if known.
    pub fn length_samples(&self) -> Option<u64> {
        self.length_samples
    }

    /// Track length in seconds, 0.0 when unknown.
    pub fn length_seconds(&self) -> f64 {
        match (self.length_samples, self.sample_rate) {
            (Some(frames), rate) if rate > 0 => frames as f64 / rate as f64,
            _ => 0.0,
        }
    }

    /// Decode the next packet, returning interleaved f32 samples.
    /// Returns None when the end of the stream is reached.
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>, PlayerError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None); // End of stream
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    return Err(PlayerError::Decode {
                        path: self.path.clone(),
                        reason: format!("failed to read packet: {}", e),
                    })
                }
            };

            // Skip packets from other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    return Ok(Some(Self::audio_buf_to_f32(&decoded)));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt packets are skipped, not fatal
                    log::warn!("decode error (skipping packet): {}", e);
                    continue;
                }
                Err(e) => {
                    return Err(PlayerError::Decode {
                        path: self.path.clone(),
                        reason: format!("decode failed: {}", e),
                    })
                }
            }
        }
    }

    /// Seek to a position in seconds, returning the position actually
    /// reached (coarse seeks land on a packet boundary).
    pub fn seek(&mut self, seconds: f64) -> Result<f64, PlayerError> {
        let seconds = seconds.max(0.0);
        let time = Time::new(seconds as u64, seconds.fract());

        let seeked_to = self
            .format
            .seek(
                SeekMode::Coarse,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| PlayerError::Decode {
                path: self.path.clone(),
                reason: format!("seek failed: {}", e),
            })?;

        // Decoder state is stale after a seek
        self.decoder.reset();

        Ok(seeked_to.actual_ts as f64 / self.sample_rate as f64)
    }

    /// Convert any AudioBufferRef to interleaved f32 samples
    fn audio_buf_to_f32(buf: &AudioBufferRef) -> Vec<f32> {
        match buf {
            AudioBufferRef::F32(b) => Self::interleave(b.planes(), b.frames(), |s: f32| s),
            AudioBufferRef::F64(b) => Self::interleave(b.planes(), b.frames(), |s: f64| s as f32),
            AudioBufferRef::S8(b) => {
                Self::interleave(b.planes(), b.frames(), |s: i8| s as f32 / 128.0)
            }
            AudioBufferRef::S16(b) => {
                Self::interleave(b.planes(), b.frames(), |s: i16| s as f32 / 32768.0)
            }
            AudioBufferRef::S24(b) => {
                Self::interleave(b.planes(), b.frames(), |s| s.inner() as f32 / 8388608.0)
            }
            AudioBufferRef::S32(b) => {
                Self::interleave(b.planes(), b.frames(), |s: i32| s as f32 / 2147483648.0)
            }
            AudioBufferRef::U8(b) => {
                Self::interleave(b.planes(), b.frames(), |s: u8| (s as f32 - 128.0) / 128.0)
            }
            AudioBufferRef::U16(b) => Self::interleave(b.planes(), b.frames(), |s: u16| {
                (s as f32 - 32768.0) / 32768.0
            }),
            AudioBufferRef::U24(b) => Self::interleave(b.planes(), b.frames(), |s| {
                (s.inner() as f32 - 8388608.0) / 8388608.0
            }),
            AudioBufferRef::U32(b) => Self::interleave(b.planes(), b.frames(), |s: u32| {
                ((s as f64 - 2147483648.0) / 2147483648.0) as f32
            }),
        }
    }

    fn interleave<T: Sample + Copy, F: Fn(T) -> f32>(
        planes: AudioPlanes<T>,
        frames: usize,
        convert: F,
    ) -> Vec<f32> {
        let num_channels = planes.planes().len();
        if num_channels == 0 || frames == 0 {
            return vec![];
        }

        let mut interleaved = Vec::with_capacity(frames * num_channels);
        for frame in 0..frames {
            for ch in 0..num_channels {
                interleaved.push(convert(planes.planes()[ch][frame]));
            }
        }
        interleaved
    }
}
