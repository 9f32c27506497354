// Audio playback module
// Uses Symphonia for decoding, rubato for speed/rate conversion, and cpal
// for output
pub mod decoder;
pub mod engine;
pub mod output;
pub mod resampler;
