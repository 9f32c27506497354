// Track summary and tag reading using lofty with id3 fallback for
// problematic MP3 files
use std::path::Path;

use id3::TagLike;
use lofty::prelude::{Accessor, TaggedFileExt};
use lofty::probe::Probe;
use serde::Serialize;

/// Extensions the file-selection layer is allowed to offer.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "mp3", "flac"];

const UNKNOWN_ARTIST: &str = "Unknown Artist";
const UNKNOWN_ALBUM: &str = "Unknown Album";

/// Summary of one loaded audio source, handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Zero-padded `MM:SS`, floor semantics.
    pub duration_string: String,
    pub duration_seconds: f64,
    pub sample_rate: f64,
}

impl TrackInfo {
    /// Build the summary for a freshly opened source. Tags are read with
    /// lofty; empty or missing fields fall back to the filename stem for
    /// the title and fixed placeholders for artist/album.
    pub fn for_file(path: &Path, duration_seconds: f64, sample_rate: f64) -> Self {
        let tags = read_tags(path);

        let title = non_empty(tags.title).unwrap_or_else(|| file_stem(path));
        let artist = non_empty(tags.artist).unwrap_or_else(|| UNKNOWN_ARTIST.to_string());
        let album = non_empty(tags.album).unwrap_or_else(|| UNKNOWN_ALBUM.to_string());

        Self {
            title,
            artist,
            album,
            duration_string: format_duration(duration_seconds),
            duration_seconds,
            sample_rate,
        }
    }
}

/// Whether the file extension is one the player accepts (case-insensitive).
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.iter().any(|s| *s == e)
        })
        .unwrap_or(false)
}

/// Format a duration as zero-padded `MM:SS`.
/// Negative or non-finite inputs render as "00:00".
pub fn format_duration(total_seconds: f64) -> String {
    let total = if total_seconds.is_finite() && total_seconds > 0.0 {
        total_seconds
    } else {
        0.0
    };
    let minutes = (total / 60.0).floor() as u64;
    let seconds = (total % 60.0).floor() as u64;
    format!("{:02}:{:02}", minutes, seconds)
}

#[derive(Default)]
struct RawTags {
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
}

fn read_tags(path: &Path) -> RawTags {
    match read_tags_lofty(path) {
        Some(tags) => tags,
        None => {
            // Fallback: try the id3 crate for MP3 files, which is more
            // lenient with malformed tags
            let is_mp3 = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("mp3"))
                .unwrap_or(false);
            if is_mp3 {
                if let Some(tags) = read_tags_id3(path) {
                    log::debug!("read tags via id3 fallback for {:?}", path);
                    return tags;
                }
            }
            RawTags::default()
        }
    }
}

fn read_tags_lofty(path: &Path) -> Option<RawTags> {
    let tagged_file = Probe::open(path)
        .ok()?
        .guess_file_type()
        .ok()?
        .read()
        .map_err(|e| log::debug!("lofty failed to read {:?}: {}", path, e))
        .ok()?;

    let tag = tagged_file.primary_tag().or(tagged_file.first_tag())?;
    Some(RawTags {
        title: tag.title().map(|s| s.to_string()),
        artist: tag.artist().map(|s| s.to_string()),
        album: tag.album().map(|s| s.to_string()),
    })
}

fn read_tags_id3(path: &Path) -> Option<RawTags> {
    let tag = id3::Tag::read_from_path(path).ok()?;
    Some(RawTags {
        title: tag.title().map(|s| s.to_string()),
        artist: tag.artist().map(|s| s.to_string()),
        album: tag.album().map(|s| s.to_string()),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_duration_floor_and_padding() {
        assert_eq!(format_duration(125.4), "02:05");
        assert_eq!(format_duration(59.9), "00:59");
        assert_eq!(format_duration(0.0), "00:00");
    }

    #[test]
    fn test_duration_invalid_inputs() {
        assert_eq!(format_duration(-3.0), "00:00");
        assert_eq!(format_duration(f64::NAN), "00:00");
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported(&PathBuf::from("a.wav")));
        assert!(is_supported(&PathBuf::from("b.MP3")));
        assert!(is_supported(&PathBuf::from("c.flac")));
        assert!(!is_supported(&PathBuf::from("d.ogg")));
        assert!(!is_supported(&PathBuf::from("noextension")));
    }

    #[test]
    fn test_metadata_fallbacks_for_untagged_file() {
        // Not an audio file at all, so every tag reader fails and the
        // fallback rules apply.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evening jam.wav");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"not really audio").unwrap();

        let info = TrackInfo::for_file(&path, 12.0, 44100.0);
        assert_eq!(info.title, "evening jam");
        assert_eq!(info.artist, "Unknown Artist");
        assert_eq!(info.album, "Unknown Album");
        assert_eq!(info.duration_string, "00:12");
    }
}
