// Playlist sequencing
// Thin ordering layer over the transport: tracks which file is "current"
// and steps forward/backward. It never touches playback itself; the shell
// forwards the selected path to `Player::load_file`.
use std::path::{Path, PathBuf};

use crate::track;

#[derive(Debug, Default)]
pub struct Playlist {
    entries: Vec<PathBuf>,
    current: Option<usize>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file if its extension is one the player accepts.
    /// Returns false (and keeps the list unchanged) otherwise.
    pub fn add(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if !track::is_supported(&path) {
            log::debug!("rejected unsupported file {:?}", path);
            return false;
        }
        self.entries.push(path);
        if self.current.is_none() {
            self.current = Some(0);
        }
        true
    }

    /// Append every supported file, returning how many were accepted.
    pub fn add_all<I, P>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut added = 0;
        for path in paths {
            if self.add(path) {
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn current(&self) -> Option<&Path> {
        self.current.map(|i| self.entries[i].as_path())
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Jump to an entry by index, returning its path.
    pub fn select(&mut self, index: usize) -> Option<&Path> {
        if index < self.entries.len() {
            self.current = Some(index);
            self.current()
        } else {
            None
        }
    }

    /// Advance to the next entry; None (current unchanged) at the end.
    pub fn next(&mut self) -> Option<&Path> {
        match self.current {
            Some(i) if i + 1 < self.entries.len() => {
                self.current = Some(i + 1);
                self.current()
            }
            _ => None,
        }
    }

    /// Step back to the previous entry; None (current unchanged) at the
    /// start.
    pub fn prev(&mut self) -> Option<&Path> {
        match self.current {
            Some(i) if i > 0 => {
                self.current = Some(i - 1);
                self.current()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_filters_by_extension() {
        let mut pl = Playlist::new();
        assert!(pl.add("a.wav"));
        assert!(pl.add("b.mp3"));
        assert!(pl.add("c.flac"));
        assert!(!pl.add("d.ogg"));
        assert!(!pl.add("e.txt"));
        assert_eq!(pl.len(), 3);
    }

    #[test]
    fn test_first_add_becomes_current() {
        let mut pl = Playlist::new();
        assert_eq!(pl.current(), None);
        pl.add("a.wav");
        pl.add("b.wav");
        assert_eq!(pl.current(), Some(Path::new("a.wav")));
    }

    #[test]
    fn test_next_prev_clamp_at_ends() {
        let mut pl = Playlist::new();
        pl.add("a.wav");
        pl.add("b.wav");
        pl.add("c.wav");

        assert_eq!(pl.prev(), None);
        assert_eq!(pl.next(), Some(Path::new("b.wav")));
        assert_eq!(pl.next(), Some(Path::new("c.wav")));
        assert_eq!(pl.next(), None);
        assert_eq!(pl.current(), Some(Path::new("c.wav")));
        assert_eq!(pl.prev(), Some(Path::new("b.wav")));
    }

    #[test]
    fn test_select_out_of_range() {
        let mut pl = Playlist::new();
        pl.add("a.wav");
        assert_eq!(pl.select(5), None);
        assert_eq!(pl.select(0), Some(Path::new("a.wav")));
    }
}
