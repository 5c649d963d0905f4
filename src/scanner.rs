//! # Library Scanner
//!
//! Walks a directory tree, reads tags from every supported audio file and
//! catalogues the results.
//!
//! Tag reading runs in parallel; inserts happen afterwards in a single
//! transaction. Files that cannot be probed are skipped with a debug log.

use crate::config;
use crate::db::{MusicStore, NewTrack};
use anyhow::{Context, Result};
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, Tag};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

lazy_static::lazy_static! {
    /// Lowercase extensions the scanner picks up.
    static ref SUPPORTED_EXTENSIONS: HashSet<&'static str> =
        ["mp3", "flac", "wav", "m4a", "ogg"].into_iter().collect();
}

/// Tags read from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    /// Whole seconds.
    pub duration: u32,
    /// Lowercase extension.
    pub format: String,
}

/// Outcome of a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Supported files whose tags could be read.
    pub catalogued: usize,
    /// Of those, how many were not in the store before.
    pub added: usize,
    /// Supported files that could not be read.
    pub skipped: usize,
}

/// Whether `path` has one of the supported audio extensions (any case).
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(ext.to_lowercase().as_str()))
}

/// Read tags and duration from `path`. Returns `None` if the file cannot be
/// probed as audio.
pub fn extract_metadata(path: &Path) -> Option<TrackMetadata> {
    match read_tags(path) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            debug!("Skipping {}: {e:#}", path.display());
            None
        }
    }
}

fn read_tags(path: &Path) -> Result<TrackMetadata> {
    let tagged_file = Probe::open(path)
        .context("Failed to open file for probing")?
        .read()
        .context("Failed to read file metadata")?;

    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag());

    let text = |value: Option<std::borrow::Cow<'_, str>>| {
        value
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    Ok(TrackMetadata {
        title: tag.and_then(|t| text(t.title())),
        artist: tag.and_then(|t| text(t.artist())),
        album: tag.and_then(|t| text(t.album())),
        year: tag.and_then(tag_year),
        genre: tag.and_then(|t| text(t.genre())),
        duration: u32::try_from(tagged_file.properties().duration().as_secs()).unwrap_or(u32::MAX),
        format,
    })
}

fn tag_year(tag: &Tag) -> Option<i32> {
    if let Some(year) = tag.year().and_then(|y| i32::try_from(y).ok()).filter(|y| *y > 0) {
        return Some(year);
    }
    tag.get_string(&ItemKey::RecordingDate)
        .or_else(|| tag.get_string(&ItemKey::OriginalReleaseDate))
        .and_then(first_year)
}

/// First run of four ASCII digits in `text`, e.g. `"2004-03-01"` -> 2004.
pub fn first_year(text: &str) -> Option<i32> {
    let bytes = text.as_bytes();
    bytes
        .windows(4)
        .position(|w| w.iter().all(u8::is_ascii_digit))
        .and_then(|start| text.get(start..start + 4))
        .and_then(|digits| digits.parse().ok())
}

/// Turn extracted tags into an insertable record. The title falls back to
/// the file stem.
pub fn to_new_track(path: &Path, metadata: TrackMetadata) -> NewTrack {
    let title = metadata.title.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    NewTrack {
        file_path: path.to_string_lossy().into_owned(),
        title,
        artist: metadata.artist,
        album: metadata.album,
        year: metadata.year,
        genre: metadata.genre,
        duration: Some(metadata.duration),
        format: Some(metadata.format).filter(|f| !f.is_empty()),
    }
}

/// All supported audio files under `dir`, as absolute paths, in walk order.
pub fn find_audio_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let root = config::absolute(dir)?;
    let files = WalkDir::new(&root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Cannot read directory entry: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_supported(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    Ok(files)
}

/// Scan `dir` recursively and catalogue every readable audio file.
///
/// A missing directory is not an error; it yields an empty report.
///
/// # Errors
///
/// Returns an error if the store rejects the inserts.
pub fn scan_directory(store: &mut MusicStore, dir: &Path) -> Result<ScanReport> {
    if !dir.is_dir() {
        warn!("Music directory does not exist: {}", dir.display());
        return Ok(ScanReport::default());
    }

    info!("Scanning music directory {}", dir.display());
    let files = find_audio_files(dir)?;

    let tracks: Vec<NewTrack> = files
        .par_iter()
        .filter_map(|path| extract_metadata(path).map(|m| to_new_track(path, m)))
        .collect();

    let added = store
        .add_tracks(&tracks)
        .context("Failed to store scanned tracks")?;

    let report = ScanReport {
        catalogued: tracks.len(),
        added,
        skipped: files.len() - tracks.len(),
    };
    info!(
        "Scan finished: {} catalogued, {} new, {} unreadable",
        report.catalogued, report.added, report.skipped
    );
    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Minimal PCM WAV: mono, 8 kHz, 16-bit, `seconds` of silence.
    pub(crate) fn write_wav(path: &Path, seconds: u32) {
        let sample_rate: u32 = 8_000;
        let data_len = sample_rate * 2 * seconds;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(44 + data_len as usize, 0);
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_is_supported() {
        assert!(is_supported(Path::new("a/b/song.mp3")));
        assert!(is_supported(Path::new("LOUD.FLAC")));
        assert!(is_supported(Path::new("x.m4a")));
        assert!(!is_supported(Path::new("notes.txt")));
        assert!(!is_supported(Path::new("no_extension")));
    }

    #[test]
    fn test_first_year() {
        assert_eq!(first_year("2004-03-01"), Some(2004));
        assert_eq!(first_year("Released in 1987"), Some(1987));
        assert_eq!(first_year("87"), None);
        assert_eq!(first_year(""), None);
    }

    #[test]
    fn test_title_falls_back_to_stem() {
        let track = to_new_track(
            Path::new("/music/Some Song.flac"),
            TrackMetadata {
                format: "flac".to_string(),
                duration: 12,
                ..TrackMetadata::default()
            },
        );
        assert_eq!(track.title, "Some Song");
        assert_eq!(track.format.as_deref(), Some("flac"));
        assert_eq!(track.duration, Some(12));
    }

    #[test]
    fn test_find_audio_files_filters_and_recurses() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.mp3"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("B.OGG"), b"").unwrap();

        let files = find_audio_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.mp3", "B.OGG"]);
        assert!(files.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn test_scan_catalogues_readable_files() {
        let dir = TempDir::new().unwrap();
        write_wav(&dir.path().join("first.wav"), 2);
        write_wav(&dir.path().join("second.wav"), 1);
        fs::write(dir.path().join("broken.mp3"), b"not audio").unwrap();

        let mut store = MusicStore::open_in_memory().unwrap();
        let report = scan_directory(&mut store, dir.path()).unwrap();
        assert_eq!(report.catalogued, 2);
        assert_eq!(report.added, 2);
        assert_eq!(report.skipped, 1);

        let first = store.search(crate::db::SearchField::Title, "first", None).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].format.as_deref(), Some("wav"));
        assert_eq!(first[0].duration, Some(2));

        let again = scan_directory(&mut store, dir.path()).unwrap();
        assert_eq!(again.catalogued, 2);
        assert_eq!(again.added, 0);
        assert_eq!(store.track_count().unwrap(), 2);
    }

    #[test]
    fn test_missing_directory_yields_empty_report() {
        let mut store = MusicStore::open_in_memory().unwrap();
        let report = scan_directory(&mut store, Path::new("/definitely/not/here")).unwrap();
        assert_eq!(report, ScanReport::default());
    }
}
