//! # Database Module
//!
//! SQLite persistence for the music library. Three tables:
//!
//! - `music`: one row per audio file, keyed by its absolute path
//! - `play_history`: append-only play events
//! - `user_preference`: per-(category, value) play counters, see
//!   [`crate::preferences`]
//!
//! All queries go through [`MusicStore`], which owns the connection.

use anyhow::{Context, Result};
use log::{debug, trace};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS music (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path   TEXT    NOT NULL UNIQUE,
        title       TEXT    NOT NULL,
        artist      TEXT,
        album       TEXT,
        year        INTEGER,
        genre       TEXT,
        duration    INTEGER,
        format      TEXT,
        created_at  TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_music_artist ON music(artist);
    CREATE INDEX IF NOT EXISTS idx_music_year ON music(year);

    CREATE TABLE IF NOT EXISTS play_history (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        music_id        INTEGER NOT NULL,
        played_at       TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP,
        completion_rate REAL    NOT NULL DEFAULT 0.0
    );

    CREATE TABLE IF NOT EXISTS user_preference (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        category    TEXT    NOT NULL,
        value       TEXT    NOT NULL,
        play_count  INTEGER NOT NULL DEFAULT 0,
        last_played TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(category, value)
    );
";

const TRACK_COLUMNS: &str =
    "id, file_path, title, artist, album, year, genre, duration, format, created_at";

/// One catalogued audio file. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    /// Absolute file path, unique across the store.
    pub file_path: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    /// Length in whole seconds.
    pub duration: Option<u32>,
    /// Lowercase extension, e.g. `flac`.
    pub format: Option<String>,
    pub created_at: String,
}

impl Track {
    /// `Title - Artist`, or just the title when the artist is unknown.
    pub fn display_name(&self) -> String {
        match self.artist.as_deref() {
            Some(artist) if !artist.is_empty() => format!("{} - {}", self.title, artist),
            _ => self.title.clone(),
        }
    }

    /// Decade the track was released in, if its year is known.
    pub fn decade(&self) -> Option<i32> {
        self.year.map(crate::preferences::decade_of)
    }
}

/// Fields for a track that has not been stored yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTrack {
    pub file_path: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub duration: Option<u32>,
    pub format: Option<String>,
}

/// Text columns that support substring search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Title,
    Artist,
    Album,
    Genre,
}

impl SearchField {
    const fn column(self) -> &'static str {
        match self {
            SearchField::Title => "title",
            SearchField::Artist => "artist",
            SearchField::Album => "album",
            SearchField::Genre => "genre",
        }
    }
}

/// Owner of the SQLite connection.
#[derive(Debug)]
pub struct MusicStore {
    pub(crate) conn: Connection,
}

impl MusicStore {
    /// Open (creating if needed) the database at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        debug!("Opened music database at {}", path.display());
        Self::with_connection(conn)
    }

    /// Fresh in-memory store. Used by tests and benchmarks.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create database schema")?;
        Ok(Self { conn })
    }

    /// Insert a track. If a track with the same `file_path` already exists the
    /// existing record is returned and nothing is written.
    pub fn add_track(&mut self, track: &NewTrack) -> Result<Track> {
        if let Some(existing) = self.get_track_by_path(&track.file_path)? {
            trace!("Track already catalogued: {}", track.file_path);
            return Ok(existing);
        }

        self.conn
            .execute(
                "INSERT INTO music (file_path, title, artist, album, year, genre, duration, format)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    track.file_path,
                    track.title,
                    track.artist,
                    track.album,
                    track.year,
                    track.genre,
                    track.duration,
                    track.format,
                ],
            )
            .with_context(|| format!("Failed to INSERT track {}", track.file_path))?;

        let id = self.conn.last_insert_rowid();
        self.get_track(id)?
            .with_context(|| format!("Track {id} vanished right after INSERT"))
    }

    /// Insert many tracks in one transaction. Returns how many were new.
    pub fn add_tracks(&mut self, tracks: &[NewTrack]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut added = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO music (file_path, title, artist, album, year, genre, duration, format)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(file_path) DO NOTHING",
            )?;

            for track in tracks {
                added += stmt
                    .execute(params![
                        track.file_path,
                        track.title,
                        track.artist,
                        track.album,
                        track.year,
                        track.genre,
                        track.duration,
                        track.format,
                    ])
                    .with_context(|| format!("Failed to INSERT track {}", track.file_path))?;
            }
        }

        tx.commit().context("Commiting SQL transaction failed.")?;
        Ok(added)
    }

    pub fn get_track(&self, id: i64) -> Result<Option<Track>> {
        self.conn
            .query_row(
                &format!("SELECT {TRACK_COLUMNS} FROM music WHERE id = ?1"),
                [id],
                track_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to query track {id}"))
    }

    pub fn get_track_by_path(&self, file_path: &str) -> Result<Option<Track>> {
        self.conn
            .query_row(
                &format!("SELECT {TRACK_COLUMNS} FROM music WHERE file_path = ?1"),
                [file_path],
                track_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to query track {file_path}"))
    }

    pub fn all_tracks(&self) -> Result<Vec<Track>> {
        self.query_tracks(
            &format!("SELECT {TRACK_COLUMNS} FROM music ORDER BY id"),
            [],
        )
    }

    pub fn track_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM music", [], |row| row.get(0))
            .context("Could not count database entries.")?;
        Ok(count as usize)
    }

    /// Case-insensitive substring search on one column, in storage order.
    pub fn search(&self, field: SearchField, needle: &str, limit: Option<usize>) -> Result<Vec<Track>> {
        let sql = format!(
            "SELECT {TRACK_COLUMNS} FROM music WHERE {} LIKE ?1 ESCAPE '\\' ORDER BY id LIMIT ?2",
            field.column()
        );
        self.query_tracks(&sql, params![like_pattern(needle), sql_limit(limit)])
    }

    pub fn tracks_by_year(&self, year: i32) -> Result<Vec<Track>> {
        self.query_tracks(
            &format!("SELECT {TRACK_COLUMNS} FROM music WHERE year = ?1 ORDER BY id"),
            [year],
        )
    }

    /// Tracks released in `[decade, decade + 10)`.
    pub fn tracks_in_decade(&self, decade: i32, limit: Option<usize>) -> Result<Vec<Track>> {
        self.query_tracks(
            &format!(
                "SELECT {TRACK_COLUMNS} FROM music
                 WHERE year >= ?1 AND year < ?1 + 10 ORDER BY id LIMIT ?2"
            ),
            params![decade, sql_limit(limit)],
        )
    }

    /// Up to `limit` tracks in uniformly random order.
    pub fn random_tracks(&self, limit: usize) -> Result<Vec<Track>> {
        self.query_tracks(
            &format!("SELECT {TRACK_COLUMNS} FROM music ORDER BY RANDOM() LIMIT ?1"),
            [sql_limit(Some(limit))],
        )
    }

    pub fn random_track(&self) -> Result<Option<Track>> {
        Ok(self.random_tracks(1)?.into_iter().next())
    }

    /// Remove a track by path. Returns whether a row was deleted.
    pub fn delete_track(&mut self, file_path: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM music WHERE file_path = ?1", [file_path])
            .with_context(|| format!("Failed to DELETE track {file_path}"))?;
        Ok(deleted > 0)
    }

    pub fn all_artists(&self) -> Result<Vec<String>> {
        self.distinct_values("artist")
    }

    pub fn all_genres(&self) -> Result<Vec<String>> {
        self.distinct_values("genre")
    }

    /// Number of recorded play events.
    pub fn play_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM play_history", [], |row| row.get(0))
            .context("Could not count play history.")?;
        Ok(count as usize)
    }

    fn distinct_values(&self, column: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT {column} FROM music
             WHERE {column} IS NOT NULL AND {column} != '' ORDER BY {column}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let values = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to list distinct {column} values"))?;
        Ok(values)
    }

    fn query_tracks<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Track>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("Invalid SQL statement: {sql}"))?;
        let tracks = stmt
            .query_map(params, track_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Cannot query tracks.")?;
        Ok(tracks)
    }
}

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        file_path: row.get(1)?,
        title: row.get(2)?,
        artist: row.get(3)?,
        album: row.get(4)?,
        year: row.get(5)?,
        genre: row.get(6)?,
        duration: row.get(7)?,
        format: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// `%needle%` with LIKE wildcards in the needle matched literally.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// SQLite treats a negative LIMIT as "no limit".
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn new_track(path: &str, title: &str, artist: &str, year: Option<i32>, genre: &str) -> NewTrack {
        NewTrack {
            file_path: path.to_string(),
            title: title.to_string(),
            artist: Some(artist.to_string()),
            album: Some(format!("{artist} Album")),
            year,
            genre: Some(genre.to_string()),
            duration: Some(200),
            format: Some("mp3".to_string()),
        }
    }

    fn sample_store() -> MusicStore {
        let mut store = MusicStore::open_in_memory().unwrap();
        store.add_track(&new_track("/music/a1.mp3", "Morning", "Artist A", Some(1985), "Rock")).unwrap();
        store.add_track(&new_track("/music/a2.mp3", "Evening", "Artist A", Some(1989), "Rock")).unwrap();
        store.add_track(&new_track("/music/b1.mp3", "100% Night", "Artist B", Some(1990), "Jazz")).unwrap();
        store
    }

    #[test]
    fn test_duplicate_path_returns_existing() {
        let mut store = sample_store();
        let again = store
            .add_track(&new_track("/music/a1.mp3", "Different", "Someone", None, "Pop"))
            .unwrap();

        assert_eq!(again.title, "Morning");
        assert_eq!(store.track_count().unwrap(), 3);
    }

    #[test]
    fn test_bulk_insert_skips_existing() {
        let mut store = sample_store();
        let added = store
            .add_tracks(&[
                new_track("/music/a1.mp3", "Morning", "Artist A", Some(1985), "Rock"),
                new_track("/music/c1.mp3", "Dawn", "Artist C", Some(2001), "Pop"),
            ])
            .unwrap();

        assert_eq!(added, 1);
        assert_eq!(store.track_count().unwrap(), 4);
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let store = sample_store();
        let found = store.search(SearchField::Artist, "artist a", None).unwrap();
        assert_eq!(found.len(), 2);

        let limited = store.search(SearchField::Artist, "artist", Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let store = sample_store();
        let found = store.search(SearchField::Title, "100%", None).unwrap();
        assert_eq!(found.len(), 1);

        assert!(store.search(SearchField::Title, "_", None).unwrap().is_empty());
    }

    #[test]
    fn test_decade_bounds() {
        let store = sample_store();
        let eighties = store.tracks_in_decade(1980, None).unwrap();
        assert_eq!(eighties.len(), 2);

        let nineties = store.tracks_in_decade(1990, None).unwrap();
        assert_eq!(nineties.len(), 1);
        assert_eq!(nineties[0].title, "100% Night");
    }

    #[test]
    fn test_tracks_by_exact_year() {
        let store = sample_store();
        let titles: Vec<String> = store
            .tracks_by_year(1989)
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["Evening"]);
        assert!(store.tracks_by_year(1980).unwrap().is_empty());
    }

    #[test]
    fn test_random_tracks_are_unique_and_bounded() {
        let store = sample_store();
        let tracks = store.random_tracks(10).unwrap();
        assert_eq!(tracks.len(), 3);

        let mut ids: Vec<i64> = tracks.iter().map(|t| t.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_distinct_lists_skip_empty() {
        let mut store = sample_store();
        let mut blank = new_track("/music/x.mp3", "X", "", None, "");
        blank.artist = Some(String::new());
        store.add_track(&blank).unwrap();

        assert_eq!(store.all_artists().unwrap(), vec!["Artist A", "Artist B"]);
        assert_eq!(store.all_genres().unwrap(), vec!["Jazz", "Rock"]);
    }

    #[test]
    fn test_delete_track() {
        let mut store = sample_store();
        assert!(store.delete_track("/music/a1.mp3").unwrap());
        assert!(!store.delete_track("/music/a1.mp3").unwrap());
        assert!(store.get_track_by_path("/music/a1.mp3").unwrap().is_none());
    }

    #[test]
    fn test_display_name() {
        let store = sample_store();
        let track = store.get_track_by_path("/music/b1.mp3").unwrap().unwrap();
        assert_eq!(track.display_name(), "100% Night - Artist B");
        assert_eq!(track.decade(), Some(1990));
    }
}
