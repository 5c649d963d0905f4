//! # Tool Surface
//!
//! The operations an agent can call, each mapped onto the [`MusicStore`] and
//! the [`Player`]. Every tool answers with a short human-readable line or a
//! small JSON record; "nothing matched" is an answer, not an error.
//!
//! Tools that start playback also log plays for the first few tracks of the
//! new playlist so listening preferences keep up with what was asked for.

use crate::db::{MusicStore, SearchField, Track};
use crate::player::Player;
use crate::preferences::{self, get_user_preferences};
use crate::recommend;
use crate::scanner;
use anyhow::{Context, Result};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default row cap for `list_artists` and `list_genres`.
pub const DEFAULT_LIST_LIMIT: usize = 20;
/// Maximum rows returned by `search_songs`.
pub const SEARCH_LIMIT: usize = 20;
/// Tracks picked by `smart_recommend`.
pub const RECOMMEND_LIMIT: usize = 10;
/// Seconds kept between the latest seek target and the end of the track.
const SEEK_END_MARGIN: f64 = 0.001;

/// Result of a successful tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    /// Render for a text-only transport. JSON is pretty-printed.
    pub fn into_text(self) -> String {
        match self {
            ToolOutput::Text(text) => text,
            ToolOutput::Json(value) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

/// Call failures caused by the caller rather than by the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCallError {
    UnknownTool(String),
    InvalidArguments { tool: String, message: String },
}

impl fmt::Display for ToolCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolCallError::UnknownTool(name) => write!(f, "Unknown tool: {name}"),
            ToolCallError::InvalidArguments { tool, message } => {
                write!(f, "Invalid arguments for {tool}: {message}")
            }
        }
    }
}

impl std::error::Error for ToolCallError {}

/// Name, description and argument schema of one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct ArtistArgs {
    artist: String,
}

#[derive(Debug, Deserialize)]
struct TitleArgs {
    title: String,
}

#[derive(Debug, Deserialize)]
struct GenreArgs {
    genre: String,
}

#[derive(Debug, Deserialize)]
struct DecadeArgs {
    #[serde(deserialize_with = "lenient_number")]
    decade: i32,
}

#[derive(Debug, Deserialize)]
struct AlbumArgs {
    album: String,
}

#[derive(Debug, Deserialize)]
struct RecommendArgs {
    #[serde(default)]
    context: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VolumeArgs {
    #[serde(deserialize_with = "lenient_number")]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct SeekArgs {
    #[serde(deserialize_with = "lenient_number")]
    position: f64,
}

#[derive(Debug, Deserialize)]
struct ListArgs {
    #[serde(default = "default_list_limit", deserialize_with = "lenient_number")]
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    keyword: String,
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

/// Accept both `1980` and `"1980"`; agents are loose with JSON types.
fn lenient_number<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(serde_json::Number),
        Text(String),
    }

    let text = match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s.trim().to_string(),
    };
    text.parse().map_err(serde::de::Error::custom)
}

/// Track fields shown to the agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummary {
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub duration: Option<u32>,
}

impl From<&Track> for TrackSummary {
    fn from(track: &Track) -> Self {
        Self {
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            year: track.year,
            duration: track.duration,
        }
    }
}

/// Owns everything the tools act on.
#[derive(Debug)]
pub struct ToolSurface {
    store: MusicStore,
    player: Player,
    music_dir: PathBuf,
}

impl ToolSurface {
    pub fn new(store: MusicStore, player: Player, music_dir: PathBuf) -> Self {
        Self {
            store,
            player,
            music_dir,
        }
    }

    pub fn store(&self) -> &MusicStore {
        &self.store
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn music_dir(&self) -> &Path {
        &self.music_dir
    }

    /// Dispatch a call by tool name. `args` may be `null` for tools without
    /// arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ToolCallError`] (inside `anyhow::Error`) for unknown tools or
    /// malformed arguments, and storage errors as they occur.
    pub fn call(&mut self, name: &str, args: &Value) -> Result<ToolOutput> {
        debug!("Tool call {name} {args}");
        match name {
            "play_artist" => {
                let args: ArtistArgs = parse_args(name, args)?;
                self.play_artist(&args.artist)
            }
            "play_song" => {
                let args: TitleArgs = parse_args(name, args)?;
                self.play_song(&args.title)
            }
            "play_genre" => {
                let args: GenreArgs = parse_args(name, args)?;
                self.play_genre(&args.genre)
            }
            "play_decade" => {
                let args: DecadeArgs = parse_args(name, args)?;
                self.play_decade(args.decade)
            }
            "play_album" => {
                let args: AlbumArgs = parse_args(name, args)?;
                self.play_album(&args.album)
            }
            "play_random" => self.play_random(),
            "smart_recommend" => {
                let args: RecommendArgs = parse_args(name, args)?;
                self.smart_recommend(args.context.as_deref())
            }
            "pause" => Ok(self.pause()),
            "resume" => Ok(self.resume()),
            "stop" => Ok(self.stop()),
            "next_track" => Ok(self.next_track()),
            "previous_track" => Ok(self.previous_track()),
            "volume_up" => Ok(self.volume_up()),
            "volume_down" => Ok(self.volume_down()),
            "set_volume" => {
                let args: VolumeArgs = parse_args(name, args)?;
                Ok(self.set_volume(args.volume))
            }
            "seek_to" => {
                let args: SeekArgs = parse_args(name, args)?;
                Ok(self.seek_to(args.position))
            }
            "get_player_status" => Ok(self.get_player_status()),
            "list_artists" => {
                let args: ListArgs = parse_args(name, args)?;
                self.list_artists(args.limit)
            }
            "list_genres" => {
                let args: ListArgs = parse_args(name, args)?;
                self.list_genres(args.limit)
            }
            "search_songs" => {
                let args: SearchArgs = parse_args(name, args)?;
                self.search_songs(&args.keyword)
            }
            "get_user_preferences" => self.get_user_preferences(),
            "scan_music_library" => self.scan_music_library(),
            other => Err(ToolCallError::UnknownTool(other.to_string()).into()),
        }
    }

    /// Shuffle-play every track whose artist contains `artist`.
    pub fn play_artist(&mut self, artist: &str) -> Result<ToolOutput> {
        let tracks = self.store.search(SearchField::Artist, artist, None)?;
        if tracks.is_empty() {
            return Ok(text(format!("No tracks found for artist {artist}")));
        }

        let count = tracks.len();
        let started = self.start_playlist(tracks, Order::Shuffled, 5)?;
        if started {
            let current = self
                .player
                .status()
                .current_track_name
                .unwrap_or_else(|| "Unknown".to_string());
            Ok(text(format!(
                "Playing {count} tracks by {artist} - now playing: {current}"
            )))
        } else {
            Ok(text(format!(
                "Found {count} tracks by {artist}, but playback failed"
            )))
        }
    }

    /// Play every track whose title contains `title`, in order.
    pub fn play_song(&mut self, title: &str) -> Result<ToolOutput> {
        let tracks = self.store.search(SearchField::Title, title, None)?;
        let Some(first) = tracks.first().cloned() else {
            return Ok(text(format!("No track found matching {title}")));
        };

        self.start_playlist(tracks, Order::InOrder, 3)?;
        Ok(text(format!("Now playing: {}", describe(&first))))
    }

    pub fn play_genre(&mut self, genre: &str) -> Result<ToolOutput> {
        let tracks = self.store.search(SearchField::Genre, genre, None)?;
        if tracks.is_empty() {
            return Ok(text(format!("No {genre} tracks found")));
        }

        let count = tracks.len();
        self.start_playlist(tracks, Order::Shuffled, 5)?;
        Ok(text(format!("Playing {genre}: {count} tracks")))
    }

    /// Shuffle-play tracks released in `[decade, decade + 10)`.
    pub fn play_decade(&mut self, decade: i32) -> Result<ToolOutput> {
        let tracks = self.store.tracks_in_decade(decade, None)?;
        if tracks.is_empty() {
            return Ok(text(format!("No tracks found from the {decade}s")));
        }

        let count = tracks.len();
        self.start_playlist(tracks, Order::Shuffled, 5)?;
        Ok(text(format!("Playing music from the {decade}s: {count} tracks")))
    }

    pub fn play_album(&mut self, album: &str) -> Result<ToolOutput> {
        let tracks = self.store.search(SearchField::Album, album, None)?;
        if tracks.is_empty() {
            return Ok(text(format!("No album found matching {album}")));
        }

        let count = tracks.len();
        self.start_playlist(tracks, Order::InOrder, 5)?;
        Ok(text(format!("Playing album '{album}': {count} tracks")))
    }

    /// Play one random track without touching the playlist.
    pub fn play_random(&mut self) -> Result<ToolOutput> {
        let Some(track) = self.store.random_track()? else {
            return Ok(text("No tracks available to play"));
        };

        self.player.play_track(&track);
        preferences::record_play(&mut self.store, track.id, 1.0)?;
        Ok(text(format!("Playing random track: {}", describe(&track))))
    }

    /// Shuffle-play a recommendation built from listening history.
    pub fn smart_recommend(&mut self, context: Option<&str>) -> Result<ToolOutput> {
        if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
            debug!("Recommendation context: {context}");
        }

        let prefs = get_user_preferences(&self.store)?;
        let tracks = recommend::recommend_from(&self.store, &prefs, RECOMMEND_LIMIT)?;
        if tracks.is_empty() {
            return Ok(text("No tracks available to play"));
        }

        let count = tracks.len();
        self.start_playlist(tracks, Order::Shuffled, 5)?;

        let mut reasons = Vec::new();
        if let Some(artist) = prefs.top_artists.first() {
            reasons.push(format!("you like {artist}"));
        }
        if let Some(decade) = prefs.top_decades.first() {
            reasons.push(format!("music from the {decade}s"));
        }
        if let Some(genre) = prefs.top_genres.first() {
            reasons.push(format!("{genre} style"));
        }

        if reasons.is_empty() {
            Ok(text(format!("Recommended {count} tracks for you")))
        } else {
            Ok(text(format!(
                "Based on your taste ({}): {count} tracks",
                reasons.join(", ")
            )))
        }
    }

    pub fn pause(&self) -> ToolOutput {
        if self.player.pause() {
            text("Paused")
        } else {
            text("Nothing is playing")
        }
    }

    pub fn resume(&self) -> ToolOutput {
        if self.player.resume() {
            text("Resumed")
        } else if self.player.is_busy() {
            text("Already playing")
        } else {
            text("Nothing to resume")
        }
    }

    pub fn stop(&self) -> ToolOutput {
        self.player.stop();
        text("Stopped")
    }

    pub fn next_track(&self) -> ToolOutput {
        if !self.player.next() && self.player.status().playlist_size == 0 {
            return text("The playlist is empty");
        }
        self.now_playing("Skipped to the next track")
    }

    pub fn previous_track(&self) -> ToolOutput {
        if !self.player.previous() && self.player.status().playlist_size == 0 {
            return text("The playlist is empty");
        }
        self.now_playing("Went back to the previous track")
    }

    pub fn volume_up(&self) -> ToolOutput {
        volume_text(self.player.volume_up())
    }

    pub fn volume_down(&self) -> ToolOutput {
        volume_text(self.player.volume_down())
    }

    pub fn set_volume(&self, volume: f64) -> ToolOutput {
        volume_text(self.player.set_volume(volume))
    }

    /// Jump within the current playlist track. The position is clamped to
    /// `[0, duration)`; anything at or past the end lands just before it.
    pub fn seek_to(&self, position: f64) -> ToolOutput {
        if !self.player.is_busy() && !self.player.is_paused() {
            return text("Nothing is playing");
        }
        if self.player.status().playlist_size == 0 {
            return text("The playlist is empty");
        }
        let Some(track) = self.player.current_playlist_track() else {
            return text("Invalid playlist position");
        };
        let Some(duration) = track.duration.filter(|d| *d > 0) else {
            return text("Track duration is unknown");
        };

        let target = if position.is_nan() {
            0.0
        } else {
            position.max(0.0).min(f64::from(duration) - SEEK_END_MARGIN)
        };

        if self.player.seek_to(target) {
            text(format!("Jumped to {} / {}", clock(target as u32), clock(duration)))
        } else {
            text("Seek failed")
        }
    }

    pub fn get_player_status(&self) -> ToolOutput {
        let status = self.player.status();
        let current = self
            .player
            .current_playlist_track()
            .filter(|_| status.playlist_size > 0)
            .map(|track| {
                json!({
                    "title": track.title,
                    "artist": track.artist,
                    "album": track.album,
                    "year": track.year,
                })
            });

        ToolOutput::Json(json!({
            "is_playing": status.is_playing,
            "is_paused": status.is_paused,
            "is_busy": self.player.is_busy(),
            "state": self.player.state(),
            "current_track": current,
            "volume": volume_percent(status.volume),
            "playlist_size": status.playlist_size,
            "current_index": status.current_index + 1,
        }))
    }

    pub fn list_artists(&self, limit: usize) -> Result<ToolOutput> {
        let artists: Vec<String> = self.store.all_artists()?.into_iter().take(limit).collect();
        Ok(ToolOutput::Json(json!(artists)))
    }

    pub fn list_genres(&self, limit: usize) -> Result<ToolOutput> {
        let genres: Vec<String> = self.store.all_genres()?.into_iter().take(limit).collect();
        Ok(ToolOutput::Json(json!(genres)))
    }

    /// Title matches first, then artist matches, without repeats.
    pub fn search_songs(&self, keyword: &str) -> Result<ToolOutput> {
        let by_title = self.store.search(SearchField::Title, keyword, None)?;
        let by_artist = self.store.search(SearchField::Artist, keyword, None)?;

        let mut seen = HashSet::new();
        let results: Vec<TrackSummary> = by_title
            .iter()
            .chain(by_artist.iter())
            .filter(|track| seen.insert(track.id))
            .take(SEARCH_LIMIT)
            .map(TrackSummary::from)
            .collect();

        Ok(ToolOutput::Json(serde_json::to_value(results)?))
    }

    pub fn get_user_preferences(&self) -> Result<ToolOutput> {
        let prefs = get_user_preferences(&self.store)?;
        Ok(ToolOutput::Json(serde_json::to_value(prefs)?))
    }

    /// Rescan the configured music directory.
    pub fn scan_music_library(&mut self) -> Result<ToolOutput> {
        let report = scanner::scan_directory(&mut self.store, &self.music_dir)
            .with_context(|| format!("Failed to scan {}", self.music_dir.display()))?;
        Ok(text(format!(
            "Scan complete: {} tracks catalogued ({} new)",
            report.catalogued, report.added
        )))
    }

    /// Replace the playlist, start it and log plays for the first
    /// `record` tracks of `tracks` as given.
    fn start_playlist(&mut self, tracks: Vec<Track>, order: Order, record: usize) -> Result<bool> {
        let recorded: Vec<i64> = tracks.iter().take(record).map(|t| t.id).collect();

        let started = self
            .player
            .start_playlist(tracks, matches!(order, Order::Shuffled));
        info!(
            "Started playlist of {} tracks ({order:?}, started: {started})",
            self.player.status().playlist_size
        );

        for id in recorded {
            preferences::record_play(&mut self.store, id, 1.0)?;
        }
        Ok(started)
    }

    fn now_playing(&self, fallback: &str) -> ToolOutput {
        match self.player.status().current_track_name {
            Some(name) => text(format!("Now playing: {name}")),
            None => text(fallback),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Order {
    InOrder,
    Shuffled,
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args.clone() };
    serde_json::from_value(args).map_err(|e| {
        ToolCallError::InvalidArguments {
            tool: tool.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

fn text(message: impl Into<String>) -> ToolOutput {
    ToolOutput::Text(message.into())
}

fn describe(track: &Track) -> String {
    format!(
        "{} - {}",
        track.title,
        track.artist.as_deref().filter(|a| !a.is_empty()).unwrap_or("Unknown artist")
    )
}

fn volume_percent(volume: f64) -> u32 {
    (volume * 100.0).round() as u32
}

fn volume_text(volume: f64) -> ToolOutput {
    text(format!("Volume: {}%", volume_percent(volume)))
}

/// `mm:ss`, minutes not capped at 60.
fn clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Descriptors for every tool [`ToolSurface::call`] accepts.
pub fn descriptors() -> Vec<ToolDescriptor> {
    let none = || json!({ "type": "object", "properties": {} });
    let one = |name: &str, kind: &str, description: &str| {
        json!({
            "type": "object",
            "properties": { name: { "type": kind, "description": description } },
            "required": [name],
        })
    };

    vec![
        ToolDescriptor {
            name: "play_artist",
            description: "Play songs by an artist, shuffled. Call this whenever the user asks to hear an artist or singer.",
            input_schema: one("artist", "string", "Artist name, or part of it"),
        },
        ToolDescriptor {
            name: "play_song",
            description: "Play a specific song by title. Call this when the user names a song.",
            input_schema: one("title", "string", "Song title, or part of it"),
        },
        ToolDescriptor {
            name: "play_genre",
            description: "Play music of a genre or style, shuffled.",
            input_schema: one("genre", "string", "Genre name, e.g. Rock or Jazz"),
        },
        ToolDescriptor {
            name: "play_decade",
            description: "Play music released in a decade, shuffled.",
            input_schema: one("decade", "integer", "First year of the decade, e.g. 1980"),
        },
        ToolDescriptor {
            name: "play_album",
            description: "Play an album from the first track, in order.",
            input_schema: one("album", "string", "Album name, or part of it"),
        },
        ToolDescriptor {
            name: "play_random",
            description: "Play one random song.",
            input_schema: none(),
        },
        ToolDescriptor {
            name: "smart_recommend",
            description: "Recommend and play songs based on the user's listening history.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "context": { "type": "string", "description": "Optional mood or situation" }
                }
            }),
        },
        ToolDescriptor {
            name: "pause",
            description: "Pause playback. Always call this tool when the user asks to pause; never just say it is paused.",
            input_schema: none(),
        },
        ToolDescriptor {
            name: "resume",
            description: "Resume paused playback. Always call this tool when the user asks to continue.",
            input_schema: none(),
        },
        ToolDescriptor {
            name: "stop",
            description: "Stop playback and rewind the playlist. Always call this tool when the user asks to stop.",
            input_schema: none(),
        },
        ToolDescriptor {
            name: "next_track",
            description: "Skip to the next song in the playlist.",
            input_schema: none(),
        },
        ToolDescriptor {
            name: "previous_track",
            description: "Go back to the previous song in the playlist.",
            input_schema: none(),
        },
        ToolDescriptor {
            name: "volume_up",
            description: "Raise the volume by 10%.",
            input_schema: none(),
        },
        ToolDescriptor {
            name: "volume_down",
            description: "Lower the volume by 10%.",
            input_schema: none(),
        },
        ToolDescriptor {
            name: "set_volume",
            description: "Set the volume to an exact level.",
            input_schema: one("volume", "number", "Volume from 0.0 (mute) to 1.0 (max)"),
        },
        ToolDescriptor {
            name: "seek_to",
            description: "Jump to a position in the current song.",
            input_schema: one("position", "number", "Position in seconds, e.g. 90.5 for 1:30"),
        },
        ToolDescriptor {
            name: "get_player_status",
            description: "Current playback state, song, volume and playlist position. Useful when unsure what the user wants.",
            input_schema: none(),
        },
        ToolDescriptor {
            name: "list_artists",
            description: "List artists in the library.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "description": "Maximum number of names", "default": DEFAULT_LIST_LIMIT }
                }
            }),
        },
        ToolDescriptor {
            name: "list_genres",
            description: "List genres in the library.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "description": "Maximum number of names", "default": DEFAULT_LIST_LIMIT }
                }
            }),
        },
        ToolDescriptor {
            name: "search_songs",
            description: "Search songs by title or artist.",
            input_schema: one("keyword", "string", "Text to look for"),
        },
        ToolDescriptor {
            name: "get_user_preferences",
            description: "The user's most played artists, decades and genres.",
            input_schema: none(),
        },
        ToolDescriptor {
            name: "scan_music_library",
            description: "Rescan the music directory and add new files to the library.",
            input_schema: none(),
        },
    ]
}
