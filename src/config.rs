//! # Configuration Module
//!
//! This module handles configuration management and data directory setup for Maestro.
//! It provides platform-appropriate data storage locations, ensures necessary
//! directories exist, and reads runtime overrides from the environment.
//!
//! ## Data Storage
//!
//! Maestro stores its database in the platform-standard data directory:
//! - Linux: `~/.local/share/maestro/`
//! - macOS: `~/Library/Application Support/maestro/`
//! - Windows: `%APPDATA%\maestro\`
//!
//! ## Environment Overrides
//!
//! | Variable            | Meaning                                   |
//! |---------------------|-------------------------------------------|
//! | `DATABASE_PATH`     | SQLite database file                      |
//! | `MUSIC_DIR`         | Root of the music library to scan         |
//! | `DEFAULT_VOLUME`    | Startup volume, 0.0 to 1.0                |
//! | `MAESTRO_SETTLE_MS` | Settle delay after a play command (ms)    |
//! | `MAESTRO_POLL_MS`   | Auto-advance poll interval (ms)           |

use anyhow::{Result, Context};
use log::warn;
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Volume used when `DEFAULT_VOLUME` is unset or unparsable.
pub const DEFAULT_VOLUME: f64 = 0.7;

/// Settle delay observed after every play command.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// How often the auto-advance poller samples the output device.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Returns the platform-appropriate database file path.
///
/// Locates the standard data directory for the current platform and creates
/// the Maestro subdirectory if it doesn't exist. The database file is named
/// `music.db` and stores the track catalogue, play history and preferences.
///
/// # Platform Behavior
///
/// - **Linux**: `~/.local/share/maestro/music.db`
/// - **macOS**: `~/Library/Application Support/maestro/music.db`
/// - **Windows**: `%APPDATA%\maestro\music.db`
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The maestro subdirectory cannot be created due to permissions
///
/// # Examples
///
/// ```no_run
/// use maestro::config::get_db_path;
///
/// let db_path = get_db_path()?;
/// println!("Database location: {}", db_path.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("music.db"))
}

/// Returns the platform-appropriate data directory for Maestro, creating it
/// when missing.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        ))?;

    let maestro_dir = data_dir.join("maestro");
    fs::create_dir_all(&maestro_dir)
        .with_context(|| format!(
            "Failed to create Maestro data directory at {}. Please check file permissions.",
            maestro_dir.display()
        ))?;

    Ok(maestro_dir)
}

/// Where [`get_db_path`] would put the database, without touching the
/// filesystem. Falls back to `./music.db` when the platform has no data
/// directory.
fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("maestro").join("music.db"))
        .unwrap_or_else(|| PathBuf::from("music.db"))
}

/// Default music library location: the platform audio directory, falling back
/// to `./music`.
pub fn default_music_dir() -> PathBuf {
    dirs::audio_dir().unwrap_or_else(|| PathBuf::from("music"))
}

/// Configuration for runtime behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Path to the database file
    pub db_path: PathBuf,
    /// Root directory scanned for audio files
    pub music_dir: PathBuf,
    /// Volume the player starts with
    pub default_volume: f64,
    /// Pause after issuing a play command, masking device start-up latency
    pub settle_delay: Duration,
    /// Auto-advance poll cadence
    pub poll_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            music_dir: default_music_dir(),
            default_volume: DEFAULT_VOLUME,
            settle_delay: DEFAULT_SETTLE_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl RuntimeConfig {
    /// Create a new runtime configuration from platform defaults and the
    /// environment.
    pub fn new() -> Result<Self> {
        Self::from_env(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`. The platform data directory is only
    /// resolved (and created) when `DATABASE_PATH` is unset.
    pub fn from_env<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_overridden = lookup("DATABASE_PATH").is_some_and(|p| !p.trim().is_empty());
        let mut config = Self::default();
        config.apply_env(lookup)?;
        if !db_overridden {
            config.db_path = get_db_path()?;
        }
        Ok(config)
    }

    /// Create configuration with explicit database path
    pub fn with_db_path(db_path: PathBuf) -> Self {
        Self {
            db_path,
            ..Self::default()
        }
    }

    /// Apply overrides from a variable lookup. Split from [`RuntimeConfig::new`]
    /// so tests can feed a fake environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("DATABASE_PATH").filter(|p| !p.trim().is_empty()) {
            self.db_path = absolute(Path::new(path.trim()))?;
        }

        if let Some(dir) = lookup("MUSIC_DIR").filter(|d| !d.trim().is_empty()) {
            self.music_dir = absolute(Path::new(dir.trim()))?;
        }

        if let Some(raw) = lookup("DEFAULT_VOLUME") {
            match raw.trim().parse::<f64>() {
                Ok(volume) if volume.is_finite() => {
                    self.default_volume = volume.max(0.0).min(1.0);
                }
                _ => warn!("Ignoring invalid DEFAULT_VOLUME '{raw}', using {DEFAULT_VOLUME}"),
            }
        }

        if let Some(ms) = parse_millis(lookup("MAESTRO_SETTLE_MS"), "MAESTRO_SETTLE_MS") {
            self.settle_delay = ms;
        }

        if let Some(ms) = parse_millis(lookup("MAESTRO_POLL_MS"), "MAESTRO_POLL_MS") {
            // A zero interval would spin the poller.
            self.poll_interval = ms.max(Duration::from_millis(10));
        }

        Ok(())
    }
}

fn parse_millis(raw: Option<String>, name: &str) -> Option<Duration> {
    let raw = raw?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            warn!("Ignoring invalid {name} '{raw}'");
            None
        }
    }
}

/// Resolve `path` against the current directory without touching the
/// filesystem.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(path
        .absolutize()
        .with_context(|| format!("Failed to resolve path {}", path.display()))?
        .into_owned())
}
