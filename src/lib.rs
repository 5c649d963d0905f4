//! # Maestro Library
//!
//! Conversational control for a local music library. An agent drives
//! playback, search and recommendations through a set of tools served over
//! stdio; the library learns listening preferences from what gets played.
//!
//! Core modules:
//! - [`player`] - Playback state machine (playlist, volume, seek)
//! - [`monitor`] - Background auto-advance poller
//! - [`preferences`] - Play history and preference counters
//! - [`recommend`] - Tiered recommendations from preferences
//! - [`tools`] - The agent-facing tool surface
//! - [`server`] - JSON-RPC stdio transport for the tools
//!
//! ### Supporting Modules
//!
//! - [`db`] - SQLite catalogue and schema
//! - [`scanner`] - Directory walk and tag extraction
//! - [`device`] - Audio output abstraction and the rodio backend
//! - [`config`] - Data directory and runtime settings
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use maestro::config::RuntimeConfig;
//! use maestro::db::MusicStore;
//! use maestro::device::RodioDevice;
//! use maestro::monitor::PlaybackMonitor;
//! use maestro::player::Player;
//! use maestro::{preferences, recommend, scanner};
//!
//! let config = RuntimeConfig::new()?;
//! let mut store = MusicStore::open(&config.db_path)?;
//! scanner::scan_directory(&mut store, &config.music_dir)?;
//!
//! // The output stream has to stay alive while anything plays.
//! let (device, _stream) = RodioDevice::open_default()?;
//! let player = Player::from_config(Box::new(device), &config);
//! let _monitor = PlaybackMonitor::start(player.clone(), config.poll_interval)?;
//!
//! let picks = recommend::get_recommended_tracks(&store, 10)?;
//! if let Some(first) = picks.first() {
//!     preferences::record_play(&mut store, first.id, 1.0)?;
//! }
//! player.set_playlist(picks);
//! player.play_all();
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Playback Model
//!
//! - A [`player::Player`] is a cheap clonable handle; every clone shares one
//!   locked state, so the tool surface and the monitor see the same playlist.
//! - The monitor advances the playlist only when a playing track ends on its
//!   own. Pausing and stopping never count as an ending.
//! - Device failures are reported as `false` from player operations and never
//!   reach the agent as raw errors.
//!
//! ## Preferences and Recommendations
//!
//! Every play records a history row and bumps counters for the track's
//! artist, album, genre and decade. Recommendations fill tiers from the top
//! artists, then decades, then genres, and top up with random tracks; the
//! result never repeats a track.
//!
//! ## Error Handling
//!
//! Fallible functions return `anyhow::Result` with context attached. Tool
//! calls turn storage failures into an error result for the agent, and bad
//! arguments into a JSON-RPC `-32602` error.
//!
//! Run tests with:
//! ```bash
//! cargo test
//! ```

pub mod cli;
pub mod completion;
pub mod config;
pub mod db;
pub mod device;
pub mod monitor;
pub mod player;
pub mod preferences;
pub mod recommend;
pub mod scanner;
pub mod server;
pub mod tools;
