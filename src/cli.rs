//! # Command-Line Interface Module
//!
//! This module defines the command-line interface for Maestro using Clap derive
//! macros. Library management commands run and exit; `serve` starts the tool
//! server that an agent talks to over stdio.
//!
//! ## Commands
//!
//! - `scan`: Walk the music directory and catalogue new files
//! - `list`: Display all catalogued tracks
//! - `search`: Find tracks by title or artist
//! - `prefs`: Show listening preferences
//! - `recommend`: Preview a recommendation without playing it
//! - `serve`: Run the agent tool server on stdin/stdout
//!
//! ## Examples
//!
//! ```bash
//! maestro scan ~/Music
//! maestro search "blue"
//! maestro --db /tmp/music.db serve
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
///
/// Global options override the matching environment variables
/// (`DATABASE_PATH`, `MUSIC_DIR`).
#[derive(Parser, Debug)]
#[command(name = "maestro")]
#[command(about = "Maestro: conversational control for your local music library")]
#[command(version)]
pub struct Args {
    /// SQLite database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Root of the music library
    #[arg(long, global = true, value_name = "PATH")]
    pub music_dir: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan a music directory and add new files to the library
    ///
    /// Recursively finds supported audio files, reads their tags and stores
    /// them. Files already in the library are left untouched.
    ///
    /// Supported formats: MP3, FLAC, WAV, M4A, OGG
    Scan {
        /// Directory to scan (defaults to the configured music directory)
        #[arg(value_hint = clap::ValueHint::DirPath)]
        path: Option<PathBuf>,
    },

    /// List all tracks in the library
    List,

    /// Search tracks by title or artist
    Search {
        /// Text to look for
        keyword: String,
    },

    /// Show the most played artists, decades and genres
    Prefs,

    /// Preview recommended tracks without playing them
    Recommend {
        /// Number of tracks to recommend
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Run the agent tool server on stdin/stdout
    ///
    /// Speaks line-delimited JSON-RPC (Model Context Protocol tools).
    /// Opens the default audio output and keeps it for the whole session.
    Serve,

    /// Generate shell completions
    ///
    /// Usage: maestro completion bash > ~/.local/share/bash-completion/completions/maestro
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// List artist names for completion (hidden command)
    #[command(hide = true)]
    CompleteArtists,
}
