//! # Maestro - Conversational Music Player
//!
//! Maestro catalogues a local music library and exposes playback, search and
//! recommendations to an agent as tools over stdio. The library commands are
//! also usable directly from the shell.
//!
//! ## Usage
//!
//! ```bash
//! # Catalogue a music directory
//! maestro scan ~/Music
//!
//! # Inspect the library
//! maestro list
//! maestro search "river"
//! maestro prefs
//!
//! # Run the tool server for an agent
//! maestro serve
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::info;
use maestro::config::{self, RuntimeConfig};
use maestro::db::{MusicStore, SearchField};
use maestro::device::RodioDevice;
use maestro::monitor::PlaybackMonitor;
use maestro::player::Player;
use maestro::tools::ToolSurface;
use maestro::{cli, completion, preferences, recommend, scanner, server};
use std::collections::HashSet;
use std::io;

/// Main entry point for the Maestro application.
///
/// Initializes logging, parses command-line arguments, and routes commands
/// to the appropriate module functions.
///
/// # Logging
///
/// Logs go to stderr and are controlled via `RUST_LOG`:
/// - `RUST_LOG=debug maestro serve` - Enable debug logging
/// - `RUST_LOG=maestro::player=trace maestro serve` - Module-specific logging
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    // Completion scripts never need the database.
    if let cli::Command::Completion { shell } = &args.command {
        let mut cmd = cli::Args::command();
        completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        return Ok(());
    }

    let config = load_config(&args)?;

    match args.command {
        cli::Command::Scan { path } => {
            let dir = match path {
                Some(path) => config::absolute(&path)?,
                None => config.music_dir.clone(),
            };
            let mut store = open_store(&config)?;
            let report = scanner::scan_directory(&mut store, &dir)?;
            println!(
                "Scanned {}: {} tracks catalogued, {} new, {} unreadable",
                dir.display(),
                report.catalogued,
                report.added,
                report.skipped
            );
        }
        cli::Command::List => {
            let store = open_store(&config)?;
            let tracks = store.all_tracks()?;
            if tracks.is_empty() {
                println!("The library is empty. Run `maestro scan` first.");
            }
            for track in tracks {
                println!("{:>5}  {}", track.id, track.display_name());
            }
        }
        cli::Command::Search { keyword } => {
            let store = open_store(&config)?;
            let mut seen = HashSet::new();
            let matches: Vec<_> = store
                .search(SearchField::Title, &keyword, None)?
                .into_iter()
                .chain(store.search(SearchField::Artist, &keyword, None)?)
                .filter(|track| seen.insert(track.id))
                .collect();
            if matches.is_empty() {
                println!("No tracks match '{keyword}'");
            }
            for track in matches {
                println!("{:>5}  {}", track.id, track.display_name());
            }
        }
        cli::Command::Prefs => {
            let store = open_store(&config)?;
            let prefs = preferences::get_user_preferences(&store)?;
            println!("{}", serde_json::to_string_pretty(&prefs)?);
        }
        cli::Command::Recommend { limit } => {
            let store = open_store(&config)?;
            for (i, track) in recommend::get_recommended_tracks(&store, limit)?
                .iter()
                .enumerate()
            {
                println!("{:>3}. {}", i + 1, track.display_name());
            }
        }
        cli::Command::Serve => serve(&config)?,
        cli::Command::CompleteArtists => {
            completion::print_artist_completions(&config.db_path)?;
        }
        cli::Command::Completion { .. } => {}
    }

    Ok(())
}

/// Platform defaults, then environment, then command-line flags.
fn load_config(args: &cli::Args) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::new()?;
    if let Some(db) = &args.db {
        config.db_path = config::absolute(db)?;
    }
    if let Some(dir) = &args.music_dir {
        config.music_dir = config::absolute(dir)?;
    }
    Ok(config)
}

fn open_store(config: &RuntimeConfig) -> Result<MusicStore> {
    MusicStore::open(&config.db_path)
        .with_context(|| format!("Failed to open library at {}", config.db_path.display()))
}

/// Run the tool server until stdin closes.
fn serve(config: &RuntimeConfig) -> Result<()> {
    let store = open_store(config)?;
    info!(
        "Serving {} tracks from {}",
        store.track_count()?,
        config.db_path.display()
    );

    // The stream must outlive every sink created from its mixer.
    let (device, _stream) = RodioDevice::open_default()?;
    let player = Player::from_config(Box::new(device), config);
    let mut monitor = PlaybackMonitor::start(player.clone(), config.poll_interval)?;

    let mut tools = ToolSurface::new(store, player.clone(), config.music_dir.clone());
    let stdin = io::stdin();
    let stdout = io::stdout();
    let result = server::serve(&mut tools, stdin.lock(), stdout.lock());

    monitor.stop();
    player.stop();
    result
}
