//! # Shell Completion Module
//!
//! Shell completion support for Maestro:
//! - Generation of completion scripts for various shells
//! - Dynamic artist-name completion read from the library database
//!
//! ## Usage
//!
//! ```bash
//! # Generate bash completions
//! maestro completion bash > ~/.local/share/bash-completion/completions/maestro
//!
//! # Generate zsh completions
//! maestro completion zsh > ~/.config/zsh/completions/_maestro
//! ```

use crate::db::MusicStore;
use anyhow::Result;
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io::{self, Write};
use std::path::Path;

/// Generate shell completions for the given shell
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

/// Convert our Shell enum to clap_complete's Shell enum
pub fn shell_to_completion_shell(shell: &crate::cli::Shell) -> CompletionShell {
    match shell {
        crate::cli::Shell::Bash => CompletionShell::Bash,
        crate::cli::Shell::Zsh => CompletionShell::Zsh,
        crate::cli::Shell::Fish => CompletionShell::Fish,
        crate::cli::Shell::PowerShell => CompletionShell::PowerShell,
        crate::cli::Shell::Elvish => CompletionShell::Elvish,
    }
}

/// Artist names in the library at `db_path`, sorted.
///
/// Completion must never fail loudly, so a missing or unreadable database
/// yields an empty list.
pub fn get_artist_completions(db_path: &Path) -> Vec<String> {
    if !db_path.exists() {
        return Vec::new();
    }

    MusicStore::open(db_path)
        .and_then(|store| store.all_artists())
        .unwrap_or_default()
}

/// Write one completion per line, quoting entries that contain whitespace.
pub fn write_completions<W: Write>(out: &mut W, completions: &[String]) -> Result<()> {
    for completion in completions {
        if completion.contains(char::is_whitespace) {
            writeln!(out, "\"{}\"", completion.replace('"', "\\\""))?;
        } else {
            writeln!(out, "{completion}")?;
        }
    }
    Ok(())
}

/// Print artist completions for shell completion scripts.
pub fn print_artist_completions(db_path: &Path) -> Result<()> {
    let completions = get_artist_completions(db_path);
    let stdout = io::stdout();
    write_completions(&mut stdout.lock(), &completions)
}
