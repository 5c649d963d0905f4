//! # Playback State Machine
//!
//! [`Player`] owns the playlist, the position in it and the transport flags,
//! and drives an [`OutputDevice`]. It is a cheap `Clone` handle: every clone
//! shares one mutex around the whole state (device included), so the tool
//! layer and the auto-advance monitor never observe a half-applied
//! transition.
//!
//! ## States
//!
//! ```text
//! Idle ──load──▶ Stopped ──play──▶ Playing ◀──resume── Paused
//!                   ▲                 │  └────pause────▶ │
//!                   └──────stop───────┴──────────stop────┘
//! ```
//!
//! ## Auto-advance
//!
//! [`Player::poll_tick`] samples the device's busy flag and compares it with
//! the previous sample. Only a busy → idle edge while not paused counts as a
//! finished track. [`Player::stop`] and [`Player::pause`] clear the previous
//! sample so a user-initiated halt is never mistaken for a natural end.
//!
//! Device failures never escape a transport call: they are logged and turned
//! into a `false` return.

use crate::config::RuntimeConfig;
use crate::db::Track;
use crate::device::OutputDevice;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Step used by [`Player::volume_up`] and [`Player::volume_down`].
pub const VOLUME_STEP: f64 = 0.1;

/// Coarse transport state derived from the player flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Nothing loaded.
    Idle,
    Playing,
    Paused,
    /// A track is loaded but at rest.
    Stopped,
}

/// Point-in-time view of the player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStatus {
    pub is_playing: bool,
    pub is_paused: bool,
    /// Path of the loaded track.
    pub current_track: Option<String>,
    /// File stem of the loaded track.
    pub current_track_name: Option<String>,
    pub volume: f64,
    pub playlist_size: usize,
    /// Zero-based position in the playlist.
    pub current_index: usize,
}

/// What a single [`Player::poll_tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No finished track detected.
    Unchanged,
    /// A track finished and playback moved to `index`.
    Advanced { index: usize, started: bool },
    /// The only track finished; playback is over.
    Finished,
}

struct Inner {
    device: Box<dyn OutputDevice>,
    playlist: Vec<Track>,
    current_index: usize,
    current_track: Option<Track>,
    is_playing: bool,
    is_paused: bool,
    volume: f64,
    last_busy: bool,
    settle_delay: Duration,
}

/// Shared handle to the single playback state machine.
#[derive(Clone)]
pub struct Player {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player").field("status", &self.status()).finish()
    }
}

impl Player {
    /// Wrap `device`, applying the initial volume.
    pub fn new(device: Box<dyn OutputDevice>, volume: f64, settle_delay: Duration) -> Self {
        let mut inner = Inner {
            device,
            playlist: Vec::new(),
            current_index: 0,
            current_track: None,
            is_playing: false,
            is_paused: false,
            volume: clamp_volume(volume),
            last_busy: false,
            settle_delay,
        };
        let volume = inner.volume;
        inner.apply_volume(volume);

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn from_config(device: Box<dyn OutputDevice>, config: &RuntimeConfig) -> Self {
        Self::new(device, config.default_volume, config.settle_delay)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic mid-call leaves plain flags behind; keep going with them.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `track` current without starting output. On failure nothing is
    /// current afterwards.
    pub fn load(&self, track: &Track) -> bool {
        self.lock().load(track)
    }

    /// Start the loaded track, then wait out the settle delay.
    pub fn play(&self) -> bool {
        self.lock().play()
    }

    pub fn pause(&self) -> bool {
        self.lock().pause()
    }

    pub fn resume(&self) -> bool {
        self.lock().resume()
    }

    /// Halt output and rewind the playlist position to the start.
    pub fn stop(&self) -> bool {
        self.lock().stop()
    }

    pub fn next(&self) -> bool {
        self.lock().step(1)
    }

    pub fn previous(&self) -> bool {
        self.lock().step(-1)
    }

    /// Load and play the track at the current playlist position.
    pub fn play_current(&self) -> bool {
        self.lock().play_current()
    }

    /// Replace the playlist and rewind. Does not start playback.
    pub fn set_playlist(&self, tracks: Vec<Track>) {
        let mut inner = self.lock();
        debug!("Playlist replaced with {} tracks", tracks.len());
        inner.playlist = tracks;
        inner.current_index = 0;
    }

    /// Play a single track, leaving the playlist alone.
    pub fn play_track(&self, track: &Track) -> bool {
        let mut inner = self.lock();
        inner.load(track) && inner.play()
    }

    /// Play the playlist in order from the first track.
    pub fn play_all(&self) -> bool {
        self.lock().play_from_start(false)
    }

    /// Shuffle the playlist once, then play it from the top.
    pub fn shuffle_play(&self) -> bool {
        self.lock().play_from_start(true)
    }

    /// Replace the playlist and start it in one step, optionally shuffled.
    /// The poller cannot run between the swap and the start, so the end of
    /// the outgoing track is never taken as the end of a new entry.
    pub fn start_playlist(&self, tracks: Vec<Track>, shuffled: bool) -> bool {
        let mut inner = self.lock();
        debug!("Starting playlist of {} tracks (shuffled: {shuffled})", tracks.len());
        inner.playlist = tracks;
        inner.current_index = 0;
        inner.last_busy = false;
        inner.play_from_start(shuffled)
    }

    /// Set the volume, clamped to `[0.0, 1.0]`. Returns the stored value.
    pub fn set_volume(&self, volume: f64) -> f64 {
        self.lock().apply_volume(volume)
    }

    pub fn volume_up(&self) -> f64 {
        let mut inner = self.lock();
        let volume = inner.volume + VOLUME_STEP;
        inner.apply_volume(volume)
    }

    pub fn volume_down(&self) -> f64 {
        let mut inner = self.lock();
        let volume = inner.volume - VOLUME_STEP;
        inner.apply_volume(volume)
    }

    pub fn volume(&self) -> f64 {
        self.lock().volume
    }

    /// Jump to `position` seconds in the loaded track. Range checking is
    /// left to the caller; only negative or non-finite positions are refused.
    pub fn seek_to(&self, position: f64) -> bool {
        let mut inner = self.lock();
        let Ok(target) = Duration::try_from_secs_f64(position) else {
            warn!("Refusing to seek to {position}");
            return false;
        };
        match inner.device.seek(target) {
            Ok(()) => true,
            Err(e) => {
                warn!("Error seeking: {e:#}");
                false
            }
        }
    }

    pub fn status(&self) -> PlayerStatus {
        let inner = self.lock();
        let current_track = inner.current_track.as_ref();
        PlayerStatus {
            is_playing: inner.is_playing,
            is_paused: inner.is_paused,
            current_track: current_track.map(|t| t.file_path.clone()),
            current_track_name: current_track.and_then(|t| {
                Path::new(&t.file_path)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            }),
            volume: inner.volume,
            playlist_size: inner.playlist.len(),
            current_index: inner.current_index,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state()
    }

    /// The playlist entry at the current position.
    pub fn current_playlist_track(&self) -> Option<Track> {
        let inner = self.lock();
        inner.playlist.get(inner.current_index).cloned()
    }

    /// The track most recently loaded, whether or not it came from the playlist.
    pub fn current_track(&self) -> Option<Track> {
        self.lock().current_track.clone()
    }

    pub fn playlist(&self) -> Vec<Track> {
        self.lock().playlist.clone()
    }

    pub fn current_index(&self) -> usize {
        self.lock().current_index
    }

    pub fn is_paused(&self) -> bool {
        self.lock().is_paused
    }

    /// Whether the device is producing audio. Device errors read as idle.
    pub fn is_busy(&self) -> bool {
        self.lock().device_busy()
    }

    /// One iteration of the auto-advance protocol.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be sampled. The previous sample
    /// is kept in that case.
    pub fn poll_tick(&self) -> Result<TickOutcome> {
        let mut inner = self.lock();
        let busy = inner
            .device
            .is_busy()
            .context("Failed to sample output device")?;

        let outcome = if inner.last_busy && !busy && !inner.is_paused {
            if inner.playlist.len() > 1 {
                inner.current_index = (inner.current_index + 1) % inner.playlist.len();
                let index = inner.current_index;
                info!("Track finished, advancing to playlist entry {}", index + 1);
                let started = inner.play_current();
                TickOutcome::Advanced { index, started }
            } else {
                debug!("Track finished, nothing left to play");
                inner.is_playing = false;
                TickOutcome::Finished
            }
        } else {
            TickOutcome::Unchanged
        };

        inner.last_busy = busy;
        Ok(outcome)
    }
}

impl Inner {
    fn load(&mut self, track: &Track) -> bool {
        match self.device.load(Path::new(&track.file_path)) {
            Ok(()) => {
                self.current_track = Some(track.clone());
                true
            }
            Err(e) => {
                warn!("Error loading {}: {e:#}", track.file_path);
                self.current_track = None;
                false
            }
        }
    }

    fn play(&mut self) -> bool {
        if self.current_track.is_none() {
            warn!("Play requested with nothing loaded");
            return false;
        }

        match self.device.play() {
            Ok(()) => {
                self.is_playing = true;
                self.is_paused = false;
                if !self.settle_delay.is_zero() {
                    std::thread::sleep(self.settle_delay);
                }
                true
            }
            Err(e) => {
                warn!("Error playing: {e:#}");
                false
            }
        }
    }

    fn pause(&mut self) -> bool {
        if self.device_busy() {
            match self.device.pause() {
                Ok(()) => {
                    self.is_paused = true;
                    self.last_busy = false;
                    true
                }
                Err(e) => {
                    warn!("Error pausing: {e:#}");
                    false
                }
            }
        } else {
            self.is_paused
        }
    }

    fn resume(&mut self) -> bool {
        if self.is_paused {
            match self.device.resume() {
                Ok(()) => {
                    self.is_paused = false;
                    self.is_playing = true;
                    true
                }
                Err(e) => {
                    warn!("Error resuming: {e:#}");
                    false
                }
            }
        } else if !self.device_busy() {
            self.play_current()
        } else {
            false
        }
    }

    fn stop(&mut self) -> bool {
        let result = self.device.stop();
        self.is_playing = false;
        self.is_paused = false;
        self.current_index = 0;
        self.last_busy = false;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Error stopping: {e:#}");
                false
            }
        }
    }

    fn step(&mut self, delta: isize) -> bool {
        let len = self.playlist.len();
        if len == 0 {
            return false;
        }
        self.current_index = if delta >= 0 {
            (self.current_index + 1) % len
        } else {
            (self.current_index + len - 1) % len
        };
        self.play_current()
    }

    fn play_from_start(&mut self, shuffled: bool) -> bool {
        if self.playlist.is_empty() {
            return false;
        }
        if shuffled {
            self.playlist.shuffle(&mut thread_rng());
        }
        self.current_index = 0;
        self.play_current()
    }

    fn play_current(&mut self) -> bool {
        let Some(track) = self.playlist.get(self.current_index).cloned() else {
            return false;
        };
        self.load(&track) && self.play()
    }

    fn apply_volume(&mut self, volume: f64) -> f64 {
        self.volume = clamp_volume(volume);
        if let Err(e) = self.device.set_volume(self.volume as f32) {
            warn!("Error setting volume: {e:#}");
        }
        self.volume
    }

    fn device_busy(&self) -> bool {
        self.device.is_busy().unwrap_or_else(|e| {
            debug!("Device busy check failed: {e:#}");
            false
        })
    }

    fn state(&self) -> PlaybackState {
        if self.current_track.is_none() {
            PlaybackState::Idle
        } else if self.is_paused {
            PlaybackState::Paused
        } else if self.is_playing {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        }
    }
}

fn clamp_volume(volume: f64) -> f64 {
    volume.max(0.0).min(1.0)
}
