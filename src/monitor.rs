//! # Auto-Advance Monitor
//!
//! Background thread that drives [`Player::poll_tick`] on a fixed interval
//! for the lifetime of the process.
//!
//! ## Behavior
//!
//! - A tick that fails (for example because the audio device went away) is
//!   logged and dropped; the loop always carries on with the next tick.
//! - The loop only ends when [`PlaybackMonitor::stop`] is called or the
//!   monitor is dropped.

use crate::player::{Player, TickOutcome};
use anyhow::{Context, Result};
use log::{debug, info, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Granularity at which a sleeping monitor notices a stop request.
const STOP_CHECK: Duration = Duration::from_millis(50);

/// Handle to the running poll thread.
#[derive(Debug)]
pub struct PlaybackMonitor {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackMonitor {
    /// Spawn the poll thread for `player`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn start(player: Player, interval: Duration) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("playback-monitor".to_string())
            .spawn(move || run(&player, interval, &flag))
            .context("Failed to spawn playback monitor thread")?;

        info!("Playback monitor started (interval {interval:?})");
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the thread to finish and wait for it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("Playback monitor thread panicked");
            }
            info!("Playback monitor stopped");
        }
    }
}

impl Drop for PlaybackMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(player: &Player, interval: Duration, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        match player.poll_tick() {
            Ok(TickOutcome::Unchanged) => trace!("Poll tick: no change"),
            Ok(TickOutcome::Advanced { index, started }) => {
                debug!("Poll tick advanced to entry {index} (started: {started})");
            }
            Ok(TickOutcome::Finished) => debug!("Poll tick: playback finished"),
            Err(e) => debug!("Ignoring poll tick error: {e:#}"),
        }
        sleep_while_running(interval, running);
    }
}

fn sleep_while_running(interval: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + interval;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(STOP_CHECK));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::tests::{fake_player, track};

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_monitor_advances_finished_track() {
        let (player, state) = fake_player();
        player.set_playlist(vec![track(1, "A"), track(2, "B")]);
        player.play_all();

        let mut monitor = PlaybackMonitor::start(player.clone(), Duration::from_millis(10)).unwrap();
        assert!(monitor.is_running());

        // Let the monitor see the busy track before it ends.
        thread::sleep(Duration::from_millis(50));
        state.lock().unwrap().busy = false;

        assert!(wait_for(|| player.current_index() == 1));
        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_monitor_survives_device_errors() {
        let (player, state) = fake_player();
        player.set_playlist(vec![track(1, "A"), track(2, "B")]);
        player.play_all();
        state.lock().unwrap().fail_busy = true;

        let mut monitor = PlaybackMonitor::start(player.clone(), Duration::from_millis(5)).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(monitor.is_running());

        state.lock().unwrap().fail_busy = false;
        thread::sleep(Duration::from_millis(50));
        state.lock().unwrap().busy = false;

        assert!(wait_for(|| player.current_index() == 1));
        monitor.stop();
    }

    #[test]
    fn test_stop_is_prompt_with_long_interval() {
        let (player, _) = fake_player();
        let mut monitor = PlaybackMonitor::start(player, Duration::from_secs(60)).unwrap();

        let started = Instant::now();
        monitor.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
