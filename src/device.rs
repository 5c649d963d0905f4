//! # Audio Output
//!
//! The [`OutputDevice`] trait is everything the player needs from an audio
//! backend. [`RodioDevice`] is the real implementation; tests drive the
//! player through a scripted fake instead.
//!
//! rodio's `OutputStream` is not `Send`, so it cannot live inside the player.
//! [`RodioDevice::open_default`] hands it back to the caller, who must keep
//! it alive for as long as the device is used.

use anyhow::{anyhow, Context, Result};
use log::{debug, trace};
use rodio::mixer::Mixer;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Minimal audio sink driven by the player.
pub trait OutputDevice: Send {
    /// Open `path` and make it the current resource without starting output.
    fn load(&mut self, path: &Path) -> Result<()>;
    /// Start (or restart) output of the loaded resource.
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    /// Volume in `[0.0, 1.0]`.
    fn set_volume(&mut self, volume: f32) -> Result<()>;
    fn seek(&mut self, position: Duration) -> Result<()>;
    /// Whether audio is currently being produced.
    fn is_busy(&self) -> Result<bool>;
}

/// Output device on top of a rodio mixer.
pub struct RodioDevice {
    mixer: Mixer,
    sink: Option<Sink>,
    path: Option<PathBuf>,
    volume: f32,
}

impl std::fmt::Debug for RodioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RodioDevice")
            .field("path", &self.path)
            .field("volume", &self.volume)
            .field("loaded", &self.sink.is_some())
            .finish()
    }
}

impl RodioDevice {
    /// Open the system default output.
    ///
    /// # Errors
    ///
    /// Returns an error if no output device is available.
    pub fn open_default() -> Result<(Self, OutputStream)> {
        let mut stream = OutputStreamBuilder::open_default_stream()
            .context("Cannot open default audio output")?;
        stream.log_on_drop(false);

        let device = Self::with_mixer(stream.mixer().clone());
        Ok((device, stream))
    }

    pub fn with_mixer(mixer: Mixer) -> Self {
        Self {
            mixer,
            sink: None,
            path: None,
            volume: 1.0,
        }
    }

    fn sink(&self) -> Result<&Sink> {
        self.sink.as_ref().ok_or_else(|| anyhow!("No audio file loaded"))
    }

    fn open_source(path: &Path) -> Result<Decoder<std::io::BufReader<File>>> {
        let file = File::open(path)
            .with_context(|| format!("Cannot open audio file {}", path.display()))?;
        Decoder::try_from(file)
            .with_context(|| format!("Cannot decode audio file {}", path.display()))
    }
}

impl OutputDevice for RodioDevice {
    fn load(&mut self, path: &Path) -> Result<()> {
        let source = Self::open_source(path)?;

        if let Some(old) = self.sink.take() {
            old.stop();
        }

        let sink = Sink::connect_new(&self.mixer);
        sink.pause();
        sink.set_volume(self.volume);
        sink.append(source);

        debug!("Loaded {}", path.display());
        self.sink = Some(sink);
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        // A drained or stopped sink has to be rebuilt to play again.
        if self.sink()?.empty() {
            let path = self
                .path
                .clone()
                .ok_or_else(|| anyhow!("No audio file loaded"))?;
            self.load(&path)?;
        }
        self.sink()?.play();
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.sink()?.pause();
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.sink()?.play();
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(sink) = &self.sink {
            sink.stop();
        }
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.volume);
        }
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        trace!("Seeking to {position:?}");
        self.sink()?
            .try_seek(position)
            .map_err(|e| anyhow!("Seek failed: {e}"))
    }

    fn is_busy(&self) -> Result<bool> {
        Ok(self
            .sink
            .as_ref()
            .is_some_and(|sink| !sink.empty() && !sink.is_paused()))
    }
}
