use super::{
    AssetError,
    AudioAsset,
    AudioBackend,
    Tone,
};
use std::io::Write;
use tracing::{
    debug,
    trace,
};

const NO_DEVICE: &str = "no audio device on a plain terminal";

/// Backend for a terminal without a sound device.
///
/// No asset can be played, so the worker falls back to synthesized tones for
/// everything; win and lose tones ring the terminal bell.
pub struct TerminalAudio {
    out: Box<dyn Write + Send>,
}

impl Default for TerminalAudio {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalAudio {
    pub fn new() -> Self {
        Self::with_output(std::io::stderr())
    }

    /// Ring the bell on `out` instead of stderr.
    pub fn with_output(out: impl Write + Send + 'static) -> Self {
        Self { out: Box::new(out) }
    }

    fn ring(&mut self, times: usize) {
        for _ in 0..times {
            if self.out.write_all(b"\x07").is_err() {
                return;
            }
        }
        let _ = self.out.flush();
    }

    fn unavailable(name: &str) -> AssetError {
        AssetError::Playback {
            name: name.to_string(),
            reason: NO_DEVICE.to_string(),
        }
    }
}

impl AudioBackend for TerminalAudio {
    fn load(&mut self, name: &str) -> Result<AudioAsset, AssetError> {
        Err(Self::unavailable(name))
    }

    fn play_loop(&mut self, asset: &AudioAsset, _volume: f32) -> Result<(), AssetError> {
        Err(Self::unavailable(&asset.name))
    }

    fn pause_loop(&mut self) {}

    fn play_once(&mut self, asset: &AudioAsset, _volume: f32) -> Result<(), AssetError> {
        Err(Self::unavailable(&asset.name))
    }

    fn stop_cues(&mut self) {
        debug!("cues stopped");
    }

    fn synthesize(&mut self, tone: Tone) {
        trace!(?tone, "synthesized");
        match tone {
            Tone::Background | Tone::Spin => {}
            Tone::Win => self.ring(2),
            Tone::Lose => self.ring(1),
        }
    }
}
