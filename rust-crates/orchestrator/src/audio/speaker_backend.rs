use super::{
    AssetError,
    AudioAsset,
    AudioBackend,
    Tone,
};
use rodio::{
    Decoder,
    OutputStream,
    OutputStreamHandle,
    Sink,
    Source,
    source::SineWave,
};
use std::{
    collections::HashMap,
    fs,
    io::{
        self,
        Cursor,
    },
    path::{
        Path,
        PathBuf,
    },
    sync::mpsc,
    thread,
    time::Duration,
};
use thiserror::Error;
use tracing::{
    debug,
    info,
};

/// Amplitude of synthesized tones relative to full scale.
const SYNTH_GAIN: f32 = 0.15;

#[derive(Error, Debug)]
pub enum SpeakerError {
    #[error("no audio output device: {0}")]
    NoDevice(String),
}

/// Notes as (frequency in Hz, length in ms).
fn melody(tone: Tone) -> &'static [(f32, u64)] {
    match tone {
        Tone::Background => &[(261.63, 180), (329.63, 180), (392.0, 240)],
        Tone::Spin => &[(440.0, 60), (554.37, 60), (659.25, 60), (880.0, 90)],
        Tone::Win => &[(523.25, 150), (659.25, 150), (783.99, 150), (1046.5, 400)],
        Tone::Lose => &[(392.0, 220), (329.63, 220), (261.63, 360)],
    }
}

/// Plays assets from `asset_dir` on the default output device.
pub struct SpeakerAudio {
    asset_dir: PathBuf,
    output: OutputStreamHandle,
    samples: HashMap<String, Vec<u8>>,
    background: Option<Sink>,
    cue: Option<Sink>,
    // dropping the sender ends the thread that owns the output stream
    _stream: mpsc::Sender<()>,
}

impl SpeakerAudio {
    /// Open the default output device.
    ///
    /// The device stream cannot leave the thread that opened it, so it lives on a
    /// dedicated thread for as long as the backend does.
    pub fn open(asset_dir: impl Into<PathBuf>) -> Result<Self, SpeakerError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = ready_tx.send(Ok(handle));
                    let _ = stop_rx.recv();
                    drop(stream);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err.to_string()));
                }
            })
            .map_err(|err| SpeakerError::NoDevice(err.to_string()))?;
        let output = ready_rx
            .recv()
            .map_err(|err| SpeakerError::NoDevice(err.to_string()))?
            .map_err(SpeakerError::NoDevice)?;
        info!("audio output device opened");
        Ok(Self {
            asset_dir: asset_dir.into(),
            output,
            samples: HashMap::new(),
            background: None,
            cue: None,
            _stream: stop_tx,
        })
    }

    fn decoder(&self, asset: &AudioAsset) -> Result<Decoder<Cursor<Vec<u8>>>, AssetError> {
        let bytes = self
            .samples
            .get(&asset.name)
            .ok_or_else(|| AssetError::Missing(asset.name.clone()))?;
        Decoder::new(Cursor::new(bytes.clone())).map_err(|err| playback(&asset.name, err))
    }

    fn sink(&self, name: &str) -> Result<Sink, AssetError> {
        Sink::try_new(&self.output).map_err(|err| playback(name, err))
    }
}

fn playback(name: &str, err: impl ToString) -> AssetError {
    AssetError::Playback {
        name: name.to_string(),
        reason: err.to_string(),
    }
}

/// Read and decode an asset file once, returning its bytes and length.
fn read_asset(path: &Path, name: &str) -> Result<(Vec<u8>, AudioAsset), AssetError> {
    let bytes = fs::read(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => AssetError::Missing(path.display().to_string()),
        _ => playback(name, err),
    })?;
    let decoder = Decoder::new(Cursor::new(bytes.clone())).map_err(|err| playback(name, err))?;
    let asset = AudioAsset {
        name: name.to_string(),
        duration: decoder.total_duration(),
    };
    Ok((bytes, asset))
}

impl AudioBackend for SpeakerAudio {
    fn load(&mut self, name: &str) -> Result<AudioAsset, AssetError> {
        let (bytes, asset) = read_asset(&self.asset_dir.join(name), name)?;
        debug!(asset = name, duration = ?asset.duration, "audio asset loaded");
        self.samples.insert(name.to_string(), bytes);
        Ok(asset)
    }

    fn play_loop(&mut self, asset: &AudioAsset, volume: f32) -> Result<(), AssetError> {
        if let Some(sink) = &self.background {
            sink.set_volume(volume);
            sink.play();
            return Ok(());
        }
        let source = self.decoder(asset)?.repeat_infinite();
        let sink = self.sink(&asset.name)?;
        sink.set_volume(volume);
        sink.append(source);
        self.background = Some(sink);
        Ok(())
    }

    fn pause_loop(&mut self) {
        if let Some(sink) = &self.background {
            sink.pause();
        }
    }

    fn play_once(&mut self, asset: &AudioAsset, volume: f32) -> Result<(), AssetError> {
        let source = self.decoder(asset)?;
        let sink = self.sink(&asset.name)?;
        sink.set_volume(volume);
        sink.append(source);
        // replacing the sink stops whatever cue was still playing
        self.cue = Some(sink);
        Ok(())
    }

    fn stop_cues(&mut self) {
        self.cue = None;
    }

    fn synthesize(&mut self, tone: Tone) {
        let sink = match Sink::try_new(&self.output) {
            Ok(sink) => sink,
            Err(err) => {
                debug!(%err, ?tone, "no sink for synthesized tone");
                return;
            }
        };
        for &(frequency, millis) in melody(tone) {
            sink.append(
                SineWave::new(frequency)
                    .take_duration(Duration::from_millis(millis))
                    .amplify(SYNTH_GAIN),
            );
        }
        match tone {
            Tone::Win | Tone::Lose => self.cue = Some(sink),
            Tone::Background | Tone::Spin => sink.detach(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    /// Silent 16-bit mono PCM.
    fn wav(sample_rate: u32, samples: u32) -> Vec<u8> {
        let data_len = samples * 2;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.resize(out.len() + data_len as usize, 0);
        out
    }

    #[test]
    fn read_asset__reports_the_decoded_length() {
        // given
        let dir = TempDir::new("speaker").unwrap();
        let path = dir.path().join("win.wav");
        fs::write(&path, wav(8_000, 12_000)).unwrap();

        // when
        let (bytes, asset) = read_asset(&path, "win.wav").unwrap();

        // then
        assert_eq!(asset.name, "win.wav");
        assert!(!bytes.is_empty());
        let duration = asset.duration.unwrap();
        assert!(duration >= Duration::from_millis(1_490));
        assert!(duration <= Duration::from_millis(1_510));
    }

    #[test]
    fn read_asset__distinguishes_missing_from_undecodable() {
        // given
        let dir = TempDir::new("speaker").unwrap();
        let garbage = dir.path().join("lose.mp3");
        fs::write(&garbage, b"definitely not audio").unwrap();

        // when
        let missing = read_asset(&dir.path().join("bgm.mp3"), "bgm.mp3");
        let undecodable = read_asset(&garbage, "lose.mp3");

        // then
        assert!(matches!(missing, Err(AssetError::Missing(_))));
        assert!(matches!(undecodable, Err(AssetError::Playback { .. })));
    }

    #[test]
    fn melody__win_ends_higher_than_lose() {
        let last = |tone| melody(tone).last().map(|(f, _)| *f).unwrap();
        assert!(last(Tone::Win) > last(Tone::Lose));
    }
}
