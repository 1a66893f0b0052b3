use crate::outcome::GameOutcome;
use std::time::Duration;
use thiserror::Error;
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    task::JoinHandle,
    time::{
        self,
        Instant,
        Interval,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    info,
    warn,
};

mod machine;
#[cfg(feature = "speaker")]
pub mod speaker_backend;
pub mod terminal_backend;

pub use machine::{
    AudioEffect,
    AudioEvent,
    AudioMachine,
};

/// What the player currently hears.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AudioState {
    #[default]
    Idle,
    PlayingBackground,
    PlayingWinCue,
    PlayingLoseCue,
}

impl AudioState {
    pub fn is_cue(self) -> bool {
        matches!(self, AudioState::PlayingWinCue | AudioState::PlayingLoseCue)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cue {
    Win,
    Lose,
}

impl Cue {
    pub fn state(self) -> AudioState {
        match self {
            Cue::Win => AudioState::PlayingWinCue,
            Cue::Lose => AudioState::PlayingLoseCue,
        }
    }
}

/// Procedurally generated sounds used when an asset is unavailable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tone {
    Background,
    Spin,
    Win,
    Lose,
}

impl From<Cue> for Tone {
    fn from(cue: Cue) -> Self {
        match cue {
            Cue::Win => Tone::Win,
            Cue::Lose => Tone::Lose,
        }
    }
}

/// A loaded sound. `duration` is `None` when the backend cannot tell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioAsset {
    pub name: String,
    pub duration: Option<Duration>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("audio asset {0} not found")]
    Missing(String),
    #[error("audio asset {name} could not be played: {reason}")]
    Playback { name: String, reason: String },
}

/// Sound output device.
pub trait AudioBackend {
    fn load(&mut self, name: &str) -> Result<AudioAsset, AssetError>;

    /// Start or resume the looping background track.
    fn play_loop(&mut self, asset: &AudioAsset, volume: f32) -> Result<(), AssetError>;

    fn pause_loop(&mut self);

    fn play_once(&mut self, asset: &AudioAsset, volume: f32) -> Result<(), AssetError>;

    fn stop_cues(&mut self);

    fn synthesize(&mut self, tone: Tone);
}

#[derive(Clone, Debug, PartialEq)]
pub struct AudioConfig {
    pub enabled: bool,
    pub volume: f32,
    /// tried in order; if neither loads the background is synthesized
    pub background_tracks: Vec<String>,
    pub spin_cue: String,
    pub win_cue: String,
    pub lose_cue: String,
    pub synth_background_interval: Duration,
    /// how long a win cue holds when its real duration is unknown
    pub win_fallback: Duration,
    pub lose_fallback: Duration,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: 0.3,
            background_tracks: vec!["bgm.mp3".to_string(), "kung-fu-bgm.mp3".to_string()],
            spin_cue: "spin-sound.mp3".to_string(),
            win_cue: "win.mp3".to_string(),
            lose_cue: "lose.mp3".to_string(),
            synth_background_interval: Duration::from_secs(2),
            win_fallback: Duration::from_millis(1000),
            lose_fallback: Duration::from_millis(800),
        }
    }
}

impl AudioConfig {
    fn fallback(&self, cue: Cue) -> Duration {
        match cue {
            Cue::Win => self.win_fallback,
            Cue::Lose => self.lose_fallback,
        }
    }

    fn cue_name(&self, cue: Cue) -> &str {
        match cue {
            Cue::Win => &self.win_cue,
            Cue::Lose => &self.lose_cue,
        }
    }
}

/// Sender side of the audio worker. Cheap to clone; notifications never block.
#[derive(Clone, Debug)]
pub struct AudioHandle {
    events: mpsc::UnboundedSender<AudioEvent>,
    state: watch::Receiver<AudioState>,
}

impl AudioHandle {
    /// Spawn the worker on the current runtime.
    pub fn spawn<B>(backend: B, config: AudioConfig) -> (Self, JoinHandle<()>)
    where
        B: AudioBackend + Send + 'static,
    {
        let (events, receiver) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(AudioState::Idle);
        let worker = AudioWorker::new(backend, config);
        let task = tokio::spawn(worker.run(receiver, state_tx));
        (Self { events, state }, task)
    }

    /// A handle whose worker is already gone. Notifications are dropped.
    pub fn detached() -> Self {
        let (events, _) = mpsc::unbounded_channel();
        let (_, state) = watch::channel(AudioState::Idle);
        Self { events, state }
    }

    pub fn notify_spin_started(&self) {
        self.send(AudioEvent::SpinStarted);
    }

    pub fn notify_outcome(&self, outcome: &GameOutcome) {
        self.send(AudioEvent::OutcomeDecoded {
            is_win: outcome.is_win(),
        });
    }

    pub fn set_master_audio_enabled(&self, enabled: bool) {
        self.send(AudioEvent::MasterToggled(enabled));
    }

    pub fn state(&self) -> AudioState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<AudioState> {
        self.state.clone()
    }

    fn send(&self, event: AudioEvent) {
        if self.events.send(event).is_err() {
            debug!(?event, "audio worker not running; event dropped");
        }
    }
}

enum Background {
    Track(AudioAsset),
    Synthesized,
}

enum Wake {
    Event(AudioEvent),
    CueElapsed,
    SynthTick,
}

struct AudioWorker<B> {
    backend: B,
    config: AudioConfig,
    machine: AudioMachine,
    background: Background,
    spin: Option<AudioAsset>,
    win: Option<AudioAsset>,
    lose: Option<AudioAsset>,
    cue_deadline: Option<Instant>,
    synth_ticker: Option<Interval>,
}

impl<B: AudioBackend> AudioWorker<B> {
    fn new(mut backend: B, config: AudioConfig) -> Self {
        let background = config
            .background_tracks
            .iter()
            .find_map(|name| load_asset(&mut backend, name))
            .map(Background::Track)
            .unwrap_or_else(|| {
                info!("no background track available; synthesizing");
                Background::Synthesized
            });
        let spin = load_asset(&mut backend, &config.spin_cue);
        let win = load_asset(&mut backend, &config.win_cue);
        let lose = load_asset(&mut backend, &config.lose_cue);
        Self {
            backend,
            config,
            machine: AudioMachine::default(),
            background,
            spin,
            win,
            lose,
            cue_deadline: None,
            synth_ticker: None,
        }
    }

    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<AudioEvent>,
        state: watch::Sender<AudioState>,
    ) {
        self.apply(AudioEvent::MasterToggled(self.config.enabled));
        state.send_replace(self.machine.state());

        loop {
            let wake = tokio::select! {
                event = events.recv() => event.map(Wake::Event),
                _ = sleep_until(self.cue_deadline) => Some(Wake::CueElapsed),
                _ = next_tick(self.synth_ticker.as_mut()) => Some(Wake::SynthTick),
            };
            let Some(wake) = wake else {
                break;
            };
            match wake {
                Wake::Event(event) => self.apply(event),
                Wake::CueElapsed => {
                    self.cue_deadline = None;
                    self.apply(AudioEvent::CueFinished);
                }
                Wake::SynthTick => self.backend.synthesize(Tone::Background),
            }
            state.send_replace(self.machine.state());
        }

        self.stop_all();
        debug!("audio worker stopped");
    }

    fn apply(&mut self, event: AudioEvent) {
        let before = self.machine.state();
        for effect in self.machine.handle(event) {
            self.execute(effect);
        }
        let after = self.machine.state();
        if before != after {
            debug!(?event, from = ?before, to = ?after, "audio transition");
        }
    }

    fn execute(&mut self, effect: AudioEffect) {
        match effect {
            AudioEffect::ResumeBackground => self.resume_background(),
            AudioEffect::PauseBackground => self.pause_background(),
            AudioEffect::StopCue => {
                self.backend.stop_cues();
                self.cue_deadline = None;
            }
            AudioEffect::StopAll => self.stop_all(),
            AudioEffect::PlaySpin => self.play_spin(),
            AudioEffect::PlayCue(cue) => self.play_cue(cue),
        }
    }

    fn resume_background(&mut self) {
        if let Background::Track(asset) = &self.background {
            match self.backend.play_loop(asset, self.config.volume) {
                Ok(()) => return,
                Err(err) => {
                    warn!(%err, "background track failed; synthesizing instead");
                    self.background = Background::Synthesized;
                }
            }
        }
        let mut ticker = time::interval(self.config.synth_background_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.synth_ticker = Some(ticker);
    }

    fn pause_background(&mut self) {
        match self.background {
            Background::Track(_) => self.backend.pause_loop(),
            Background::Synthesized => self.synth_ticker = None,
        }
    }

    fn stop_all(&mut self) {
        self.pause_background();
        self.backend.stop_cues();
        self.cue_deadline = None;
    }

    fn play_spin(&mut self) {
        let volume = self.config.volume * 0.8;
        let played = match &self.spin {
            Some(asset) => self.backend.play_once(asset, volume),
            None => Err(AssetError::Missing(self.config.spin_cue.clone())),
        };
        if let Err(err) = played {
            debug!(%err, "spin cue synthesized");
            self.backend.synthesize(Tone::Spin);
        }
    }

    fn play_cue(&mut self, cue: Cue) {
        let asset = match cue {
            Cue::Win => self.win.as_ref(),
            Cue::Lose => self.lose.as_ref(),
        };
        let played = match asset {
            Some(asset) => self
                .backend
                .play_once(asset, self.config.volume)
                .map(|()| asset.duration),
            None => Err(AssetError::Missing(self.config.cue_name(cue).to_string())),
        };
        let hold = match played {
            Ok(Some(duration)) => duration,
            Ok(None) => self.config.fallback(cue),
            Err(err) => {
                debug!(%err, ?cue, "cue synthesized");
                self.backend.synthesize(cue.into());
                self.config.fallback(cue)
            }
        };
        self.cue_deadline = Some(Instant::now() + hold);
    }
}

fn load_asset<B: AudioBackend>(backend: &mut B, name: &str) -> Option<AudioAsset> {
    match backend.load(name) {
        Ok(asset) => Some(asset),
        Err(err) => {
            info!(%err, "audio asset unavailable");
            None
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
