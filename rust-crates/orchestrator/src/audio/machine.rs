use super::{
    AudioState,
    Cue,
};

/// Inputs to the audio state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioEvent {
    SpinStarted,
    OutcomeDecoded { is_win: bool },
    /// the active cue ended or its fallback timer elapsed
    CueFinished,
    MasterToggled(bool),
}

/// What the driver must do to the audio backend after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioEffect {
    ResumeBackground,
    PauseBackground,
    StopCue,
    StopAll,
    PlaySpin,
    PlayCue(Cue),
}

/// Pure transition table. Timers and playback live in the worker.
#[derive(Clone, Debug, Default)]
pub struct AudioMachine {
    state: AudioState,
    enabled: bool,
}

impl AudioMachine {
    pub fn state(&self) -> AudioState {
        self.state
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn handle(&mut self, event: AudioEvent) -> Vec<AudioEffect> {
        match event {
            AudioEvent::MasterToggled(false) => {
                self.enabled = false;
                self.state = AudioState::Idle;
                vec![AudioEffect::StopAll]
            }
            AudioEvent::MasterToggled(true) => {
                self.enabled = true;
                if self.state == AudioState::Idle {
                    self.state = AudioState::PlayingBackground;
                    vec![AudioEffect::ResumeBackground]
                } else {
                    Vec::new()
                }
            }
            AudioEvent::SpinStarted if self.enabled => vec![AudioEffect::PlaySpin],
            AudioEvent::OutcomeDecoded { is_win } if self.enabled => {
                let cue = if is_win { Cue::Win } else { Cue::Lose };
                let mut effects = Vec::with_capacity(2);
                match self.state {
                    AudioState::PlayingBackground => {
                        effects.push(AudioEffect::PauseBackground)
                    }
                    AudioState::PlayingWinCue | AudioState::PlayingLoseCue => {
                        effects.push(AudioEffect::StopCue)
                    }
                    AudioState::Idle => {}
                }
                effects.push(AudioEffect::PlayCue(cue));
                self.state = cue.state();
                effects
            }
            // the toggle forces Idle, so a cue state implies audio is still enabled
            AudioEvent::CueFinished if self.state.is_cue() => {
                self.state = AudioState::PlayingBackground;
                vec![AudioEffect::ResumeBackground]
            }
            _ => Vec::new(),
        }
    }
}
