//! Envelope generators for triggered voices.
//!
//! The amplitude envelope is a linear ADSR counted in samples; the filter
//! envelope sweeps cutoff exponentially over an octave range.

/// Envelope stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

const ENV_MIN: f64 = 0.001;
const RELEASE_MIN: f64 = 0.01;

/// Resolved ADSR parameters, in seconds (sustain is a level).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdsrParams {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl AdsrParams {
    pub const DEFAULT: AdsrParams = AdsrParams {
        attack: 0.001,
        decay: 0.05,
        sustain: 0.6,
        release: 0.01,
    };

    /// Resolve event-supplied fields. All unset means the defaults; once any
    /// field is set, times are floored at sensible minimums and the sustain
    /// level depends on whether a decay was given (a decay with no sustain
    /// reads as percussive).
    pub fn resolve(
        attack: Option<f64>,
        decay: Option<f64>,
        sustain: Option<f64>,
        release: Option<f64>,
    ) -> Self {
        if attack.is_none() && decay.is_none() && sustain.is_none() && release.is_none() {
            return Self::DEFAULT;
        }
        let sustain_level = sustain.unwrap_or(if decay.is_some() { 0.0 } else { 1.0 });
        AdsrParams {
            attack: attack.unwrap_or(0.0).max(ENV_MIN),
            decay: decay.unwrap_or(0.0).max(ENV_MIN),
            sustain: sustain_level.clamp(0.0, 1.0),
            release: release.unwrap_or(0.0).max(RELEASE_MIN),
        }
    }
}

/// Linear ADSR over sample counts. Release always ramps from the level the
/// envelope had when the gate dropped, so a release during the attack does
/// not jump.
#[derive(Debug, Clone)]
pub struct AdsrEnvelope {
    attack_samples: u64,
    decay_samples: u64,
    sustain: f32,
    release_samples: u64,
    state: EnvelopeState,
    position: u64,
    level: f32,
    release_from: f32,
}

impl AdsrEnvelope {
    pub fn new(params: AdsrParams, sample_rate: f32) -> Self {
        let samples = |seconds: f64| (seconds * sample_rate as f64).max(1.0) as u64;
        Self {
            attack_samples: samples(params.attack),
            decay_samples: samples(params.decay),
            sustain: params.sustain as f32,
            release_samples: samples(params.release),
            state: EnvelopeState::Idle,
            position: 0,
            level: 0.0,
            release_from: 0.0,
        }
    }

    pub fn trigger(&mut self) {
        self.state = EnvelopeState::Attack;
        self.position = 0;
        self.level = 0.0;
    }

    pub fn release(&mut self) {
        if self.state != EnvelopeState::Idle && self.state != EnvelopeState::Release {
            self.release_from = self.level;
            self.state = EnvelopeState::Release;
            self.position = 0;
        }
    }

    pub fn is_active(&self) -> bool {
        self.state != EnvelopeState::Idle
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    /// Advance one sample and return the current level.
    pub fn process(&mut self) -> f32 {
        match self.state {
            EnvelopeState::Idle => {
                self.level = 0.0;
            }
            EnvelopeState::Attack => {
                self.level = self.position as f32 / self.attack_samples as f32;
                self.position += 1;
                if self.position >= self.attack_samples {
                    self.state = EnvelopeState::Decay;
                    self.position = 0;
                    self.level = 1.0;
                }
            }
            EnvelopeState::Decay => {
                let t = self.position as f32 / self.decay_samples as f32;
                self.level = 1.0 + (self.sustain - 1.0) * t;
                self.position += 1;
                if self.position >= self.decay_samples {
                    self.state = EnvelopeState::Sustain;
                    self.position = 0;
                    self.level = self.sustain;
                }
            }
            EnvelopeState::Sustain => {
                self.level = self.sustain;
            }
            EnvelopeState::Release => {
                let t = self.position as f32 / self.release_samples as f32;
                self.level = self.release_from * (1.0 - t);
                self.position += 1;
                if self.position >= self.release_samples {
                    self.state = EnvelopeState::Idle;
                    self.level = 0.0;
                }
            }
        }
        self.level
    }
}

/// Filter-cutoff envelope with depth in octaves.
///
/// With depth `env`, the sweep runs between `base` and `base * 2^|env|`
/// (downward when `env` is negative): attack rises exponentially to the top,
/// decay falls to the sustain cutoff, release returns to the bottom.
#[derive(Debug, Clone)]
pub struct FilterEnvelope {
    min: f64,
    max: f64,
    sustain_cutoff: f64,
    attack_samples: u64,
    decay_samples: u64,
    release_samples: u64,
    state: EnvelopeState,
    position: u64,
    current: f64,
    release_from: f64,
}

/// Filter envelope timing defaults.
pub const FILTER_ENV_DEFAULTS: AdsrParams = AdsrParams {
    attack: 0.005,
    decay: 0.14,
    sustain: 0.0,
    release: 0.1,
};

const CUTOFF_CEIL: f64 = 20_000.0;

impl FilterEnvelope {
    pub fn new(base_cutoff: f64, env_octaves: f64, params: AdsrParams, sample_rate: f32) -> Self {
        let env_abs = env_octaves.abs();
        let anchor = 0.0;
        let offset = env_abs * anchor;
        let mut min = (2.0f64).powf(-offset) * base_cutoff;
        let mut max = (2.0f64).powf(env_abs - offset) * base_cutoff;
        if env_octaves < 0.0 {
            std::mem::swap(&mut min, &mut max);
        }
        let sustain_cutoff = min + params.sustain * (max - min);
        let samples = |seconds: f64| (seconds * sample_rate as f64).max(1.0) as u64;
        Self {
            min,
            max,
            sustain_cutoff,
            attack_samples: samples(params.attack),
            decay_samples: samples(params.decay),
            release_samples: samples(params.release),
            state: EnvelopeState::Idle,
            position: 0,
            current: min,
            release_from: min,
        }
    }

    pub fn trigger(&mut self) {
        self.state = EnvelopeState::Attack;
        self.position = 0;
        self.current = self.min;
    }

    pub fn release(&mut self) {
        if self.state != EnvelopeState::Idle && self.state != EnvelopeState::Release {
            self.release_from = self.current;
            self.state = EnvelopeState::Release;
            self.position = 0;
        }
    }

    /// Exponential interpolation between two positive cutoffs.
    fn interpolate(from: f64, to: f64, t: f64) -> f64 {
        let from = from.max(1e-3);
        let to = to.max(1e-3);
        from * (to / from).powf(t)
    }

    /// Advance one sample and return the cutoff in Hz.
    pub fn process(&mut self) -> f32 {
        match self.state {
            EnvelopeState::Idle => {
                self.current = self.min;
            }
            EnvelopeState::Attack => {
                let t = self.position as f64 / self.attack_samples as f64;
                self.current = Self::interpolate(self.min, self.max, t);
                self.position += 1;
                if self.position >= self.attack_samples {
                    self.state = EnvelopeState::Decay;
                    self.position = 0;
                    self.current = self.max;
                }
            }
            EnvelopeState::Decay => {
                let t = self.position as f64 / self.decay_samples as f64;
                self.current = Self::interpolate(self.max, self.sustain_cutoff, t);
                self.position += 1;
                if self.position >= self.decay_samples {
                    self.state = EnvelopeState::Sustain;
                    self.position = 0;
                    self.current = self.sustain_cutoff;
                }
            }
            EnvelopeState::Sustain => {
                self.current = self.sustain_cutoff;
            }
            EnvelopeState::Release => {
                let t = self.position as f64 / self.release_samples as f64;
                self.current = Self::interpolate(self.release_from, self.min, t);
                self.position += 1;
                if self.position >= self.release_samples {
                    self.state = EnvelopeState::Idle;
                    self.current = self.min;
                }
            }
        }
        self.current.clamp(0.0, CUTOFF_CEIL) as f32
    }
}
