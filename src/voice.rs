//! Voices: the stateful sound generators the cyclist spawns per event.
//!
//! A synth voice is an oscillator (optionally FM-modulated) through an
//! optional resonant low-pass, shaped by an amplitude ADSR. A sample voice
//! plays decoded channel data with linear interpolation at a rate ratio.
//! Both are mono sources mixed up to two identical channels; stereo samples
//! keep their first two channels.

use crate::envelope::{AdsrEnvelope, AdsrParams, FilterEnvelope};
use crate::filter::LowPassFilter;
use crate::osc::{Oscillator, Waveform};
use crate::sample_bank::SampleData;
use std::sync::Arc;

/// Fixed headroom applied to every synth voice.
const SYNTH_LEVEL: f32 = 0.3;

#[derive(Debug, Clone, Copy)]
pub struct FmParams {
    /// Modulation index; 0 disables FM.
    pub index: f32,
    /// Modulator frequency as a multiple of the carrier ("harmonicity").
    pub harmonicity: f32,
    pub wave: Waveform,
}

#[derive(Debug, Clone, Copy)]
pub struct LpfParams {
    pub cutoff: f32,
    pub q: f32,
    /// Envelope depth in octaves; 0 pins the filter at `cutoff`.
    pub env_octaves: f64,
    pub envelope: AdsrParams,
}

/// Everything a synth voice captures at trigger time.
#[derive(Debug, Clone)]
pub struct SynthParams {
    pub wave: Waveform,
    pub freq: f32,
    pub gain: f32,
    /// Hold time in seconds; `None` falls back to a plain exponential decay.
    pub duration: Option<f64>,
    pub adsr: AdsrParams,
    pub unison: usize,
    pub spread: f32,
    pub fm: Option<FmParams>,
    pub lpf: Option<LpfParams>,
}

pub struct SynthVoice {
    osc: Oscillator,
    fm: Option<(Oscillator, FmParams)>,
    base_freq: f32,
    amp_env: AdsrEnvelope,
    filter: Option<(LowPassFilter, FilterEnvelope)>,
    gain: f32,
    hold_samples: Option<u64>,
    samples_done: u64,
    /// Fallback decay for duration-less triggers.
    decay_coeff: f32,
    decay_level: f32,
    held: bool,
}

impl SynthVoice {
    pub fn trigger(params: SynthParams, sample_rate: f32) -> Self {
        let mut osc =
            Oscillator::with_unison(params.wave, sample_rate, params.unison, params.spread);
        osc.reset();
        let fm = params.fm.filter(|fm| fm.index != 0.0).map(|fm| {
            (Oscillator::new(fm.wave, sample_rate), fm)
        });
        let mut amp_env = AdsrEnvelope::new(params.adsr, sample_rate);
        amp_env.trigger();
        let filter = params.lpf.map(|lpf| {
            let mut env =
                FilterEnvelope::new(lpf.cutoff as f64, lpf.env_octaves, lpf.envelope, sample_rate);
            env.trigger();
            (LowPassFilter::new(sample_rate, lpf.cutoff, lpf.q), env)
        });
        let tau = params.adsr.decay.max(1e-3);
        Self {
            osc,
            fm,
            base_freq: params.freq,
            amp_env,
            filter,
            gain: params.gain,
            hold_samples: params
                .duration
                .map(|seconds| (seconds * sample_rate as f64).max(1.0) as u64),
            samples_done: 0,
            decay_coeff: (-1.0 / (tau * sample_rate as f64)).exp() as f32,
            decay_level: 1.0,
            held: params.duration.is_some(),
        }
    }

    /// One stereo frame. Mono source, both channels identical.
    pub fn process(&mut self) -> (f32, f32) {
        let freq = match &mut self.fm {
            Some((modulator, fm)) => {
                let m = modulator.step(self.base_freq * fm.harmonicity);
                (self.base_freq + m * self.base_freq * fm.harmonicity * fm.index).max(0.0)
            }
            None => self.base_freq,
        };
        let raw = self.osc.step(freq);

        let amp = if self.held {
            self.amp_env.process()
        } else {
            self.decay_level *= self.decay_coeff;
            self.decay_level
        };

        let body = match &mut self.filter {
            Some((filter, env)) => {
                filter.set_cutoff(env.process());
                filter.process(raw)
            }
            None => raw,
        };

        self.samples_done += 1;
        if let Some(hold) = self.hold_samples {
            if self.samples_done == hold {
                self.amp_env.release();
                if let Some((_, env)) = &mut self.filter {
                    env.release();
                }
            }
        }

        let out = body * amp * self.gain * SYNTH_LEVEL;
        (out, out)
    }

    pub fn playing(&self) -> bool {
        if self.held {
            self.amp_env.is_active()
        } else {
            self.decay_level > 1e-4
        }
    }
}

/// Everything a sample voice captures at trigger time.
#[derive(Debug, Clone)]
pub struct SampleParams {
    pub gain: f32,
    /// Source frames consumed per output frame (already includes the
    /// source/target rate ratio and the event's speed).
    pub rate_ratio: f64,
    pub duration: Option<f64>,
    pub adsr: AdsrParams,
}

pub struct SampleVoice {
    data: Arc<SampleData>,
    position: f64,
    rate_ratio: f64,
    amp_env: AdsrEnvelope,
    gain: f32,
    hold_samples: Option<u64>,
    samples_done: u64,
}

impl SampleVoice {
    pub fn trigger(data: Arc<SampleData>, params: SampleParams, sample_rate: f32) -> Self {
        let mut amp_env = AdsrEnvelope::new(params.adsr, sample_rate);
        amp_env.trigger();
        Self {
            data,
            position: 0.0,
            rate_ratio: params.rate_ratio.abs().max(1e-6),
            amp_env,
            gain: params.gain,
            hold_samples: params
                .duration
                .map(|seconds| (seconds * sample_rate as f64).max(1.0) as u64),
            samples_done: 0,
        }
    }

    fn read_channel(&self, channel: &[f32]) -> f32 {
        let index = self.position as usize;
        match (channel.get(index), channel.get(index + 1)) {
            (Some(&a), Some(&b)) => {
                let frac = (self.position - index as f64) as f32;
                a + (b - a) * frac
            }
            (Some(&a), None) => a,
            _ => 0.0,
        }
    }

    pub fn process(&mut self) -> (f32, f32) {
        let channels = &self.data.channels;
        if channels.is_empty() || !self.has_samples() {
            return (0.0, 0.0);
        }
        let amp = self.amp_env.process() * self.gain;
        let left = self.read_channel(&channels[0]);
        let right = if channels.len() > 1 {
            self.read_channel(&channels[1])
        } else {
            left
        };
        self.position += self.rate_ratio;
        self.samples_done += 1;
        if let Some(hold) = self.hold_samples {
            if self.samples_done == hold {
                self.amp_env.release();
            }
        }
        (left * amp, right * amp)
    }

    fn has_samples(&self) -> bool {
        (self.position as usize) < self.data.frames()
    }

    pub fn playing(&self) -> bool {
        self.amp_env.is_active() && self.has_samples()
    }
}

/// Either kind of voice, as the mixer holds them.
pub enum Voice {
    Synth(SynthVoice),
    Sample(SampleVoice),
}

impl Voice {
    pub fn process(&mut self) -> (f32, f32) {
        match self {
            Voice::Synth(v) => v.process(),
            Voice::Sample(v) => v.process(),
        }
    }

    pub fn playing(&self) -> bool {
        match self {
            Voice::Synth(v) => v.playing(),
            Voice::Sample(v) => v.playing(),
        }
    }
}
