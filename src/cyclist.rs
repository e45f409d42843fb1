//! The cyclist: real-time scheduler and mixer.
//!
//! Each audio block advances a rational cycle cursor, queries the active
//! pattern for event onsets in the block, spawns voices, and mixes them
//! through per-orbit delay and ducking into a soft-limited stereo master.
//! The audio thread owns all of that state; other threads only swap the
//! active pattern through the lock-free slot.

use crate::control::{ControlMap, PatternValue};
use crate::envelope::{AdsrParams, FILTER_ENV_DEFAULTS};
use crate::orbit::{DelayParams, OrbitBus};
use crate::osc::{Waveform, DEFAULT_SPREAD, DEFAULT_UNISON};
use crate::pattern::{Fraction, Hap, Pattern, State, TimeSpan};
use crate::sample_bank::SampleBank;
use crate::voice::{
    FmParams, LpfParams, SampleParams, SampleVoice, SynthParams, SynthVoice, Voice,
};
use arc_swap::ArcSwapOption;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

/// Shared handle for installing a new active pattern.
pub type PatternSlot = Arc<ArcSwapOption<Pattern<PatternValue>>>;

const DEFAULT_ORBIT: usize = 1;
const DUCK_DEPTH_DEFAULT: f32 = 0.5;
const DUCK_ONSET_DEFAULT: f32 = 0.01;
const DUCK_ATTACK_DEFAULT: f32 = 0.1;

struct ActiveVoice {
    voice: Voice,
    orbit: usize,
    pan_left: f32,
    pan_right: f32,
}

pub struct Cyclist {
    sample_rate: u32,
    cps: Fraction,
    cursor: Fraction,
    voices: Vec<ActiveVoice>,
    orbits: BTreeMap<usize, OrbitBus>,
    slot: PatternSlot,
    bank: SampleBank,
    master_left: Vec<f32>,
    master_right: Vec<f32>,
    smoothed_gain: f32,
}

impl Cyclist {
    pub fn new(sample_rate: u32, cps: f64, samples_path: Option<PathBuf>) -> Self {
        Self {
            sample_rate,
            cps: Fraction::approximate(cps),
            cursor: Fraction::ZERO,
            voices: Vec::new(),
            orbits: BTreeMap::new(),
            slot: Arc::new(ArcSwapOption::empty()),
            bank: SampleBank::new(samples_path.unwrap_or_else(|| PathBuf::from("samples"))),
            master_left: Vec::new(),
            master_right: Vec::new(),
            smoothed_gain: 1.0,
        }
    }

    /// Handle other threads use to install patterns.
    pub fn pattern_slot(&self) -> PatternSlot {
        self.slot.clone()
    }

    /// Install a new pattern; it takes effect at the next block.
    pub fn set_pattern(&self, pattern: Pattern<PatternValue>) {
        self.slot.store(Some(Arc::new(pattern)));
    }

    pub fn clear_pattern(&self) {
        self.slot.store(None);
    }

    pub fn set_cps(&mut self, cps: f64) {
        if cps > 0.0 && cps.is_finite() {
            self.cps = Fraction::approximate(cps);
        }
    }

    pub fn cps(&self) -> f64 {
        self.cps.to_float()
    }

    pub fn cursor(&self) -> Fraction {
        self.cursor
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Rewind to cycle zero and drop every sounding voice.
    pub fn reset(&mut self) {
        self.cursor = Fraction::ZERO;
        self.voices.clear();
    }

    /// Produce one block of `frames` stereo samples. The returned slices
    /// are valid until the next call.
    pub fn generate(&mut self, frames: usize) -> (&[f32], &[f32]) {
        self.master_left.clear();
        self.master_left.resize(frames, 0.0);
        self.master_right.clear();
        self.master_right.resize(frames, 0.0);

        let delta = Fraction::new(frames as i64, 1) * self.cps
            / Fraction::new(self.sample_rate as i64, 1);
        let end = self.cursor + delta;
        let span = TimeSpan::new(self.cursor, end);

        if let Some(pattern) = self.slot.load_full() {
            let result =
                catch_unwind(AssertUnwindSafe(|| pattern.query(&State::new(span))));
            match result {
                Ok(mut haps) => {
                    haps.sort_by(|a, b| a.part.begin.cmp(&b.part.begin));
                    for hap in haps {
                        if hap.has_onset() {
                            self.trigger_event(&hap);
                        }
                    }
                }
                Err(_) => {
                    tracing::error!(
                        begin = %span.begin,
                        end = %span.end,
                        "pattern query panicked; no voices spawned this block"
                    );
                }
            }
        }

        for orbit in self.orbits.values_mut() {
            orbit.begin_block(frames);
        }

        // Accumulate voices onto their orbit buses with equal-power pan.
        for active in &mut self.voices {
            let bus = self
                .orbits
                .entry(active.orbit)
                .or_insert_with(|| {
                    let mut bus = OrbitBus::new(self.sample_rate as f32);
                    bus.begin_block(frames);
                    bus
                });
            for i in 0..frames {
                let (l, r) = active.voice.process();
                bus.bus_left[i] += l * active.pan_left;
                bus.bus_right[i] += r * active.pan_right;
            }
        }

        // Delay + duck per orbit, summed into the master.
        for orbit in self.orbits.values_mut() {
            for i in 0..frames {
                let (l, r) = orbit.process_frame(i);
                self.master_left[i] += l;
                self.master_right[i] += r;
            }
        }

        // Smoothed 1/sqrt(n) normalisation, then a soft ceiling.
        let target = if self.voices.len() > 1 {
            1.0 / (self.voices.len() as f32).sqrt()
        } else {
            1.0
        };
        for i in 0..frames {
            self.smoothed_gain = self.smoothed_gain * 0.999 + target * 0.001;
            self.master_left[i] = soft_limit(self.master_left[i] * self.smoothed_gain);
            self.master_right[i] = soft_limit(self.master_right[i] * self.smoothed_gain);
        }

        self.voices.retain(|v| v.voice.playing());
        self.cursor = end;
        (&self.master_left, &self.master_right)
    }

    /// Resolve one onset hap into voice/effect changes.
    fn trigger_event(&mut self, hap: &Hap<PatternValue>) {
        let map = match &hap.value {
            PatternValue::Map(m) => m.clone(),
            PatternValue::String(name) => {
                ControlMap::from_entry("s", PatternValue::String(name.clone()))
            }
            PatternValue::Number(_) => return,
        };

        let orbit = map
            .number(&["orbit"])
            .map(|o| o.max(0.0) as usize)
            .unwrap_or(DEFAULT_ORBIT);

        self.apply_delay_controls(&map, orbit);
        self.apply_duck_controls(&map);

        let Some(sound) = map.string(&["s", "sound"]) else {
            return;
        };

        let gain = map
            .number(&["gain"])
            .or_else(|| map.number(&["velocity"]).map(|v| v / 127.0))
            .unwrap_or(1.0) as f32;
        let pan = map.number(&["pan"]).unwrap_or(0.5).clamp(0.0, 1.0) as f32;
        let theta = pan * std::f32::consts::FRAC_PI_2;
        let (pan_left, pan_right) = (theta.cos(), theta.sin());

        let duration = (hap.duration() / self.cps).to_float().max(0.0);
        let adsr = AdsrParams::resolve(
            map.number(&["attack"]),
            map.number(&["decay"]),
            map.number(&["sustain"]),
            map.number(&["release"]),
        );

        let voice = match Waveform::from_name(&sound) {
            Some(wave) => self.synth_voice(&map, wave, gain, duration, adsr),
            None => self.sample_voice(&map, &sound, gain, duration, adsr),
        };
        if let Some(voice) = voice {
            self.voices.push(ActiveVoice {
                voice,
                orbit,
                pan_left,
                pan_right,
            });
        }
    }

    fn synth_voice(
        &self,
        map: &ControlMap,
        wave: Waveform,
        gain: f32,
        duration: f64,
        adsr: AdsrParams,
    ) -> Option<Voice> {
        let note = map.number(&["note"]).or_else(|| map.number(&["n"]));
        let freq = match note {
            Some(midi) => 440.0 * (2.0f32).powf((midi as f32 - 69.0) / 12.0),
            None => 440.0,
        };
        let fm = map.number(&["fmi"]).filter(|i| *i != 0.0).map(|index| {
            let wave = map
                .string(&["fmwave"])
                .and_then(|name| Waveform::from_name(&name))
                .unwrap_or(Waveform::Sine);
            FmParams {
                index: index as f32,
                harmonicity: map.number(&["fmh"]).unwrap_or(1.0) as f32,
                wave,
            }
        });
        let lpf = map.number(&["lpf"]).map(|cutoff| LpfParams {
            cutoff: cutoff as f32,
            q: map.number(&["lpq"]).unwrap_or(1.0) as f32,
            env_octaves: map.number(&["lpenv"]).unwrap_or(0.0),
            envelope: AdsrParams {
                attack: map.number(&["lpa"]).unwrap_or(FILTER_ENV_DEFAULTS.attack),
                decay: map.number(&["lpd"]).unwrap_or(FILTER_ENV_DEFAULTS.decay),
                sustain: map.number(&["lps"]).unwrap_or(FILTER_ENV_DEFAULTS.sustain),
                release: map.number(&["lpr"]).unwrap_or(FILTER_ENV_DEFAULTS.release),
            },
        });
        let params = SynthParams {
            wave,
            freq,
            gain,
            duration: Some(duration),
            adsr,
            unison: map
                .number(&["unison"])
                .map(|u| u.max(1.0) as usize)
                .unwrap_or(DEFAULT_UNISON),
            spread: map
                .number(&["spread"])
                .or_else(|| map.number(&["detune"]))
                .unwrap_or(DEFAULT_SPREAD as f64) as f32,
            fm,
            lpf,
        };
        Some(Voice::Synth(SynthVoice::trigger(
            params,
            self.sample_rate as f32,
        )))
    }

    fn sample_voice(
        &mut self,
        map: &ControlMap,
        name: &str,
        gain: f32,
        duration: f64,
        adsr: AdsrParams,
    ) -> Option<Voice> {
        let n = map.number(&["n"]).map(|n| n.max(0.0) as usize).unwrap_or(0);
        let data = self.bank.get(name, n)?;
        if data.is_empty() {
            return None;
        }
        let speed = map.number(&["speed"]).unwrap_or(1.0);
        let unit_cycles = map.string(&["unit"]).as_deref() == Some("c");
        let rate_ratio = if unit_cycles {
            // The whole sample spans 1/speed cycles.
            data.frames() as f64 * speed.abs() * self.cps.to_float() / self.sample_rate as f64
        } else {
            data.sample_rate as f64 / self.sample_rate as f64 * speed.abs()
        };
        let params = SampleParams {
            gain,
            rate_ratio,
            duration: Some(duration),
            adsr,
        };
        Some(Voice::Sample(SampleVoice::trigger(
            data,
            params,
            self.sample_rate as f32,
        )))
    }

    fn apply_delay_controls(&mut self, map: &ControlMap, orbit: usize) {
        let wet = map.number(&["delay"]);
        let time = map.number(&["delaytime", "delayt", "dt"]);
        let feedback = map.number(&["delayfeedback", "delayfb", "dfb"]);
        let sync = map.number(&["delaysync"]);
        if wet.is_none() && time.is_none() && feedback.is_none() && sync.is_none() {
            return;
        }
        let sample_rate = self.sample_rate as f32;
        let cps = self.cps.to_float();
        let bus = self
            .orbits
            .entry(orbit)
            .or_insert_with(|| OrbitBus::new(sample_rate));
        let mut params = bus.delay();
        if let Some(wet) = wet {
            params.wet = wet as f32;
        }
        if let Some(time) = time {
            params.time = time as f32;
        }
        if let Some(sync) = sync {
            // delaysync is measured in cycles.
            params.time = (sync / cps) as f32;
        }
        if let Some(feedback) = feedback {
            params.feedback = feedback as f32;
        }
        bus.set_delay(params);
    }

    fn apply_duck_controls(&mut self, map: &ControlMap) {
        let Some(target) = map.get("duckorbit").or_else(|| map.get("duck")) else {
            return;
        };
        let depth = map.number(&["duckdepth"]).unwrap_or(DUCK_DEPTH_DEFAULT as f64) as f32;
        let onset = map.number(&["duckonset"]).unwrap_or(DUCK_ONSET_DEFAULT as f64) as f32;
        let attack = map
            .number(&["duckattack"])
            .unwrap_or(DUCK_ATTACK_DEFAULT as f64) as f32;
        let sample_rate = self.sample_rate as f32;
        for orbit in duck_targets(target) {
            self.orbits
                .entry(orbit)
                .or_insert_with(|| OrbitBus::new(sample_rate))
                .trigger_duck(depth, onset, attack);
        }
    }
}

/// Orbit ids named by a duck control: an integer, a float (floored) or a
/// colon-delimited list. Negative or unparsable entries are skipped.
fn duck_targets(value: &PatternValue) -> Vec<usize> {
    match value {
        PatternValue::Number(x) if *x >= 0.0 => vec![*x as usize],
        PatternValue::String(s) => s
            .split(':')
            .filter_map(|part| part.trim().parse::<f64>().ok())
            .filter(|x| *x >= 0.0)
            .map(|x| x as usize)
            .collect(),
        _ => Vec::new(),
    }
}

fn soft_limit(sample: f32) -> f32 {
    if sample.abs() > 0.8 {
        sample.tanh()
    } else {
        sample
    }
}
