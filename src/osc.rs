//! Oscillators for synth voices.
//!
//! All shapes share phase-accumulator state in `[0, 1)`. Sawtooth (and the
//! supersaw layers) apply polyBLEP corrections at the wrap discontinuity;
//! see Valimaki/Huovilainen, "Oscillator and Filter Algorithms for Virtual
//! Analog Synthesis" (2006).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Waveforms a synth voice can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Sawtooth,
    Square,
    Triangle,
    Supersaw,
    White,
}

impl Waveform {
    /// Recognise a synth name, including the short aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sine" | "sin" => Some(Waveform::Sine),
            "sawtooth" | "saw" => Some(Waveform::Sawtooth),
            "square" | "sqr" => Some(Waveform::Square),
            "triangle" | "tri" => Some(Waveform::Triangle),
            "supersaw" => Some(Waveform::Supersaw),
            "white" => Some(Waveform::White),
            _ => None,
        }
    }
}

/// polyBLEP correction for a discontinuity at the phase wrap point.
fn poly_blep(phase: f32, dt: f32) -> f32 {
    if phase < dt {
        let t = phase / dt;
        2.0 * t - t * t - 1.0
    } else if phase > 1.0 - dt {
        let t = (phase - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

fn saw_sample(phase: f32, dt: f32) -> f32 {
    2.0 * phase - 1.0 - poly_blep(phase, dt)
}

/// Supersaw defaults when the event sets none.
pub const DEFAULT_UNISON: usize = 5;
pub const DEFAULT_SPREAD: f32 = 0.5;

/// A single oscillator: one phase for the simple shapes, one per layer for
/// the supersaw.
#[derive(Debug, Clone)]
pub struct Oscillator {
    wave: Waveform,
    sample_rate: f32,
    phases: Vec<f32>,
    /// Frequency ratios per supersaw layer, `2^(offset/12)`.
    ratios: Vec<f32>,
    rng: StdRng,
}

impl Oscillator {
    pub fn new(wave: Waveform, sample_rate: f32) -> Self {
        Self::with_unison(wave, sample_rate, DEFAULT_UNISON, DEFAULT_SPREAD)
    }

    /// `unison` and `spread` (in semitones) only matter for the supersaw.
    pub fn with_unison(wave: Waveform, sample_rate: f32, unison: usize, spread: f32) -> Self {
        let mut rng = StdRng::from_entropy();
        let layers = if wave == Waveform::Supersaw {
            unison.max(1)
        } else {
            1
        };
        let mut ratios = Vec::with_capacity(layers);
        let mut phases = Vec::with_capacity(layers);
        for i in 0..layers {
            let offset = if layers > 1 {
                -spread / 2.0 + spread * i as f32 / (layers - 1) as f32
            } else {
                0.0
            };
            ratios.push((2.0f32).powf(offset / 12.0));
            // Layers start at scattered phases so they don't comb-cancel.
            phases.push(if layers > 1 { rng.gen::<f32>() } else { 0.0 });
        }
        Self {
            wave,
            sample_rate,
            phases,
            ratios,
            rng,
        }
    }

    pub fn wave(&self) -> Waveform {
        self.wave
    }

    /// Restart the waveform. Supersaw layers are re-scattered.
    pub fn reset(&mut self) {
        let layers = self.phases.len();
        for phase in self.phases.iter_mut() {
            *phase = if layers > 1 { self.rng.gen::<f32>() } else { 0.0 };
        }
    }

    /// Produce one sample at `freq` Hz and advance the phase.
    pub fn step(&mut self, freq: f32) -> f32 {
        let freq = freq.max(0.0);
        match self.wave {
            Waveform::White => self.rng.gen::<f32>() * 2.0 - 1.0,
            Waveform::Supersaw => {
                let mut sum = 0.0;
                for i in 0..self.phases.len() {
                    let dt = freq * self.ratios[i] / self.sample_rate;
                    sum += saw_sample(self.phases[i], dt);
                    self.phases[i] = wrap(self.phases[i] + dt);
                }
                sum / (self.phases.len() as f32).sqrt()
            }
            simple => {
                let dt = freq / self.sample_rate;
                let phase = self.phases[0];
                let out = match simple {
                    Waveform::Sine => (phase * std::f32::consts::TAU).sin(),
                    Waveform::Sawtooth => saw_sample(phase, dt),
                    Waveform::Square => {
                        if phase < 0.5 {
                            1.0
                        } else {
                            -1.0
                        }
                    }
                    Waveform::Triangle => {
                        if phase < 0.25 {
                            4.0 * phase
                        } else if phase < 0.75 {
                            2.0 - 4.0 * phase
                        } else {
                            4.0 * phase - 4.0
                        }
                    }
                    _ => unreachable!(),
                };
                self.phases[0] = wrap(phase + dt);
                out
            }
        }
    }
}

fn wrap(phase: f32) -> f32 {
    if phase >= 1.0 {
        phase - 1.0
    } else {
        phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waveform_aliases() {
        assert_eq!(Waveform::from_name("saw"), Some(Waveform::Sawtooth));
        assert_eq!(Waveform::from_name("sqr"), Some(Waveform::Square));
        assert_eq!(Waveform::from_name("tri"), Some(Waveform::Triangle));
        assert_eq!(Waveform::from_name("sin"), Some(Waveform::Sine));
        assert_eq!(Waveform::from_name("SINE"), Some(Waveform::Sine));
        assert_eq!(Waveform::from_name("bd"), None);
    }

    #[test]
    fn sine_period_matches_frequency() {
        let sr = 48_000.0;
        let mut osc = Oscillator::new(Waveform::Sine, sr);
        // 480 Hz at 48 kHz: one period every 100 samples.
        let first = osc.step(480.0);
        assert!(first.abs() < 1e-6);
        let mut samples = vec![first];
        for _ in 0..100 {
            samples.push(osc.step(480.0));
        }
        assert!((samples[100] - samples[0]).abs() < 1e-3);
        // A quarter period in is near the positive peak.
        assert!(samples[25] > 0.99);
    }

    #[test]
    fn square_and_triangle_stay_bounded() {
        let sr = 44_100.0;
        for wave in [Waveform::Square, Waveform::Triangle, Waveform::Sawtooth] {
            let mut osc = Oscillator::new(wave, sr);
            for _ in 0..2000 {
                let s = osc.step(1000.0);
                assert!(s.abs() <= 1.5, "{:?} out of range: {}", wave, s);
            }
        }
    }

    #[test]
    fn triangle_peaks_at_quarter_points() {
        let sr = 1000.0;
        let mut osc = Oscillator::new(Waveform::Triangle, sr);
        let samples: Vec<f32> = (0..1000).map(|_| osc.step(1.0)).collect();
        assert!((samples[250] - 1.0).abs() < 0.01);
        assert!((samples[750] + 1.0).abs() < 0.01);
    }

    #[test]
    fn white_noise_is_roughly_centred() {
        let mut osc = Oscillator::new(Waveform::White, 44_100.0);
        let n = 20_000;
        let mean: f32 = (0..n).map(|_| osc.step(0.0)).sum::<f32>() / n as f32;
        assert!(mean.abs() < 0.05, "mean {}", mean);
    }

    #[test]
    fn supersaw_layers_scale_by_inverse_sqrt() {
        let mut osc = Oscillator::with_unison(Waveform::Supersaw, 44_100.0, 7, 0.6);
        for _ in 0..5000 {
            let s = osc.step(220.0);
            // 7 layers at up to ~1 each, scaled by 1/sqrt(7).
            assert!(s.abs() <= 7.0 / (7.0f32).sqrt() + 0.5);
        }
    }
}
