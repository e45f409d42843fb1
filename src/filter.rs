//! Resonant low-pass filter for synth voices.
//!
//! Biquad coefficients come from the `biquad` crate; this wrapper adds the
//! parameter hygiene the voices need: cutoff slewing so envelope sweeps
//! don't zipper, clamped ranges, and a soft ceiling so high resonance can't
//! blow up the mix.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, Hertz, Type};

const CUTOFF_MIN: f32 = 20.0;
const Q_MIN: f32 = 0.5;
const Q_MAX: f32 = 50.0;

/// One-pole coefficient for the cutoff slew.
const SMOOTH: f32 = 0.99;

#[derive(Debug, Clone)]
pub struct LowPassFilter {
    sample_rate: f32,
    cutoff: f32,
    target_cutoff: f32,
    q: f32,
    coeff_cutoff: f32,
    coeff_q: f32,
    inner: DirectForm2Transposed<f32>,
}

impl LowPassFilter {
    pub fn new(sample_rate: f32, cutoff: f32, q: f32) -> Self {
        let cutoff = clamp_cutoff(cutoff, sample_rate);
        let q = q.clamp(Q_MIN, Q_MAX);
        let inner = DirectForm2Transposed::<f32>::new(coefficients(sample_rate, cutoff, q));
        Self {
            sample_rate,
            cutoff,
            target_cutoff: cutoff,
            q,
            coeff_cutoff: cutoff,
            coeff_q: q,
            inner,
        }
    }

    /// Set the cutoff target; the actual cutoff slews there per sample.
    pub fn set_cutoff(&mut self, cutoff: f32) {
        self.target_cutoff = clamp_cutoff(cutoff, self.sample_rate);
    }

    pub fn set_q(&mut self, q: f32) {
        self.q = q.clamp(Q_MIN, Q_MAX);
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    pub fn process(&mut self, input: f32) -> f32 {
        // Slew toward the target unless already within a hertz of it.
        if (self.target_cutoff - self.cutoff).abs() > 1.0 {
            self.cutoff = self.cutoff * SMOOTH + self.target_cutoff * (1.0 - SMOOTH);
        } else {
            self.cutoff = self.target_cutoff;
        }
        if self.cutoff != self.coeff_cutoff || self.q != self.coeff_q {
            self.inner
                .update_coefficients(coefficients(self.sample_rate, self.cutoff, self.q));
            self.coeff_cutoff = self.cutoff;
            self.coeff_q = self.q;
        }
        let out = self.inner.run(input);
        // Contain self-oscillation within [-2, 2].
        2.0 * (out * 0.5).tanh()
    }
}

fn clamp_cutoff(cutoff: f32, sample_rate: f32) -> f32 {
    cutoff.clamp(CUTOFF_MIN, 0.45 * sample_rate)
}

fn coefficients(sample_rate: f32, cutoff: f32, q: f32) -> Coefficients<f32> {
    let fs = Hertz::<f32>::from_hz(sample_rate).expect("positive sample rate");
    let f0 = Hertz::<f32>::from_hz(cutoff).expect("cutoff already clamped positive");
    Coefficients::<f32>::from_params(Type::LowPass, fs, f0, q)
        .expect("clamped parameters are always valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_dc_and_attenuates_high_frequencies() {
        let sr = 44_100.0;
        let mut filter = LowPassFilter::new(sr, 500.0, 0.707);
        // DC settles to unity (small enough that the soft ceiling is
        // transparent).
        let mut out = 0.0;
        for _ in 0..2000 {
            out = filter.process(0.5);
        }
        assert!((out - 0.5).abs() < 0.03, "dc gain {}", out);

        // A tone far above cutoff comes out much smaller than it went in.
        let mut filter = LowPassFilter::new(sr, 500.0, 0.707);
        let freq = 8_000.0;
        let mut peak: f32 = 0.0;
        for i in 0..4000 {
            let x = (std::f32::consts::TAU * freq * i as f32 / sr).sin();
            let y = filter.process(x);
            if i > 2000 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak < 0.1, "stopband peak {}", peak);
    }

    #[test]
    fn cutoff_slews_rather_than_jumping() {
        let mut filter = LowPassFilter::new(44_100.0, 200.0, 1.0);
        filter.set_cutoff(8_000.0);
        filter.process(0.0);
        let after_one = filter.cutoff();
        assert!(after_one > 200.0 && after_one < 400.0, "cutoff {}", after_one);
        for _ in 0..2000 {
            filter.process(0.0);
        }
        assert!((filter.cutoff() - 8_000.0).abs() < 1.5);
    }

    #[test]
    fn parameters_are_clamped() {
        let sr = 48_000.0;
        let mut filter = LowPassFilter::new(sr, 100_000.0, 500.0);
        assert!(filter.cutoff() <= 0.45 * sr);
        filter.set_cutoff(-5.0);
        filter.process(0.0);
        assert!(filter.cutoff() >= CUTOFF_MIN - 1.0);
    }

    #[test]
    fn output_is_soft_limited() {
        let mut filter = LowPassFilter::new(44_100.0, 2_000.0, 50.0);
        for i in 0..10_000 {
            let x = if i % 2 == 0 { 10.0 } else { -10.0 };
            let y = filter.process(x);
            assert!(y.abs() <= 2.0);
        }
    }
}
