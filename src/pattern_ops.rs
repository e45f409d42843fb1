//! Operations over control patterns: arithmetic joins, control
//! application, Euclidean rhythms and the chainable builder API used by the
//! surface script layer.

use crate::control::{ControlMap, PatternValue};
use crate::mini_notation::mini;
use crate::pattern::{Fraction, Pattern};

/// Anything usable as the right-hand side of a control: a number, a
/// mini-notation string, or an already-built pattern.
pub trait IntoControlPattern {
    fn into_control_pattern(self) -> Pattern<PatternValue>;
}

impl IntoControlPattern for f64 {
    fn into_control_pattern(self) -> Pattern<PatternValue> {
        Pattern::pure(PatternValue::Number(self))
    }
}

impl IntoControlPattern for i64 {
    fn into_control_pattern(self) -> Pattern<PatternValue> {
        Pattern::pure(PatternValue::Number(self as f64))
    }
}

impl IntoControlPattern for &str {
    fn into_control_pattern(self) -> Pattern<PatternValue> {
        mini(self)
    }
}

impl IntoControlPattern for Pattern<PatternValue> {
    fn into_control_pattern(self) -> Pattern<PatternValue> {
        self
    }
}

/// Lift bare atom values into sound descriptors: `"bd"` -> `{s: bd}`,
/// `bd:3` maps pass through, numbers become `{s: "<number>"}`.
pub fn s(input: impl IntoControlPattern) -> Pattern<PatternValue> {
    input.into_control_pattern().fmap(|v| match v {
        PatternValue::Map(m) => PatternValue::Map(m.clone()),
        other => PatternValue::Map(ControlMap::from_entry(
            "s",
            PatternValue::String(other.as_string()),
        )),
    })
}

/// Alias for [`s`].
pub fn sound(input: impl IntoControlPattern) -> Pattern<PatternValue> {
    s(input)
}

/// Numeric pattern lifted to `{n: v}`; selects sample slots and, for
/// synths, scale degrees.
pub fn n(input: impl IntoControlPattern) -> Pattern<PatternValue> {
    lift_number_key("n", input)
}

/// Numeric pattern lifted to `{note: v}` (MIDI note numbers). Note names
/// are resolved by the tonal layer.
pub fn note(input: impl IntoControlPattern) -> Pattern<PatternValue> {
    use crate::pattern_tonal::note_name_to_midi;
    input.into_control_pattern().fmap(|v| {
        let number = match v {
            PatternValue::String(name) => note_name_to_midi(name).map(|m| m as f64),
            other => other.as_number(),
        };
        match number {
            Some(x) => PatternValue::Map(ControlMap::from_entry("note", PatternValue::Number(x))),
            None => v.clone(),
        }
    })
}

fn lift_number_key(key: &'static str, input: impl IntoControlPattern) -> Pattern<PatternValue> {
    input.into_control_pattern().fmap(move |v| match v.as_number() {
        Some(x) => PatternValue::Map(ControlMap::from_entry(key, PatternValue::Number(x))),
        None => v.clone(),
    })
}

fn numeric(f: impl Fn(f64, f64) -> f64 + Send + Sync + 'static)
-> impl Fn(&PatternValue, &PatternValue) -> PatternValue + Send + Sync + 'static {
    move |left, right| match (left.as_number(), right.as_number()) {
        (Some(a), Some(b)) => PatternValue::Number(f(a, b)),
        _ => left.clone(),
    }
}

impl Pattern<PatternValue> {
    /// Inner-join combine: left drives structure, right supplies values.
    pub fn op_with(
        self,
        other: impl IntoControlPattern,
        f: impl Fn(&PatternValue, &PatternValue) -> PatternValue + Send + Sync + 'static,
    ) -> Self {
        self.app_left(other.into_control_pattern(), f)
    }

    pub fn add(self, other: impl IntoControlPattern) -> Self {
        self.op_with(other, numeric(|a, b| a + b))
    }

    pub fn sub(self, other: impl IntoControlPattern) -> Self {
        self.op_with(other, numeric(|a, b| a - b))
    }

    pub fn mul(self, other: impl IntoControlPattern) -> Self {
        self.op_with(other, numeric(|a, b| a * b))
    }

    pub fn div(self, other: impl IntoControlPattern) -> Self {
        self.op_with(other, numeric(|a, b| a / b))
    }

    pub fn pow(self, other: impl IntoControlPattern) -> Self {
        self.op_with(other, numeric(|a, b| a.powf(b)))
    }

    /// Attach a named control, inner-joined against the value pattern. A
    /// non-map left value is replaced by a fresh single-entry map.
    pub fn set_control(self, key: &str, value: impl IntoControlPattern) -> Self {
        let key = key.to_string();
        self.op_with(value, move |left, right| match left {
            PatternValue::Map(m) => {
                let mut m = m.clone();
                m.set(&key, right.clone());
                PatternValue::Map(m)
            }
            _ => PatternValue::Map(ControlMap::from_entry(&key, right.clone())),
        })
    }

    /// Take structure from a boolean pattern, values from this one.
    pub fn struct_with(self, structure: Pattern<bool>) -> Self {
        structure
            .filter_haps(|h| h.value)
            .app_left(self, |_, v| v.clone())
    }

    /// Distribute `pulses` onsets over `steps` subdivisions, as evenly as
    /// Bjorklund allows, keeping this pattern's values.
    pub fn euclid(self, pulses: usize, steps: usize, rotation: i64) -> Self {
        self.struct_with(euclid(pulses, steps, rotation))
    }

    /// Mark each event to play its sample across exactly its own duration:
    /// `unit = "c"` and `speed = 1/duration` in cycles.
    pub fn fit(self) -> Self {
        Pattern::new(move |state| {
            self.query(state)
                .into_iter()
                .map(|hap| {
                    let duration = hap.duration();
                    let speed = if duration > Fraction::ZERO {
                        1.0 / duration.to_float()
                    } else {
                        1.0
                    };
                    let mut map = hap.value.to_map();
                    map.set("unit", PatternValue::String("c".into()));
                    map.set("speed", PatternValue::Number(speed));
                    hap.with_value(|_| PatternValue::Map(map.clone()))
                })
                .collect()
        })
    }
}

macro_rules! control_methods {
    ($($(#[$doc:meta])* $name:ident => $key:literal),+ $(,)?) => {
        impl Pattern<PatternValue> {
            $(
                $(#[$doc])*
                pub fn $name(self, value: impl IntoControlPattern) -> Self {
                    self.set_control($key, value)
                }
            )+
        }
    };
}

control_methods! {
    /// Sound or synth name.
    s => "s",
    /// Alias for [`Pattern::s`].
    sound => "s",
    /// Sample slot / scale degree.
    n => "n",
    /// MIDI note number.
    note => "note",
    gain => "gain",
    velocity => "velocity",
    /// Stereo position, 0 left .. 1 right, 0.5 centre.
    pan => "pan",
    /// Sample playback rate multiplier.
    speed => "speed",
    /// Mixer bus for delay/duck isolation.
    orbit => "orbit",
    attack => "attack",
    decay => "decay",
    sustain => "sustain",
    release => "release",
    /// Low-pass cutoff in Hz.
    lpf => "lpf",
    /// High-pass cutoff; carried on the event for downstream consumers.
    hpf => "hpf",
    lpq => "lpq",
    /// Filter envelope depth in octaves.
    lpenv => "lpenv",
    lpa => "lpa",
    lpd => "lpd",
    lps => "lps",
    lpr => "lpr",
    /// FM index; 0 disables FM.
    fmi => "fmi",
    /// FM harmonicity ratio.
    fmh => "fmh",
    fmwave => "fmwave",
    detune => "detune",
    unison => "unison",
    spread => "spread",
    /// Delay send, 0 dry .. 1 wet.
    delay => "delay",
    delaytime => "delaytime",
    delayfeedback => "delayfeedback",
    /// Delay time in cycles rather than seconds.
    delaysync => "delaysync",
    /// Orbits to duck when this event fires.
    duck => "duckorbit",
    duckdepth => "duckdepth",
    duckattack => "duckattack",
    duckonset => "duckonset",
}

/// The Bjorklund step sequence: `pulses` trues spread over `steps` slots.
pub fn bjorklund(pulses: usize, steps: usize) -> Vec<bool> {
    if steps == 0 {
        return Vec::new();
    }
    if pulses == 0 {
        return vec![false; steps];
    }
    if pulses >= steps {
        return vec![true; steps];
    }
    let mut front: Vec<Vec<bool>> = vec![vec![true]; pulses];
    let mut back: Vec<Vec<bool>> = vec![vec![false]; steps - pulses];
    // Fold the remainder groups onto the leading groups until one unique
    // remainder (or none) is left.
    while back.len() > 1 {
        let n = front.len().min(back.len());
        let mut folded = Vec::with_capacity(n);
        for i in 0..n {
            let mut group = front[i].clone();
            group.extend_from_slice(&back[i]);
            folded.push(group);
        }
        let remainder = if front.len() > n {
            front.split_off(n)
        } else {
            back.split_off(n)
        };
        front = folded;
        back = remainder;
    }
    front.into_iter().chain(back).flatten().collect()
}

/// Euclidean rhythm as a pattern: unit-value haps of `true` at positions
/// `k/steps`, each `1/steps` long.
pub fn euclid(pulses: usize, steps: usize, rotation: i64) -> Pattern<bool> {
    let mut slots = bjorklund(pulses, steps);
    if !slots.is_empty() && rotation != 0 {
        let len = slots.len() as i64;
        slots.rotate_left(rotation.rem_euclid(len) as usize);
    }
    let pairs = slots
        .into_iter()
        .map(|active| {
            let pattern = if active {
                Pattern::pure(true)
            } else {
                Pattern::silence()
            };
            (Fraction::ONE, pattern)
        })
        .collect();
    Pattern::timecat(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Fraction;

    fn f(a: i64, b: i64) -> Fraction {
        Fraction::new(a, b)
    }

    #[test]
    fn add_combines_structure_left() {
        let p = Pattern::pure(PatternValue::Number(3.0))
            .add(Pattern::fastcat(vec![
                Pattern::pure(PatternValue::Number(1.0)),
                Pattern::pure(PatternValue::Number(2.0)),
            ]));
        let haps = p.query_span(f(0, 1), f(1, 1));
        let values: Vec<f64> = haps.iter().filter_map(|h| h.value.as_number()).collect();
        assert_eq!(values, vec![4.0, 5.0]);
        // Structure comes from the left: both haps belong to the one whole.
        assert_eq!(haps[0].whole.unwrap().duration(), f(1, 1));
        assert_eq!(haps[0].part, crate::pattern::TimeSpan::new(f(0, 1), f(1, 2)));
    }

    #[test]
    fn set_control_wraps_bare_values() {
        let p = mini("bd").set_control("gain", 0.5);
        let haps = p.query_span(f(0, 1), f(1, 1));
        let map = haps[0].value.as_map().expect("map");
        assert_eq!(map.number(&["gain"]), Some(0.5));
        assert!(!map.contains("s"), "bare left value is replaced wholesale");
    }

    #[test]
    fn set_control_extends_maps() {
        let p = s("bd").gain(0.9).pan("0 1");
        let haps = p.query_span(f(0, 1), f(1, 1));
        let map = haps[0].value.as_map().expect("map");
        assert_eq!(map.string(&["s"]).as_deref(), Some("bd"));
        assert_eq!(map.number(&["gain"]), Some(0.9));
        assert_eq!(map.number(&["pan"]), Some(0.0));
        assert_eq!(haps.len(), 2, "pan pattern splits the event's part");
    }

    #[test]
    fn bjorklund_three_eight() {
        let slots = bjorklund(3, 8);
        assert_eq!(
            slots,
            vec![true, false, false, true, false, false, true, false]
        );
    }

    #[test]
    fn bjorklund_five_eight() {
        let onsets: Vec<usize> = bjorklund(5, 8)
            .iter()
            .enumerate()
            .filter(|(_, &b)| b)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(onsets, vec![0, 2, 3, 5, 6]);
    }

    #[test]
    fn euclid_positions_and_count() {
        let haps = euclid(3, 8, 0).query_span(f(0, 1), f(1, 1));
        assert_eq!(haps.len(), 3);
        let begins: Vec<Fraction> = haps.iter().map(|h| h.whole.unwrap().begin).collect();
        assert_eq!(begins, vec![f(0, 8), f(3, 8), f(6, 8)]);
        for hap in &haps {
            assert_eq!(hap.whole.unwrap().duration(), f(1, 8));
        }
    }

    #[test]
    fn euclid_rotation_shifts_onsets() {
        let haps = euclid(3, 8, 3).query_span(f(0, 1), f(1, 1));
        let begins: Vec<Fraction> = haps.iter().map(|h| h.whole.unwrap().begin).collect();
        assert_eq!(begins, vec![f(0, 8), f(3, 8), f(5, 8)]);
    }

    #[test]
    fn euclid_applies_structure_to_values() {
        let p = s("bd").euclid(3, 8, 0);
        let haps = p.query_span(f(0, 1), f(1, 1));
        assert_eq!(haps.len(), 3);
        for hap in &haps {
            let map = hap.value.as_map().expect("map");
            assert_eq!(map.string(&["s"]).as_deref(), Some("bd"));
        }
    }

    #[test]
    fn fit_inverts_duration() {
        let p = s("break").fit();
        for hap in mini_haps(&p) {
            let map = hap.value.as_map().expect("map");
            let speed = map.number(&["speed"]).unwrap();
            let duration = hap.duration().to_float();
            assert!((speed * duration - 1.0).abs() < 1e-9);
            assert_eq!(map.string(&["unit"]).as_deref(), Some("c"));
        }
        let quarters = s("break*4").fit();
        for hap in mini_haps(&quarters) {
            let map = hap.value.as_map().expect("map");
            assert!((map.number(&["speed"]).unwrap() - 4.0).abs() < 1e-9);
        }
    }

    fn mini_haps(p: &Pattern<PatternValue>) -> Vec<crate::pattern::Hap<PatternValue>> {
        p.query_span(f(0, 1), f(1, 1))
    }
}
