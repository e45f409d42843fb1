//! Tonal operations: scale degrees to notes, note names, transposition.

use crate::control::{ControlMap, PatternValue};
use crate::pattern::Pattern;
use crate::pattern_ops::IntoControlPattern;
use std::collections::HashMap;

lazy_static::lazy_static! {
    /// Semitone offsets from the root for each recognised mode.
    static ref SCALES: HashMap<&'static str, Vec<i32>> = {
        let mut m = HashMap::new();
        m.insert("major", vec![0, 2, 4, 5, 7, 9, 11]);
        m.insert("minor", vec![0, 2, 3, 5, 7, 8, 10]);
        m.insert("dorian", vec![0, 2, 3, 5, 7, 9, 10]);
        m.insert("phrygian", vec![0, 1, 3, 5, 7, 8, 10]);
        m.insert("lydian", vec![0, 2, 4, 6, 7, 9, 11]);
        m.insert("mixolydian", vec![0, 2, 4, 5, 7, 9, 10]);
        m.insert("locrian", vec![0, 1, 3, 5, 6, 8, 10]);
        m.insert("chromatic", (0..12).collect());
        m.insert("pentatonic", vec![0, 2, 4, 7, 9]);
        m.insert("minor_pentatonic", vec![0, 3, 5, 7, 10]);
        m.insert("blues", vec![0, 3, 5, 6, 7, 10]);
        m.insert("wholetone", vec![0, 2, 4, 6, 8, 10]);
        m
    };
}

fn pitch_class(letter: char) -> Option<i32> {
    match letter.to_ascii_lowercase() {
        'c' => Some(0),
        'd' => Some(2),
        'e' => Some(4),
        'f' => Some(5),
        'g' => Some(7),
        'a' => Some(9),
        'b' => Some(11),
        _ => None,
    }
}

/// Parse a note name like `c`, `c#3`, `ef2` or `a-1` into a MIDI number.
/// A bare letter defaults to octave 3.
///
/// Octave numbering deliberately follows the Yamaha convention, `c3` = 60,
/// i.e. `base = (octave + 2) * 12 + pitch_class`, not the scientific
/// `(octave + 1) * 12` numbering (`c3` = 48): degree 0 of `c:major` has to
/// land on middle C = 60. See DESIGN.md ("Scale base octave") for why this
/// side of the conflicting conventions was chosen.
pub fn note_name_to_midi(name: &str) -> Option<i32> {
    let name = name.trim();
    let mut chars = name.chars();
    let mut pc = pitch_class(chars.next()?)?;
    let rest: String = chars.collect();
    let mut rest = rest.as_str();
    if let Some(tail) = rest.strip_prefix(['#', 's']) {
        pc += 1;
        rest = tail;
    } else if let Some(tail) = rest.strip_prefix(['b', 'f']) {
        pc -= 1;
        rest = tail;
    }
    let octave: i32 = if rest.is_empty() {
        3
    } else {
        rest.parse().ok()?
    };
    Some((octave + 2) * 12 + pc)
}

/// Semitone offset of scale degree `d` in `mode`. Positive degrees walk up
/// the mode, octave by octave; negative degrees mirror symmetrically below
/// the root.
pub fn degree_to_semitone(degree: i64, mode: &[i32]) -> i32 {
    if mode.is_empty() {
        return 0;
    }
    if degree < 0 {
        return -degree_to_semitone(-degree, mode);
    }
    let len = mode.len() as i64;
    let octave = (degree / len) as i32;
    let index = (degree % len) as usize;
    octave * 12 + mode[index]
}

/// Parse `"root:mode"` into the root MIDI base and the mode's semitones.
/// The mode defaults to major when omitted.
fn parse_scale(name: &str) -> Option<(i32, &'static [i32])> {
    let (root, mode_name) = match name.split_once(':') {
        Some((r, m)) => (r, m),
        None => (name, "major"),
    };
    let base = note_name_to_midi(root)?;
    let mode = SCALES.get(mode_name.trim().to_ascii_lowercase().as_str())?;
    Some((base, mode.as_slice()))
}

impl Pattern<PatternValue> {
    /// Interpret values (or their `n` key) as scale degrees, producing
    /// `{note: base + semitone}`. Events with no usable degree pass through.
    pub fn scale(self, name: &str) -> Self {
        let Some((base, mode)) = parse_scale(name) else {
            tracing::error!(name, "unknown scale");
            return self;
        };
        self.fmap(move |value| {
            let (degree, mut map) = match value {
                PatternValue::Map(m) => (m.number(&["n"]), m.clone()),
                other => (other.as_number(), ControlMap::new()),
            };
            let Some(degree) = degree else {
                return value.clone();
            };
            let semitone = degree_to_semitone(degree.floor() as i64, mode);
            map.remove("n");
            map.set("note", PatternValue::Number((base + semitone) as f64));
            PatternValue::Map(map)
        })
    }

    /// Transpose by a semitone pattern: adds to an existing `note` value and
    /// leaves note-less events untouched.
    pub fn trans(self, semitones: impl IntoControlPattern) -> Self {
        self.op_with(semitones, |left, right| {
            let Some(offset) = right.as_number() else {
                return left.clone();
            };
            match left {
                PatternValue::Map(m) if m.contains("note") => {
                    let mut m = m.clone();
                    if let Some(note) = m.number(&["note"]) {
                        m.set("note", PatternValue::Number(note + offset));
                    }
                    PatternValue::Map(m)
                }
                other => other.clone(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Fraction;
    use crate::pattern_ops::n;

    fn query_notes(p: &Pattern<PatternValue>) -> Vec<f64> {
        p.query_span(Fraction::ZERO, Fraction::ONE)
            .iter()
            .filter_map(|h| h.value.as_map()?.number(&["note"]))
            .collect()
    }

    #[test]
    fn c_major_triad_degrees() {
        let p = n("0 2 4").scale("c:major");
        assert_eq!(query_notes(&p), vec![60.0, 64.0, 67.0]);
    }

    #[test]
    fn minor_and_explicit_octave() {
        let p = n("0 1 2").scale("a2:minor");
        // a2 = 57; minor steps 0, 2, 3.
        assert_eq!(query_notes(&p), vec![57.0, 59.0, 60.0]);
    }

    #[test]
    fn degrees_wrap_by_octave() {
        let p = n("7 8").scale("c:major");
        assert_eq!(query_notes(&p), vec![72.0, 74.0]);
    }

    #[test]
    fn negative_degrees_mirror() {
        let mode = SCALES.get("major").unwrap();
        assert_eq!(degree_to_semitone(1, mode), 2);
        assert_eq!(degree_to_semitone(-1, mode), -2);
        assert_eq!(degree_to_semitone(-7, mode), -12);
    }

    #[test]
    fn note_names() {
        assert_eq!(note_name_to_midi("c3"), Some(60));
        assert_eq!(note_name_to_midi("c"), Some(60));
        assert_eq!(note_name_to_midi("a2"), Some(57));
        assert_eq!(note_name_to_midi("c#3"), Some(61));
        assert_eq!(note_name_to_midi("ef3"), Some(63));
        assert_eq!(note_name_to_midi("C3"), Some(60), "notes are case-insensitive");
        assert_eq!(note_name_to_midi("x"), None);
    }

    #[test]
    fn scale_preserves_other_controls() {
        let p = n("0").scale("c:major").gain(0.7);
        let haps = p.query_span(Fraction::ZERO, Fraction::ONE);
        let map = haps[0].value.as_map().unwrap();
        assert_eq!(map.number(&["note"]), Some(60.0));
        assert_eq!(map.number(&["gain"]), Some(0.7));
        assert!(!map.contains("n"));
    }

    #[test]
    fn trans_shifts_notes_and_skips_the_rest() {
        let p = n("0").scale("c:major").trans(12.0);
        assert_eq!(query_notes(&p), vec![72.0]);
        let untouched = crate::pattern_ops::s("bd").trans(12.0);
        let haps = untouched.query_span(Fraction::ZERO, Fraction::ONE);
        let map = haps[0].value.as_map().unwrap();
        assert!(!map.contains("note"));
        assert_eq!(map.string(&["s"]).as_deref(), Some("bd"));
    }
}
