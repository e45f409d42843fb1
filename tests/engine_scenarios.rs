//! End-to-end scenarios across the parser, the pattern algebra and the
//! scheduler, pinned to literal expected values.

use magnon::parse_mini_notation;
use magnon::pattern::{Fraction, TimeSpan};
use magnon::pattern_ops::{euclid, n, s};
use magnon::Cyclist;

fn f(a: i64, b: i64) -> Fraction {
    Fraction::new(a, b)
}

#[test]
fn four_on_the_floor_wholes() {
    let haps = parse_mini_notation("bd hh sd hh")
        .unwrap()
        .query_span(f(0, 1), f(1, 1));
    let got: Vec<(String, TimeSpan)> = haps
        .iter()
        .map(|h| (h.value.as_string(), h.whole.unwrap()))
        .collect();
    assert_eq!(
        got,
        vec![
            ("bd".into(), TimeSpan::new(f(0, 1), f(1, 4))),
            ("hh".into(), TimeSpan::new(f(1, 4), f(1, 2))),
            ("sd".into(), TimeSpan::new(f(1, 2), f(3, 4))),
            ("hh".into(), TimeSpan::new(f(3, 4), f(1, 1))),
        ]
    );
}

#[test]
fn nested_group_timing() {
    // The bracket group is one step of the outer three-step sequence and
    // divides its own third equally.
    let haps = parse_mini_notation("bd [hh hh] sd")
        .unwrap()
        .query_span(f(0, 1), f(1, 1));
    let wholes: Vec<TimeSpan> = haps.iter().map(|h| h.whole.unwrap()).collect();
    assert_eq!(
        wholes,
        vec![
            TimeSpan::new(f(0, 1), f(1, 3)),
            TimeSpan::new(f(1, 3), f(1, 2)),
            TimeSpan::new(f(1, 2), f(2, 3)),
            TimeSpan::new(f(2, 3), f(1, 1)),
        ]
    );
}

#[test]
fn repetition_and_alternation() {
    let haps = parse_mini_notation("bd*2").unwrap().query_span(f(0, 1), f(1, 1));
    assert_eq!(haps.len(), 2);
    assert_eq!(haps[0].whole, Some(TimeSpan::new(f(0, 1), f(1, 2))));
    assert_eq!(haps[1].whole, Some(TimeSpan::new(f(1, 2), f(1, 1))));

    let haps = parse_mini_notation("<bd sd hh>*4")
        .unwrap()
        .query_span(f(0, 1), f(1, 1));
    let values: Vec<String> = haps.iter().map(|h| h.value.as_string()).collect();
    assert_eq!(values, vec!["bd", "sd", "hh", "bd"]);
}

#[test]
fn scale_resolves_degrees_to_notes() {
    let haps = n("0 2 4").scale("c:major").query_span(f(0, 1), f(1, 1));
    let notes: Vec<f64> = haps
        .iter()
        .map(|h| h.value.as_map().unwrap().number(&["note"]).unwrap())
        .collect();
    assert_eq!(notes, vec![60.0, 64.0, 67.0]);
    for hap in &haps {
        assert_eq!(hap.value.as_map().unwrap().len(), 1, "only the note key");
    }
}

#[test]
fn euclid_three_eight_onsets() {
    let haps = euclid(3, 8, 0).query_span(f(0, 1), f(1, 1));
    let begins: Vec<Fraction> = haps.iter().map(|h| h.whole.unwrap().begin).collect();
    assert_eq!(begins, vec![f(0, 8), f(3, 8), f(6, 8)]);
}

#[test]
fn euclid_is_as_even_as_possible() {
    for (pulses, steps) in [(2usize, 5usize), (3, 8), (5, 8), (7, 16), (4, 12)] {
        let haps = euclid(pulses, steps, 0).query_span(f(0, 1), f(1, 1));
        assert_eq!(haps.len(), pulses, "({}, {})", pulses, steps);
        let begins: Vec<Fraction> = haps.iter().map(|h| h.whole.unwrap().begin).collect();
        // Gaps between consecutive onsets (wrapping) differ by at most one
        // step.
        let step = f(1, steps as i64);
        let mut gaps = Vec::new();
        for i in 0..begins.len() {
            let next = if i + 1 < begins.len() {
                begins[i + 1]
            } else {
                begins[0] + f(1, 1)
            };
            gaps.push((next - begins[i]) / step);
        }
        let min = gaps.iter().min().unwrap();
        let max = gaps.iter().max().unwrap();
        assert!(
            (*max - *min) <= f(1, 1),
            "({}, {}): gaps {:?}",
            pulses,
            steps,
            gaps
        );
    }
}

#[test]
fn alternation_hold_repeats_across_cycles() {
    let haps = parse_mini_notation("<7 _ _ 6>")
        .unwrap()
        .query_span(f(0, 1), f(4, 1));
    let got: Vec<(String, TimeSpan)> = haps
        .iter()
        .map(|h| (h.value.as_string(), h.whole.unwrap()))
        .collect();
    assert_eq!(
        got,
        vec![
            ("7".into(), TimeSpan::new(f(0, 1), f(1, 1))),
            ("7".into(), TimeSpan::new(f(1, 1), f(2, 1))),
            ("7".into(), TimeSpan::new(f(2, 1), f(3, 1))),
            ("6".into(), TimeSpan::new(f(3, 1), f(4, 1))),
        ]
    );
}

#[test]
fn pan_law_shapes_the_stereo_image() {
    // Four sine notes per cycle panned a quarter left: mean |L| / mean |R|
    // approaches cos(pi/8) / sin(pi/8).
    let mut cyclist = Cyclist::new(1000, 1.0, None);
    cyclist.set_pattern(n("0*4").scale("c:major").s("sine").pan(0.25));
    let (left, right) = cyclist.generate(200);
    let mean = |xs: &[f32]| xs.iter().map(|x| x.abs()).sum::<f32>() / xs.len() as f32;
    let (ml, mr) = (mean(left), mean(right));
    assert!(mr > 0.0, "right channel is silent");
    let expected = (std::f32::consts::PI / 8.0).cos() / (std::f32::consts::PI / 8.0).sin();
    let got = ml / mr;
    assert!((got - expected).abs() < 0.1, "ratio {} vs {}", got, expected);
}

#[test]
fn sample_events_fall_silent_without_a_bank() {
    // Unknown sample names degrade to silence rather than erroring.
    let mut cyclist = Cyclist::new(1000, 1.0, None);
    cyclist.set_pattern(s("bd sd"));
    let (left, right) = cyclist.generate(500);
    assert!(left.iter().chain(right.iter()).all(|&x| x == 0.0));
}

#[test]
fn samples_play_from_a_bank_directory() {
    let dir = tempfile::tempdir().unwrap();
    let bd = dir.path().join("bd");
    std::fs::create_dir(&bd).unwrap();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 1000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(bd.join("0.wav"), spec).unwrap();
    for _ in 0..200 {
        writer.write_sample(16_384i16).unwrap();
    }
    writer.finalize().unwrap();

    let mut cyclist = Cyclist::new(1000, 1.0, Some(dir.path().to_path_buf()));
    cyclist.set_pattern(s("bd"));
    let (left, _) = cyclist.generate(100);
    assert!(left.iter().any(|&x| x > 0.1), "sample audible");
}
