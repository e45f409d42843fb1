//! # Magnon - live coding music engine
//!
//! Magnon interprets TidalCycles-style pattern expressions as lazy,
//! queryable functions of rational time, resolves them into discrete
//! events, and renders audio through synth voices and sample playback in
//! real time. A file watcher reloads the user's script so edits take
//! effect without restarting audio.
//!
//! ## Layers
//!
//! - **Patterns** ([`pattern`], [`pattern_ops`], [`pattern_tonal`]):
//!   exact-rational time spans, haps, and the combinator algebra
//!   (`pure`, `stack`, `slowcat`, `fast`, `every`, `rev`, joins, scales).
//! - **Mini-notation** ([`mini_notation`]): `"bd [hh hh] sd"` compiled
//!   onto the combinators.
//! - **Voices** ([`osc`], [`filter`], [`envelope`], [`voice`]): polyBLEP
//!   oscillators, resonant low-pass with octave-depth envelope, ADSR amps,
//!   FM, and interpolating sample playback.
//! - **Cyclist** ([`cyclist`], [`orbit`]): the block scheduler/mixer with
//!   per-orbit delay and sidechain ducking.
//! - **Host** ([`script`], [`live`], [`render`]): the track script DSL,
//!   the cpal/notify live session, and offline WAV rendering.
//!
//! ## Quick start
//!
//! ```
//! use magnon::mini_notation::parse_mini_notation;
//! use magnon::pattern::Fraction;
//!
//! let pattern = parse_mini_notation("bd hh sd hh").unwrap();
//! let haps = pattern.query_span(Fraction::ZERO, Fraction::ONE);
//! assert_eq!(haps.len(), 4);
//! assert_eq!(haps[0].value.as_string(), "bd");
//! ```
//!
//! Building a playable pattern and rendering a block:
//!
//! ```
//! use magnon::cyclist::Cyclist;
//! use magnon::pattern_ops::n;
//!
//! let mut cyclist = Cyclist::new(44_100, 1.0, None);
//! cyclist.set_pattern(n("0 4 7").scale("c:major").s("sine"));
//! let (left, right) = cyclist.generate(512);
//! assert_eq!(left.len(), 512);
//! assert_eq!(right.len(), 512);
//! ```

pub mod control;
pub mod cyclist;
pub mod envelope;
pub mod filter;
pub mod live;
pub mod mini_notation;
pub mod orbit;
pub mod osc;
pub mod pattern;
pub mod pattern_ops;
pub mod pattern_tonal;
pub mod render;
pub mod sample_bank;
pub mod script;
pub mod tempo;
pub mod voice;

pub use control::{ControlMap, PatternValue};
pub use cyclist::Cyclist;
pub use mini_notation::parse_mini_notation;
pub use pattern::{Fraction, Hap, Pattern, State, TimeSpan};
pub use pattern_ops::{n, note, s, sound};
