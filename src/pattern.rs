//! Core pattern engine: exact rational time, spans, haps and the
//! `Pattern` type itself.
//!
//! A pattern is a pure function from a query span to a list of events
//! ("haps"). Nothing is evaluated until a query runs, so combinators are
//! cheap to build and safe to share across threads. All time arithmetic is
//! exact rational; floats only appear at the audio edge.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Exact rational time in cycles. Always kept in reduced form with a
/// positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    pub numerator: i64,
    pub denominator: i64,
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

impl Fraction {
    pub fn new(n: i64, d: i64) -> Self {
        debug_assert!(d != 0, "fraction with zero denominator");
        let g = gcd(n.abs(), d.abs()).max(1);
        Self {
            numerator: n / g * d.signum(),
            denominator: d.abs() / g,
        }
    }

    pub const ZERO: Fraction = Fraction {
        numerator: 0,
        denominator: 1,
    };

    pub const ONE: Fraction = Fraction {
        numerator: 1,
        denominator: 1,
    };

    /// Best rational approximation of a float, by continued fractions with
    /// the denominator capped at one million. Exact for the factors that
    /// actually occur in notation (`*2`, `*1.5`, ...).
    pub fn approximate(x: f64) -> Self {
        const MAX_DENOM: i64 = 1_000_000;
        if !x.is_finite() {
            return Fraction::ZERO;
        }
        let negative = x < 0.0;
        let mut x = x.abs();
        let (mut h0, mut h1) = (0i64, 1i64);
        let (mut k0, mut k1) = (1i64, 0i64);
        loop {
            let a = x.floor();
            if a > i64::MAX as f64 {
                break;
            }
            let a = a as i64;
            let h2 = match a.checked_mul(h1).and_then(|v| v.checked_add(h0)) {
                Some(v) => v,
                None => break,
            };
            let k2 = match a.checked_mul(k1).and_then(|v| v.checked_add(k0)) {
                Some(v) => v,
                None => break,
            };
            if k2 > MAX_DENOM {
                break;
            }
            h0 = h1;
            h1 = h2;
            k0 = k1;
            k1 = k2;
            let frac = x - a as f64;
            if frac < 1e-12 {
                break;
            }
            x = 1.0 / frac;
        }
        if k1 == 0 {
            return Fraction::ZERO;
        }
        let f = Fraction::new(h1, k1);
        if negative {
            -f
        } else {
            f
        }
    }

    pub fn to_float(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Largest integer not greater than the fraction.
    pub fn floor(&self) -> i64 {
        self.numerator.div_euclid(self.denominator)
    }

    pub fn ceil(&self) -> i64 {
        -(-*self).floor()
    }

    /// Start of the cycle this time falls in.
    pub fn sam(&self) -> Fraction {
        Fraction::new(self.floor(), 1)
    }

    /// Start of the next cycle.
    pub fn next_sam(&self) -> Fraction {
        self.sam() + Fraction::ONE
    }

    pub fn is_integer(&self) -> bool {
        self.denominator == 1
    }
}

impl From<i64> for Fraction {
    fn from(n: i64) -> Self {
        Fraction::new(n, 1)
    }
}

impl std::ops::Add for Fraction {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Fraction::new(
            self.numerator * other.denominator + other.numerator * self.denominator,
            self.denominator * other.denominator,
        )
    }
}

impl std::ops::Sub for Fraction {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Fraction::new(
            self.numerator * other.denominator - other.numerator * self.denominator,
            self.denominator * other.denominator,
        )
    }
}

impl std::ops::Mul for Fraction {
    type Output = Self;
    fn mul(self, other: Self) -> Self {
        Fraction::new(
            self.numerator * other.numerator,
            self.denominator * other.denominator,
        )
    }
}

impl std::ops::Div for Fraction {
    type Output = Self;
    fn div(self, other: Self) -> Self {
        debug_assert!(other.numerator != 0, "division by zero fraction");
        Fraction::new(
            self.numerator * other.denominator,
            self.denominator * other.numerator,
        )
    }
}

impl std::ops::Neg for Fraction {
    type Output = Self;
    fn neg(self) -> Self {
        Fraction::new(-self.numerator, self.denominator)
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let lhs = self.numerator as i128 * other.denominator as i128;
        let rhs = other.numerator as i128 * self.denominator as i128;
        lhs.cmp(&rhs)
    }
}

impl std::fmt::Display for Fraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

/// Half-open time interval `[begin, end)` over cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSpan {
    pub begin: Fraction,
    pub end: Fraction,
}

impl TimeSpan {
    pub fn new(begin: Fraction, end: Fraction) -> Self {
        Self { begin, end }
    }

    pub fn duration(&self) -> Fraction {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }

    /// Split at every integer cycle boundary. The pieces cover the span
    /// exactly and each lies within a single cycle.
    pub fn span_cycles(&self) -> Vec<TimeSpan> {
        let mut spans = Vec::new();
        if self.is_empty() {
            return spans;
        }
        let mut begin = self.begin;
        while begin < self.end {
            let boundary = begin.next_sam();
            let end = boundary.min(self.end);
            spans.push(TimeSpan::new(begin, end));
            begin = end;
        }
        spans
    }

    /// Overlap with another span, or `None` when they only touch or miss.
    pub fn sect(&self, other: &TimeSpan) -> Option<TimeSpan> {
        let begin = self.begin.max(other.begin);
        let end = self.end.min(other.end);
        if begin < end {
            Some(TimeSpan::new(begin, end))
        } else {
            None
        }
    }

    /// Apply a time transform to both endpoints.
    pub fn with_time(&self, f: impl Fn(Fraction) -> Fraction) -> TimeSpan {
        TimeSpan::new(f(self.begin), f(self.end))
    }

    /// The whole cycle containing `t`.
    pub fn cycle_of(t: Fraction) -> TimeSpan {
        TimeSpan::new(t.sam(), t.next_sam())
    }
}

/// Hap (short for "happening"): a value active over `part`, conceptually
/// belonging to the larger `whole` it was sliced from. Haps without a whole
/// are analog/continuous values and never count as onsets.
#[derive(Debug, Clone)]
pub struct Hap<T> {
    pub whole: Option<TimeSpan>,
    pub part: TimeSpan,
    pub value: T,
    pub context: HashMap<String, String>,
}

impl<T: Clone> Hap<T> {
    pub fn new(whole: Option<TimeSpan>, part: TimeSpan, value: T) -> Self {
        Self {
            whole,
            part,
            value,
            context: HashMap::new(),
        }
    }

    /// True when this hap begins at the start of its whole, i.e. this slice
    /// carries the event's trigger.
    pub fn has_onset(&self) -> bool {
        matches!(self.whole, Some(w) if w.begin == self.part.begin)
    }

    pub fn whole_or_part(&self) -> TimeSpan {
        self.whole.unwrap_or(self.part)
    }

    /// Event length in cycles (whole when present, else part).
    pub fn duration(&self) -> Fraction {
        self.whole_or_part().duration()
    }

    pub fn with_value<U>(&self, f: impl FnOnce(&T) -> U) -> Hap<U> {
        Hap {
            whole: self.whole,
            part: self.part,
            value: f(&self.value),
            context: self.context.clone(),
        }
    }

    /// Apply a time transform to part and whole alike.
    pub fn with_time(&self, f: impl Fn(Fraction) -> Fraction) -> Hap<T> {
        Hap {
            whole: self.whole.map(|w| w.with_time(&f)),
            part: self.part.with_time(&f),
            value: self.value.clone(),
            context: self.context.clone(),
        }
    }
}

/// A pattern query: the span to sample plus named controls supplied by the
/// caller.
#[derive(Debug, Clone)]
pub struct State {
    pub span: TimeSpan,
    pub controls: HashMap<String, f64>,
}

impl State {
    pub fn new(span: TimeSpan) -> Self {
        Self {
            span,
            controls: HashMap::new(),
        }
    }

    fn with_span(&self, span: TimeSpan) -> Self {
        Self {
            span,
            controls: self.controls.clone(),
        }
    }
}

/// Core pattern type: a shareable query function from span to haps.
pub struct Pattern<T: Clone + Send + Sync> {
    query: Arc<dyn Fn(&State) -> Vec<Hap<T>> + Send + Sync>,
}

impl<T: Clone + Send + Sync> Clone for Pattern<T> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
        }
    }
}

impl<T: Clone + Send + Sync> Debug for Pattern<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern").field("query", &"<closure>").finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Pattern<T> {
    pub fn new(query: impl Fn(&State) -> Vec<Hap<T>> + Send + Sync + 'static) -> Self {
        Self {
            query: Arc::new(query),
        }
    }

    pub fn query(&self, state: &State) -> Vec<Hap<T>> {
        (self.query)(state)
    }

    /// Query over `[begin, end)` with no controls.
    pub fn query_span(&self, begin: Fraction, end: Fraction) -> Vec<Hap<T>> {
        self.query(&State::new(TimeSpan::new(begin, end)))
    }

    /// One event per cycle, `whole = [n, n+1)`.
    pub fn pure(value: T) -> Self {
        Self::new(move |state| {
            state
                .span
                .span_cycles()
                .into_iter()
                .map(|subspan| {
                    Hap::new(
                        Some(TimeSpan::cycle_of(subspan.begin)),
                        subspan,
                        value.clone(),
                    )
                })
                .collect()
        })
    }

    pub fn silence() -> Self {
        Self::new(|_| Vec::new())
    }

    /// Map a function over every hap's value.
    pub fn fmap<U: Clone + Send + Sync + 'static>(
        self,
        f: impl Fn(&T) -> U + Send + Sync + 'static,
    ) -> Pattern<U> {
        Pattern::new(move |state| {
            self.query(state)
                .into_iter()
                .map(|hap| hap.with_value(|v| f(v)))
                .collect()
        })
    }

    /// Keep only haps the predicate accepts.
    pub fn filter_haps(self, pred: impl Fn(&Hap<T>) -> bool + Send + Sync + 'static) -> Self {
        Pattern::new(move |state| {
            self.query(state).into_iter().filter(|h| pred(h)).collect()
        })
    }

    /// Keep only the slices that carry their event's trigger.
    pub fn onsets_only(self) -> Self {
        self.filter_haps(|h| h.has_onset())
    }

    /// Speed up by an exact factor: query the source over `span * r`, then
    /// rescale hap times by `1/r`. Non-positive factors give silence.
    pub fn fast(self, factor: Fraction) -> Self {
        if factor <= Fraction::ZERO {
            return Pattern::silence();
        }
        Pattern::new(move |state| {
            let inner = state.with_span(state.span.with_time(|t| t * factor));
            self.query(&inner)
                .into_iter()
                .map(|hap| hap.with_time(|t| t / factor))
                .collect()
        })
    }

    pub fn slow(self, factor: Fraction) -> Self {
        if factor <= Fraction::ZERO {
            return Pattern::silence();
        }
        self.fast(Fraction::ONE / factor)
    }

    /// Reflect each cycle in time. Involutive: `rev(rev(p)) == p`.
    pub fn rev(self) -> Self {
        Pattern::new(move |state| {
            let mut result = Vec::new();
            for subspan in state.span.span_cycles() {
                // Mirror around the centre of the cycle: t -> 2c + 1 - t.
                let pivot = subspan.begin.sam() + subspan.begin.next_sam();
                let reflect =
                    move |span: TimeSpan| TimeSpan::new(pivot - span.end, pivot - span.begin);
                let reflected = state.with_span(reflect(subspan));
                for hap in self.query(&reflected) {
                    result.push(Hap {
                        whole: hap.whole.map(reflect),
                        part: reflect(hap.part),
                        value: hap.value,
                        context: hap.context,
                    });
                }
            }
            result.sort_by(|a, b| a.part.begin.cmp(&b.part.begin));
            result
        })
    }

    /// Apply `f` on the last cycle of every group of `n`: cycles where
    /// `cycle mod n == n - 1`.
    pub fn every(
        self,
        n: i64,
        f: impl Fn(Pattern<T>) -> Pattern<T> + Send + Sync + 'static,
    ) -> Self {
        if n <= 0 {
            return self;
        }
        let transformed = f(self.clone());
        Pattern::new(move |state| {
            let mut result = Vec::new();
            for subspan in state.span.span_cycles() {
                let cycle = subspan.begin.floor();
                let source = if cycle.rem_euclid(n) == n - 1 {
                    &transformed
                } else {
                    &self
                };
                result.extend(source.query(&state.with_span(subspan)));
            }
            result
        })
    }

    /// Play all patterns at once.
    pub fn stack(patterns: Vec<Pattern<T>>) -> Pattern<T> {
        Pattern::new(move |state| patterns.iter().flat_map(|p| p.query(state)).collect())
    }

    /// One pattern per cycle, round-robin by cycle index.
    pub fn slowcat(patterns: Vec<Pattern<T>>) -> Pattern<T> {
        if patterns.is_empty() {
            return Pattern::silence();
        }
        let len = patterns.len() as i64;
        Pattern::new(move |state| {
            let mut result = Vec::new();
            for subspan in state.span.span_cycles() {
                let index = subspan.begin.floor().rem_euclid(len) as usize;
                result.extend(patterns[index].query(&state.with_span(subspan)));
            }
            result
        })
    }

    /// All patterns inside one cycle: `fast(k, slowcat(...))`.
    pub fn fastcat(patterns: Vec<Pattern<T>>) -> Pattern<T> {
        let k = patterns.len() as i64;
        Pattern::slowcat(patterns).fast(Fraction::new(k, 1))
    }

    /// Weighted concatenation within each cycle. Each entry occupies a slot
    /// proportional to its weight; the slot shows the pattern's cycle with
    /// the same index as the enclosing cycle, which is what lets alternation
    /// nested in a sequence advance per outer cycle.
    pub fn timecat(pairs: Vec<(Fraction, Pattern<T>)>) -> Pattern<T> {
        if pairs.is_empty() {
            return Pattern::silence();
        }
        let total = pairs
            .iter()
            .fold(Fraction::ZERO, |acc, (w, _)| acc + *w);
        if total <= Fraction::ZERO {
            return Pattern::silence();
        }
        // Precompute each slot as [begin, end) fractions of one cycle.
        let mut slots = Vec::with_capacity(pairs.len());
        let mut acc = Fraction::ZERO;
        for (weight, pattern) in pairs {
            let begin = acc / total;
            acc = acc + weight;
            let end = acc / total;
            slots.push((begin, end, pattern));
        }
        Pattern::new(move |state| {
            let mut result = Vec::new();
            for subspan in state.span.span_cycles() {
                let cycle = subspan.begin.sam();
                for (begin, end, pattern) in &slots {
                    let width = *end - *begin;
                    if width <= Fraction::ZERO {
                        continue;
                    }
                    let slot = TimeSpan::new(cycle + *begin, cycle + *end);
                    let Some(sect) = slot.sect(&subspan) else {
                        continue;
                    };
                    let slot_begin = slot.begin;
                    let to_inner = move |t: Fraction| cycle + (t - slot_begin) / width;
                    let to_outer = move |t: Fraction| slot_begin + (t - cycle) * width;
                    let inner = state.with_span(sect.with_time(to_inner));
                    for hap in pattern.query(&inner) {
                        result.push(hap.with_time(to_outer));
                    }
                }
            }
            result
        })
    }

    /// Inner join: the left pattern drives structure, the right supplies a
    /// second value. For each left hap the right pattern is sampled over the
    /// left's whole (or part); overlapping right haps combine on the
    /// intersection of the parts.
    pub fn app_left<U: Clone + Send + Sync + 'static, V: Clone + Send + Sync + 'static>(
        self,
        other: Pattern<U>,
        f: impl Fn(&T, &U) -> V + Send + Sync + 'static,
    ) -> Pattern<V> {
        Pattern::new(move |state| {
            let mut result = Vec::new();
            for left in self.query(state) {
                let inner = state.with_span(left.whole_or_part());
                for right in other.query(&inner) {
                    let Some(part) = left.part.sect(&right.part) else {
                        continue;
                    };
                    let whole = match (left.whole, right.whole) {
                        (Some(lw), Some(rw)) => lw.sect(&rw),
                        _ => None,
                    };
                    let mut hap = Hap::new(whole, part, f(&left.value, &right.value));
                    hap.context = left.context.clone();
                    result.push(hap);
                }
            }
            result
        })
    }
}
