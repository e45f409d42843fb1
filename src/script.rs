//! The surface script: what a live-coded file contains.
//!
//! A script is line-oriented. `#` and `//` start comments; `setcps` /
//! `setbpm` set the tempo; every other non-empty line is a track, optionally
//! labelled:
//!
//! ```text
//! setcps 0.5
//! drums: s("bd hh sd hh").gain(0.9)
//! bass:  n("0 3 5 7").scale("c:minor").s("sawtooth").lpf(800).lpenv(2)
//! ```
//!
//! Tracks are stacked into one pattern. Expressions are chains of calls on
//! the pattern constructors (`s`, `sound`, `n`, `note`, `stack`, `silence`);
//! string arguments are mini-notation, numbers are plain values.

use crate::control::PatternValue;
use crate::mini_notation::parse_mini_notation;
use crate::pattern::{Fraction, Pattern};
use crate::pattern_ops::{n, note, s, IntoControlPattern};
use std::sync::Arc;

/// Evaluation failure with the line it came from.
#[derive(Debug, Clone)]
pub struct ScriptError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ScriptError {}

/// Result of evaluating a script.
#[derive(Debug)]
pub struct Script {
    /// Tempo requested by the script, when it sets one.
    pub cps: Option<f64>,
    pub pattern: Pattern<PatternValue>,
    pub track_names: Vec<String>,
}

/// Evaluate a whole script source.
pub fn eval_script(source: &str) -> Result<Script, ScriptError> {
    let mut cps = None;
    let mut tracks = Vec::new();
    let mut track_names = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        let err = |message: String| ScriptError {
            line: line_no,
            message,
        };

        if let Some(rest) = line.strip_prefix("setcps") {
            let value: f64 = rest
                .trim()
                .parse()
                .map_err(|_| err(format!("setcps expects a number, got \"{}\"", rest.trim())))?;
            cps = Some(value);
            continue;
        }
        if let Some(rest) = line.strip_prefix("setbpm") {
            let mut parts = rest.split_whitespace();
            let bpm: f64 = parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| err("setbpm expects a number".into()))?;
            let bpc: f64 = match parts.next() {
                Some(p) => p
                    .parse()
                    .map_err(|_| err(format!("bad beats-per-cycle \"{}\"", p)))?,
                None => 4.0,
            };
            cps = Some(bpm / (60.0 * bpc));
            continue;
        }

        let (name, expr_src) = split_track_label(line);
        let pattern = Evaluator::new(expr_src, line_no)
            .parse_expression()
            .and_then(|(value, eval)| eval.finish(value))?;
        track_names.push(name.unwrap_or_else(|| format!("track{}", tracks.len() + 1)));
        tracks.push(pattern);
    }

    let pattern = match tracks.len() {
        0 => Pattern::silence(),
        1 => tracks.remove(0),
        _ => Pattern::stack(tracks),
    };
    Ok(Script {
        cps,
        pattern,
        track_names,
    })
}

fn strip_comment(line: &str) -> &str {
    // Comments start outside string literals only.
    let bytes = line.as_bytes();
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_string = !in_string,
            b'#' if !in_string => return &line[..i],
            b'/' if !in_string && bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
        i += 1;
    }
    line
}

/// `name: expr` when the colon appears before any expression syntax.
fn split_track_label(line: &str) -> (Option<String>, &str) {
    for (i, c) in line.char_indices() {
        match c {
            ':' => {
                let name = line[..i].trim();
                if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return (Some(name.to_string()), line[i + 1..].trim_start());
                }
                return (None, line);
            }
            '(' | '"' | '.' | ' ' => return (None, line),
            _ => {}
        }
    }
    (None, line)
}

/// A value during evaluation.
enum Value {
    Pattern(Pattern<PatternValue>),
    Number(f64),
    Str(String),
    Transform(Arc<dyn Fn(Pattern<PatternValue>) -> Pattern<PatternValue> + Send + Sync>),
}

/// Recursive-descent evaluator for one track expression.
struct Evaluator<'a> {
    src: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: usize,
}

impl<'a> Evaluator<'a> {
    fn new(src: &'a str, line: usize) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
            line,
        }
    }

    fn error(&mut self, message: impl Into<String>) -> ScriptError {
        let rest: String = match self.chars.peek() {
            Some(&(i, _)) => self.src[i..].chars().take(16).collect(),
            None => String::new(),
        };
        ScriptError {
            line: self.line,
            message: if rest.is_empty() {
                message.into()
            } else {
                format!("{} (near \"{}\")", message.into(), rest)
            },
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some(&(_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if matches!(self.chars.peek(), Some(&(_, c)) if c == expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn read_ident(&mut self) -> Option<String> {
        self.skip_ws();
        let mut ident = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if ident.is_empty() {
            None
        } else {
            Some(ident)
        }
    }

    fn read_string(&mut self) -> Result<String, ScriptError> {
        let mut out = String::new();
        for (_, c) in self.chars.by_ref() {
            if c == '"' {
                return Ok(out);
            }
            out.push(c);
        }
        Err(ScriptError {
            line: self.line,
            message: "unterminated string".into(),
        })
    }

    fn read_number(&mut self) -> Result<f64, ScriptError> {
        let mut text = String::new();
        if matches!(self.chars.peek(), Some(&(_, '-'))) {
            text.push('-');
            self.chars.next();
        }
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                text.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        text.parse()
            .map_err(|_| self.error(format!("malformed number \"{}\"", text)))
    }

    /// Parse a full expression: a constructor call followed by a method
    /// chain. Returns self so the caller can check for trailing input.
    fn parse_expression(mut self) -> Result<(Value, Self), ScriptError> {
        let value = self.parse_value()?;
        Ok((value, self))
    }

    fn finish(mut self, value: Value) -> Result<Pattern<PatternValue>, ScriptError> {
        self.skip_ws();
        if self.chars.peek().is_some() {
            return Err(self.error("trailing input"));
        }
        match value {
            Value::Pattern(p) => Ok(p),
            Value::Str(text) => {
                // A bare mini-notation string is a track of sounds.
                parse_mini_notation(&text)
                    .map(|p| s(p))
                    .map_err(|e| ScriptError {
                        line: self.line,
                        message: e.to_string(),
                    })
            }
            _ => Err(self.error("expected a pattern expression")),
        }
    }

    fn parse_value(&mut self) -> Result<Value, ScriptError> {
        self.skip_ws();
        let mut value = match self.chars.peek() {
            Some(&(_, '"')) => {
                self.chars.next();
                Value::Str(self.read_string()?)
            }
            Some(&(_, c)) if c.is_ascii_digit() || c == '-' => Value::Number(self.read_number()?),
            Some(&(_, c)) if c.is_alphabetic() || c == '_' => {
                let ident = self.read_ident().expect("alphabetic start");
                self.parse_call(&ident)?
            }
            _ => return Err(self.error("expected an expression")),
        };
        // Method chain.
        loop {
            self.skip_ws();
            if !matches!(self.chars.peek(), Some(&(_, '.'))) {
                break;
            }
            // A dot inside a number was already consumed by read_number.
            self.chars.next();
            let method = self
                .read_ident()
                .ok_or_else(|| self.error("expected method name after '.'"))?;
            value = self.apply_method(value, &method)?;
        }
        Ok(value)
    }

    fn parse_args(&mut self) -> Result<Vec<Value>, ScriptError> {
        let mut args = Vec::new();
        if !self.eat('(') {
            return Ok(args);
        }
        self.skip_ws();
        if self.eat(')') {
            return Ok(args);
        }
        loop {
            args.push(self.parse_value()?);
            if self.eat(',') {
                continue;
            }
            if self.eat(')') {
                return Ok(args);
            }
            return Err(self.error("expected ',' or ')'"));
        }
    }

    fn parse_call(&mut self, ident: &str) -> Result<Value, ScriptError> {
        match ident {
            "silence" => {
                // Allow both `silence` and `silence()`.
                if self.eat('(') && !self.eat(')') {
                    return Err(self.error("silence takes no arguments"));
                }
                Ok(Value::Pattern(Pattern::silence()))
            }
            "s" | "sound" => {
                let pat = self.single_control_arg(ident)?;
                Ok(Value::Pattern(s(pat)))
            }
            "n" => {
                let pat = self.single_control_arg(ident)?;
                Ok(Value::Pattern(n(pat)))
            }
            "note" => {
                let pat = self.single_control_arg(ident)?;
                Ok(Value::Pattern(note(pat)))
            }
            "stack" => {
                let args = self.parse_args()?;
                let mut patterns = Vec::with_capacity(args.len());
                for arg in args {
                    match arg {
                        Value::Pattern(p) => patterns.push(p),
                        _ => return Err(self.error("stack takes pattern arguments")),
                    }
                }
                Ok(Value::Pattern(Pattern::stack(patterns)))
            }
            "rev" => {
                if self.eat('(') && !self.eat(')') {
                    return Err(self.error("rev takes no arguments"));
                }
                Ok(Value::Transform(Arc::new(|p| p.rev())))
            }
            "fast" | "slow" => {
                let slow = ident == "slow";
                let factor = match self.parse_args()?.as_slice() {
                    [Value::Number(x)] => Fraction::approximate(*x),
                    _ => return Err(self.error(format!("{} expects one number", ident))),
                };
                Ok(Value::Transform(Arc::new(move |p| {
                    if slow {
                        p.slow(factor)
                    } else {
                        p.fast(factor)
                    }
                })))
            }
            other => Err(self.error(format!("unknown function \"{}\"", other))),
        }
    }

    fn single_control_arg(&mut self, ident: &str) -> Result<Pattern<PatternValue>, ScriptError> {
        let args = self.parse_args()?;
        match args.into_iter().next() {
            Some(arg) => self.control_pattern(arg),
            None => Err(self.error(format!("{} expects an argument", ident))),
        }
    }

    fn control_pattern(&mut self, value: Value) -> Result<Pattern<PatternValue>, ScriptError> {
        match value {
            Value::Str(text) => parse_mini_notation(&text).map_err(|e| ScriptError {
                line: self.line,
                message: e.to_string(),
            }),
            Value::Number(x) => Ok(x.into_control_pattern()),
            Value::Pattern(p) => Ok(p),
            Value::Transform(_) => Err(self.error("expected a value, found a transform")),
        }
    }

    fn apply_method(&mut self, value: Value, method: &str) -> Result<Value, ScriptError> {
        let pattern = match value {
            Value::Pattern(p) => p,
            Value::Str(text) => parse_mini_notation(&text)
                .map(s)
                .map_err(|e| ScriptError {
                    line: self.line,
                    message: e.to_string(),
                })?,
            _ => return Err(self.error(format!("cannot call .{} here", method))),
        };
        let result = match method {
            "fast" | "slow" => {
                let factor = match self.parse_args()?.as_slice() {
                    [Value::Number(x)] => Fraction::approximate(*x),
                    _ => return Err(self.error(format!(".{} expects one number", method))),
                };
                if method == "slow" {
                    pattern.slow(factor)
                } else {
                    pattern.fast(factor)
                }
            }
            "rev" => {
                let args = self.parse_args()?;
                if !args.is_empty() {
                    return Err(self.error(".rev takes no arguments"));
                }
                pattern.rev()
            }
            "every" => {
                let mut args = self.parse_args()?.into_iter();
                let k = match args.next() {
                    Some(Value::Number(x)) if x >= 1.0 => x as i64,
                    _ => return Err(self.error(".every expects a cycle count")),
                };
                let transform = match args.next() {
                    Some(Value::Transform(f)) => f,
                    _ => {
                        return Err(
                            self.error(".every expects a transform (rev, fast(n), slow(n))")
                        )
                    }
                };
                pattern.every(k, move |p| transform(p))
            }
            "euclid" => {
                let args = self.parse_args()?;
                let numbers: Vec<f64> = args
                    .iter()
                    .filter_map(|a| match a {
                        Value::Number(x) => Some(*x),
                        _ => None,
                    })
                    .collect();
                match numbers.as_slice() {
                    [pulses, steps] => pattern.euclid(*pulses as usize, *steps as usize, 0),
                    [pulses, steps, rot] => {
                        pattern.euclid(*pulses as usize, *steps as usize, *rot as i64)
                    }
                    _ => return Err(self.error(".euclid expects (pulses, steps[, rotation])")),
                }
            }
            "scale" => match self.parse_args()?.into_iter().next() {
                Some(Value::Str(name)) => pattern.scale(&name),
                _ => return Err(self.error(".scale expects a \"root:mode\" string")),
            },
            "trans" => {
                let arg = self
                    .parse_args()?
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.error(".trans expects an argument"))?;
                pattern.trans(self.control_pattern(arg)?)
            }
            "fit" => {
                let args = self.parse_args()?;
                if !args.is_empty() {
                    return Err(self.error(".fit takes no arguments"));
                }
                pattern.fit()
            }
            other => {
                let Some(key) = control_key(other) else {
                    return Err(self.error(format!("unknown method \".{}\"", other)));
                };
                let arg = self
                    .parse_args()?
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.error(format!(".{} expects an argument", other)))?;
                pattern.set_control(key, self.control_pattern(arg)?)
            }
        };
        Ok(Value::Pattern(result))
    }
}

/// Canonical control key for a method name, including the aliases.
fn control_key(method: &str) -> Option<&'static str> {
    Some(match method {
        "s" | "sound" => "s",
        "n" => "n",
        "note" => "note",
        "gain" => "gain",
        "velocity" => "velocity",
        "pan" => "pan",
        "speed" => "speed",
        "orbit" => "orbit",
        "attack" => "attack",
        "decay" => "decay",
        "sustain" => "sustain",
        "release" => "release",
        "lpf" => "lpf",
        "hpf" => "hpf",
        "lpq" => "lpq",
        "lpenv" => "lpenv",
        "lpa" => "lpa",
        "lpd" => "lpd",
        "lps" => "lps",
        "lpr" => "lpr",
        "fmi" => "fmi",
        "fmh" => "fmh",
        "fmwave" => "fmwave",
        "detune" => "detune",
        "unison" => "unison",
        "spread" => "spread",
        "delay" => "delay",
        "delaytime" | "delayt" | "dt" => "delaytime",
        "delayfeedback" | "delayfb" | "dfb" => "delayfeedback",
        "delaysync" => "delaysync",
        "duck" | "duckorbit" => "duckorbit",
        "duckdepth" => "duckdepth",
        "duckattack" => "duckattack",
        "duckonset" => "duckonset",
        "unit" => "unit",
        _ => return None,
    })
}
