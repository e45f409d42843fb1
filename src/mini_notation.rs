//! Mini-notation parser: the compact textual DSL for rhythmic patterns.
//!
//! `"bd [hh hh] sd"` and friends are tokenized, parsed into a small AST and
//! lowered onto the pattern combinators. Step semantics:
//!
//! - a sequence of `k` elements divides the cycle into `k` equal steps;
//! - `[ ... ]` groups are one step of the enclosing sequence;
//! - `,` stacks alternatives over the whole cycle;
//! - `< ... >` alternates, one element per cycle;
//! - `a*n` speeds `a` up by `n`; `a!n` repeats `a` as `n` separate steps;
//! - `_` holds the previous step (or, inside `< >`, repeats the previous
//!   alternative); `~` and `-` are rests;
//! - `name:3` selects sample 3 of bank `name`.

use crate::control::{ControlMap, PatternValue};
use crate::pattern::{Fraction, Pattern};

/// Parse failure with the offending fragment and its byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotationError {
    pub message: String,
    pub fragment: String,
    pub position: usize,
}

impl std::fmt::Display for NotationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mini-notation error at {}: {} (near \"{}\")",
            self.position, self.message, self.fragment
        )
    }
}

impl std::error::Error for NotationError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Symbol(String),
    Number(f64),
    Rest,        // ~ or -
    Hold,        // _
    OpenBracket, // [
    CloseBracket,
    OpenAngle, // <
    CloseAngle,
    Comma,
    Star, // *
    Bang, // !
    Colon,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    position: usize,
}

struct Tokenizer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn is_name_char(c: char) -> bool {
        c.is_alphanumeric() || c == '_' || c == '#'
    }

    fn read_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut s = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if pred(c) {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        s
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>, NotationError> {
        let mut tokens = Vec::new();
        while let Some(&(position, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }
            let token = match c {
                '[' => {
                    self.chars.next();
                    Token::OpenBracket
                }
                ']' => {
                    self.chars.next();
                    Token::CloseBracket
                }
                '<' => {
                    self.chars.next();
                    Token::OpenAngle
                }
                '>' => {
                    self.chars.next();
                    Token::CloseAngle
                }
                ',' => {
                    self.chars.next();
                    Token::Comma
                }
                '*' => {
                    self.chars.next();
                    Token::Star
                }
                '!' => {
                    self.chars.next();
                    Token::Bang
                }
                ':' => {
                    self.chars.next();
                    Token::Colon
                }
                '~' => {
                    self.chars.next();
                    Token::Rest
                }
                '-' => {
                    // A dash is a rest unless it starts a negative number.
                    self.chars.next();
                    match self.chars.peek() {
                        Some(&(_, d)) if d.is_ascii_digit() => {
                            let body = self.read_number_body();
                            let text = format!("-{}", body);
                            Token::Number(text.parse().map_err(|_| self.error(
                                position,
                                &text,
                                "malformed number",
                            ))?)
                        }
                        _ => Token::Rest,
                    }
                }
                d if d.is_ascii_digit() => {
                    let start = position;
                    let body = self.read_number_body();
                    // Digits followed by name characters form a symbol
                    // ("808", "909x"); a pure numeric body is a number.
                    if self
                        .chars
                        .peek()
                        .map(|&(_, c)| Self::is_name_char(c))
                        .unwrap_or(false)
                    {
                        let tail = self.read_while(Self::is_name_char);
                        Token::Symbol(format!("{}{}", body, tail))
                    } else if let Ok(n) = body.parse() {
                        Token::Number(n)
                    } else {
                        return Err(self.error(start, &body, "malformed number"));
                    }
                }
                c if Self::is_name_char(c) => {
                    let name = self.read_while(Self::is_name_char);
                    if name == "_" {
                        Token::Hold
                    } else {
                        Token::Symbol(name)
                    }
                }
                other => {
                    return Err(self.error(
                        position,
                        &other.to_string(),
                        "unexpected character",
                    ));
                }
            };
            tokens.push(Spanned { token, position });
        }
        Ok(tokens)
    }

    fn read_number_body(&mut self) -> String {
        let mut s = self.read_while(|c| c.is_ascii_digit());
        if let Some(&(_, '.')) = self.chars.peek() {
            // Only consume the dot when a digit follows.
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if lookahead.peek().map(|&(_, c)| c.is_ascii_digit()) == Some(true) {
                self.chars.next();
                s.push('.');
                s.push_str(&self.read_while(|c| c.is_ascii_digit()));
            }
        }
        s
    }

    fn error(&self, position: usize, fragment: &str, message: &str) -> NotationError {
        NotationError {
            message: message.to_string(),
            fragment: if fragment.is_empty() {
                self.input[position..].chars().take(12).collect()
            } else {
                fragment.to_string()
            },
            position,
        }
    }
}

/// Parsed structure before lowering.
#[derive(Debug, Clone)]
enum Node {
    Atom(PatternValue),
    Rest,
    Hold,
    Sequence(Vec<Node>),
    Stack(Vec<Node>),
    Alternate(Vec<Node>),
    Fast(Box<Node>, Fraction),
    Replicate(Box<Node>, usize),
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Spanned>,
    position: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.position).map(|s| s.token.clone());
        if t.is_some() {
            self.position += 1;
        }
        t
    }

    fn here(&self) -> usize {
        self.tokens
            .get(self.position)
            .or_else(|| self.tokens.last())
            .map(|s| s.position)
            .unwrap_or(self.input.len())
    }

    fn error(&self, message: impl Into<String>) -> NotationError {
        let position = self.here();
        NotationError {
            message: message.into(),
            fragment: self.input[position.min(self.input.len())..]
                .chars()
                .take(12)
                .collect(),
            position,
        }
    }

    /// pattern = sequence ("," sequence)*
    fn parse_pattern(&mut self, closer: Option<&Token>) -> Result<Node, NotationError> {
        let mut alternatives = vec![self.parse_sequence(closer)?];
        while self.peek() == Some(&Token::Comma) {
            self.advance();
            alternatives.push(self.parse_sequence(closer)?);
        }
        if alternatives.len() == 1 {
            Ok(alternatives.pop().unwrap())
        } else {
            Ok(Node::Stack(alternatives))
        }
    }

    fn parse_sequence(&mut self, closer: Option<&Token>) -> Result<Node, NotationError> {
        let mut elements = Vec::new();
        loop {
            match self.peek() {
                None => break,
                Some(t) if Some(t) == closer || t == &Token::Comma => break,
                Some(_) => elements.push(self.parse_element()?),
            }
        }
        if elements.is_empty() {
            return Err(self.error("empty sequence"));
        }
        if elements.len() == 1 {
            Ok(elements.pop().unwrap())
        } else {
            Ok(Node::Sequence(elements))
        }
    }

    fn parse_element(&mut self) -> Result<Node, NotationError> {
        let node = match self.advance().ok_or_else(|| self.error("expected element"))? {
            Token::Symbol(name) => self.finish_atom(name)?,
            Token::Number(n) => Node::Atom(PatternValue::Number(n)),
            Token::Rest => Node::Rest,
            Token::Hold => Node::Hold,
            Token::OpenBracket => {
                let inner = self.parse_pattern(Some(&Token::CloseBracket))?;
                if self.advance() != Some(Token::CloseBracket) {
                    return Err(self.error("unclosed '['"));
                }
                inner
            }
            Token::OpenAngle => {
                let mut elements = Vec::new();
                while self.peek() != Some(&Token::CloseAngle) {
                    if self.peek().is_none() {
                        return Err(self.error("unclosed '<'"));
                    }
                    elements.push(self.parse_element()?);
                }
                self.advance();
                if elements.is_empty() {
                    return Err(self.error("empty '< >'"));
                }
                Node::Alternate(elements)
            }
            other => {
                return Err(self.error(format!("unexpected token {:?}", other)));
            }
        };
        self.parse_modifier(node)
    }

    fn finish_atom(&mut self, name: String) -> Result<Node, NotationError> {
        if self.peek() == Some(&Token::Colon) {
            self.advance();
            let index = match self.advance() {
                Some(Token::Number(n)) if n >= 0.0 && n.fract() == 0.0 => n,
                _ => return Err(self.error("expected sample index after ':'")),
            };
            let mut map = ControlMap::from_entry("s", PatternValue::String(name));
            map.set("n", PatternValue::Number(index));
            Ok(Node::Atom(PatternValue::Map(map)))
        } else {
            Ok(Node::Atom(PatternValue::String(name)))
        }
    }

    fn parse_modifier(&mut self, node: Node) -> Result<Node, NotationError> {
        match self.peek() {
            Some(Token::Star) => {
                self.advance();
                let factor = match self.advance() {
                    Some(Token::Number(n)) if n > 0.0 => Fraction::approximate(n),
                    _ => return Err(self.error("expected positive number after '*'")),
                };
                Ok(Node::Fast(Box::new(node), factor))
            }
            Some(Token::Bang) => {
                self.advance();
                let count = match self.advance() {
                    Some(Token::Number(n)) if n >= 1.0 && n.fract() == 0.0 => n as usize,
                    _ => return Err(self.error("expected whole number after '!'")),
                };
                Ok(Node::Replicate(Box::new(node), count))
            }
            _ => Ok(node),
        }
    }
}

/// Expand replication and resolve holds into explicit weighted steps.
fn sequence_steps(elements: Vec<Node>) -> Result<Vec<(Fraction, Node)>, NotationError> {
    let mut steps: Vec<(Fraction, Node)> = Vec::new();
    for element in elements {
        match element {
            Node::Hold => match steps.last_mut() {
                Some(last) => last.0 = last.0 + Fraction::ONE,
                None => {
                    return Err(NotationError {
                        message: "hold with no preceding element".into(),
                        fragment: "_".into(),
                        position: 0,
                    })
                }
            },
            Node::Replicate(inner, count) => {
                for _ in 0..count {
                    steps.push((Fraction::ONE, (*inner).clone()));
                }
            }
            other => steps.push((Fraction::ONE, other)),
        }
    }
    Ok(steps)
}

/// Resolve `_` inside `< >`: each hold repeats the previous alternative.
fn alternate_elements(elements: Vec<Node>) -> Result<Vec<Node>, NotationError> {
    let mut out: Vec<Node> = Vec::new();
    for element in elements {
        match element {
            Node::Hold => match out.last() {
                Some(prev) => out.push(prev.clone()),
                None => {
                    return Err(NotationError {
                        message: "hold at start of '< >'".into(),
                        fragment: "_".into(),
                        position: 0,
                    })
                }
            },
            Node::Replicate(inner, count) => {
                for _ in 0..count {
                    out.push((*inner).clone());
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn lower(node: Node) -> Result<Pattern<PatternValue>, NotationError> {
    match node {
        Node::Atom(value) => Ok(Pattern::pure(value)),
        Node::Rest => Ok(Pattern::silence()),
        Node::Hold => Err(NotationError {
            message: "hold with no preceding element".into(),
            fragment: "_".into(),
            position: 0,
        }),
        Node::Sequence(elements) => {
            let steps = sequence_steps(elements)?;
            let mut pairs = Vec::with_capacity(steps.len());
            for (weight, step) in steps {
                pairs.push((weight, lower(step)?));
            }
            Ok(Pattern::timecat(pairs))
        }
        Node::Stack(nodes) => {
            let patterns = nodes.into_iter().map(lower).collect::<Result<_, _>>()?;
            Ok(Pattern::stack(patterns))
        }
        Node::Alternate(elements) => {
            let elements = alternate_elements(elements)?;
            let patterns = elements.into_iter().map(lower).collect::<Result<_, _>>()?;
            Ok(Pattern::slowcat(patterns))
        }
        Node::Fast(inner, factor) => Ok(lower(*inner)?.fast(factor)),
        Node::Replicate(inner, count) => {
            // Replication outside a sequence still multiplies the steps.
            let steps = vec![(*inner).clone(); count];
            lower(Node::Sequence(steps))
        }
    }
}

/// Parse mini-notation into a pattern of values.
pub fn parse_mini_notation(input: &str) -> Result<Pattern<PatternValue>, NotationError> {
    let tokens = Tokenizer::new(input).tokenize()?;
    if tokens.is_empty() {
        return Ok(Pattern::silence());
    }
    let mut parser = Parser {
        input,
        tokens,
        position: 0,
    };
    let node = parser.parse_pattern(None)?;
    if parser.peek().is_some() {
        return Err(parser.error("trailing input"));
    }
    lower(node)
}

/// Lenient variant for chained builders: failures log and give silence, so a
/// bad fragment can never take the audio thread down.
pub fn mini(input: &str) -> Pattern<PatternValue> {
    match parse_mini_notation(input) {
        Ok(pattern) => pattern,
        Err(err) => {
            tracing::error!(%err, input, "mini-notation parse failed");
            Pattern::silence()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Fraction, TimeSpan};

    fn f(n: i64, d: i64) -> Fraction {
        Fraction::new(n, d)
    }

    fn cycle(input: &str, n: i64) -> Vec<(String, TimeSpan)> {
        let pattern = parse_mini_notation(input).expect("parse");
        let mut haps = pattern.query_span(f(n, 1), f(n + 1, 1));
        haps.sort_by(|a, b| a.part.begin.cmp(&b.part.begin));
        haps.into_iter()
            .map(|h| (h.value.as_string(), h.whole.unwrap()))
            .collect()
    }

    #[test]
    fn four_step_sequence() {
        let haps = cycle("bd hh sd hh", 0);
        let expected = [
            ("bd", (0, 1, 1, 4)),
            ("hh", (1, 4, 1, 2)),
            ("sd", (1, 2, 3, 4)),
            ("hh", (3, 4, 1, 1)),
        ];
        assert_eq!(haps.len(), 4);
        for ((value, whole), (ev, (bn, bd, en, ed))) in haps.iter().zip(expected) {
            assert_eq!(value, ev);
            assert_eq!(*whole, TimeSpan::new(f(bn, bd), f(en, ed)));
        }
    }

    #[test]
    fn groups_subdivide_their_step() {
        let haps = cycle("bd [hh hh] sd", 0);
        assert_eq!(haps.len(), 4);
        assert_eq!(haps[0].1, TimeSpan::new(f(0, 1), f(1, 3)));
        assert_eq!(haps[1].1, TimeSpan::new(f(1, 3), f(1, 2)));
        assert_eq!(haps[2].1, TimeSpan::new(f(1, 2), f(2, 3)));
        assert_eq!(haps[3].1, TimeSpan::new(f(2, 3), f(1, 1)));
    }

    #[test]
    fn star_speeds_up_an_element() {
        let haps = cycle("bd*2", 0);
        assert_eq!(haps.len(), 2);
        assert_eq!(haps[0].1, TimeSpan::new(f(0, 1), f(1, 2)));
        assert_eq!(haps[1].1, TimeSpan::new(f(1, 2), f(1, 1)));
    }

    #[test]
    fn alternation_under_star_pulls_future_cycles() {
        let haps = cycle("<bd sd hh>*4", 0);
        let values: Vec<&str> = haps.iter().map(|(v, _)| v.as_str()).collect();
        assert_eq!(values, vec!["bd", "sd", "hh", "bd"]);
        for (i, (_, whole)) in haps.iter().enumerate() {
            assert_eq!(whole.duration(), f(1, 4), "hap {}", i);
        }
    }

    #[test]
    fn rests_leave_gaps() {
        let haps = cycle("bd - sd -", 0);
        assert_eq!(haps.len(), 2);
        assert_eq!(haps[0].0, "bd");
        assert_eq!(haps[0].1, TimeSpan::new(f(0, 1), f(1, 4)));
        assert_eq!(haps[1].0, "sd");
        assert_eq!(haps[1].1, TimeSpan::new(f(1, 2), f(3, 4)));
    }

    #[test]
    fn tilde_is_also_a_rest() {
        assert_eq!(cycle("bd ~ sd ~", 0).len(), 2);
    }

    #[test]
    fn hold_extends_the_previous_step() {
        let haps = cycle("bd _ sd hh", 0);
        assert_eq!(haps.len(), 3);
        assert_eq!(haps[0].1, TimeSpan::new(f(0, 1), f(1, 2)));
        assert_eq!(haps[1].1, TimeSpan::new(f(1, 2), f(3, 4)));
    }

    #[test]
    fn hold_in_alternation_repeats_previous() {
        let pattern = parse_mini_notation("<7 _ _ 6>").expect("parse");
        let haps = pattern.query_span(f(0, 1), f(4, 1));
        let values: Vec<String> = haps.iter().map(|h| h.value.as_string()).collect();
        assert_eq!(values, vec!["7", "7", "7", "6"]);
        for (i, hap) in haps.iter().enumerate() {
            let n = i as i64;
            assert_eq!(hap.whole, Some(TimeSpan::new(f(n, 1), f(n + 1, 1))));
        }
    }

    #[test]
    fn replicate_adds_steps() {
        let haps = cycle("bd!3 sd", 0);
        assert_eq!(haps.len(), 4);
        assert_eq!(
            haps.iter().map(|(v, _)| v.as_str()).collect::<Vec<_>>(),
            vec!["bd", "bd", "bd", "sd"]
        );
        assert_eq!(haps[0].1.duration(), f(1, 4));
    }

    #[test]
    fn stack_fills_the_whole_cycle() {
        let pattern = parse_mini_notation("bd sd, hh hh hh").expect("parse");
        let haps = pattern.query_span(f(0, 1), f(1, 1));
        assert_eq!(haps.len(), 5);
    }

    #[test]
    fn colon_atoms_become_control_maps() {
        let pattern = parse_mini_notation("bd:3").expect("parse");
        let haps = pattern.query_span(f(0, 1), f(1, 1));
        let map = haps[0].value.as_map().expect("map value");
        assert_eq!(map.string(&["s"]).as_deref(), Some("bd"));
        assert_eq!(map.number(&["n"]), Some(3.0));
    }

    #[test]
    fn numbers_parse_as_numbers() {
        let pattern = parse_mini_notation("0 2 -1 1.5").expect("parse");
        let haps = pattern.query_span(f(0, 1), f(1, 1));
        let values: Vec<f64> = haps.iter().filter_map(|h| h.value.as_number()).collect();
        assert_eq!(values, vec![0.0, 2.0, -1.0, 1.5]);
    }

    #[test]
    fn numeric_bank_names_stay_symbols() {
        let pattern = parse_mini_notation("808bd").expect("parse");
        let haps = pattern.query_span(f(0, 1), f(1, 1));
        assert_eq!(haps[0].value, PatternValue::String("808bd".into()));
    }

    #[test]
    fn errors_identify_the_fragment() {
        let err = parse_mini_notation("bd [hh sd").unwrap_err();
        assert!(err.message.contains("unclosed"), "{}", err);
        let err = parse_mini_notation("_ bd").unwrap_err();
        assert!(err.message.contains("hold"), "{}", err);
        let err = parse_mini_notation("bd*").unwrap_err();
        assert!(err.message.contains("after '*'"), "{}", err);
    }
}
