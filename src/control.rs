//! Event payloads: strings, numbers, and ordered control maps.
//!
//! Bare mini-notation atoms stay strings or numbers until the surface layer
//! lifts them into control maps; the scheduler consumes maps with keys drawn
//! from the control vocabulary (`s`, `n`, `gain`, `pan`, `orbit`, ...).
//! Unknown keys ride along untouched.

/// A value carried by a pattern event.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternValue {
    String(String),
    Number(f64),
    Map(ControlMap),
}

impl PatternValue {
    pub fn as_string(&self) -> String {
        match self {
            PatternValue::String(s) => s.clone(),
            PatternValue::Number(n) => format_number(*n),
            PatternValue::Map(m) => m.to_string(),
        }
    }

    /// Numeric view; strings parse leniently, maps have no number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PatternValue::Number(n) => Some(*n),
            PatternValue::String(s) => s.trim().parse().ok(),
            PatternValue::Map(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&ControlMap> {
        match self {
            PatternValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// View any value as a control map: maps pass through, a bare string
    /// becomes `{s: name}`, a bare number `{n: value}`.
    pub fn to_map(&self) -> ControlMap {
        match self {
            PatternValue::Map(m) => m.clone(),
            PatternValue::String(s) => ControlMap::from_entry("s", PatternValue::String(s.clone())),
            PatternValue::Number(n) => ControlMap::from_entry("n", PatternValue::Number(*n)),
        }
    }
}

impl std::fmt::Display for PatternValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// An insertion-ordered mapping from control key to value. Small and linear
/// on purpose; events carry a handful of keys.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControlMap {
    entries: Vec<(String, PatternValue)>,
}

impl ControlMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entry(key: &str, value: PatternValue) -> Self {
        Self {
            entries: vec![(key.to_string(), value)],
        }
    }

    pub fn get(&self, key: &str) -> Option<&PatternValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Insert or replace, keeping the original position on replace.
    pub fn set(&mut self, key: &str, value: PatternValue) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key.to_string(), value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<PatternValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Numeric value under `key`, trying the listed aliases in order.
    pub fn number(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().find_map(|k| self.get(k)?.as_number())
    }

    pub fn string(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.get(k).map(|v| v.as_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PatternValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Display for ControlMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_preserves_insertion_order() {
        let mut m = ControlMap::new();
        m.set("s", PatternValue::String("bd".into()));
        m.set("n", PatternValue::Number(3.0));
        m.set("gain", PatternValue::Number(0.8));
        m.set("s", PatternValue::String("sd".into()));
        let keys: Vec<&str> = m.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["s", "n", "gain"]);
        assert_eq!(m.string(&["s"]).as_deref(), Some("sd"));
    }

    #[test]
    fn number_lookup_follows_alias_order() {
        let mut m = ControlMap::new();
        m.set("delayfb", PatternValue::Number(0.4));
        assert_eq!(m.number(&["delayfeedback", "delayfb", "dfb"]), Some(0.4));
        assert_eq!(m.number(&["delaytime"]), None);
    }

    #[test]
    fn strings_parse_as_numbers_leniently() {
        assert_eq!(PatternValue::String("1.5".into()).as_number(), Some(1.5));
        assert_eq!(PatternValue::String("bd".into()).as_number(), None);
    }

    #[test]
    fn lifting_bare_values_into_maps() {
        let m = PatternValue::String("bd".into()).to_map();
        assert_eq!(m.string(&["s"]).as_deref(), Some("bd"));
        let m = PatternValue::Number(4.0).to_map();
        assert_eq!(m.number(&["n"]), Some(4.0));
    }
}
