// Path: crates/execution/src/tally/reveals.rs

//! Extracts the value a filter compares from each reveal.
//!
//! A reveal's payload is base64-encoded JSON. The filter's JSONPath selects the
//! value of interest, which is held as a [`RevealValue`] so that values can be
//! counted and compared with a total order that is identical on every validator.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use std::collections::HashMap;
use tally_types::app::Reveal;

/// A JSON value selected from a reveal, reduced to a hashable, totally ordered key.
///
/// Numbers keep their textual JSON form, so `1` and `1.0` are distinct values.
/// Arrays and objects are compared by their compact JSON encoding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RevealValue {
    /// JSON `null`.
    Null,
    /// A JSON boolean.
    Bool(bool),
    /// A JSON number in its textual form.
    Number(String),
    /// A JSON string.
    Text(String),
    /// An array or object in compact JSON form.
    Composite(String),
}

impl RevealValue {
    /// Converts a JSON value into its comparable form.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.to_string()),
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => Self::Composite(value.to_string()),
        }
    }

    /// The value as an integer, if it is an integral JSON number or a string
    /// holding a decimal integer.
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Self::Number(s) | Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Reveal values index-aligned with the reveals they were parsed from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReveals {
    /// `values[i]` is `None` when the i-th reveal is in error.
    pub values: Vec<Option<RevealValue>>,
    frequencies: HashMap<RevealValue, usize>,
    max_frequency: usize,
}

impl ParsedReveals {
    /// How many reveals carry `value`.
    pub fn frequency(&self, value: &RevealValue) -> usize {
        self.frequencies.get(value).copied().unwrap_or(0)
    }

    /// The frequency of the most common value, or zero if every reveal is in error.
    pub fn max_frequency(&self) -> usize {
        self.max_frequency
    }
}

/// Extracts the value at `json_path` from every reveal.
///
/// `errors` must be index-aligned with `reveals`; entries are set for reveals
/// whose value cannot be extracted and are never cleared.
pub fn parse_reveals(reveals: &[Reveal], json_path: &str, errors: &mut [bool]) -> ParsedReveals {
    let mut parsed = ParsedReveals {
        values: Vec::with_capacity(reveals.len()),
        ..Default::default()
    };
    for (reveal, error) in reveals.iter().zip(errors.iter_mut()) {
        let value = extract_value(reveal, json_path);
        if let Some(v) = &value {
            let count = parsed.frequencies.entry(v.clone()).or_insert(0);
            *count += 1;
            parsed.max_frequency = parsed.max_frequency.max(*count);
        } else {
            *error = true;
        }
        parsed.values.push(value);
    }
    parsed
}

fn extract_value(reveal: &Reveal, json_path: &str) -> Option<RevealValue> {
    if reveal.body.exit_code != 0 {
        return None;
    }
    let bytes = STANDARD.decode(reveal.body.reveal.as_bytes()).ok()?;
    let document: Value = serde_json::from_slice(&bytes).ok()?;
    let matches = jsonpath_lib::select(&document, json_path).ok()?;
    // Several matches are resolved to the smallest compact encoding so that the
    // choice does not depend on traversal order.
    matches
        .into_iter()
        .min_by_key(|v| v.to_string())
        .map(RevealValue::from_json)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tally_types::app::RevealBody;

    pub(crate) fn reveal(executor: &str, json: &str) -> Reveal {
        Reveal {
            executor: executor.to_string(),
            body: RevealBody {
                reveal: STANDARD.encode(json),
                gas_used: 100,
                ..Default::default()
            },
        }
    }

    #[test]
    fn extracts_values_and_frequencies() {
        let reveals = vec![
            reveal("a", r#"{"result":{"text":"A"}}"#),
            reveal("b", r#"{"result":{"text":"B"}}"#),
            reveal("c", r#"{"result":{"text":"A"}}"#),
        ];
        let mut errors = vec![false; 3];
        let parsed = parse_reveals(&reveals, "$.result.text", &mut errors);
        assert_eq!(errors, vec![false; 3]);
        assert_eq!(parsed.max_frequency(), 2);
        assert_eq!(parsed.frequency(&RevealValue::Text("A".into())), 2);
        assert_eq!(parsed.values[1], Some(RevealValue::Text("B".into())));
    }

    #[test]
    fn failures_mark_errors() {
        let mut failed = reveal("a", r#"{"x":1}"#);
        failed.body.exit_code = 1;
        let mut bad_b64 = reveal("b", "{}");
        bad_b64.body.reveal = "***".into();
        let reveals = vec![
            failed,
            bad_b64,
            reveal("c", "not json"),
            reveal("d", r#"{"y":1}"#),
            reveal("e", r#"{"x":1}"#),
        ];
        let mut errors = vec![false; 5];
        let parsed = parse_reveals(&reveals, "$.x", &mut errors);
        assert_eq!(errors, vec![true, true, true, true, false]);
        assert_eq!(parsed.values[4], Some(RevealValue::Number("1".into())));
        assert_eq!(parsed.max_frequency(), 1);
    }

    #[test]
    fn invalid_path_marks_every_reveal() {
        let reveals = vec![reveal("a", r#"{"x":1}"#)];
        let mut errors = vec![false];
        let parsed = parse_reveals(&reveals, "!!", &mut errors);
        assert_eq!(errors, vec![true]);
        assert_eq!(parsed.max_frequency(), 0);
    }

    #[test]
    fn multiple_matches_take_smallest_encoding() {
        let reveals = vec![reveal("a", r#"{"xs":[3, 1, 2]}"#)];
        let mut errors = vec![false];
        let parsed = parse_reveals(&reveals, "$.xs[*]", &mut errors);
        assert_eq!(parsed.values[0], Some(RevealValue::Number("1".into())));
    }

    #[test]
    fn integer_conversion() {
        assert_eq!(RevealValue::Number("-42".into()).as_integer(), Some(-42));
        assert_eq!(RevealValue::Text("+5".into()).as_integer(), Some(5));
        assert_eq!(RevealValue::Text("18446744073709551615".into()).as_integer(), Some(u64::MAX as i128));
        assert_eq!(RevealValue::Number("1.5".into()).as_integer(), None);
        assert_eq!(RevealValue::Bool(true).as_integer(), None);
    }
}
