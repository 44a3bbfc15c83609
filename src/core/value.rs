//! The typed answer union and the "answered" rule.

use serde::{Deserialize, Serialize};

/// Value of one field or cell answer.
///
/// Dates travel as ISO-8601 strings; the engine orders and stores them,
/// it never does calendar arithmetic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    Number(f64),
    Date(String),
    Bool(bool),
    Null,
}

impl AnswerValue {
    /// Whether this value counts toward progress.
    ///
    /// Null never counts; string-typed values must be non-blank after
    /// trimming; numbers and booleans always count.
    pub fn is_answered(&self) -> bool {
        match self {
            AnswerValue::Null => false,
            AnswerValue::Text(s) | AnswerValue::Date(s) => !s.trim().is_empty(),
            AnswerValue::Number(_) | AnswerValue::Bool(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_strings_do_not_count() {
        assert!(!AnswerValue::Null.is_answered());
        assert!(!AnswerValue::Text("".into()).is_answered());
        assert!(!AnswerValue::Text("   ".into()).is_answered());
        assert!(!AnswerValue::Date(" \t".into()).is_answered());
    }

    #[test]
    fn typed_values_count() {
        assert!(AnswerValue::Text("8.2".into()).is_answered());
        assert!(AnswerValue::Number(0.0).is_answered());
        assert!(AnswerValue::Bool(false).is_answered());
        assert!(AnswerValue::Date("2026-08-30".into()).is_answered());
    }

    #[test]
    fn wire_encoding_is_tagged() {
        let v = AnswerValue::Number(4.5);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"kind":"number","value":4.5}"#);

        let back: AnswerValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
