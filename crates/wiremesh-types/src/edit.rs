//! Field-edit payloads sent by editors before they are committed.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::EnabledValue;

/// A scalar carried inside a toggle: text from a form field, or a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// A number, e.g. an MTU typed into a numeric input.
    Number(i64),
    /// Free text.
    Text(String),
}

impl Scalar {
    /// The text, if this is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    /// The value as an integer; text is parsed after trimming.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<u16> for Scalar {
    fn from(n: u16) -> Self {
        Self::Number(n.into())
    }
}

/// The value of one edited field.
///
/// Deserialization goes by shape: a JSON string is [`FieldValue::Text`], an
/// object with `enabled`/`value` is [`FieldValue::Toggle`], any other object
/// of toggles is [`FieldValue::Scripts`], and anything else lands in
/// [`FieldValue::Other`] so validation can reject it instead of the decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A plain string field (name, address, endpoint, ...).
    Text(String),
    /// An optional override.
    Toggle(EnabledValue<Scalar>),
    /// The composite script hooks, keyed by hook name.
    Scripts(BTreeMap<String, EnabledValue<Scalar>>),
    /// A payload of no recognised shape.
    Other(serde_json::Value),
}

impl FieldValue {
    /// A text payload.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// A toggle payload.
    pub fn toggle(enabled: bool, value: impl Into<Scalar>) -> Self {
        Self::Toggle(EnabledValue { enabled, value: value.into() })
    }

    /// Short description of the payload shape, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Toggle(_) => "toggle",
            Self::Scripts(_) => "scripts",
            Self::Other(_) => "other",
        }
    }
}

impl From<&crate::Scripts> for FieldValue {
    fn from(scripts: &crate::Scripts) -> Self {
        Self::Scripts(
            scripts
                .entries()
                .into_iter()
                .map(|(key, hook)| {
                    let value = EnabledValue {
                        enabled: hook.enabled,
                        value: Scalar::Text(hook.value.clone()),
                    };
                    (key.to_string(), value)
                })
                .collect(),
        )
    }
}
