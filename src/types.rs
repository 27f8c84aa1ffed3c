//! Core types for spark-elements.
//!
//! [`Value`] is what flows through the input bus; [`WriteMode`] is how an
//! output element renders it.

use std::fmt;

use tracing::debug;

use crate::dom::{Document, NodeId};

// =============================================================================
// Value
// =============================================================================

/// A coerced input value.
///
/// Equality is strict: `Number(NaN) != Number(NaN)`, so a NaN is always
/// considered a change.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl Value {
    /// Truthiness used by the write modes: `0`, `NaN`, `false` and `""` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
            Value::Text(s) => !s.is_empty(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) if n.is_nan() => f.write_str("NaN"),
            Value::Number(n) if n.is_infinite() => {
                f.write_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            // -0 prints as 0
            Value::Number(n) if *n == 0.0 => f.write_str("0"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Numeric conversion with the loose rules form fields use: surrounding
/// whitespace is ignored, an empty string is `0`, anything unparseable is NaN.
pub fn parse_number(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse().unwrap_or(f64::NAN),
    }
}

// =============================================================================
// WriteMode
// =============================================================================

/// How an output renders a value into its target (the `as` attribute).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    /// `textContent` - replace the text; falsy values clear it.
    TextContent,
    /// `@value` - the `value` property.
    ValueProperty,
    /// `@name` - an attribute; falsy values write an empty string.
    Attribute(String),
    /// `--name` - an inline custom property; falsy values remove it.
    CustomProperty(String),
    /// `.a.b` - classes added when truthy, removed when falsy.
    Classes(Vec<String>),
    /// Anything else renders nothing.
    Unknown(String),
}

impl WriteMode {
    pub fn parse(raw: &str) -> Self {
        if raw == "textContent" {
            WriteMode::TextContent
        } else if raw == "@value" {
            WriteMode::ValueProperty
        } else if let Some(name) = raw.strip_prefix('@') {
            WriteMode::Attribute(name.trim_start_matches('@').to_string())
        } else if raw.starts_with("--") {
            WriteMode::CustomProperty(raw.to_string())
        } else if raw.starts_with('.') {
            WriteMode::Classes(
                raw.split('.')
                    .filter(|class| !class.is_empty())
                    .map(str::to_string)
                    .collect(),
            )
        } else {
            WriteMode::Unknown(raw.to_string())
        }
    }

    /// Render `value` into `target`.
    pub fn apply(&self, doc: &Document, target: NodeId, value: &Value) {
        let truthy = value.is_truthy();
        let text = value.to_string();
        match self {
            WriteMode::TextContent => {
                doc.set_text_content(target, truthy.then_some(text.as_str()));
            }
            // Targets without a value property get the attribute instead.
            WriteMode::ValueProperty if doc.supports_value(target) => {
                doc.set_value(target, &text);
            }
            WriteMode::ValueProperty => {
                doc.set_attribute(target, "value", if truthy { text.as_str() } else { "" });
            }
            WriteMode::Attribute(name) if name.is_empty() => {
                debug!(node = target.index(), "empty attribute name, nothing written");
            }
            WriteMode::Attribute(name) => {
                doc.set_attribute(target, name, if truthy { text.as_str() } else { "" });
            }
            WriteMode::CustomProperty(name) => {
                doc.set_style_property(target, name, if truthy { text.as_str() } else { "" });
            }
            WriteMode::Classes(classes) => {
                for class in classes {
                    doc.class_list_toggle(target, class, truthy);
                }
            }
            WriteMode::Unknown(raw) => {
                debug!(mode = %raw, "unknown write mode, nothing written");
            }
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::TextContent => f.write_str("textContent"),
            WriteMode::ValueProperty => f.write_str("@value"),
            WriteMode::Attribute(name) => write!(f, "@{name}"),
            WriteMode::CustomProperty(name) | WriteMode::Unknown(name) => f.write_str(name),
            WriteMode::Classes(classes) => {
                for class in classes {
                    write!(f, ".{class}")?;
                }
                Ok(())
            }
        }
    }
}
