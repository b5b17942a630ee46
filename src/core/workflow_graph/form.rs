//! Approval form definitions attached to action nodes.
//!
//! Forms arrive serialized, either as a JSON string or as an inline object, and are
//! frequently hand-edited. Parsing is strict, but callers go through
//! [`FormSpec::parse_lenient`], which turns any malformed definition into "no form" so a
//! broken form never blocks the node it is attached to.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormParseError {
    #[error("form definition is not valid JSON: {0}")]
    Syntax(String),
    #[error("form definition has an unexpected shape: {0}")]
    Shape(String),
    #[error("form definition must be a string or an object")]
    UnsupportedValue,
}

/// Which approval outcome makes the form visible. `False` keeps it hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShowCondition {
    True,
    False,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default, rename = "type")]
    pub field_type: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self {
            label: None,
            placeholder: None,
            field_type: None,
            required: true,
        }
    }
}

fn default_required() -> bool {
    true
}

/// Parsed form: an optional show condition plus the declared fields in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSpec {
    pub show_condition: Option<ShowCondition>,
    pub fields: IndexMap<String, FieldSpec>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawForm {
    #[serde(default)]
    show_condition: Option<String>,
    #[serde(default)]
    fields: Option<RawFields>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFields {
    Keyed(IndexMap<String, FieldSpec>),
    Listed(Vec<NamedField>),
}

#[derive(Deserialize)]
struct NamedField {
    name: String,
    #[serde(flatten)]
    spec: FieldSpec,
}

impl FormSpec {
    /// Strict parse of a serialized form definition.
    pub fn parse(raw: &Value) -> Result<FormSpec, FormParseError> {
        let object = match raw {
            Value::String(text) => serde_json::from_str::<Value>(text)
                .map_err(|err| FormParseError::Syntax(err.to_string()))?,
            Value::Object(_) => raw.clone(),
            _ => return Err(FormParseError::UnsupportedValue),
        };
        let parsed: RawForm = serde_json::from_value(object)
            .map_err(|err| FormParseError::Shape(err.to_string()))?;

        let show_condition = match parsed.show_condition.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(parse_show_condition(value)?),
        };
        let fields = match parsed.fields {
            None => IndexMap::new(),
            Some(RawFields::Keyed(map)) => map,
            Some(RawFields::Listed(list)) => list
                .into_iter()
                .map(|field| (field.name, field.spec))
                .collect(),
        };

        Ok(FormSpec {
            show_condition,
            fields,
        })
    }

    /// Parse, treating a malformed definition as absent.
    pub fn parse_lenient(raw: &Value) -> Option<FormSpec> {
        match Self::parse(raw) {
            Ok(spec) => Some(spec),
            Err(err) => {
                warn!("ignoring malformed approval form: {}", err);
                None
            }
        }
    }

    /// Required fields whose value is missing, blank or still a placeholder.
    pub fn missing_fields(&self, values: &IndexMap<String, String>) -> Vec<String> {
        self.fields
            .iter()
            .filter(|(_, spec)| spec.required)
            .filter(|(name, spec)| {
                values
                    .get(name.as_str())
                    .map_or(true, |value| !is_filled(value, spec))
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}

fn parse_show_condition(value: &str) -> Result<ShowCondition, FormParseError> {
    match value.to_ascii_uppercase().as_str() {
        "TRUE" => Ok(ShowCondition::True),
        "FALSE" => Ok(ShowCondition::False),
        "BOTH" => Ok(ShowCondition::Both),
        other => Err(FormParseError::Shape(format!(
            "unknown showCondition '{}'",
            other
        ))),
    }
}

fn template_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"^\{\{[^{}]*\}\}$").expect("valid template token regex"))
}

fn is_filled(value: &str, spec: &FieldSpec) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return false;
    }
    if spec
        .placeholder
        .as_deref()
        .is_some_and(|placeholder| placeholder.trim() == trimmed)
    {
        return false;
    }
    !template_token().is_match(trimmed)
}
