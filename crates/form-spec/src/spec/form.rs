use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::spec::component::Component;

/// How the form is presented; only used for structural checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Display {
    #[default]
    Form,
    Wizard,
    Pdf,
}

impl Display {
    pub const ALL: [Display; 3] = [Display::Form, Display::Wizard, Display::Pdf];

    pub fn as_str(&self) -> &'static str {
        match self {
            Display::Form => "form",
            Display::Wizard => "wizard",
            Display::Pdf => "pdf",
        }
    }
}

impl fmt::Display for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Display {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Display::ALL
            .into_iter()
            .find(|display| display.as_str() == value)
            .ok_or_else(|| format!("unknown display '{}'", value))
    }
}

/// Top-level form definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormSchema {
    pub name: String,
    pub title: String,
    pub path: String,
    #[serde(default)]
    pub display: Display,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_access: Option<Vec<Value>>,
}

impl FormSchema {
    /// Reads whatever is usable from a raw schema document.
    ///
    /// Malformed top-level fields fall back to defaults and malformed
    /// components are dropped; `schema_check::validate_schema` reports both.
    pub fn from_value(value: &Value) -> Self {
        let text = |field: &str| {
            value
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let array = |field: &str| value.get(field).and_then(Value::as_array).cloned();

        FormSchema {
            name: text("name"),
            title: text("title"),
            path: text("path"),
            display: value
                .get("display")
                .and_then(Value::as_str)
                .and_then(|display| display.parse().ok())
                .unwrap_or_default(),
            tags: array("tags")
                .unwrap_or_default()
                .into_iter()
                .filter_map(|tag| tag.as_str().map(str::to_string))
                .collect(),
            components: parse_components(value.get("components")).components,
            access: array("access"),
            submission_access: array("submissionAccess"),
        }
    }
}

/// Components recovered from a raw `components` array.
#[derive(Debug, Default)]
pub struct ParsedComponents {
    pub components: Vec<Component>,
    /// Index and reason for each element that could not be read.
    pub rejected: Vec<(usize, String)>,
}

/// Deserializes each element of `components` independently so one bad
/// element does not discard its siblings.
pub fn parse_components(value: Option<&Value>) -> ParsedComponents {
    let mut parsed = ParsedComponents::default();
    let Some(items) = value.and_then(Value::as_array) else {
        return parsed;
    };
    for (index, item) in items.iter().enumerate() {
        match Component::deserialize(item) {
            Ok(component) => parsed.components.push(component),
            Err(err) => parsed.rejected.push((index, err.to_string())),
        }
    }
    parsed
}

/// Submitted data for a form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Submission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Submission {
    pub fn new(data: Value) -> Self {
        Self {
            data: Some(data),
            extra: Map::new(),
        }
    }

    /// The `data` object, if the submission carries one.
    pub fn data_object(&self) -> Option<&Value> {
        self.data.as_ref().filter(|data| data.is_object())
    }
}

/// Caller identity, recorded on validation spans only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UserContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl UserContext {
    pub fn anonymous() -> Self {
        Self::default()
    }
}
