use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Declarative `{show, when, eq}` conditional, optionally with a JSON-logic form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Conditional {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

impl Conditional {
    /// Key the simple conditional depends on, ignoring blank values.
    pub fn when_key(&self) -> Option<&str> {
        self.when.as_deref().filter(|when| !when.trim().is_empty())
    }

    pub fn json_logic(&self) -> Option<&Value> {
        self.json.as_ref().filter(|logic| !logic.is_null())
    }
}

/// Rule parameters attached to a component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateBlock {
    #[serde(default, deserialize_with = "truthy")]
    #[schemars(with = "bool")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_words: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_words: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ValidateBlock {
    pub fn min_length(&self) -> Option<usize> {
        self.min_length.as_ref().and_then(as_count)
    }

    pub fn max_length(&self) -> Option<usize> {
        self.max_length.as_ref().and_then(as_count)
    }

    pub fn min_words(&self) -> Option<usize> {
        self.min_words.as_ref().and_then(as_count)
    }

    pub fn max_words(&self) -> Option<usize> {
        self.max_words.as_ref().and_then(as_count)
    }

    pub fn min(&self) -> Option<f64> {
        self.min.as_ref().and_then(as_number)
    }

    pub fn max(&self) -> Option<f64> {
        self.max.as_ref().and_then(as_number)
    }

    pub fn pattern(&self) -> Option<&str> {
        non_blank(self.pattern.as_deref())
    }

    pub fn custom_script(&self) -> Option<&str> {
        non_blank(self.custom.as_deref())
    }

    pub fn json_logic(&self) -> Option<&Value> {
        self.json.as_ref().filter(|logic| !logic.is_null())
    }

    pub fn custom_message(&self) -> Option<&str> {
        non_blank(self.custom_message.as_deref())
    }
}

/// One column of a `columns` layout component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LayoutCell {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A node of the form-definition tree.
///
/// Only the attributes the engine reads are typed; everything else the form
/// builder stores on a component is kept in `extra` so schemas round-trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "truthy")]
    #[schemars(with = "bool")]
    pub input: bool,
    #[serde(default, deserialize_with = "truthy")]
    #[schemars(with = "bool")]
    pub multiple: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_conditional: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional: Option<Conditional>,
    #[serde(default, deserialize_with = "null_as_default")]
    #[schemars(with = "ValidateBlock")]
    pub validate: ValidateBlock,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    #[schemars(with = "Vec<Component>")]
    pub components: Vec<Component>,
    #[serde(
        default,
        deserialize_with = "layout_columns",
        skip_serializing_if = "Vec::is_empty"
    )]
    #[schemars(with = "Vec<LayoutCell>")]
    pub columns: Vec<LayoutCell>,
    #[serde(
        default,
        deserialize_with = "layout_rows",
        skip_serializing_if = "Vec::is_empty"
    )]
    #[schemars(with = "Vec<Vec<LayoutCell>>")]
    pub rows: Vec<Vec<LayoutCell>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Component {
    /// Key used for data lookup, ignoring blank keys.
    pub fn data_key(&self) -> Option<&str> {
        non_blank(self.key.as_deref())
    }

    /// Human-facing name used in issue messages.
    pub fn display_name(&self) -> &str {
        non_blank(self.label.as_deref())
            .or(self.data_key())
            .unwrap_or(self.kind.as_str())
    }

    pub fn custom_conditional(&self) -> Option<&str> {
        non_blank(self.custom_conditional.as_deref())
    }

    /// Whether this component carries data rules: it has a key and is an input.
    pub fn is_data_bearing(&self) -> bool {
        self.input && self.data_key().is_some()
    }

    /// How the component nests its children's data, if it does.
    pub fn data_nesting(&self) -> Option<DataNesting> {
        self.data_key()?;
        match self.kind.as_str() {
            "datagrid" | "editgrid" => Some(DataNesting::Rows),
            "form" => Some(DataNesting::Subform),
            "container" => Some(DataNesting::Object),
            _ if self.extra.get("tree").and_then(Value::as_bool) == Some(true) => {
                Some(DataNesting::Object)
            }
            _ => None,
        }
    }

    /// Direct children in document order: `components`, then columns, then table cells.
    pub fn children(&self) -> impl Iterator<Item = &Component> {
        self.components
            .iter()
            .chain(self.columns.iter().flat_map(|cell| cell.components.iter()))
            .chain(
                self.rows
                    .iter()
                    .flatten()
                    .flat_map(|cell| cell.components.iter()),
            )
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data_key() {
            Some(key) => write!(f, "{}({})", self.kind, key),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Shape of the data a container component holds for its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataNesting {
    /// `container`: a single nested object.
    Object,
    /// `datagrid` / `editgrid`: an array of row objects.
    Rows,
    /// Nested `form`: `{ data: {...} }`.
    Subform,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}

fn as_count(value: &Value) -> Option<usize> {
    as_number(value)
        .filter(|number| *number >= 0.0 && number.fract() == 0.0)
        .map(|number| number as usize)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(flag) => flag,
        Value::String(text) => text == "true",
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// `columns` and `rows` are overloaded: a textarea stores its height in `rows`.
fn layout_columns<'de, D>(deserializer: D) -> Result<Vec<LayoutCell>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(_) => serde_json::from_value(value).map_err(serde::de::Error::custom),
        _ => Ok(Vec::new()),
    }
}

fn layout_rows<'de, D>(deserializer: D) -> Result<Vec<Vec<LayoutCell>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(ref rows) if rows.iter().all(Value::is_array) => {
            serde_json::from_value(value).map_err(serde::de::Error::custom)
        }
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lenient_fields_accept_form_builder_output() {
        let component: Component = serde_json::from_value(json!({
            "type": "textarea",
            "key": "notes",
            "input": true,
            "rows": 3,
            "validate": { "required": "true", "maxWords": "5", "minLength": "" },
            "conditional": { "show": "", "when": null, "eq": "" },
            "tableView": true
        }))
        .expect("component");

        assert!(component.rows.is_empty());
        assert!(component.validate.required);
        assert_eq!(component.validate.max_words(), Some(5));
        assert_eq!(component.validate.min_length(), None);
        assert_eq!(component.conditional.as_ref().and_then(Conditional::when_key), None);
        assert_eq!(component.extra["tableView"], json!(true));
    }

    #[test]
    fn children_cover_columns_and_table_cells() {
        let component: Component = serde_json::from_value(json!({
            "type": "columns",
            "columns": [
                { "components": [{ "type": "textfield", "key": "a", "input": true }] },
                { "components": [{ "type": "textfield", "key": "b", "input": true }] }
            ]
        }))
        .expect("columns");
        let keys: Vec<_> = component.children().filter_map(Component::data_key).collect();
        assert_eq!(keys, vec!["a", "b"]);

        let table: Component = serde_json::from_value(json!({
            "type": "table",
            "rows": [[{ "components": [{ "type": "number", "key": "n", "input": true }] }]]
        }))
        .expect("table");
        assert_eq!(table.children().count(), 1);
    }

    #[test]
    fn null_validate_block_is_default() {
        let component: Component =
            serde_json::from_value(json!({ "type": "panel", "validate": null, "components": null }))
                .expect("panel");
        assert_eq!(component.validate, ValidateBlock::default());
        assert!(component.components.is_empty());
        assert!(component.data_nesting().is_none());
    }
}
