use serde_json::{Value, json};

use super::{Rule, RowInput, RuleContext};
use crate::spec::Component;

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Non-empty strings held by the row: the value itself, or each string
/// item of a multi-value field.
fn texts<'v>(component: &Component, input: Option<&'v Value>) -> Vec<&'v str> {
    match input {
        Some(Value::String(text)) if !text.is_empty() => vec![text.as_str()],
        Some(Value::Array(items)) if component.multiple => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|text| !text.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// `validate.maxWords`
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxWordsRule;

impl Rule for MaxWordsRule {
    fn name(&self) -> &str {
        "maxWords"
    }

    fn applies(&self, component: &Component) -> bool {
        component.validate.max_words().is_some()
    }

    fn check(&self, cx: &RuleContext<'_>, row: &RowInput<'_>) -> Result<(), String> {
        let Some(limit) = cx.component.validate.max_words() else {
            return Ok(());
        };
        if texts(cx.component, row.input)
            .into_iter()
            .any(|text| word_count(text) > limit)
        {
            return Err(cx.message(self.name(), json!({ "length": limit })));
        }
        Ok(())
    }
}

/// `validate.minWords`
#[derive(Debug, Clone, Copy, Default)]
pub struct MinWordsRule;

impl Rule for MinWordsRule {
    fn name(&self) -> &str {
        "minWords"
    }

    fn applies(&self, component: &Component) -> bool {
        component.validate.min_words().is_some()
    }

    fn check(&self, cx: &RuleContext<'_>, row: &RowInput<'_>) -> Result<(), String> {
        let Some(limit) = cx.component.validate.min_words() else {
            return Ok(());
        };
        if texts(cx.component, row.input)
            .into_iter()
            .any(|text| word_count(text) < limit)
        {
            return Err(cx.message(self.name(), json!({ "length": limit })));
        }
        Ok(())
    }
}
