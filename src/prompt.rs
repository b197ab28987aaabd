//! Prompt variables
//!
//! The app's `user_input_form` declares the variables a new conversation must
//! bind before the first message. The same bindings fill `{{variable}}`
//! placeholders in the opening statement.

use crate::registry::Inputs;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("placeholder pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    String,
    Paragraph,
    Number,
    Select,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptVariable {
    pub key: String,
    pub name: String,
    pub kind: VariableKind,
    pub required: bool,
    pub max_length: Option<u32>,
    pub options: Vec<String>,
}

/// One control of `user_input_form`, e.g. `{"text-input": {...}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInputFormItem {
    #[serde(rename = "text-input", default, skip_serializing_if = "Option::is_none")]
    pub text_input: Option<FormControl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph: Option<FormControl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<FormControl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<FormControl>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormControl {
    pub variable: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub options: Vec<String>,
}

pub fn variables_from_form(form: &[UserInputFormItem]) -> Vec<PromptVariable> {
    form.iter()
        .filter_map(|item| {
            let (kind, control) = if let Some(c) = &item.paragraph {
                (VariableKind::Paragraph, c)
            } else if let Some(c) = &item.text_input {
                (VariableKind::String, c)
            } else if let Some(c) = &item.number {
                (VariableKind::Number, c)
            } else {
                (VariableKind::Select, item.select.as_ref()?)
            };
            Some(PromptVariable {
                key: control.variable.clone(),
                name: control.label.clone(),
                kind,
                required: control.required,
                max_length: match kind {
                    VariableKind::String | VariableKind::Paragraph => control.max_length,
                    VariableKind::Number | VariableKind::Select => None,
                },
                options: if kind == VariableKind::Select {
                    control.options.clone()
                } else {
                    Vec::new()
                },
            })
        })
        .collect()
}

/// Replace `{{key}}` with the bound value. Unbound known variables show
/// their display name; unknown placeholders are left as they are.
pub fn replace_vars(template: &str, variables: &[PromptVariable], inputs: &Inputs) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let key = &caps[1];
            if let Some(value) = inputs.get(key).and_then(value_text) {
                return value;
            }
            match variables.iter().find(|v| v.key == key) {
                Some(variable) => format!("{{{{{}}}}}", variable.name),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Names of required variables without a usable value
pub fn missing_required<'a>(variables: &'a [PromptVariable], inputs: &Inputs) -> Vec<&'a str> {
    variables
        .iter()
        .filter(|v| v.required)
        .filter(|v| {
            inputs
                .get(&v.key)
                .and_then(value_text)
                .is_none_or(|s| s.trim().is_empty())
        })
        .map(|v| v.name.as_str())
        .collect()
}
