//! Generic form fields and the state that accumulates user input.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ValidationError;

/// Input widget kind for a configured form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Number,
    Select,
    Textarea,
    /// Also used for any type name not listed above.
    #[default]
    #[serde(other)]
    Text,
}

/// A field declared by a use-case configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub id: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Allowed values for `select` fields, in display order.
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Empty strings, zero, NaN, and `false` count as unset.
    pub fn is_falsy(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Number(n) => *n == 0.0 || n.is_nan(),
            FieldValue::Bool(b) => !b,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Text(s) => serde_json::Value::String(s.clone()),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Whether the dynamic fields are currently shown.
///
/// Hidden fields are exempt from validation; the developer form hides them
/// while the evaluation sub-mode is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldVisibility {
    Visible,
    Hidden,
}

/// Current values and validation errors for one form instance.
#[derive(Debug, Clone, Default)]
pub struct FormState {
    values: BTreeMap<String, FieldValue>,
    errors: BTreeMap<String, String>,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite one field and clear any error recorded for it.
    pub fn set_field(&mut self, id: impl Into<String>, value: impl Into<FieldValue>) {
        let id = id.into();
        self.errors.remove(&id);
        self.values.insert(id, value.into());
    }

    pub fn get(&self, id: &str) -> Option<&FieldValue> {
        self.values.get(id)
    }

    /// The field's value as text, if it holds text.
    pub fn text(&self, id: &str) -> Option<&str> {
        match self.values.get(id) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Check every visible required field and record the failures.
    ///
    /// Replaces previously recorded errors and returns the new error map.
    pub fn validate(
        &mut self,
        fields: &[FormField],
        visibility: FieldVisibility,
    ) -> &BTreeMap<String, String> {
        self.errors.clear();
        if visibility == FieldVisibility::Visible {
            for field in fields.iter().filter(|f| f.required) {
                let unset = self.values.get(&field.id).is_none_or(FieldValue::is_falsy);
                if unset {
                    self.errors
                        .insert(field.id.clone(), format!("{} is required", field.label));
                }
            }
        }
        &self.errors
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// The first recorded error, in field declaration order.
    pub fn first_error(&self, fields: &[FormField]) -> Option<ValidationError> {
        fields
            .iter()
            .find(|f| self.errors.contains_key(&f.id))
            .map(|f| ValidationError::RequiredField {
                id: f.id.clone(),
                label: f.label.clone(),
            })
    }

    /// Flat JSON object of all values, as posted by the generic form path.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }

    /// Parse a `key=value` assignment from the command line.
    pub fn parse_assignment(input: &str) -> Result<(String, FieldValue), ValidationError> {
        let (key, value) = input
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or_else(|| ValidationError::BadAssignment {
                input: input.to_string(),
            })?;
        let value = match value {
            "true" => FieldValue::Bool(true),
            "false" => FieldValue::Bool(false),
            v => match v.trim().parse::<f64>() {
                Ok(n) if !v.trim().is_empty() && n.is_finite() => FieldValue::Number(n),
                _ => FieldValue::Text(v.to_string()),
            },
        };
        Ok((key.trim().to_string(), value))
    }
}
