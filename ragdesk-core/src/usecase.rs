//! Use-case form configurations.
//!
//! A use case declares the fields of a generic form, the response fields to
//! display, and the endpoints it talks to. Four use cases are built in; a
//! configured directory of `<name>-formConfig.json` files takes precedence.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::form::FormField;
use crate::payload::Operation;

pub const GENERIC_USE_CASE: &str = "generic";

const BUILTIN_USE_CASES: &[(&str, &str, &str)] = &[
    (
        "generic",
        "Generic Form",
        include_str!("../usecases/generic-formConfig.json"),
    ),
    (
        "chatbot",
        "Chatbot Assistant",
        include_str!("../usecases/chatbot-formConfig.json"),
    ),
    (
        "document-analysis",
        "Document Analysis",
        include_str!("../usecases/document-analysis-formConfig.json"),
    ),
    (
        "customer-support",
        "Customer Support",
        include_str!("../usecases/customer-support-formConfig.json"),
    ),
];

/// A labelled value to pick out of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseField {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseCaseConfig {
    pub api_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_api_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_api_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_evaluations_api_endpoint: Option<String>,
    #[serde(default)]
    pub form_fields: Vec<FormField>,
    #[serde(default)]
    pub response_fields: Vec<ResponseField>,
}

impl UseCaseConfig {
    /// Endpoint for an operation, falling back to `apiEndpoint`.
    pub fn endpoint_for(&self, operation: Operation) -> &str {
        let specific = match operation {
            Operation::Upload => self.upload_api_endpoint.as_deref(),
            Operation::Test => self.test_api_endpoint.as_deref(),
            Operation::Evaluate => self.run_evaluations_api_endpoint.as_deref(),
        };
        specific.unwrap_or(&self.api_endpoint)
    }
}

/// Looks up use cases by name.
#[derive(Debug, Clone, Default)]
pub struct UseCaseCatalog {
    dir: Option<PathBuf>,
}

impl UseCaseCatalog {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Built-in use cases as `(name, label)` pairs.
    pub fn builtins() -> impl Iterator<Item = (&'static str, &'static str)> {
        BUILTIN_USE_CASES.iter().map(|(name, label, _)| (*name, *label))
    }

    /// Load a use case, preferring the configured directory.
    pub fn load(&self, name: &str) -> Result<UseCaseConfig, ConfigError> {
        if let Some(path) = self.file_for(name).filter(|p| p.exists()) {
            debug!(file = %path.display(), "Loading use case from file");
            let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::ParseError {
                message: format!("{}: {e}", path.display()),
            })?;
            return parse(&text, &path.display().to_string());
        }

        let (_, _, text) = BUILTIN_USE_CASES
            .iter()
            .find(|(n, _, _)| *n == name)
            .ok_or_else(|| ConfigError::UnknownUseCase {
                name: name.to_string(),
            })?;
        parse(text, name)
    }

    /// Load a use case, falling back to the generic one if it is unavailable.
    pub fn load_or_generic(&self, name: &str) -> Result<UseCaseConfig, ConfigError> {
        match self.load(name) {
            Ok(config) => Ok(config),
            Err(e) if name != GENERIC_USE_CASE => {
                warn!(use_case = name, error = %e, "Falling back to generic use case");
                self.load(GENERIC_USE_CASE)
            }
            Err(e) => Err(e),
        }
    }

    fn file_for(&self, name: &str) -> Option<PathBuf> {
        let dir: &Path = self.dir.as_deref()?;
        Some(dir.join(format!("{name}-formConfig.json")))
    }
}

fn parse(text: &str, source: &str) -> Result<UseCaseConfig, ConfigError> {
    serde_json::from_str(text).map_err(|e| ConfigError::ParseError {
        message: format!("{source}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FieldType;

    #[test]
    fn test_builtins_parse() {
        let catalog = UseCaseCatalog::default();
        for (name, _) in UseCaseCatalog::builtins() {
            let config = catalog.load(name).unwrap();
            assert!(!config.form_fields.is_empty(), "{name} has no fields");
            assert!(!config.response_fields.is_empty(), "{name} has no response fields");
        }
        assert_eq!(UseCaseCatalog::builtins().count(), 4);
    }

    #[test]
    fn test_endpoint_fallback() {
        let catalog = UseCaseCatalog::default();
        let generic = catalog.load("generic").unwrap();
        assert!(generic.endpoint_for(Operation::Evaluate).ends_with("/evaluate"));

        let chatbot = catalog.load("chatbot").unwrap();
        assert_eq!(chatbot.endpoint_for(Operation::Test), chatbot.api_endpoint);
        assert_eq!(chatbot.form_fields[1].field_type, FieldType::Select);
    }

    #[test]
    fn test_unknown_use_case() {
        let catalog = UseCaseCatalog::default();
        assert!(matches!(
            catalog.load("nope"),
            Err(ConfigError::UnknownUseCase { .. })
        ));
        let fallback = catalog.load_or_generic("nope").unwrap();
        assert_eq!(fallback, catalog.load(GENERIC_USE_CASE).unwrap());
    }

    #[test]
    fn test_directory_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("chatbot-formConfig.json"),
            r#"{
                "apiEndpoint": "http://bot.local/chat",
                "formFields": [{ "id": "m", "label": "M", "type": "text", "required": true }],
                "responseFields": [{ "id": "response", "label": "Reply" }]
            }"#,
        )
        .unwrap();

        let catalog = UseCaseCatalog::new(Some(dir.path().to_path_buf()));
        let config = catalog.load("chatbot").unwrap();
        assert_eq!(config.api_endpoint, "http://bot.local/chat");
        assert_eq!(config.form_fields.len(), 1);

        let generic = catalog.load("generic").unwrap();
        assert!(generic.upload_api_endpoint.is_some());
    }

    #[test]
    fn test_broken_file_falls_back_to_generic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("chatbot-formConfig.json"), "{ not json").unwrap();

        let catalog = UseCaseCatalog::new(Some(dir.path().to_path_buf()));
        assert!(matches!(
            catalog.load("chatbot"),
            Err(ConfigError::ParseError { .. })
        ));
        let config = catalog.load_or_generic("chatbot").unwrap();
        assert!(config.api_endpoint.ends_with("/query"));
    }
}
