//! Configuration system for ragdesk.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/ragdesk/config.toml` and/or `.ragdesk/config.toml`
//! in the workspace directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::payload::{
    Operation, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_TOKENS, DEFAULT_OVERLAP, DEFAULT_TEMPERATURE,
    DEFAULT_TOP_K, TOP_K_MAX, TOP_K_MIN,
};

/// Base URL of the backend API when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/savi-rag-api/api";

/// Top-level configuration for the console.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Directory holding `<name>-formConfig.json` use-case files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_cases_dir: Option<PathBuf>,
    pub api: ApiEndpointConfig,
    pub defaults: FormDefaults,
}

/// Where the backend lives and how to reach each operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEndpointConfig {
    pub base_url: String,
    /// Transport timeout for a single request, in seconds.
    pub timeout_secs: u64,
    pub upload_path: String,
    pub test_path: String,
    pub evaluate_path: String,
}

impl Default for ApiEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 300,
            upload_path: "/upload".to_string(),
            test_path: "/test".to_string(),
            evaluate_path: "/evaluate".to_string(),
        }
    }
}

impl ApiEndpointConfig {
    /// Full URL for an operation's endpoint.
    pub fn endpoint(&self, operation: Operation) -> String {
        let path = match operation {
            Operation::Upload => &self.upload_path,
            Operation::Test => &self.test_path,
            Operation::Evaluate => &self.evaluate_path,
        };
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Initial values for the developer form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormDefaults {
    pub top_k: u32,
    pub temperature: f64,
    pub max_tokens: u32,
    pub chunk_size: u32,
    pub overlap: u32,
}

impl Default for FormDefaults {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ConsoleConfig {
    /// Validate the configuration and return any problems found.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if url::Url::parse(&self.api.base_url).is_err() {
            problems.push(format!(
                "api.base_url '{}' is not a valid URL",
                self.api.base_url
            ));
        }
        if self.api.timeout_secs == 0 {
            problems.push("api.timeout_secs must be greater than 0".to_string());
        }
        for (name, path) in [
            ("upload_path", &self.api.upload_path),
            ("test_path", &self.api.test_path),
            ("evaluate_path", &self.api.evaluate_path),
        ] {
            if !path.starts_with('/') {
                problems.push(format!("api.{name} '{path}' must start with '/'"));
            }
        }

        let d = &self.defaults;
        if !(TOP_K_MIN..=TOP_K_MAX).contains(&d.top_k) {
            problems.push(format!(
                "defaults.top_k ({}) must be between {TOP_K_MIN} and {TOP_K_MAX}",
                d.top_k
            ));
        }
        if !(0.0..=2.0).contains(&d.temperature) {
            problems.push(format!(
                "defaults.temperature ({}) must be between 0.0 and 2.0",
                d.temperature
            ));
        }
        if d.max_tokens == 0 {
            problems.push("defaults.max_tokens must be greater than 0".to_string());
        }
        if d.overlap >= d.chunk_size {
            problems.push(format!(
                "defaults.overlap ({}) must be smaller than defaults.chunk_size ({})",
                d.overlap, d.chunk_size
            ));
        }

        problems
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "ragdesk", "ragdesk")
}

/// Load configuration by merging all layers.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `RAGDESK_`)
/// 3. An explicit config file (`--config`)
/// 4. Workspace-local config (`.ragdesk/config.toml`)
/// 5. User config (`~/.config/ragdesk/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&ConsoleConfig>,
) -> Result<ConsoleConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(ConsoleConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".ragdesk").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(file) = config_file {
        figment = figment.merge(Toml::file(file));
    }

    // RAGDESK_API__BASE_URL, RAGDESK_DEFAULTS__TOP_K, etc.
    figment = figment.merge(Env::prefixed("RAGDESK_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Check whether any ragdesk configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(dirs) = project_dirs() {
        if dirs.config_dir().join("config.toml").exists() {
            return true;
        }
    }

    if let Some(ws) = workspace {
        if ws.join(".ragdesk").join("config.toml").exists() {
            return true;
        }
    }

    false
}

/// Directory for rolling log files.
pub fn log_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConsoleConfig::default();
        assert_eq!(config.api.base_url, "http://localhost:8000/savi-rag-api/api");
        assert_eq!(config.defaults.top_k, 5);
        assert_eq!(config.defaults.max_tokens, 1000);
        assert!(config.use_cases_dir.is_none());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_endpoint_urls() {
        let api = ApiEndpointConfig::default();
        assert_eq!(
            api.endpoint(Operation::Upload),
            "http://localhost:8000/savi-rag-api/api/upload"
        );
        assert_eq!(
            api.endpoint(Operation::Evaluate),
            "http://localhost:8000/savi-rag-api/api/evaluate"
        );

        let api = ApiEndpointConfig {
            base_url: "http://example.test/api/".into(),
            ..Default::default()
        };
        assert_eq!(api.endpoint(Operation::Test), "http://example.test/api/test");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = ConsoleConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: ConsoleConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.api.base_url, config.api.base_url);
        assert_eq!(deserialized.defaults.overlap, config.defaults.overlap);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = ConsoleConfig::default();
        overrides.api.base_url = "http://rag.internal:9000/api".to_string();
        overrides.defaults.top_k = 8;

        let config = load_config(None, None, Some(&overrides)).unwrap();
        assert_eq!(config.api.base_url, "http://rag.internal:9000/api");
        assert_eq!(config.defaults.top_k, 8);
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(".ragdesk");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            r#"
[api]
base_url = "http://staging:8000/savi-rag-api/api"
timeout_secs = 60

[defaults]
temperature = 0.2
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None, None).unwrap();
        assert_eq!(config.api.base_url, "http://staging:8000/savi-rag-api/api");
        assert_eq!(config.api.timeout_secs, 60);
        assert_eq!(config.api.test_path, "/test");
        assert_eq!(config.defaults.temperature, 0.2);
        assert_eq!(config.defaults.top_k, 5);
        assert!(config_exists(Some(dir.path())));
    }

    #[test]
    fn test_load_config_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("custom.toml");
        std::fs::write(&file, "use_cases_dir = \"/srv/usecases\"\n").unwrap();

        let config = load_config(None, Some(&file), None).unwrap();
        assert_eq!(config.use_cases_dir, Some(PathBuf::from("/srv/usecases")));
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut config = ConsoleConfig::default();
        config.api.base_url = "not a url".into();
        config.api.test_path = "test".into();
        config.defaults.top_k = 20;
        config.defaults.temperature = 3.5;
        config.defaults.overlap = 2000;

        let problems = config.validate();
        assert_eq!(problems.len(), 5);
        assert!(problems.iter().any(|p| p.contains("base_url")));
        assert!(problems.iter().any(|p| p.contains("test_path")));
        assert!(problems.iter().any(|p| p.contains("top_k")));
    }
}
