//! Layered configuration for agent-crew.
//!
//! Settings are read from `crew.toml` files and merged in this order, later layers
//! winning key by key:
//!
//! 1. Built-in defaults
//! 2. Global file at `<config dir>/agent-crew/crew.toml`
//! 3. Project file at `.crew/crew.toml` (or the file given with `--config`)
//! 4. Environment (`AGENT_CREW_BASE_URL`, `AGENT_CREW_MODEL`, `AGENT_CREW_MAX_PARALLEL`)
//! 5. CLI flags, applied by the command that owns them
//!
//! # Configuration File Format
//!
//! ```toml
//! [backend]
//! base_url = "https://api.groq.com/openai/v1"
//! api_key_env = "GROQ_API_KEY"
//! default_model = "llama3-70b-8192"
//! request_timeout_secs = 60
//!
//! [defaults]
//! temperature = 0.7
//! max_tokens = 4096
//! retry = { max_attempts = 3, backoff = "exponential", delay = 500 }
//!
//! [execution]
//! max_parallel = 4
//! task_timeout_secs = 120
//! history_limit = 50
//! expose_errors = false
//!
//! [logging]
//! level = "info"
//! format = "text"
//! directory = ".crew/logs"
//! ```

use crate::errors::ConfigError;
use crate::graph::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_API_KEY_ENV: &str = "GROQ_API_KEY";
pub const DEFAULT_MODEL: &str = "llama3-70b-8192";

/// Directory holding project-level state.
pub const CREW_DIR: &str = ".crew";
pub const CONFIG_FILE: &str = "crew.toml";

pub const ENV_BASE_URL: &str = "AGENT_CREW_BASE_URL";
pub const ENV_MODEL: &str = "AGENT_CREW_MODEL";
pub const ENV_MAX_PARALLEL: &str = "AGENT_CREW_MAX_PARALLEL";

/// Language-model backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Model used when an agent names none
    pub default_model: String,
    pub request_timeout_secs: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// Parameter defaults for tasks and agents that set none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsSection {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Retry policy for tasks without their own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
            retry: None,
        }
    }
}

/// Run-level limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Concurrent tasks for `parallel` crews
    pub max_parallel: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_timeout_secs: Option<u64>,
    /// Results kept per workflow in execution history
    pub history_limit: usize,
    /// Show recorded errors to end users
    pub expose_errors: bool,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            task_timeout_secs: None,
            history_limit: 50,
            expose_errors: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: text, json", s),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    pub format: LogFormat,
    /// Also write daily-rolling log files here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            directory: None,
        }
    }
}

/// The complete crew.toml configuration structure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CrewToml {
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

impl CrewToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        toml::Value::Table(read_table(path)?)
            .try_into()
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })
    }

    /// Load `crew.toml` from a crew directory, or defaults if it does not exist.
    pub fn load_or_default(crew_dir: &Path) -> Result<Self, ConfigError> {
        let path = crew_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Merge the given files in order; missing files are skipped.
    pub fn load_layered(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        let mut last = PathBuf::from("<defaults>");
        for path in paths.iter().filter(|p| p.exists()) {
            merge_tables(&mut merged, read_table(path)?);
            last = path.clone();
        }
        toml::Value::Table(merged)
            .try_into()
            .map_err(|source| ConfigError::Parse { path: last, source })
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.backend.base_url = url.trim().to_string();
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            self.backend.default_model = model.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_MAX_PARALLEL) {
            self.execution.max_parallel =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_MAX_PARALLEL.to_string(),
                        message: format!("expected a positive integer, got '{}'", raw),
                    })?;
        }
        Ok(())
    }

    /// Render as pretty TOML.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.backend.base_url.starts_with("http://")
            && !self.backend.base_url.starts_with("https://")
        {
            warnings.push(format!(
                "Invalid backend.base_url '{}': must start with http:// or https://",
                self.backend.base_url
            ));
        }
        if self.backend.api_key_env.trim().is_empty() {
            warnings.push("backend.api_key_env must not be empty".to_string());
        }
        if self.backend.request_timeout_secs == 0 {
            warnings.push("backend.request_timeout_secs must be greater than 0".to_string());
        }
        if !(0.0..=2.0).contains(&self.defaults.temperature) {
            warnings.push(format!(
                "Invalid defaults.temperature {}: should be between 0.0 and 2.0",
                self.defaults.temperature
            ));
        }
        if self.defaults.max_tokens == 0 {
            warnings.push("defaults.max_tokens must be greater than 0".to_string());
        }
        if let Some(retry) = &self.defaults.retry
            && retry.max_attempts == 0
        {
            warnings.push("defaults.retry.max_attempts must be at least 1".to_string());
        }
        if self.execution.max_parallel == 0 {
            warnings.push("execution.max_parallel must be at least 1".to_string());
        }
        if self.execution.task_timeout_secs == Some(0) {
            warnings.push("execution.task_timeout_secs must be greater than 0".to_string());
        }
        if self.execution.history_limit == 0 {
            warnings.push("execution.history_limit must be at least 1".to_string());
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            warnings.push(format!(
                "Invalid logging.level '{}'. Valid values: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }

        warnings
    }
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Deep-merge `overlay` into `base`; nested tables merge, other values replace.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Path of the per-user configuration file, if the platform has a config dir.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("agent-crew").join(CONFIG_FILE))
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct CrewConfig {
    pub project_dir: PathBuf,
    /// The `.crew` directory of the project
    pub crew_dir: PathBuf,
    /// Files that contributed, in merge order
    pub sources: Vec<PathBuf>,
    pub toml: CrewToml,
    pub verbose: bool,
}

impl CrewConfig {
    /// Resolve configuration for `project_dir`.
    ///
    /// `explicit` replaces the project file and must exist.
    pub fn load(project_dir: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let crew_dir = project_dir.join(CREW_DIR);

        let mut candidates: Vec<PathBuf> = global_config_path().into_iter().collect();
        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::Read {
                        path: path.to_path_buf(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "config file does not exist",
                        ),
                    });
                }
                candidates.push(path.to_path_buf());
            }
            None => candidates.push(crew_dir.join(CONFIG_FILE)),
        }

        let mut toml = CrewToml::load_layered(&candidates)?;
        toml.apply_env(|key| std::env::var(key).ok())?;

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            crew_dir,
            sources: candidates.into_iter().filter(|p| p.exists()).collect(),
            toml,
            verbose: false,
        })
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Default directory for file logs.
    pub fn log_dir(&self) -> PathBuf {
        self.toml
            .logging
            .directory
            .clone()
            .unwrap_or_else(|| self.crew_dir.join("logs"))
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Backoff;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = CrewToml::parse("").unwrap();
        assert_eq!(config, CrewToml::default());
        assert_eq!(config.backend.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.execution.max_parallel, 4);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_full() {
        let content = r#"
[backend]
base_url = "http://localhost:8080/v1"
default_model = "local-model"

[defaults]
temperature = 0.2
retry = { max_attempts = 3, backoff = "exponential", delay = 250 }

[execution]
max_parallel = 8
task_timeout_secs = 30
expose_errors = true

[logging]
format = "json"
"#;
        let config = CrewToml::parse(content).unwrap();
        assert_eq!(config.backend.base_url, "http://localhost:8080/v1");
        assert_eq!(config.backend.api_key_env, DEFAULT_API_KEY_ENV);
        assert_eq!(config.defaults.temperature, 0.2);
        assert_eq!(config.defaults.max_tokens, 4096);
        let retry = config.defaults.retry.unwrap();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.backoff, Backoff::Exponential);
        assert_eq!(retry.delay, Duration::from_millis(250));
        assert_eq!(config.execution.max_parallel, 8);
        assert_eq!(config.execution.task_timeout_secs, Some(30));
        assert!(config.execution.expose_errors);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_invalid_toml() {
        let err = CrewToml::parse("[backend\nbase_url = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut config = CrewToml::default();
        config.backend.base_url = "localhost".to_string();
        config.defaults.temperature = 3.5;
        config.execution.max_parallel = 0;
        config.logging.level = "loud".to_string();

        let warnings = config.validate();
        assert_eq!(warnings.len(), 4);
        assert!(warnings[0].contains("base_url"));
        assert!(warnings.iter().any(|w| w.contains("max_parallel")));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let config = CrewToml::load_or_default(dir.path()).unwrap();
        assert_eq!(config, CrewToml::default());
    }

    #[test]
    fn test_layered_merge_keeps_unset_keys() {
        let dir = tempdir().unwrap();
        let global = dir.path().join("global.toml");
        let project = dir.path().join("project.toml");
        std::fs::write(
            &global,
            "[backend]\ndefault_model = \"global-model\"\nrequest_timeout_secs = 10\n",
        )
        .unwrap();
        std::fs::write(&project, "[backend]\ndefault_model = \"project-model\"\n").unwrap();

        let config = CrewToml::load_layered(&[
            global,
            dir.path().join("missing.toml"),
            project,
        ])
        .unwrap();
        assert_eq!(config.backend.default_model, "project-model");
        assert_eq!(config.backend.request_timeout_secs, 10);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_MODEL, "env-model"),
            (ENV_MAX_PARALLEL, "2"),
        ]);
        let mut config = CrewToml::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.backend.default_model, "env-model");
        assert_eq!(config.execution.max_parallel, 2);
        assert_eq!(config.backend.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_env_override_invalid_number() {
        let mut config = CrewToml::default();
        let err = config
            .apply_env(|key| (key == ENV_MAX_PARALLEL).then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_PARALLEL));
    }

    #[test]
    fn test_crew_config_explicit_missing_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = CrewConfig::load(dir.path(), Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_crew_config_project_file_and_log_dir() {
        let dir = tempdir().unwrap();
        let crew_dir = dir.path().join(CREW_DIR);
        std::fs::create_dir_all(&crew_dir).unwrap();
        std::fs::write(
            crew_dir.join(CONFIG_FILE),
            "[execution]\nhistory_limit = 5\n",
        )
        .unwrap();

        let config = CrewConfig::load(dir.path(), None).unwrap();
        assert_eq!(config.toml.execution.history_limit, 5);
        assert_eq!(config.log_dir(), crew_dir.join("logs"));
        assert!(config.sources.contains(&crew_dir.join(CONFIG_FILE)));
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
