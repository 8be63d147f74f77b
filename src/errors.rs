//! Typed error hierarchy for the crew orchestrator.
//!
//! Top-level enums per subsystem:
//! - `ConfigurationError`: malformed graphs, raised before any backend call
//! - `BackendError`: language-model call failures, retryable per task policy
//! - `TaskError`: per-task failures recorded into `TaskResult`, never thrown across tasks
//! - `SwarmError` / `CopilotError` / `TemplateError` / `ConfigError`: adapter, template and config failures

use thiserror::Error;

/// Errors raised while validating a task graph or registering definitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("{kind} id must not be empty")]
    EmptyId { kind: &'static str },

    #[error("Graph '{graph}' has no tasks")]
    EmptyGraph { graph: String },

    #[error("Duplicate task id '{task}'")]
    DuplicateTask { task: String },

    #[error("Duplicate agent id '{agent}'")]
    DuplicateAgent { agent: String },

    #[error("Task '{task}' references unknown agent '{agent}'")]
    UnknownAgent { task: String, agent: String },

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Task '{task}' depends on itself")]
    SelfDependency { task: String },

    #[error("Cycle detected in task dependencies: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Task '{task}' has an invalid retry policy: {message}")]
    InvalidRetry { task: String, message: String },
}

impl ConfigurationError {
    /// The task id the error is about, when there is one.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::DuplicateTask { task }
            | Self::UnknownAgent { task, .. }
            | Self::UnknownDependency { task, .. }
            | Self::SelfDependency { task }
            | Self::InvalidRetry { task, .. } => Some(task),
            Self::Cycle { path } => path.first().map(String::as_str),
            _ => None,
        }
    }
}

/// Errors from the language-model backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Request failed: {0}")]
    Http(String),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Backend call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("API key not set (expected environment variable {var})")]
    MissingApiKey { var: String },

    #[error("{0}")]
    Scripted(String),
}

impl BackendError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout { .. } | Self::Scripted(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::MalformedResponse(_) | Self::MissingApiKey { .. } => false,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout { secs: 0 }
        } else if err.is_decode() {
            BackendError::MalformedResponse(err.to_string())
        } else {
            BackendError::Http(err.to_string())
        }
    }
}

/// Errors recorded against a single task of a run.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("upstream task {task_id} failed")]
    UpstreamFailure { task_id: String },

    #[error("stream interrupted: {0}")]
    StreamingTransport(String),

    #[error("run cancelled")]
    Cancelled,
}

/// Errors from running registered swarm workflows.
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("Swarm workflow '{name}' not found")]
    NotFound { name: String },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Errors from the copilot adapter.
#[derive(Debug, Error)]
pub enum CopilotError {
    #[error("Copilot '{id}' not found")]
    NotFound { id: String },

    #[error("No active copilot")]
    NoActiveCopilot,

    #[error("Copilot '{id}' is not permitted to execute UI actions")]
    ActionNotPermitted { id: String },

    #[error("Copilot '{id}' does not declare action '{action}'")]
    UnknownAction { id: String, action: String },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Errors from template lookup and graph file loading.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template '{0}' not found")]
    NotFound(String),

    #[error("Failed to read graph file {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse graph file {path}: {message}")]
    Parse {
        path: std::path::PathBuf,
        message: String,
    },

    #[error("Unsupported graph file extension '{0}' (expected json, yaml, yml or toml)")]
    UnsupportedFormat(String),
}

/// Errors from loading `crew.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
