//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module      | Commands handled      |
//! |-------------|-----------------------|
//! | `run`       | `Run`                 |
//! | `swarm`     | `Swarm`, `Copilot`    |
//! | `templates` | `Templates`, `Validate` |
//! | `config`    | `Config`              |

pub mod config;
pub mod run;
pub mod swarm;
pub mod templates;

pub use config::cmd_config;
pub use run::cmd_run;
pub use swarm::{cmd_copilot, cmd_swarm};
pub use templates::{cmd_templates, cmd_validate};

use agent_crew::config::CrewConfig;
use agent_crew::crew::{CrewExecutor, ExecutorSettings};
use agent_crew::llm::{CompletionBackend, OpenAiCompatibleBackend, ScriptedBackend};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Backend for a command: the configured HTTP endpoint, or a scripted echo for dry runs.
pub fn build_backend(config: &CrewConfig, dry_run: bool) -> Result<Arc<dyn CompletionBackend>> {
    if dry_run {
        tracing::info!("Dry run: using scripted backend");
        return Ok(Arc::new(ScriptedBackend::new()));
    }
    let backend = OpenAiCompatibleBackend::from_settings(&config.toml.backend)
        .context("Failed to create language-model backend")?;
    Ok(Arc::new(backend))
}

/// Executor configured from `crew.toml` and the environment.
pub fn build_executor(config: &CrewConfig, dry_run: bool) -> Result<CrewExecutor> {
    let backend = build_backend(config, dry_run)?;
    Ok(CrewExecutor::new(backend).with_settings(ExecutorSettings::from_toml(&config.toml)))
}
