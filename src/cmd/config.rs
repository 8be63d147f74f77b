//! Configuration view and validation commands: `agent-crew config`.

use agent_crew::config::{CONFIG_FILE, CrewConfig, CrewToml};
use anyhow::{Context, Result};

use super::super::ConfigCommands;

pub fn cmd_config(config: &CrewConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.crew_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Agent Crew Configuration");
            println!("========================");
            println!();

            if config.sources.is_empty() {
                println!("No crew.toml found; using defaults.");
            } else {
                println!("Loaded from:");
                for source in &config.sources {
                    println!("  {}", source.display());
                }
            }
            println!();
            println!("Effective values (with env overrides):");
            println!();
            print!("{}", config.toml.to_toml_string());
            println!();
            println!("Log directory: {}", config.log_dir().display());
            println!(
                "API key variable: {} ({})",
                config.toml.backend.api_key_env,
                if std::env::var(&config.toml.backend.api_key_env).is_ok() {
                    "set"
                } else {
                    "not set"
                }
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
                println!();
                anyhow::bail!("{} configuration problem(s) found", warnings.len());
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("crew.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&config.crew_dir).with_context(|| {
                format!("Failed to create {}", config.crew_dir.display())
            })?;
            std::fs::write(&config_path, CrewToml::default().to_toml_string())
                .with_context(|| format!("Failed to write {}", config_path.display()))?;

            println!("Created crew.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [backend] base_url, api_key_env, default_model");
            println!("  - [execution] max_parallel, task_timeout_secs, expose_errors");
            println!("  - [logging] level, format, directory");
            println!();
        }
    }

    Ok(())
}
