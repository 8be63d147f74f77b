use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "agent-crew")]
#[command(version, about = "Run crews of LLM agents over task dependency graphs")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Config file to use instead of .crew/crew.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a built-in template or a graph file
    Run {
        /// Template id (see `agent-crew templates`)
        template: Option<String>,

        /// Graph file (.json, .yaml, .yml or .toml)
        #[arg(short, long, conflicts_with = "template")]
        file: Option<PathBuf>,

        /// Input handed to the root tasks
        #[arg(short, long, default_value = "")]
        input: String,

        /// Read the input from a file instead
        #[arg(long, conflicts_with = "input")]
        input_file: Option<PathBuf>,

        /// Override the graph's process: sequential, parallel, hierarchical
        #[arg(long)]
        process: Option<String>,

        /// Maximum concurrent tasks for parallel graphs
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Use a scripted backend instead of calling a model
        #[arg(long)]
        dry_run: bool,

        /// Include the recorded error in failure messages
        #[arg(long)]
        expose_errors: bool,

        /// UI output mode: full, minimal, json
        #[arg(long, default_value = "full")]
        ui: String,
    },
    /// Run a swarm workflow file, or answer a single message
    Swarm {
        /// Workflow file (.json, .yaml, .yml or .toml)
        file: Option<PathBuf>,

        /// Answer one message with the general assistant
        #[arg(short, long, conflicts_with = "file")]
        message: Option<String>,

        /// Input handed to the first step
        #[arg(short, long, default_value = "")]
        input: String,

        /// JSON object describing where the user is (module, user, task)
        #[arg(long, requires = "message")]
        context: Option<String>,

        #[arg(long)]
        dry_run: bool,

        /// UI output mode: full, minimal, json
        #[arg(long, default_value = "full")]
        ui: String,
    },
    /// Send one message to a copilot
    Copilot {
        message: String,

        /// Copilot id: ui-copilot, developer-copilot, analyst-copilot
        #[arg(short, long)]
        copilot: Option<String>,

        /// Current view reported in the UI context
        #[arg(long)]
        view: Option<String>,

        #[arg(long)]
        dry_run: bool,

        /// Print the reply as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a graph or swarm workflow file without running it
    Validate {
        file: PathBuf,

        /// Treat the file as a swarm workflow
        #[arg(long)]
        swarm: bool,
    },
    /// List or show built-in templates
    Templates {
        #[command(subcommand)]
        command: Option<TemplatesCommands>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum TemplatesCommands {
    /// List built-in templates
    List,
    /// Print a template's definition
    Show {
        id: String,
        /// Output format: yaml, json, toml
        #[arg(long, default_value = "yaml")]
        format: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default crew.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = agent_crew::config::CrewConfig::load(&project_dir, cli.config.as_deref())
        .context("Failed to load configuration")?
        .with_verbose(cli.verbose);
    let _log_guard = agent_crew::logging::init_logging(&config.toml.logging, cli.verbose);

    match &cli.command {
        Commands::Run {
            template,
            file,
            input,
            input_file,
            process,
            max_parallel,
            dry_run,
            expose_errors,
            ui,
        } => {
            let args = cmd::run::RunArgs {
                template: template.clone(),
                file: file.clone(),
                input: input.clone(),
                input_file: input_file.clone(),
                process: process.clone(),
                max_parallel: *max_parallel,
                dry_run: *dry_run,
                expose_errors: *expose_errors,
                ui: ui.clone(),
            };
            cmd::cmd_run(&config, args).await?;
        }
        Commands::Swarm {
            file,
            message,
            input,
            context,
            dry_run,
            ui,
        } => {
            cmd::cmd_swarm(
                &config,
                file.as_deref(),
                message.as_deref(),
                input,
                context.as_deref(),
                *dry_run,
                ui,
            )
            .await?;
        }
        Commands::Copilot {
            message,
            copilot,
            view,
            dry_run,
            json,
        } => {
            cmd::cmd_copilot(
                &config,
                message,
                copilot.as_deref(),
                view.as_deref(),
                *dry_run,
                *json,
            )
            .await?;
        }
        Commands::Validate { file, swarm } => cmd::cmd_validate(file, *swarm)?,
        Commands::Templates { command } => cmd::cmd_templates(command.clone())?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
