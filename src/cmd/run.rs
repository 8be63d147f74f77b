//! Crew execution: `agent-crew run`.

use agent_crew::config::CrewConfig;
use agent_crew::crew::{CrewExecutor, ExecutionResult, RunOptions};
use agent_crew::graph::{CrewPlan, Process, TaskGraph};
use agent_crew::templates;
use agent_crew::ui::{CrewUI, UiMode};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Arguments of `agent-crew run`.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub template: Option<String>,
    pub file: Option<PathBuf>,
    pub input: String,
    pub input_file: Option<PathBuf>,
    pub process: Option<String>,
    pub max_parallel: Option<usize>,
    pub dry_run: bool,
    pub expose_errors: bool,
    pub ui: String,
}

/// Resolve the graph named by `--file` or a template id.
pub fn resolve_graph(args: &RunArgs) -> Result<TaskGraph> {
    let mut graph = match (&args.file, &args.template) {
        (Some(path), _) => templates::load_graph_file(path)
            .with_context(|| format!("Failed to load graph from {}", path.display()))?,
        (None, Some(id)) => templates::template(id)?,
        (None, None) => anyhow::bail!(
            "Specify a template id or --file. Available templates: {}",
            templates::template_ids().join(", ")
        ),
    };
    if let Some(process) = &args.process {
        graph.process = process.parse::<Process>()?;
    }
    Ok(graph)
}

/// Resolve the run input from `--input-file` or `--input`.
pub fn resolve_input(args: &RunArgs) -> Result<String> {
    match &args.input_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path.display())),
        None => Ok(args.input.clone()),
    }
}

pub async fn cmd_run(config: &CrewConfig, args: RunArgs) -> Result<()> {
    let graph = resolve_graph(&args)?;
    let input = resolve_input(&args)?;

    let mut executor = super::build_executor(config, args.dry_run)?;
    let mut settings = executor.settings().clone();
    if let Some(max) = args.max_parallel {
        settings = settings.with_max_parallel(max);
    }
    if args.expose_errors {
        settings = settings.with_expose_errors(true);
    }
    executor = executor.with_settings(settings);

    let plan = executor.plan(&graph, None).context("Invalid task graph")?;
    info!(
        graph = %plan.graph_id(),
        tasks = plan.len(),
        process = %plan.process(),
        "Running crew"
    );

    let mode = UiMode::parse(&args.ui);
    let result = execute(&executor, plan, &input, mode, config.verbose).await?;

    if mode == UiMode::Full {
        println!("{}", result.user_message(executor.settings().expose_errors));
    }
    if !result.success {
        anyhow::bail!(
            "Crew '{}' {}: {}",
            result.graph_id,
            result.state,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// Run a plan in the background, rendering events until it finishes.
///
/// Ctrl-C stops further tasks from being issued.
pub async fn execute(
    executor: &CrewExecutor,
    plan: Arc<CrewPlan>,
    input: &str,
    mode: UiMode,
    verbose: bool,
) -> Result<ExecutionResult> {
    let mut ui = CrewUI::new(plan.graph_name(), plan.len(), mode, verbose);
    let mut handle = executor.spawn_streaming(plan, input, RunOptions::default());

    let cancel = handle.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining tasks");
            cancel.cancel();
        }
    });

    while let Some(event) = handle.next_event().await {
        ui.handle_event(&event);
    }
    interrupt.abort();

    let result = handle.wait().await.context("Crew run aborted")?;
    ui.finish(&result);
    Ok(result)
}
