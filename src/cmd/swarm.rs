//! Swarm workflows and copilots: `agent-crew swarm`, `agent-crew copilot`.

use agent_crew::adapters::{ActionKind, CopilotReply, CopilotSession, SwarmRunner};
use agent_crew::config::CrewConfig;
use agent_crew::crew::RunOptions;
use agent_crew::history::ExecutionHistory;
use agent_crew::stream::CancelHandle;
use agent_crew::templates;
use agent_crew::ui::{CrewUI, UiMode};
use anyhow::{Context, Result};
use console::style;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::warn;

pub async fn cmd_swarm(
    config: &CrewConfig,
    file: Option<&Path>,
    message: Option<&str>,
    input: &str,
    context: Option<&str>,
    dry_run: bool,
    ui: &str,
) -> Result<()> {
    let executor = super::build_executor(config, dry_run)?;
    let expose = executor.settings().expose_errors;
    let mut runner = SwarmRunner::new(
        executor,
        ExecutionHistory::new(config.toml.execution.history_limit),
    );

    if let Some(message) = message {
        let context = parse_context(context)?;
        let reply = runner
            .respond(message, &context, RunOptions::default())
            .await
            .context("Failed to answer message")?;
        println!("{}", reply);
        return Ok(());
    }

    let Some(path) = file else {
        anyhow::bail!("Specify a workflow file or --message");
    };
    let workflow = templates::load_swarm_file(path)
        .with_context(|| format!("Failed to load workflow from {}", path.display()))?;
    let name = workflow.name.clone();
    let steps = workflow.steps.len();
    runner
        .register_workflow(workflow)
        .context("Invalid swarm workflow")?;

    let mode = UiMode::parse(ui);
    let mut crew_ui = CrewUI::new(&name, steps, mode, config.verbose);

    let cancel = CancelHandle::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling remaining steps");
                cancel.cancel();
            }
        })
    };

    let result = runner
        .run_named_streaming(
            &name,
            input,
            RunOptions::default().with_cancel(cancel),
            |event| crew_ui.handle_event(&event),
        )
        .await
        .context("Invalid swarm workflow")?;
    interrupt.abort();
    crew_ui.finish(&result);

    if mode == UiMode::Full {
        println!("{}", result.user_message(expose));
    }
    if !result.success {
        anyhow::bail!(
            "Workflow '{}' {}: {}",
            name,
            result.state,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn parse_context(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str(raw).context("--context must be valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("--context must be a JSON object"),
    }
}

pub async fn cmd_copilot(
    config: &CrewConfig,
    message: &str,
    copilot: Option<&str>,
    view: Option<&str>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let executor = super::build_executor(config, dry_run)?;
    let mut session = CopilotSession::new(executor);

    if let Some(id) = copilot {
        session.set_active(id)?;
    }
    if let Some(view) = view {
        session.update_ui_context(|ctx| ctx.current_view = view.to_string());
    }

    let reply = session.send_message(message).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reply).context("Failed to serialize reply")?
        );
    } else {
        print_reply(&reply);
    }
    Ok(())
}

fn print_reply(reply: &CopilotReply) {
    println!("{}", reply.text);
    if reply.actions.is_empty() {
        return;
    }
    println!();
    println!("{}", style("Suggested actions").bold().cyan());
    for action in &reply.actions {
        let kind = match action.kind {
            ActionKind::Ui => "ui",
            ActionKind::Tool => "tool",
            ActionKind::Suggestion => "suggestion",
        };
        let marker = if action.bound || action.kind == ActionKind::Suggestion {
            style("•").green()
        } else {
            style("?").yellow()
        };
        println!(
            "  {} [{}] {} {}",
            marker,
            kind,
            style(&action.name).bold(),
            style(&action.description).dim()
        );
    }
}
