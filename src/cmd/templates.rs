//! Template listing and file validation: `agent-crew templates`, `agent-crew validate`.

use agent_crew::crew::CrewScheduler;
use agent_crew::graph::{CrewPlan, GraphBuilder, TaskGraph};
use agent_crew::templates::{self, FileFormat};
use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::sync::Arc;

use super::super::TemplatesCommands;

pub fn cmd_templates(command: Option<TemplatesCommands>) -> Result<()> {
    match command {
        None | Some(TemplatesCommands::List) => {
            println!();
            println!("{}", style("Built-in templates").bold().cyan());
            println!("──────────────────");
            for info in templates::list_templates()? {
                println!(
                    "  {:<26} {} {}",
                    style(&info.id).bold(),
                    info.name,
                    style(format!("({} tasks)", info.task_count)).dim()
                );
                println!("  {:<26} {}", "", style(&info.description).dim());
            }
            println!();
            println!("Run one with: agent-crew run <template> --input \"...\"");
        }
        Some(TemplatesCommands::Show { id, format }) => {
            let graph = templates::template(&id)?;
            let format = parse_format(&format)?;
            print!("{}", templates::render_graph(&graph, format)?);
        }
    }
    Ok(())
}

fn parse_format(format: &str) -> Result<FileFormat> {
    match format.to_lowercase().as_str() {
        "json" => Ok(FileFormat::Json),
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        other => anyhow::bail!("Unknown format '{}'. Valid values: yaml, json, toml", other),
    }
}

pub fn cmd_validate(path: &Path, swarm: bool) -> Result<()> {
    let graph = if swarm {
        templates::load_swarm_file(path)
            .with_context(|| format!("Failed to load workflow from {}", path.display()))?
            .to_task_graph()
    } else {
        templates::load_graph_file(path)
            .with_context(|| format!("Failed to load graph from {}", path.display()))?
    };

    let plan = GraphBuilder::new(&graph)
        .build()
        .with_context(|| format!("{} is not a valid task graph", path.display()))?;

    print_plan_summary(&graph, plan);
    Ok(())
}

fn print_plan_summary(graph: &TaskGraph, plan: CrewPlan) {
    println!(
        "{} {} is valid",
        style("✓").green(),
        style(&graph.id).bold()
    );
    println!("  Process: {}", plan.process());
    println!("  Tasks:   {}", plan.len());
    println!("  Order:   {}", plan.execution_order_ids().join(" → "));
    let roots: Vec<&str> = plan
        .root_tasks()
        .into_iter()
        .filter_map(|i| plan.task(i).map(|t| t.id.as_str()))
        .collect();
    println!("  Roots:   {}", roots.join(", "));
    if let Some(terminal) = plan.terminal_task().and_then(|i| plan.task(i)) {
        println!("  Output:  {}", terminal.id);
    }

    let waves = CrewScheduler::new(Arc::new(plan)).compute_waves();
    println!("  Waves:");
    for (i, wave) in waves.iter().enumerate() {
        println!("    {}. {}", i + 1, wave.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("YAML").unwrap(), FileFormat::Yaml);
        assert_eq!(parse_format("json").unwrap(), FileFormat::Json);
        assert!(parse_format("xml").is_err());
    }
}
