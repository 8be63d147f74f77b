//! Built-in crew templates and graph file loading.
//!
//! Templates are YAML documents compiled into the binary and parsed with the same
//! loader used for user files, so a template can be dumped, edited and run from a
//! file without changing shape.

use crate::adapters::swarm::SwarmWorkflow;
use crate::errors::TemplateError;
use crate::graph::TaskGraph;
use crate::registry::CrewRegistry;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

/// Serialization formats accepted for graph and workflow files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Yaml,
    Toml,
}

impl FileFormat {
    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, TemplateError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(FileFormat::Json),
            "yaml" | "yml" => Ok(FileFormat::Yaml),
            "toml" => Ok(FileFormat::Toml),
            _ => Err(TemplateError::UnsupportedFormat(ext)),
        }
    }
}

const TEMPLATES: &[(&str, &str)] = &[
    (
        "content-creation",
        include_str!("../templates/content-creation.yaml"),
    ),
    ("data-analysis", include_str!("../templates/data-analysis.yaml")),
    (
        "problem-solving",
        include_str!("../templates/problem-solving.yaml"),
    ),
    ("lead-scoring", include_str!("../templates/lead-scoring.yaml")),
    (
        "document-analysis",
        include_str!("../templates/document-analysis.yaml"),
    ),
    (
        "competitive-intelligence",
        include_str!("../templates/competitive-intelligence.yaml"),
    ),
    (
        "qa-ticket-review",
        include_str!("../templates/qa-ticket-review.yaml"),
    ),
    (
        "financial-compliance",
        include_str!("../templates/financial-compliance.yaml"),
    ),
];

/// Summary row for listing templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub task_count: usize,
}

/// Ids of every built-in template, in listing order.
pub fn template_ids() -> Vec<&'static str> {
    TEMPLATES.iter().map(|(id, _)| *id).collect()
}

/// Load a built-in template by id.
pub fn template(id: &str) -> Result<TaskGraph, TemplateError> {
    let (_, source) = TEMPLATES
        .iter()
        .find(|(template_id, _)| *template_id == id)
        .ok_or_else(|| TemplateError::NotFound(id.to_string()))?;
    parse_str(source, FileFormat::Yaml, Path::new(id))
}

/// Describe every built-in template.
pub fn list_templates() -> Result<Vec<TemplateInfo>, TemplateError> {
    TEMPLATES
        .iter()
        .map(|(id, _)| {
            let graph = template(id)?;
            Ok(TemplateInfo {
                id: graph.id,
                name: graph.name,
                description: graph.description,
                task_count: graph.tasks.len(),
            })
        })
        .collect()
}

/// Add every built-in template to a crew registry, replacing same-id entries.
pub fn register_templates(registry: &mut CrewRegistry) -> Result<usize, TemplateError> {
    let mut count = 0;
    for id in template_ids() {
        let graph = template(id)?;
        registry
            .register(graph)
            .map_err(|e| TemplateError::Parse {
                path: id.into(),
                message: e.to_string(),
            })?;
        count += 1;
    }
    debug!(count, "Registered built-in templates");
    Ok(count)
}

/// Load a task graph from a `.json`, `.yaml`/`.yml` or `.toml` file.
///
/// The graph is not validated; pass it through `GraphBuilder` before running.
pub fn load_graph_file(path: &Path) -> Result<TaskGraph, TemplateError> {
    load_file(path)
}

/// Load a swarm workflow from a `.json`, `.yaml`/`.yml` or `.toml` file.
pub fn load_swarm_file(path: &Path) -> Result<SwarmWorkflow, TemplateError> {
    load_file(path)
}

/// Render a graph in the given format, e.g. to dump a template for editing.
pub fn render_graph(graph: &TaskGraph, format: FileFormat) -> Result<String, TemplateError> {
    let rendered = match format {
        FileFormat::Json => serde_json::to_string_pretty(graph).map_err(|e| e.to_string()),
        FileFormat::Yaml => serde_yaml::to_string(graph).map_err(|e| e.to_string()),
        FileFormat::Toml => toml::to_string_pretty(graph).map_err(|e| e.to_string()),
    };
    rendered.map_err(|message| TemplateError::Parse {
        path: graph.id.clone().into(),
        message,
    })
}

fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T, TemplateError> {
    let format = FileFormat::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|source| TemplateError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), ?format, "Loading definition file");
    parse_str(&content, format, path)
}

fn parse_str<T: DeserializeOwned>(
    content: &str,
    format: FileFormat,
    path: &Path,
) -> Result<T, TemplateError> {
    let parsed = match format {
        FileFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        FileFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        FileFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| TemplateError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, Process};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_every_template_builds() {
        for id in template_ids() {
            let graph = template(id).unwrap();
            assert_eq!(graph.id, id);
            assert_eq!(graph.process, Process::Sequential);
            let plan = GraphBuilder::new(&graph).build().unwrap();
            assert_eq!(plan.len(), 3, "template {id}");
            assert!(plan.terminal_task().is_some(), "template {id}");
        }
    }

    #[test]
    fn test_template_fan_in() {
        let graph = template("document-analysis").unwrap();
        let summary = graph.task("write-summary").unwrap();
        assert_eq!(
            summary.dependencies,
            vec!["extract-information", "analyze-legal"]
        );
        let plan = GraphBuilder::new(&graph).build().unwrap();
        assert_eq!(
            plan.execution_order_ids(),
            vec!["extract-information", "analyze-legal", "write-summary"]
        );
    }

    #[test]
    fn test_unknown_template() {
        let err = template("nope").unwrap_err();
        assert!(matches!(err, TemplateError::NotFound(ref id) if id == "nope"));
    }

    #[test]
    fn test_list_and_register() {
        let infos = list_templates().unwrap();
        assert_eq!(infos.len(), 8);
        assert_eq!(infos[3].id, "lead-scoring");
        assert_eq!(infos[3].task_count, 3);

        let mut registry = CrewRegistry::new();
        assert_eq!(register_templates(&mut registry).unwrap(), 8);
        assert!(registry.contains("qa-ticket-review"));
    }

    #[test]
    fn test_load_json_graph() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        write!(
            file,
            r#"{{
                "id": "blog",
                "name": "Blog",
                "process": "parallel",
                "agents": [{{"id": "writer", "name": "Writer", "systemPrompt": "Write."}}],
                "tasks": [
                    {{"id": "a", "description": "Draft", "agentId": "writer"}},
                    {{"id": "b", "description": "Edit", "agentId": "writer", "dependencies": ["a"]}}
                ]
            }}"#
        )
        .unwrap();

        let graph = load_graph_file(file.path()).unwrap();
        assert_eq!(graph.process, Process::Parallel);
        assert_eq!(graph.agents[0].system_prompt, "Write.");
        assert_eq!(graph.tasks[1].dependencies, vec!["a"]);
    }

    #[test]
    fn test_load_toml_graph() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(
            file,
            r#"
id = "review"
name = "Review"

[[agents]]
id = "critic"
system_prompt = "Critique."

[[tasks]]
id = "critique"
description = "Critique the draft"
agent_id = "critic"
temperature = 0.2
"#
        )
        .unwrap();

        let graph = load_graph_file(file.path()).unwrap();
        assert_eq!(graph.tasks[0].temperature, Some(0.2));
        assert_eq!(graph.process, Process::Sequential);
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let file = NamedTempFile::with_suffix(".ini").unwrap();
        let err = load_graph_file(file.path()).unwrap_err();
        assert!(matches!(err, TemplateError::UnsupportedFormat(ref ext) if ext == "ini"));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(file, "id: [unclosed").unwrap();
        let err = load_graph_file(file.path()).unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = load_graph_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, TemplateError::Read { .. }));
    }

    #[test]
    fn test_render_round_trips_through_yaml() {
        let graph = template("lead-scoring").unwrap();
        let yaml = render_graph(&graph, FileFormat::Yaml).unwrap();
        let parsed: TaskGraph = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, graph);
    }

    #[test]
    fn test_load_swarm_yaml() {
        let mut file = NamedTempFile::with_suffix(".yml").unwrap();
        write!(
            file,
            r#"
name: triage
process: parallel
steps:
  - agent:
      name: Classifier
      instructions: Classify the ticket.
    input: Classify it
  - agent:
      name: Router
      instructions: Route the ticket.
    input: Route it
"#
        )
        .unwrap();

        let workflow = load_swarm_file(file.path()).unwrap();
        assert_eq!(workflow.name, "triage");
        assert_eq!(workflow.steps.len(), 2);
    }
}
