//! Effective input construction.
//!
//! Downstream tasks consume upstream results by text concatenation: the task's
//! description, then the run input (root tasks only), then one labeled section per
//! dependency output, then the expected-output hint and any context data.

use crate::graph::{CrewPlan, TaskIndex};

/// Build the user turn sent to the backend for a task.
///
/// `outputs` holds the output of every succeeded task by index. Dependencies are
/// guaranteed to have succeeded before a task is issued.
pub fn build_effective_input(
    plan: &CrewPlan,
    index: TaskIndex,
    initial_input: &str,
    outputs: &[Option<String>],
) -> String {
    let Some(task) = plan.task(index) else {
        return String::new();
    };

    let mut sections = vec![task.description.trim().to_string()];

    let dependencies = plan.dependencies(index);
    if dependencies.is_empty() && !initial_input.trim().is_empty() {
        sections.push(format!("Input:\n{}", initial_input.trim()));
    }

    for &dep in dependencies {
        let Some(dep_task) = plan.task(dep) else {
            continue;
        };
        let output = outputs
            .get(dep)
            .and_then(|o| o.as_deref())
            .unwrap_or_default();
        sections.push(format!("### {}\n{}", dep_task.label().trim(), output.trim()));
    }

    if let Some(expected) = &task.expected_output
        && !expected.trim().is_empty()
    {
        sections.push(format!("Expected output: {}", expected.trim()));
    }

    if !task.context.is_empty() {
        let context = serde_json::to_string_pretty(&task.context).unwrap_or_default();
        sections.push(format!("Context:\n```json\n{}\n```", context));
    }

    sections.retain(|s| !s.is_empty());
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentDefinition;
    use crate::graph::{GraphBuilder, Task, TaskGraph};

    fn plan() -> CrewPlan {
        let graph = TaskGraph::new("g", "G")
            .with_agent(AgentDefinition::new("a", "a", "x"))
            .with_task(Task::new("research", "Research the market", "a"))
            .with_task(Task::new("numbers", "", "a"))
            .with_task(
                Task::new("write", "Write the report", "a")
                    .depends_on("research")
                    .depends_on("numbers")
                    .with_expected_output("A two-page report")
                    .with_context("audience", serde_json::json!("executives")),
            );
        GraphBuilder::new(&graph).build().unwrap()
    }

    #[test]
    fn test_root_task_gets_initial_input() {
        let input = build_effective_input(&plan(), 0, "EV chargers in Norway", &[]);
        assert_eq!(input, "Research the market\n\nInput:\nEV chargers in Norway");
    }

    #[test]
    fn test_root_task_without_initial_input_is_just_description() {
        let input = build_effective_input(&plan(), 0, "   ", &[]);
        assert_eq!(input, "Research the market");
    }

    #[test]
    fn test_dependent_task_gets_labeled_sections() {
        let outputs = vec![
            Some("findings".to_string()),
            Some("42 units".to_string()),
            None,
        ];
        let input = build_effective_input(&plan(), 2, "ignored for non-roots", &outputs);

        assert!(input.starts_with("Write the report"));
        assert!(input.contains("### Research the market\nfindings"));
        // Empty description falls back to the task id
        assert!(input.contains("### numbers\n42 units"));
        assert!(input.contains("Expected output: A two-page report"));
        assert!(input.contains("\"audience\": \"executives\""));
        assert!(!input.contains("ignored for non-roots"));
    }
}
