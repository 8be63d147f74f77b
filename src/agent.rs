//! Agent definitions: named personas that tasks are bound to.
//!
//! An [`AgentDefinition`] carries the system prompt and generation parameters used
//! whenever a task assigned to it is sent to the language-model backend. Definitions
//! are plain data; a run clones the ones it needs into its [`CrewPlan`](crate::graph::CrewPlan),
//! so later registry edits never affect a run in progress.

use crate::registry::Identified;
use serde::{Deserialize, Serialize};

/// A tool the agent declares to the presentation layer.
///
/// Tools are carried as metadata only; invoking them is not the orchestrator's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool's parameters.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: serde_json::Value::Null,
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A configured persona that can be invoked to produce text for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "systemPrompt")]
    pub system_prompt: String,
    /// Model identifier; the backend's configured default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, alias = "maxTokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
}

impl AgentDefinition {
    /// Create a definition with the given id, display name and system prompt.
    pub fn new(id: &str, name: &str, system_prompt: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            system_prompt: system_prompt.to_string(),
            model: None,
            temperature: None,
            max_tokens: None,
            tools: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    /// Name used in logs and progress messages, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

impl Identified for AgentDefinition {
    const KIND: &'static str = "agent";

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_parameters() {
        let agent = AgentDefinition::new("writer", "Writer", "You write.")
            .with_model("llama3-70b-8192")
            .with_temperature(0.3)
            .with_max_tokens(512)
            .with_tool(ToolSpec::new("search", "Search the web"));

        assert_eq!(agent.model.as_deref(), Some("llama3-70b-8192"));
        assert_eq!(agent.temperature, Some(0.3));
        assert_eq!(agent.max_tokens, Some(512));
        assert_eq!(agent.tools.len(), 1);
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let agent = AgentDefinition::new("r", "", "research");
        assert_eq!(agent.display_name(), "r");
    }

    #[test]
    fn test_deserialize_accepts_camel_case_aliases() {
        let json = r#"{
            "id": "analyst",
            "name": "Analyst",
            "systemPrompt": "You analyse data.",
            "maxTokens": 2048,
            "temperature": 0.5
        }"#;
        let agent: AgentDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(agent.system_prompt, "You analyse data.");
        assert_eq!(agent.max_tokens, Some(2048));
        assert!(agent.model.is_none());
    }
}
