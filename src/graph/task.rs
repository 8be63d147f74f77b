//! Task graph data model.
//!
//! These are the loosely-constrained, serializable shapes callers build or load
//! from files. Nothing here is validated; [`GraphBuilder`](super::GraphBuilder)
//! checks a [`TaskGraph`] once and produces an executable plan.

use crate::agent::AgentDefinition;
use crate::errors::ConfigurationError;
use crate::registry::Identified;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Execution discipline of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Process {
    /// One task at a time in dependency order
    #[default]
    Sequential,
    /// Independent tasks may run concurrently
    #[serde(alias = "consensual")]
    Parallel,
    /// Accepted for compatibility; runs like `Sequential`
    #[serde(alias = "adaptive")]
    Hierarchical,
}

impl std::fmt::Display for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Process::Sequential => write!(f, "sequential"),
            Process::Parallel => write!(f, "parallel"),
            Process::Hierarchical => write!(f, "hierarchical"),
        }
    }
}

impl std::str::FromStr for Process {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(Process::Sequential),
            "parallel" | "consensual" => Ok(Process::Parallel),
            "hierarchical" | "adaptive" => Ok(Process::Hierarchical),
            _ => anyhow::bail!(
                "Invalid process '{}'. Valid values: sequential, parallel, hierarchical",
                s
            ),
        }
    }
}

/// Backoff curve between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

/// Per-task retry contract for backend failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    #[serde(alias = "maxAttempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: Backoff,
    /// Base delay between attempts, in milliseconds on the wire
    #[serde(default, with = "crate::crew::state::duration_serde")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::Fixed,
            delay: Duration::ZERO,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed,
            delay,
        }
    }

    pub fn exponential(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential,
            delay,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor)
            }
        }
    }

    pub(crate) fn validate(&self, task_id: &str) -> Result<(), ConfigurationError> {
        if self.max_attempts == 0 {
            return Err(ConfigurationError::InvalidRetry {
                task: task_id.to_string(),
                message: "max_attempts must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// A unit of work bound to one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "agentId", alias = "agent")]
    pub agent_id: String,
    #[serde(default, alias = "expectedOutput", skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    /// Ids of tasks whose output this task consumes
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, alias = "maxTokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    /// Free-form data handed to the agent alongside the description
    #[serde(default, alias = "contextData", skip_serializing_if = "serde_json::Map::is_empty")]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl Task {
    pub fn new(id: &str, description: &str, agent_id: &str) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            agent_id: agent_id.to_string(),
            expected_output: None,
            dependencies: Vec::new(),
            temperature: None,
            max_tokens: None,
            retry: None,
            context: serde_json::Map::new(),
        }
    }

    pub fn depends_on(mut self, task_id: &str) -> Self {
        self.dependencies.push(task_id.to_string());
        self
    }

    pub fn with_expected_output(mut self, expected: &str) -> Self {
        self.expected_output = Some(expected.to_string());
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

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    /// Label used when this task's output is handed to a dependent.
    pub fn label(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.id
        } else {
            &self.description
        }
    }
}

/// A named collection of agents and tasks with an execution discipline.
///
/// Also known as a crew or workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Graph-local agents; these take precedence over an external registry
    #[serde(default)]
    pub agents: Vec<AgentDefinition>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub process: Process,
}

impl TaskGraph {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            agents: Vec::new(),
            tasks: Vec::new(),
            process: Process::default(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_agent(mut self, agent: AgentDefinition) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_process(mut self, process: Process) -> Self {
        self.process = process;
        self
    }

    pub fn agent(&self, id: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

impl Identified for TaskGraph {
    const KIND: &'static str = "crew";

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_from_str_accepts_aliases() {
        assert_eq!("sequential".parse::<Process>().unwrap(), Process::Sequential);
        assert_eq!("Consensual".parse::<Process>().unwrap(), Process::Parallel);
        assert_eq!("adaptive".parse::<Process>().unwrap(), Process::Hierarchical);
        assert!("round-robin".parse::<Process>().is_err());
    }

    #[test]
    fn test_process_deserialize_aliases() {
        let p: Process = serde_json::from_str("\"consensual\"").unwrap();
        assert_eq!(p, Process::Parallel);
        let p: Process = serde_json::from_str("\"adaptive\"").unwrap();
        assert_eq!(p, Process::Hierarchical);
    }

    #[test]
    fn test_retry_delay_fixed() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(100));
    }

    #[test]
    fn test_retry_delay_exponential() {
        let policy = RetryPolicy::exponential(4, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_validate_rejects_zero_attempts() {
        let policy = RetryPolicy::fixed(0, Duration::ZERO);
        let err = policy.validate("t1").unwrap_err();
        assert_eq!(err.task_id(), Some("t1"));
    }

    #[test]
    fn test_task_deserialize_camel_case() {
        let json = r#"{
            "id": "t2",
            "description": "Write the article",
            "agentId": "w",
            "expectedOutput": "An article",
            "dependencies": ["t1"],
            "retry": {"maxAttempts": 3, "backoff": "exponential", "delay": 250},
            "contextData": {"audience": "developers"}
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.agent_id, "w");
        assert_eq!(task.expected_output.as_deref(), Some("An article"));
        assert_eq!(task.dependencies, vec!["t1"]);
        let retry = task.retry.unwrap();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.backoff, Backoff::Exponential);
        assert_eq!(retry.delay, Duration::from_millis(250));
        assert_eq!(task.context["audience"], "developers");
    }

    #[test]
    fn test_task_label_falls_back_to_id() {
        assert_eq!(Task::new("t1", "", "a").label(), "t1");
        assert_eq!(Task::new("t1", "Research", "a").label(), "Research");
    }

    #[test]
    fn test_graph_defaults_to_sequential() {
        let graph: TaskGraph = serde_json::from_str(r#"{"id": "g"}"#).unwrap();
        assert_eq!(graph.process, Process::Sequential);
        assert!(graph.tasks.is_empty());
    }
}
