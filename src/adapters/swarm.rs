//! Swarm workflows: a linear list of steps, each with its own inline agent.
//!
//! A [`SwarmWorkflow`] translates into a [`TaskGraph`] with one agent and one task per
//! step (`agent_<i>`, `task_<i>`). Under `sequential` and `adaptive`, step *i*
//! depends on step *i-1*; under `parallel` no step depends on another.

use crate::agent::{AgentDefinition, ToolSpec};
use crate::crew::{CrewExecutor, ExecutionResult, RunOptions};
use crate::errors::{ConfigurationError, SwarmError};
use crate::graph::{Process, RetryPolicy, Task, TaskGraph};
use crate::history::ExecutionHistory;
use crate::registry::{Identified, SwarmRegistry};
use crate::stream::UpdateEvent;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

/// System prompt of the general-purpose assistant used by [`SwarmWorkflow::single_turn`].
pub const ASSISTANT_PROMPT: &str = "You are a helpful assistant embedded in a business \
application. Answer concisely and accurately, give specific and actionable information, \
say so when you are unsure, use markdown for structured answers, and suggest relevant \
next actions when they would help.";

/// Module name under which the assistant gains analytics tools.
pub const ANALYTICS_MODULE: &str = "analytics";

fn context_str<'a>(value: Option<&'a Value>) -> Option<&'a str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Assistant system prompt specialised with the caller's context.
///
/// Recognised keys: `module`, `user` (`{name, role}`) and `task`. Other keys are
/// only attached to the task context.
pub fn assistant_instructions(context: &Map<String, Value>) -> String {
    let mut instructions = ASSISTANT_PROMPT.to_string();

    if let Some(module) = context_str(context.get("module")) {
        instructions.push_str(&format!("\n\nYou are currently in the {} module.", module));
    }
    if let Some(user) = context.get("user").and_then(Value::as_object)
        && let Some(name) = context_str(user.get("name"))
    {
        match context_str(user.get("role")) {
            Some(role) => instructions.push_str(&format!(
                "\n\nYou are assisting {}, who is a {}.",
                name, role
            )),
            None => instructions.push_str(&format!("\n\nYou are assisting {}.", name)),
        }
    }
    if let Some(task) = context_str(context.get("task")) {
        instructions.push_str(&format!("\n\nThe current task is: {}", task));
    }

    instructions
}

/// Tools the assistant declares for the given context.
pub fn assistant_tools(context: &Map<String, Value>) -> Vec<ToolSpec> {
    let mut tools = vec![
        ToolSpec::new("search", "Search for information").with_parameters(json!({
            "type": "object",
            "properties": {"query": {"type": "string", "description": "The search query"}},
            "required": ["query"]
        })),
    ];

    if context_str(context.get("module")) == Some(ANALYTICS_MODULE) {
        tools.push(
            ToolSpec::new("getAnalyticsData", "Get analytics data").with_parameters(json!({
                "type": "object",
                "properties": {
                    "metric": {"type": "string", "description": "The metric to get data for"},
                    "timeRange": {"type": "string", "description": "The time range for the data"}
                },
                "required": ["metric"]
            })),
        );
    }

    tools
}

/// Process discipline as named by swarm workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwarmProcess {
    #[default]
    Sequential,
    Parallel,
    /// Linear like `sequential`; maps to the hierarchical process
    Adaptive,
}

impl SwarmProcess {
    pub fn to_process(self) -> Process {
        match self {
            SwarmProcess::Sequential => Process::Sequential,
            SwarmProcess::Parallel => Process::Parallel,
            SwarmProcess::Adaptive => Process::Hierarchical,
        }
    }
}

impl std::fmt::Display for SwarmProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwarmProcess::Sequential => write!(f, "sequential"),
            SwarmProcess::Parallel => write!(f, "parallel"),
            SwarmProcess::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// The persona executing one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmAgent {
    pub name: String,
    /// Becomes the agent's system prompt
    #[serde(default)]
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, alias = "functions", skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
}

impl SwarmAgent {
    pub fn new(name: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            instructions: instructions.to_string(),
            model: None,
            tools: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmStep {
    pub agent: SwarmAgent,
    /// Becomes the task description
    pub input: String,
    #[serde(default, alias = "expectedOutput", skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, alias = "maxTokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

impl SwarmStep {
    pub fn new(agent: SwarmAgent, input: &str) -> Self {
        Self {
            agent,
            input: input.to_string(),
            expected_output: None,
            temperature: None,
            max_tokens: None,
            retry: None,
        }
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
}

/// A named list of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmWorkflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<SwarmStep>,
    /// Attached to every task's context data
    #[serde(default, alias = "contextVariables", skip_serializing_if = "serde_json::Map::is_empty")]
    pub context_variables: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub process: SwarmProcess,
}

impl Identified for SwarmWorkflow {
    const KIND: &'static str = "swarm workflow";

    fn id(&self) -> &str {
        &self.name
    }
}

impl SwarmWorkflow {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            steps: Vec::new(),
            context_variables: serde_json::Map::new(),
            process: SwarmProcess::Sequential,
        }
    }

    pub fn with_step(mut self, step: SwarmStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_process(mut self, process: SwarmProcess) -> Self {
        self.process = process;
        self
    }

    pub fn with_context_variable(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context_variables.insert(key.to_string(), value);
        self
    }

    /// One-step workflow answering `message` with the general assistant persona.
    ///
    /// `context` shapes the prompt and tool list (see [`assistant_instructions`]) and
    /// is attached to the task as context variables.
    pub fn single_turn(message: &str, context: &Map<String, Value>) -> Self {
        let mut agent = SwarmAgent::new("Assistant", &assistant_instructions(context));
        for tool in assistant_tools(context) {
            agent = agent.with_tool(tool);
        }

        let mut workflow = Self::new("Assistant", "Single agent responding to a user message")
            .with_step(
                SwarmStep::new(agent, &format!("Respond to the user's message: {}", message))
                    .with_expected_output("A helpful response to the user"),
            );
        for (key, value) in context {
            workflow = workflow.with_context_variable(key, value.clone());
        }
        workflow
    }

    /// Id of the graph this workflow translates into.
    pub fn graph_id(&self) -> String {
        let slug: String = self
            .name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let slug = slug
            .split('-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        format!("swarm-{}", slug)
    }

    /// Translate into a task graph. Validation happens when the graph is built.
    pub fn to_task_graph(&self) -> TaskGraph {
        let mut graph = TaskGraph::new(&self.graph_id(), &self.name)
            .with_description(&self.description)
            .with_process(self.process.to_process());

        for (index, step) in self.steps.iter().enumerate() {
            let agent_id = format!("agent_{}", index);
            let task_id = format!("task_{}", index);

            let mut agent = AgentDefinition::new(&agent_id, &step.agent.name, &step.agent.instructions)
                .with_description(&format!("Agent for step {} of the workflow", index + 1));
            if let Some(model) = &step.agent.model {
                agent = agent.with_model(model);
            }
            for tool in &step.agent.tools {
                agent = agent.with_tool(tool.clone());
            }

            let mut task = Task::new(&task_id, &step.input, &agent_id);
            if index > 0 && self.process != SwarmProcess::Parallel {
                task = task.depends_on(&format!("task_{}", index - 1));
            }
            if let Some(expected) = &step.expected_output {
                task = task.with_expected_output(expected);
            }
            if let Some(temperature) = step.temperature {
                task = task.with_temperature(temperature);
            }
            if let Some(max_tokens) = step.max_tokens {
                task = task.with_max_tokens(max_tokens);
            }
            if let Some(retry) = &step.retry {
                task = task.with_retry(retry.clone());
            }
            for (key, value) in &self.context_variables {
                task = task.with_context(key, value.clone());
            }

            graph = graph.with_agent(agent).with_task(task);
        }

        graph
    }
}

/// Executes swarm workflows and remembers their results per workflow name.
///
/// Workflows can be run directly or registered once and run by name.
pub struct SwarmRunner {
    executor: CrewExecutor,
    workflows: SwarmRegistry,
    history: ExecutionHistory,
}

impl SwarmRunner {
    pub fn new(executor: CrewExecutor, history: ExecutionHistory) -> Self {
        Self {
            executor,
            workflows: SwarmRegistry::new(),
            history,
        }
    }

    pub fn executor(&self) -> &CrewExecutor {
        &self.executor
    }

    /// Store a workflow under its name, replacing any previous one.
    pub fn register_workflow(
        &mut self,
        workflow: SwarmWorkflow,
    ) -> Result<Option<SwarmWorkflow>, ConfigurationError> {
        debug!(workflow = %workflow.name, "Registering swarm workflow");
        self.workflows.register(workflow)
    }

    pub fn workflow(&self, name: &str) -> Option<&SwarmWorkflow> {
        self.workflows.get(name)
    }

    /// Edit a registered workflow in place.
    pub fn workflow_mut(&mut self, name: &str) -> Option<&mut SwarmWorkflow> {
        self.workflows.get_mut(name)
    }

    /// Registered workflows in registration order.
    pub fn workflows(&self) -> Vec<&SwarmWorkflow> {
        self.workflows.list()
    }

    pub fn remove_workflow(&mut self, name: &str) -> Option<SwarmWorkflow> {
        self.workflows.remove(name)
    }

    /// Run a registered workflow by name.
    pub async fn run_named(
        &mut self,
        name: &str,
        input: &str,
        options: RunOptions,
    ) -> Result<ExecutionResult, SwarmError> {
        self.run_named_streaming(name, input, options, |_event| {}).await
    }

    /// Like [`run_named`](Self::run_named), forwarding update events.
    pub async fn run_named_streaming<F>(
        &mut self,
        name: &str,
        input: &str,
        options: RunOptions,
        on_update: F,
    ) -> Result<ExecutionResult, SwarmError>
    where
        F: FnMut(UpdateEvent) + Send,
    {
        let workflow = self
            .workflows
            .get(name)
            .cloned()
            .ok_or_else(|| SwarmError::NotFound {
                name: name.to_string(),
            })?;
        Ok(self
            .run_streaming(&workflow, input, options, on_update)
            .await?)
    }

    pub async fn run(
        &mut self,
        workflow: &SwarmWorkflow,
        input: &str,
        options: RunOptions,
    ) -> Result<ExecutionResult, ConfigurationError> {
        self.run_streaming(workflow, input, options, |_event| {}).await
    }

    /// Run a workflow, forwarding every update event to `on_update`.
    pub async fn run_streaming<F>(
        &mut self,
        workflow: &SwarmWorkflow,
        input: &str,
        options: RunOptions,
        on_update: F,
    ) -> Result<ExecutionResult, ConfigurationError>
    where
        F: FnMut(UpdateEvent) + Send,
    {
        let plan = self.executor.plan(&workflow.to_task_graph(), None)?;
        info!(
            workflow = %workflow.name,
            steps = workflow.steps.len(),
            process = %workflow.process,
            "Running swarm workflow"
        );
        let result = self
            .executor
            .run_plan_streaming(plan, input, options, on_update)
            .await;
        self.history.record(&workflow.name, result.clone());
        Ok(result)
    }

    /// Answer a single message with the general assistant.
    ///
    /// Failed runs produce the user-facing apology rather than an error.
    pub async fn respond(
        &mut self,
        message: &str,
        context: &Map<String, Value>,
        options: RunOptions,
    ) -> Result<String, ConfigurationError> {
        let result = self
            .run(&SwarmWorkflow::single_turn(message, context), "", options)
            .await?;
        Ok(result.user_message(self.executor.settings().expose_errors))
    }

    /// Past results of a workflow, oldest first.
    pub fn results_for(&self, workflow_name: &str) -> Vec<&ExecutionResult> {
        self.history.results_for(workflow_name)
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }
}
