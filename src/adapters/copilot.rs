//! Copilots: single-task assistants bound to a persona and the current UI context.
//!
//! Each message becomes a one-step [`SwarmWorkflow`] whose agent prompt is the
//! copilot's system prompt extended with the UI context. The backend returns plain
//! text; structured actions are recovered from fenced blocks of the form
//!
//! ````text
//! ```actions
//! [{"type": "ui", "name": "navigate", "parameters": {"url": "/reports"}}]
//! ```
//! ````
//!
//! and returned next to the display text in a [`CopilotReply`]. Executing actions
//! is up to the caller; [`CopilotSession::request_ui_action`] only checks that the
//! active copilot may perform one.

use crate::adapters::swarm::{SwarmAgent, SwarmStep, SwarmWorkflow};
use crate::agent::ToolSpec;
use crate::crew::{CrewExecutor, ExecutionResult, RunOptions};
use crate::errors::CopilotError;
use crate::llm::ChatMessage;
use crate::registry::{CopilotRegistry, Identified};
use crate::stream::UpdateEvent;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static ACTIONS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```actions\s*(.*?)```").unwrap());

const EXPECTED_REPLY: &str = "A helpful response with optional UI actions or tool suggestions";

/// What a copilot is allowed to do in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UiCapabilities {
    #[serde(default, alias = "canManipulateDOM")]
    pub can_manipulate_dom: bool,
    #[serde(default, alias = "canNavigate")]
    pub can_navigate: bool,
    #[serde(default, alias = "canAccessForms")]
    pub can_access_forms: bool,
    #[serde(default, alias = "canExecuteActions")]
    pub can_execute_actions: bool,
}

impl UiCapabilities {
    pub fn all() -> Self {
        Self {
            can_manipulate_dom: true,
            can_navigate: true,
            can_access_forms: true,
            can_execute_actions: true,
        }
    }
}

/// Interaction performed by a UI action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiInteraction {
    Click,
    Input,
    Select,
    Hover,
    Navigate,
}

/// A UI action a copilot declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiActionSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// CSS selector of the target element(s)
    #[serde(default)]
    pub selector: String,
    pub action: UiInteraction,
    /// Default parameters, overridden per request
    #[serde(default)]
    pub parameters: Value,
}

impl UiActionSpec {
    pub fn new(name: &str, description: &str, selector: &str, action: UiInteraction) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            selector: selector.to_string(),
            action,
            parameters: Value::Null,
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A copilot persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopilotConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "systemPrompt")]
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, alias = "maxTokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default, alias = "uiActions")]
    pub ui_actions: Vec<UiActionSpec>,
    #[serde(default, alias = "uiCapabilities")]
    pub ui_capabilities: UiCapabilities,
}

impl Identified for CopilotConfig {
    const KIND: &'static str = "copilot";

    fn id(&self) -> &str {
        &self.id
    }
}

impl CopilotConfig {
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
            ui_actions: Vec::new(),
            ui_capabilities: UiCapabilities::default(),
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

    pub fn with_ui_action(mut self, action: UiActionSpec) -> Self {
        self.ui_actions.push(action);
        self
    }

    pub fn with_capabilities(mut self, capabilities: UiCapabilities) -> Self {
        self.ui_capabilities = capabilities;
        self
    }

    pub fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn ui_action(&self, name: &str) -> Option<&UiActionSpec> {
        self.ui_actions.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

/// What the user is currently looking at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiContext {
    #[serde(alias = "currentView")]
    pub current_view: String,
    #[serde(default, alias = "selectedElement", skip_serializing_if = "Option::is_none")]
    pub selected_element: Option<String>,
    #[serde(default, alias = "viewportSize", skip_serializing_if = "Option::is_none")]
    pub viewport_size: Option<ViewportSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
}

impl Default for UiContext {
    fn default() -> Self {
        Self {
            current_view: "home".to_string(),
            selected_element: None,
            viewport_size: None,
            theme: None,
        }
    }
}

impl UiContext {
    /// The context as a prompt section.
    pub fn render(&self) -> String {
        let mut lines = vec![
            "Current UI Context:".to_string(),
            format!("- Current View: {}", self.current_view),
        ];
        if let Some(element) = &self.selected_element {
            lines.push(format!("- Selected Element: {}", element));
        }
        if let Some(size) = &self.viewport_size {
            lines.push(format!("- Viewport Size: {}x{}", size.width, size.height));
        }
        if let Some(theme) = &self.theme {
            lines.push(format!("- Theme: {}", theme));
        }
        lines.join("\n")
    }
}

/// Append the UI context to a base system prompt.
pub fn enhanced_system_prompt(base: &str, context: &UiContext) -> String {
    format!("{}\n\n{}", base.trim_end(), context.render())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Ui,
    Tool,
    Suggestion,
}

/// An action proposed by the copilot in its reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopilotAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Value,
    /// Whether the name matches a tool or UI action the copilot declares
    #[serde(default, skip_deserializing)]
    pub bound: bool,
}

/// Extract actions from every fenced `actions` block in `text`.
///
/// Blocks that are not a JSON array, and entries without a known type or a name,
/// are skipped with a warning.
pub fn parse_actions(text: &str, copilot: Option<&CopilotConfig>) -> Vec<CopilotAction> {
    let mut actions = Vec::new();

    for captures in ACTIONS_BLOCK.captures_iter(text) {
        let body = captures.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let entries: Vec<Value> = match serde_json::from_str(body) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Skipping malformed actions block");
                continue;
            }
        };

        for entry in entries {
            let mut action: CopilotAction = match serde_json::from_value(entry) {
                Ok(action) => action,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed action");
                    continue;
                }
            };
            if action.name.trim().is_empty() {
                warn!("Skipping action without a name");
                continue;
            }
            action.bound = match (action.kind, copilot) {
                (ActionKind::Ui, Some(c)) => c.ui_action(&action.name).is_some(),
                (ActionKind::Tool, Some(c)) => c.tool(&action.name).is_some(),
                _ => false,
            };
            actions.push(action);
        }
    }

    actions
}

/// `text` with all actions blocks removed.
pub fn strip_actions(text: &str) -> String {
    ACTIONS_BLOCK.replace_all(text, "").trim().to_string()
}

/// A copilot's answer to one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopilotReply {
    pub copilot_id: String,
    /// Display text with actions blocks removed
    pub text: String,
    pub actions: Vec<CopilotAction>,
    pub success: bool,
    /// Id of the underlying run
    pub run_id: String,
}

/// A validated request to perform a declared UI action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiActionRequest {
    pub copilot_id: String,
    pub action: UiActionSpec,
    /// Declared defaults merged with the requested parameters
    pub parameters: Value,
}

/// Copilots, the active one, the UI context and the conversation so far.
pub struct CopilotSession {
    executor: CrewExecutor,
    copilots: CopilotRegistry,
    active: Option<String>,
    ui_context: UiContext,
    context_data: serde_json::Map<String, Value>,
    history: Vec<ChatMessage>,
}

impl CopilotSession {
    /// A session with the default UI, developer and analyst copilots; the UI
    /// copilot is active.
    pub fn new(executor: CrewExecutor) -> Self {
        let mut session = Self::empty(executor);
        for copilot in default_copilots() {
            session.copilots.register(copilot).ok();
        }
        session.active = Some(UI_COPILOT_ID.to_string());
        session
    }

    /// A session without any copilots.
    pub fn empty(executor: CrewExecutor) -> Self {
        Self {
            executor,
            copilots: CopilotRegistry::new(),
            active: None,
            ui_context: UiContext::default(),
            context_data: serde_json::Map::new(),
            history: Vec::new(),
        }
    }

    pub fn register(&mut self, copilot: CopilotConfig) -> Result<Option<CopilotConfig>, CopilotError> {
        Ok(self.copilots.register(copilot)?)
    }

    pub fn copilot(&self, id: &str) -> Option<&CopilotConfig> {
        self.copilots.get(id)
    }

    pub fn copilots(&self) -> Vec<&CopilotConfig> {
        self.copilots.list()
    }

    /// Remove a copilot; removing the active one leaves no copilot active.
    pub fn remove(&mut self, id: &str) -> Option<CopilotConfig> {
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        self.copilots.remove(id)
    }

    pub fn set_active(&mut self, id: &str) -> Result<&CopilotConfig, CopilotError> {
        let copilot = self
            .copilots
            .get(id)
            .ok_or_else(|| CopilotError::NotFound { id: id.to_string() })?;
        self.active = Some(id.to_string());
        Ok(copilot)
    }

    pub fn active(&self) -> Option<&CopilotConfig> {
        self.active.as_deref().and_then(|id| self.copilots.get(id))
    }

    pub fn ui_context(&self) -> &UiContext {
        &self.ui_context
    }

    pub fn update_ui_context(&mut self, update: impl FnOnce(&mut UiContext)) {
        update(&mut self.ui_context);
    }

    /// Extra data attached to every message's task context.
    pub fn set_context_data(&mut self, key: &str, value: Value) {
        self.context_data.insert(key.to_string(), value);
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Build the one-step workflow answering `message` with `copilot`.
    pub fn workflow_for(&self, copilot: &CopilotConfig, message: &str) -> SwarmWorkflow {
        let mut agent = SwarmAgent::new(
            &copilot.name,
            &enhanced_system_prompt(&copilot.system_prompt, &self.ui_context),
        );
        if let Some(model) = &copilot.model {
            agent = agent.with_model(model);
        }
        for tool in &copilot.tools {
            agent = agent.with_tool(tool.clone());
        }

        let mut step = SwarmStep::new(agent, message).with_expected_output(EXPECTED_REPLY);
        if let Some(temperature) = copilot.temperature {
            step = step.with_temperature(temperature);
        }
        if let Some(max_tokens) = copilot.max_tokens {
            step = step.with_max_tokens(max_tokens);
        }

        let ui_actions: Vec<Value> = copilot
            .ui_actions
            .iter()
            .map(|a| json!({"name": a.name, "description": a.description, "action": a.action, "selector": a.selector}))
            .collect();
        let tools: Vec<Value> = copilot
            .tools
            .iter()
            .map(|t| json!({"name": t.name, "description": t.description}))
            .collect();

        let mut workflow = SwarmWorkflow::new(
            &format!("{} Workflow", copilot.name),
            &format!("Workflow for {}", copilot.name),
        )
        .with_step(step)
        .with_context_variable("copilot_id", json!(copilot.id))
        .with_context_variable("copilot_name", json!(copilot.name));
        if !ui_actions.is_empty() {
            workflow = workflow.with_context_variable("available_ui_actions", Value::Array(ui_actions));
        }
        if !tools.is_empty() {
            workflow = workflow.with_context_variable("available_tools", Value::Array(tools));
        }
        for (key, value) in &self.context_data {
            workflow = workflow.with_context_variable(key, value.clone());
        }
        workflow
    }

    /// Send a message to the active copilot.
    ///
    /// A failed run still yields a reply carrying the user-facing apology.
    pub async fn send_message(&mut self, message: &str) -> Result<CopilotReply, CopilotError> {
        self.send_message_streaming(message, |_event| {}).await
    }

    /// Like [`send_message`](Self::send_message), forwarding update events.
    pub async fn send_message_streaming<F>(
        &mut self,
        message: &str,
        on_update: F,
    ) -> Result<CopilotReply, CopilotError>
    where
        F: FnMut(UpdateEvent) + Send,
    {
        let copilot = self.active().cloned().ok_or(CopilotError::NoActiveCopilot)?;
        let workflow = self.workflow_for(&copilot, message);
        let plan = self.executor.plan(&workflow.to_task_graph(), None)?;
        let options = RunOptions::default().with_history(self.history.clone());

        info!(copilot = %copilot.id, "Sending message to copilot");
        self.history.push(ChatMessage::user(message));

        let result = self
            .executor
            .run_plan_streaming(plan, "", options, on_update)
            .await;
        let reply = self.reply_from(&copilot, &result);

        debug!(copilot = %copilot.id, actions = reply.actions.len(), "Copilot replied");
        self.history.push(ChatMessage::assistant(reply.text.clone()));
        Ok(reply)
    }

    fn reply_from(&self, copilot: &CopilotConfig, result: &ExecutionResult) -> CopilotReply {
        let (text, actions) = if result.success {
            (
                strip_actions(&result.final_output),
                parse_actions(&result.final_output, Some(copilot)),
            )
        } else {
            (
                result.user_message(self.executor.settings().expose_errors),
                Vec::new(),
            )
        };
        CopilotReply {
            copilot_id: copilot.id.clone(),
            text,
            actions,
            success: result.success,
            run_id: result.id.clone(),
        }
    }

    /// Check that the active copilot may perform the named UI action.
    ///
    /// `parameters` override the action's declared defaults key by key.
    pub fn request_ui_action(
        &self,
        name: &str,
        parameters: Value,
    ) -> Result<UiActionRequest, CopilotError> {
        let copilot = self.active().ok_or(CopilotError::NoActiveCopilot)?;
        if !copilot.ui_capabilities.can_execute_actions {
            return Err(CopilotError::ActionNotPermitted {
                id: copilot.id.clone(),
            });
        }
        let action = copilot
            .ui_action(name)
            .ok_or_else(|| CopilotError::UnknownAction {
                id: copilot.id.clone(),
                action: name.to_string(),
            })?;

        let mut merged = match &action.parameters {
            Value::Object(defaults) => defaults.clone(),
            _ => serde_json::Map::new(),
        };
        if let Value::Object(requested) = parameters {
            merged.extend(requested);
        }

        info!(copilot = %copilot.id, action = name, "UI action requested");
        Ok(UiActionRequest {
            copilot_id: copilot.id.clone(),
            action: action.clone(),
            parameters: Value::Object(merged),
        })
    }
}

pub const UI_COPILOT_ID: &str = "ui-copilot";
pub const DEVELOPER_COPILOT_ID: &str = "developer-copilot";
pub const ANALYST_COPILOT_ID: &str = "analyst-copilot";

/// The built-in copilots: UI, developer and analyst.
pub fn default_copilots() -> Vec<CopilotConfig> {
    let ui = CopilotConfig::new(
        UI_COPILOT_ID,
        "UI Copilot",
        "You are a UI copilot that helps users navigate the application, fill out forms \
and perform actions. Give clear step-by-step guidance, explain what an element does \
before suggesting an interaction, and say so when you are unsure.",
    )
    .with_description("Assistant that can interact with the user interface")
    .with_temperature(0.7)
    .with_max_tokens(4096)
    .with_tool(
        ToolSpec::new("search", "Search for information").with_parameters(json!({
            "type": "object",
            "properties": {"query": {"type": "string", "description": "The search query"}},
            "required": ["query"]
        })),
    )
    .with_ui_action(
        UiActionSpec::new("navigate", "Navigate to a different page or view", "window", UiInteraction::Navigate)
            .with_parameters(json!({"url": ""})),
    )
    .with_ui_action(UiActionSpec::new(
        "clickButton",
        "Click a button on the page",
        "button",
        UiInteraction::Click,
    ))
    .with_ui_action(
        UiActionSpec::new("fillForm", "Fill out a form field", "input, textarea, select", UiInteraction::Input)
            .with_parameters(json!({"selector": "", "value": ""})),
    )
    .with_capabilities(UiCapabilities::all());

    let developer = CopilotConfig::new(
        DEVELOPER_COPILOT_ID,
        "Developer Copilot",
        "You are a developer assistant. Provide code examples when relevant, explain your \
reasoning, consider performance and maintainability, and use fenced code blocks.",
    )
    .with_description("Assistant for coding tasks")
    .with_temperature(0.3)
    .with_max_tokens(8192)
    .with_tool(
        ToolSpec::new("generateCode", "Generate code based on a description").with_parameters(json!({
            "type": "object",
            "properties": {
                "language": {"type": "string", "description": "The programming language"},
                "description": {"type": "string", "description": "What the code should do"}
            },
            "required": ["language", "description"]
        })),
    )
    .with_tool(
        ToolSpec::new("debugCode", "Debug code and suggest fixes").with_parameters(json!({
            "type": "object",
            "properties": {
                "language": {"type": "string", "description": "The programming language"},
                "code": {"type": "string", "description": "The code to debug"},
                "error": {"type": "string", "description": "The error message, if any"}
            },
            "required": ["language", "code"]
        })),
    );

    let analyst = CopilotConfig::new(
        ANALYST_COPILOT_ID,
        "Analyst Copilot",
        "You are a data analyst. Focus on data-driven insights, consider statistical \
significance and data quality, and suggest visualizations when they help.",
    )
    .with_description("Assistant for data analysis")
    .with_temperature(0.2)
    .with_max_tokens(4096)
    .with_tool(
        ToolSpec::new("analyzeData", "Analyze data and provide insights").with_parameters(json!({
            "type": "object",
            "properties": {
                "dataType": {"type": "string", "description": "The type of data to analyze"},
                "timeRange": {"type": "string", "description": "The time range for the data"},
                "metrics": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["dataType"]
        })),
    )
    .with_tool(
        ToolSpec::new("generateChart", "Generate a chart based on data").with_parameters(json!({
            "type": "object",
            "properties": {
                "chartType": {"type": "string", "description": "The type of chart"},
                "data": {"type": "object", "description": "The data for the chart"}
            },
            "required": ["chartType", "data"]
        })),
    )
    .with_capabilities(UiCapabilities {
        can_navigate: true,
        ..UiCapabilities::default()
    });

    vec![ui, developer, analyst]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crew::APOLOGY_MESSAGE;
    use crate::llm::{ScriptedBackend, ScriptedReply};
    use std::sync::Arc;

    fn ui_copilot() -> CopilotConfig {
        default_copilots().remove(0)
    }

    #[test]
    fn test_parse_actions_binds_declared_names() {
        let text = "Sure, opening reports.\n```actions\n[\
            {\"type\": \"ui\", \"name\": \"navigate\", \"parameters\": {\"url\": \"/reports\"}},\
            {\"type\": \"tool\", \"name\": \"teleport\"},\
            {\"type\": \"suggestion\", \"name\": \"Export as CSV\", \"description\": \"Download the data\"}\
        ]\n```";
        let actions = parse_actions(text, Some(&ui_copilot()));

        assert_eq!(actions.len(), 3);
        assert_eq!(actions[0].kind, ActionKind::Ui);
        assert!(actions[0].bound);
        assert_eq!(actions[0].parameters["url"], "/reports");
        assert!(!actions[1].bound);
        assert_eq!(actions[2].kind, ActionKind::Suggestion);
        assert_eq!(actions[2].description, "Download the data");
    }

    #[test]
    fn test_malformed_blocks_are_skipped() {
        let text = "```actions\nnot json\n```\nmiddle\n```actions\n[{\"type\": \"tool\", \"name\": \"search\"}, {\"type\": \"laser\", \"name\": \"x\"}, {\"type\": \"ui\", \"name\": \"\"}]\n```";
        let actions = parse_actions(text, Some(&ui_copilot()));
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].name, "search");
        assert!(actions[0].bound);
    }

    #[test]
    fn test_no_blocks_no_actions() {
        assert!(parse_actions("Just text with ```rust\nfn main() {}\n```", None).is_empty());
    }

    #[test]
    fn test_strip_actions() {
        let text = "Here you go.\n\n```actions\n[]\n```\n";
        assert_eq!(strip_actions(text), "Here you go.");
    }

    #[test]
    fn test_enhanced_prompt_includes_context() {
        let context = UiContext {
            current_view: "dashboard".to_string(),
            selected_element: Some("#revenue".to_string()),
            viewport_size: Some(ViewportSize {
                width: 1280,
                height: 720,
            }),
            theme: Some(Theme::Dark),
        };
        let prompt = enhanced_system_prompt("Base prompt.", &context);
        assert_eq!(
            prompt,
            "Base prompt.\n\nCurrent UI Context:\n- Current View: dashboard\n- Selected Element: #revenue\n- Viewport Size: 1280x720\n- Theme: dark"
        );
    }

    #[test]
    fn test_workflow_for_copilot() {
        let session = CopilotSession::new(CrewExecutor::new(Arc::new(ScriptedBackend::new())));
        let copilot = session.active().unwrap().clone();
        let workflow = session.workflow_for(&copilot, "Open settings");
        let graph = workflow.to_task_graph();

        assert_eq!(graph.tasks.len(), 1);
        assert_eq!(graph.tasks[0].description, "Open settings");
        assert_eq!(graph.tasks[0].temperature, Some(0.7));
        assert_eq!(graph.tasks[0].context["copilot_id"], "ui-copilot");
        assert!(graph.agents[0].system_prompt.contains("- Current View: home"));
        assert_eq!(graph.agents[0].tools.len(), 1);
    }

    #[tokio::test]
    async fn test_send_message_returns_text_and_actions() {
        let backend = Arc::new(ScriptedBackend::new().with_fallback(ScriptedReply::text(
            "Opening the report.\n```actions\n[{\"type\": \"ui\", \"name\": \"navigate\", \"parameters\": {\"url\": \"/r\"}}]\n```",
        )));
        let mut session = CopilotSession::new(CrewExecutor::new(backend.clone()));

        let reply = session.send_message("Show me the report").await.unwrap();
        assert!(reply.success);
        assert_eq!(reply.text, "Opening the report.");
        assert_eq!(reply.actions.len(), 1);
        assert!(reply.actions[0].bound);
        assert_eq!(session.history().len(), 2);

        session.send_message("Thanks").await.unwrap();
        // Earlier turns are sent as conversation history
        assert_eq!(backend.calls()[1].history.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_run_replies_with_apology() {
        let backend = Arc::new(ScriptedBackend::new().with_fallback(ScriptedReply::error("rate limited")));
        let mut session = CopilotSession::new(CrewExecutor::new(backend));

        let reply = session.send_message("hi").await.unwrap();
        assert!(!reply.success);
        assert_eq!(reply.text, APOLOGY_MESSAGE);
        assert!(reply.actions.is_empty());
    }

    #[tokio::test]
    async fn test_no_active_copilot() {
        let mut session = CopilotSession::empty(CrewExecutor::new(Arc::new(ScriptedBackend::new())));
        assert!(matches!(
            session.send_message("hi").await,
            Err(CopilotError::NoActiveCopilot)
        ));
    }

    #[test]
    fn test_ui_action_permissions() {
        let mut session = CopilotSession::new(CrewExecutor::new(Arc::new(ScriptedBackend::new())));

        let request = session
            .request_ui_action("fillForm", json!({"value": "Ada"}))
            .unwrap();
        assert_eq!(request.parameters, json!({"selector": "", "value": "Ada"}));

        assert!(matches!(
            session.request_ui_action("explode", Value::Null),
            Err(CopilotError::UnknownAction { .. })
        ));

        session.set_active(DEVELOPER_COPILOT_ID).unwrap();
        assert!(matches!(
            session.request_ui_action("navigate", Value::Null),
            Err(CopilotError::ActionNotPermitted { .. })
        ));
    }

    #[test]
    fn test_session_registry_management() {
        let mut session = CopilotSession::new(CrewExecutor::new(Arc::new(ScriptedBackend::new())));
        assert_eq!(session.copilots().len(), 3);
        assert!(matches!(
            session.set_active("missing"),
            Err(CopilotError::NotFound { .. })
        ));

        session.remove(UI_COPILOT_ID);
        assert!(session.active().is_none());
        assert!(session.register(CopilotConfig::new("", "Nameless", "x")).is_err());
    }
}
