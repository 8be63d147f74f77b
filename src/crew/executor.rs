//! Crew executor: runs every task of a plan and assembles the result.
//!
//! Tasks are issued in the plan's stable topological order. Each task runs on its
//! own tokio task holding a semaphore permit; `sequential` and `hierarchical` plans
//! get one permit, `parallel` plans get `max_parallel`. Workers report deltas,
//! progress and their final [`TaskResult`] over a channel back to the coordinating
//! loop, which owns the scheduler and forwards events to the caller in arrival order.

use crate::config::CrewToml;
use crate::crew::input::build_effective_input;
use crate::crew::retry::retry_with_policy;
use crate::crew::scheduler::CrewScheduler;
use crate::crew::state::{ExecutionResult, ExecutionTimer, RunState, TaskOutcome, TaskResult};
use crate::errors::{BackendError, ConfigurationError, TaskError};
use crate::graph::{CrewPlan, GraphBuilder, Process, RetryPolicy, TaskGraph, TaskIndex};
use crate::llm::{ChatMessage, CompletionBackend, CompletionParams, CompletionRequest};
use crate::registry::AgentRegistry;
use crate::stream::{CancelHandle, RunHandle, UpdateEvent};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Executor-wide defaults and limits.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Model used when an agent names none
    pub default_model: String,
    pub default_temperature: f32,
    pub default_max_tokens: u32,
    /// Retry policy for tasks that declare none
    pub default_retry: Option<RetryPolicy>,
    /// Concurrent tasks for `parallel` plans
    pub max_parallel: usize,
    /// Limit on each backend call
    pub task_timeout: Option<Duration>,
    /// Include recorded errors in user-facing messages
    pub expose_errors: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            default_model: crate::config::DEFAULT_MODEL.to_string(),
            default_temperature: 0.7,
            default_max_tokens: 4096,
            default_retry: None,
            max_parallel: 4,
            task_timeout: None,
            expose_errors: false,
        }
    }
}

impl ExecutorSettings {
    /// Derive settings from a loaded `crew.toml`.
    pub fn from_toml(toml: &CrewToml) -> Self {
        Self {
            default_model: toml.backend.default_model.clone(),
            default_temperature: toml.defaults.temperature,
            default_max_tokens: toml.defaults.max_tokens,
            default_retry: toml.defaults.retry.clone(),
            max_parallel: toml.execution.max_parallel,
            task_timeout: toml.execution.task_timeout_secs.map(Duration::from_secs),
            expose_errors: toml.execution.expose_errors,
        }
    }

    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = max;
        self
    }

    pub fn with_default_retry(mut self, retry: RetryPolicy) -> Self {
        self.default_retry = Some(retry);
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn with_default_model(mut self, model: &str) -> Self {
        self.default_model = model.to_string();
        self
    }

    pub fn with_expose_errors(mut self, expose: bool) -> Self {
        self.expose_errors = expose;
        self
    }
}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Conversation history placed before every task's user turn
    pub history: Vec<ChatMessage>,
    pub cancel: Option<CancelHandle>,
}

impl RunOptions {
    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Messages from task workers to the coordinating loop.
enum WorkerMessage {
    Event(UpdateEvent),
    Finished { index: TaskIndex, result: TaskResult },
}

/// Everything a worker needs to run one task.
struct TaskJob {
    task_id: String,
    agent_id: String,
    input: String,
    request: CompletionRequest,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    streaming: bool,
    backend: Arc<dyn CompletionBackend>,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

/// Runs task graphs against a completion backend.
#[derive(Clone)]
pub struct CrewExecutor {
    backend: Arc<dyn CompletionBackend>,
    settings: ExecutorSettings,
}

impl CrewExecutor {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            settings: ExecutorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn backend(&self) -> Arc<dyn CompletionBackend> {
        self.backend.clone()
    }

    /// Validate a graph into a plan, applying the default retry policy.
    pub fn plan(
        &self,
        graph: &TaskGraph,
        registry: Option<&AgentRegistry>,
    ) -> Result<Arc<CrewPlan>, ConfigurationError> {
        let mut builder =
            GraphBuilder::new(graph).with_default_retry(self.settings.default_retry.clone());
        if let Some(registry) = registry {
            builder = builder.with_registry(registry);
        }
        Ok(Arc::new(builder.build()?))
    }

    /// Validate and run a graph to completion.
    ///
    /// Only a [`ConfigurationError`] aborts the run; task failures are recorded in
    /// the returned result.
    pub async fn run_graph(
        &self,
        graph: &TaskGraph,
        input: &str,
    ) -> Result<ExecutionResult, ConfigurationError> {
        let plan = self.plan(graph, None)?;
        Ok(self.run_plan(plan, input, RunOptions::default()).await)
    }

    /// Like [`run_graph`](Self::run_graph), invoking `on_update` for every event.
    ///
    /// The callback runs on the executor's loop; a slow callback stalls delivery.
    pub async fn run_graph_streaming<F>(
        &self,
        graph: &TaskGraph,
        input: &str,
        on_update: F,
    ) -> Result<ExecutionResult, ConfigurationError>
    where
        F: FnMut(UpdateEvent) + Send,
    {
        let plan = self.plan(graph, None)?;
        Ok(self
            .run_plan_streaming(plan, input, RunOptions::default(), on_update)
            .await)
    }

    /// Run an already validated plan without streaming.
    pub async fn run_plan(
        &self,
        plan: Arc<CrewPlan>,
        input: &str,
        options: RunOptions,
    ) -> ExecutionResult {
        self.drive(plan, input, options, false, &mut |_event: UpdateEvent| {})
            .await
    }

    /// Run an already validated plan, streaming backend output to `on_update`.
    pub async fn run_plan_streaming<F>(
        &self,
        plan: Arc<CrewPlan>,
        input: &str,
        options: RunOptions,
        mut on_update: F,
    ) -> ExecutionResult
    where
        F: FnMut(UpdateEvent) + Send,
    {
        self.drive(plan, input, options, true, &mut on_update).await
    }

    /// Start a streaming run in the background and return a handle to pull
    /// events from, cancel, and join.
    pub fn spawn_streaming(
        &self,
        plan: Arc<CrewPlan>,
        input: &str,
        mut options: RunOptions,
    ) -> RunHandle {
        let cancel = options.cancel.clone().unwrap_or_default();
        options.cancel = Some(cancel.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let executor = self.clone();
        let input = input.to_string();

        let join = tokio::spawn(async move {
            executor
                .run_plan_streaming(plan, &input, options, move |event| {
                    tx.send(event).ok();
                })
                .await
        });

        RunHandle::new(rx, cancel, join)
    }

    async fn drive(
        &self,
        plan: Arc<CrewPlan>,
        input: &str,
        options: RunOptions,
        streaming: bool,
        on_update: &mut (dyn FnMut(UpdateEvent) + Send),
    ) -> ExecutionResult {
        let timer = ExecutionTimer::start();
        let run_id = Uuid::new_v4().to_string();
        let token = options
            .cancel
            .as_ref()
            .map(|c| c.token().clone())
            .unwrap_or_default();

        info!(
            run = %run_id,
            graph = plan.graph_id(),
            tasks = plan.len(),
            process = %plan.process(),
            "Starting crew run"
        );
        debug!(order = ?plan.execution_order_ids(), "Execution order");

        let limit = match plan.process() {
            Process::Parallel => self.settings.max_parallel.max(1),
            Process::Sequential => 1,
            Process::Hierarchical => {
                warn!(
                    graph = plan.graph_id(),
                    "Hierarchical process has no manager agent; running sequentially"
                );
                1
            }
        };

        let mut scheduler = CrewScheduler::new(plan.clone());
        let mut results: Vec<Option<TaskResult>> = vec![None; plan.len()];
        let mut outputs: Vec<Option<String>> = vec![None; plan.len()];

        let semaphore = Arc::new(Semaphore::new(limit));
        let (tx, mut rx) = mpsc::unbounded_channel::<WorkerMessage>();
        let mut active: HashMap<TaskIndex, JoinHandle<()>> = HashMap::new();

        loop {
            if !token.is_cancelled() {
                while let Some(index) = scheduler.next_ready() {
                    let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                        break;
                    };

                    let job = self.prepare_job(
                        &plan,
                        index,
                        input,
                        &outputs,
                        &options.history,
                        streaming,
                        &token,
                        tx.clone(),
                    );

                    scheduler.mark_running(index);
                    info!(task = %job.task_id, agent = %job.agent_id, "Starting task");
                    debug!(task = %job.task_id, input = %job.input, "Effective input");
                    on_update(UpdateEvent::progress(
                        &job.task_id,
                        format!("Starting task {} with agent {}", job.task_id, job.agent_id),
                    ));

                    let handle = tokio::spawn(async move {
                        let _permit = permit;
                        let started = Utc::now();
                        let result = AssertUnwindSafe(execute_single_task(&job))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|panic| {
                                TaskResult::failure(
                                    &job.task_id,
                                    &job.agent_id,
                                    job.input.clone(),
                                    &format!("task worker panicked: {}", panic_message(&*panic)),
                                    started,
                                    1,
                                )
                            });
                        job.tx
                            .send(WorkerMessage::Finished { index, result })
                            .ok();
                    });
                    active.insert(index, handle);
                }
            }

            if active.is_empty() {
                break;
            }

            match rx.recv().await {
                Some(WorkerMessage::Event(event)) => on_update(event),
                Some(WorkerMessage::Finished { index, result }) => {
                    if let Some(handle) = active.remove(&index) {
                        handle.await.ok();
                    }
                    self.record_finished(
                        &plan,
                        &mut scheduler,
                        &mut results,
                        &mut outputs,
                        index,
                        result,
                        on_update,
                    );
                }
                None => break,
            }
        }

        for index in scheduler.cancel_remaining() {
            let task = &plan.tasks()[index];
            info!(task = %task.id, "Task cancelled before execution");
            on_update(UpdateEvent::progress(
                &task.id,
                format!("Cancelled task {}", task.id),
            ));
            results[index] = Some(TaskResult::cancelled(
                &task.id,
                &task.agent_id,
                &TaskError::Cancelled.to_string(),
            ));
        }

        let task_results: Vec<TaskResult> = plan
            .execution_order()
            .iter()
            .filter_map(|&i| results[i].take())
            .collect();

        let result = assemble_result(&plan, run_id, input, task_results, &outputs, &timer);

        info!(
            run = %result.id,
            graph = %result.graph_id,
            state = %result.state,
            duration_ms = result.duration.as_millis() as u64,
            "Crew run finished"
        );

        if let Some(error) = &result.error {
            let task_id = result
                .task_results
                .iter()
                .find(|r| r.status == TaskOutcome::Failed)
                .map(|r| r.task_id.clone());
            on_update(UpdateEvent::Error {
                task_id,
                error: error.clone(),
            });
        }
        on_update(UpdateEvent::Complete {
            result: result.final_output.clone(),
        });

        result
    }

    #[allow(clippy::too_many_arguments)]
    fn prepare_job(
        &self,
        plan: &CrewPlan,
        index: TaskIndex,
        initial_input: &str,
        outputs: &[Option<String>],
        history: &[ChatMessage],
        streaming: bool,
        token: &CancellationToken,
        tx: mpsc::UnboundedSender<WorkerMessage>,
    ) -> TaskJob {
        let task = &plan.tasks()[index];
        let agent = plan.agent_at(index);
        let input = build_effective_input(plan, index, initial_input, outputs);

        let params = CompletionParams {
            model: agent
                .model
                .clone()
                .unwrap_or_else(|| self.settings.default_model.clone()),
            temperature: task
                .temperature
                .or(agent.temperature)
                .unwrap_or(self.settings.default_temperature),
            max_tokens: task
                .max_tokens
                .or(agent.max_tokens)
                .unwrap_or(self.settings.default_max_tokens),
        };

        TaskJob {
            task_id: task.id.clone(),
            agent_id: agent.id.clone(),
            request: CompletionRequest {
                system_prompt: agent.system_prompt.clone(),
                history: history.to_vec(),
                user_input: input.clone(),
                params,
            },
            input,
            retry: task
                .retry
                .clone()
                .or_else(|| self.settings.default_retry.clone())
                .unwrap_or_default(),
            timeout: self.settings.task_timeout,
            streaming,
            backend: self.backend.clone(),
            cancel: token.clone(),
            tx,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record_finished(
        &self,
        plan: &CrewPlan,
        scheduler: &mut CrewScheduler,
        results: &mut [Option<TaskResult>],
        outputs: &mut [Option<String>],
        index: TaskIndex,
        result: TaskResult,
        on_update: &mut (dyn FnMut(UpdateEvent) + Send),
    ) {
        let task_id = result.task_id.clone();

        if result.status == TaskOutcome::Cancelled {
            info!(task = %task_id, attempts = result.attempts, "Task cancelled while retrying");
            scheduler.mark_cancelled(index);
            on_update(UpdateEvent::progress(
                &task_id,
                format!("Cancelled task {}", task_id),
            ));
        } else if result.success {
            info!(task = %task_id, attempts = result.attempts, "Task completed");
            scheduler.mark_succeeded(index);
            outputs[index] = Some(result.output.clone());
            on_update(UpdateEvent::progress(
                &task_id,
                format!("Completed task {}", task_id),
            ));
        } else {
            let error = result.error.clone().unwrap_or_default();
            error!(task = %task_id, attempts = result.attempts, error = %error, "Task failed");
            on_update(UpdateEvent::progress(
                &task_id,
                format!("Task {} failed: {}", task_id, error),
            ));

            for (skipped, upstream) in scheduler.mark_failed(index, &error) {
                let task = &plan.tasks()[skipped];
                let reason = TaskError::UpstreamFailure {
                    task_id: upstream.clone(),
                }
                .to_string();
                info!(task = %task.id, upstream = %upstream, "Skipping task");
                on_update(UpdateEvent::progress(
                    &task.id,
                    format!("Skipped task {}: {}", task.id, reason),
                ));
                results[skipped] = Some(TaskResult::skipped(&task.id, &task.agent_id, &reason));
            }
        }

        results[index] = Some(result);
    }
}

/// Run one task with retries and build its result.
async fn execute_single_task(job: &TaskJob) -> TaskResult {
    let started = Utc::now();

    let outcome = retry_with_policy(
        &job.task_id,
        &job.retry,
        &job.cancel,
        |attempt| {
            let backend = job.backend.clone();
            let request = job.request.clone();
            let tx = job.tx.clone();
            let task_id = job.task_id.clone();
            let streaming = job.streaming;
            let timeout = job.timeout;
            async move {
                debug!(task = %task_id, attempt, "Invoking backend");
                call_backend(backend.as_ref(), &request, &task_id, streaming, timeout, &tx).await
            }
        },
        |next_attempt, error| {
            job.tx
                .send(WorkerMessage::Event(UpdateEvent::progress(
                    &job.task_id,
                    format!(
                        "Retrying task {} (attempt {} of {}): {}",
                        job.task_id, next_attempt, job.retry.max_attempts, error
                    ),
                )))
                .ok();
        },
    )
    .await;

    match outcome.result {
        Ok(output) => TaskResult::success(
            &job.task_id,
            &job.agent_id,
            job.input.clone(),
            output,
            started,
            outcome.attempts,
        ),
        Err(TaskError::Cancelled) => TaskResult::interrupted(
            &job.task_id,
            &job.agent_id,
            job.input.clone(),
            &TaskError::Cancelled.to_string(),
            started,
            outcome.attempts,
        ),
        Err(err) => TaskResult::failure(
            &job.task_id,
            &job.agent_id,
            job.input.clone(),
            &err.to_string(),
            started,
            outcome.attempts,
        ),
    }
}

/// One backend attempt, streaming deltas back as content events when requested.
///
/// A failure after at least one delta was delivered is a transport failure: it is
/// reported as an error event and not retried.
async fn call_backend(
    backend: &dyn CompletionBackend,
    request: &CompletionRequest,
    task_id: &str,
    streaming: bool,
    timeout: Option<Duration>,
    tx: &mpsc::UnboundedSender<WorkerMessage>,
) -> Result<String, TaskError> {
    if !streaming {
        return with_timeout(timeout, backend.complete(request)).await;
    }

    let mut accumulated = String::new();
    let mut delivered = 0usize;
    let result = {
        let mut on_delta = |delta: &str| {
            accumulated.push_str(delta);
            delivered += 1;
            tx.send(WorkerMessage::Event(UpdateEvent::Content {
                task_id: task_id.to_string(),
                content: delta.to_string(),
                accumulated_content: accumulated.clone(),
            }))
            .ok();
        };
        with_timeout(timeout, backend.complete_streaming(request, &mut on_delta)).await
    };

    match result {
        Err(TaskError::Backend(err)) if delivered > 0 => {
            let transport = TaskError::StreamingTransport(err.to_string());
            tx.send(WorkerMessage::Event(UpdateEvent::Error {
                task_id: Some(task_id.to_string()),
                error: transport.to_string(),
            }))
            .ok();
            Err(transport)
        }
        other => other,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn with_timeout<F>(timeout: Option<Duration>, call: F) -> Result<String, TaskError>
where
    F: Future<Output = Result<String, BackendError>>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result.map_err(TaskError::from),
            Err(_) => Err(BackendError::Timeout {
                secs: limit.as_secs(),
            }
            .into()),
        },
        None => call.await.map_err(TaskError::from),
    }
}

fn assemble_result(
    plan: &CrewPlan,
    run_id: String,
    input: &str,
    task_results: Vec<TaskResult>,
    outputs: &[Option<String>],
    timer: &ExecutionTimer,
) -> ExecutionResult {
    let success = !task_results.is_empty() && task_results.iter().all(|r| r.success);
    let cancelled = task_results
        .iter()
        .any(|r| r.status == TaskOutcome::Cancelled);

    let state = if cancelled {
        RunState::Cancelled
    } else if success {
        RunState::Completed
    } else {
        RunState::Failed
    };

    let terminal = plan.terminal_task();
    let final_output = terminal
        .and_then(|i| outputs.get(i).cloned().flatten())
        .unwrap_or_default();

    let error = task_results
        .iter()
        .find(|r| r.status == TaskOutcome::Failed)
        .map(|r| {
            format!(
                "Task {} failed: {}",
                r.task_id,
                r.error.as_deref().unwrap_or("unknown error")
            )
        })
        .or_else(|| cancelled.then(|| "Run cancelled before all tasks were issued".to_string()));

    let end_time = Utc::now();
    ExecutionResult {
        id: run_id,
        graph_id: plan.graph_id().to_string(),
        graph_name: plan.graph_name().to_string(),
        input: input.to_string(),
        final_output,
        task_results,
        success,
        error,
        state,
        terminal_task: terminal.and_then(|i| plan.task(i)).map(|t| t.id.clone()),
        start_time: timer.started_at(),
        end_time,
        duration: timer.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentDefinition;
    use crate::graph::Task;
    use crate::llm::{ScriptedBackend, ScriptedReply};

    fn executor(backend: ScriptedBackend) -> (CrewExecutor, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        (CrewExecutor::new(backend.clone()), backend)
    }

    fn linear_graph() -> TaskGraph {
        TaskGraph::new("linear", "Linear")
            .with_agent(AgentDefinition::new("a", "Agent", "You help."))
            .with_task(Task::new("A", "Step A", "a"))
            .with_task(Task::new("B", "Step B", "a").depends_on("A"))
            .with_task(Task::new("C", "Step C", "a").depends_on("B"))
    }

    #[tokio::test]
    async fn test_parameters_resolve_task_then_agent_then_default() {
        let (exec, backend) = executor(ScriptedBackend::new());
        let exec = exec.with_settings(ExecutorSettings::default().with_default_model("fallback-model"));
        let graph = TaskGraph::new("g", "G")
            .with_agent(
                AgentDefinition::new("a", "A", "sys")
                    .with_temperature(0.2)
                    .with_max_tokens(100),
            )
            .with_task(Task::new("t1", "First", "a").with_temperature(0.9))
            .with_task(Task::new("t2", "Second", "a"));

        exec.run_graph(&graph, "").await.unwrap();

        let calls = backend.calls();
        assert_eq!(calls[0].params.temperature, 0.9);
        assert_eq!(calls[0].params.max_tokens, 100);
        assert_eq!(calls[0].params.model, "fallback-model");
        assert_eq!(calls[1].params.temperature, 0.2);
        assert_eq!(calls[0].system_prompt, "sys");
    }

    #[tokio::test]
    async fn test_history_is_passed_to_every_task() {
        let (exec, backend) = executor(ScriptedBackend::new());
        let plan = exec.plan(&linear_graph(), None).unwrap();
        let options = RunOptions::default().with_history(vec![
            ChatMessage::user("earlier question"),
            ChatMessage::assistant("earlier answer"),
        ]);

        exec.run_plan(plan, "", options).await;

        for call in backend.calls() {
            assert_eq!(call.history.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_final_output_and_terminal_task() {
        let (exec, _) = executor(
            ScriptedBackend::new()
                .when_input_contains("Step C", ScriptedReply::text("c-out"))
                .when_input_contains("Step B", ScriptedReply::text("b-out"))
                .when_input_contains("Step A", ScriptedReply::text("a-out")),
        );
        let result = exec.run_graph(&linear_graph(), "go").await.unwrap();

        assert!(result.success);
        assert_eq!(result.state, RunState::Completed);
        assert_eq!(result.terminal_task.as_deref(), Some("C"));
        assert_eq!(result.final_output, "c-out");
        let ids: Vec<&str> = result.task_results.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_timeout_is_a_backend_failure() {
        struct Slow;

        #[async_trait::async_trait]
        impl CompletionBackend for Slow {
            fn name(&self) -> &str {
                "slow"
            }

            async fn complete(&self, _request: &CompletionRequest) -> Result<String, BackendError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("late".to_string())
            }
        }

        let exec = CrewExecutor::new(Arc::new(Slow))
            .with_settings(ExecutorSettings::default().with_task_timeout(Duration::from_millis(20)));
        let graph = TaskGraph::new("g", "G")
            .with_agent(AgentDefinition::new("a", "A", "x"))
            .with_task(Task::new("t1", "Slow task", "a"));

        let result = exec.run_graph(&graph, "").await.unwrap();
        assert!(!result.success);
        assert!(result.task_results[0]
            .error()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_mid_stream_failure_is_transport_error() {
        let (exec, backend) = executor(ScriptedBackend::new().with_fallback(
            ScriptedReply::BreakAfter(vec!["partial".to_string()], "reset".to_string()),
        ));
        let exec = exec.with_settings(
            ExecutorSettings::default()
                .with_default_retry(RetryPolicy::fixed(3, Duration::from_millis(1))),
        );
        let graph = TaskGraph::new("g", "G")
            .with_agent(AgentDefinition::new("a", "A", "x"))
            .with_task(Task::new("t1", "Stream", "a"));

        let mut events = Vec::new();
        let result = exec
            .run_graph_streaming(&graph, "", |e| events.push(e))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(backend.call_count(), 1);
        assert_eq!(
            result.task_results[0].error(),
            Some("stream interrupted: reset")
        );
        assert!(events.iter().any(|e| matches!(
            e,
            UpdateEvent::Error { task_id: Some(id), .. } if id == "t1"
        )));
        assert!(matches!(events.last(), Some(UpdateEvent::Complete { .. })));
    }

    #[tokio::test]
    async fn test_panicking_backend_fails_only_its_task() {
        struct Explosive;

        #[async_trait::async_trait]
        impl CompletionBackend for Explosive {
            fn name(&self) -> &str {
                "explosive"
            }

            async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
                if request.user_input.contains("Detonate") {
                    panic!("backend blew up");
                }
                Ok("fine".to_string())
            }
        }

        let exec = CrewExecutor::new(Arc::new(Explosive));
        let graph = TaskGraph::new("g", "G")
            .with_process(Process::Parallel)
            .with_agent(AgentDefinition::new("a", "A", "x"))
            .with_task(Task::new("t1", "Detonate", "a"))
            .with_task(Task::new("t2", "Independent", "a"))
            .with_task(Task::new("t3", "After t1", "a").depends_on("t1"));

        let result = tokio::time::timeout(Duration::from_secs(3), exec.run_graph(&graph, ""))
            .await
            .expect("run finishes after a worker panic")
            .unwrap();

        assert!(!result.success);
        let t1 = result.task_result("t1").unwrap();
        assert_eq!(t1.status, TaskOutcome::Failed);
        assert_eq!(t1.error(), Some("task worker panicked: backend blew up"));
        assert_eq!(result.task_result("t2").unwrap().status, TaskOutcome::Succeeded);
        let t3 = result.task_result("t3").unwrap();
        assert_eq!(t3.status, TaskOutcome::Skipped);
        assert_eq!(t3.error(), Some("upstream task t1 failed"));
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_records_cancelled() {
        let (exec, backend) = executor(ScriptedBackend::new().with_fallback(ScriptedReply::error("down")));
        let exec = exec.with_settings(
            ExecutorSettings::default()
                .with_default_retry(RetryPolicy::fixed(5, Duration::from_secs(60))),
        );
        let plan = exec.plan(&linear_graph(), None).unwrap();
        let cancel = CancelHandle::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            exec.run_plan(plan, "", RunOptions::default().with_cancel(cancel)),
        )
        .await
        .expect("cancellation interrupts the backoff");

        assert_eq!(backend.call_count(), 1);
        assert_eq!(result.state, RunState::Cancelled);
        let first = result.task_result("A").unwrap();
        assert_eq!(first.status, TaskOutcome::Cancelled);
        assert_eq!(first.error(), Some("run cancelled"));
        assert_eq!(first.attempts, 1);
        assert_eq!(result.count(TaskOutcome::Cancelled), 3);
        assert_eq!(result.count(TaskOutcome::Failed), 0);
    }

    #[tokio::test]
    async fn test_hierarchical_runs_in_declaration_order() {
        let (exec, backend) = executor(ScriptedBackend::new());
        let graph = TaskGraph::new("g", "G")
            .with_process(Process::Hierarchical)
            .with_agent(AgentDefinition::new("a", "A", "x"))
            .with_task(Task::new("one", "one", "a"))
            .with_task(Task::new("two", "two", "a"))
            .with_task(Task::new("three", "three", "a"));

        let result = exec.run_graph(&graph, "").await.unwrap();
        assert!(result.success);
        let inputs: Vec<String> = backend.calls().into_iter().map(|c| c.user_input).collect();
        assert_eq!(inputs, vec!["one", "two", "three"]);
        // Nothing depends on any task; the last in order is terminal
        assert_eq!(result.terminal_task.as_deref(), Some("three"));
    }
}
