//! Run and task result types.
//!
//! A [`TaskResult`] is created exactly once per task per run and never mutated
//! afterwards. The [`ExecutionResult`] aggregates them in execution order and is
//! handed to the caller, who owns it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Generic text shown to end users when a run fails.
pub const APOLOGY_MESSAGE: &str =
    "I encountered an error while processing your request. Please try again later.";

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Every task succeeded
    Completed,
    /// At least one task failed or was skipped
    Failed,
    /// The run was cancelled before every task was issued
    Cancelled,
}

impl RunState {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Completed => write!(f, "completed"),
            RunState::Failed => write!(f, "failed"),
            RunState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal outcome of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    /// Not run because a dependency failed
    Skipped,
    /// Not run because the run was cancelled
    Cancelled,
}

/// Result of executing (or not executing) a single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub agent_id: String,
    /// Effective input sent to the backend; empty when the task never ran
    pub input: String,
    /// Raw text output; empty unless the task succeeded
    pub output: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: TaskOutcome,
    /// Backend invocations made for this task
    pub attempts: u32,
}

impl TaskResult {
    /// Create a successful task result.
    pub fn success(
        task_id: &str,
        agent_id: &str,
        input: String,
        output: String,
        start_time: DateTime<Utc>,
        attempts: u32,
    ) -> Self {
        let end_time = Utc::now();
        Self {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            input,
            output,
            start_time,
            end_time,
            duration: elapsed_between(start_time, end_time),
            success: true,
            error: None,
            status: TaskOutcome::Succeeded,
            attempts,
        }
    }

    /// Create a failed task result.
    pub fn failure(
        task_id: &str,
        agent_id: &str,
        input: String,
        error: &str,
        start_time: DateTime<Utc>,
        attempts: u32,
    ) -> Self {
        let end_time = Utc::now();
        Self {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            input,
            output: String::new(),
            start_time,
            end_time,
            duration: elapsed_between(start_time, end_time),
            success: false,
            error: Some(error.to_string()),
            status: TaskOutcome::Failed,
            attempts,
        }
    }

    /// Create the result for a task whose run was cancelled while it was in flight.
    pub fn interrupted(
        task_id: &str,
        agent_id: &str,
        input: String,
        error: &str,
        start_time: DateTime<Utc>,
        attempts: u32,
    ) -> Self {
        Self {
            status: TaskOutcome::Cancelled,
            ..Self::failure(task_id, agent_id, input, error, start_time, attempts)
        }
    }

    /// Create the result for a task that never ran because a dependency failed.
    pub fn skipped(task_id: &str, agent_id: &str, error: &str) -> Self {
        Self::not_run(task_id, agent_id, error, TaskOutcome::Skipped)
    }

    /// Create the result for a task that never ran because the run was cancelled.
    pub fn cancelled(task_id: &str, agent_id: &str, error: &str) -> Self {
        Self::not_run(task_id, agent_id, error, TaskOutcome::Cancelled)
    }

    fn not_run(task_id: &str, agent_id: &str, error: &str, status: TaskOutcome) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            input: String::new(),
            output: String::new(),
            start_time: now,
            end_time: now,
            duration: Duration::ZERO,
            success: false,
            error: Some(error.to_string()),
            status,
            attempts: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Aggregate outcome of running a task graph once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Unique per run
    pub id: String,
    pub graph_id: String,
    pub graph_name: String,
    pub input: String,
    /// Output of the terminal task; empty if it did not succeed
    pub final_output: String,
    /// One result per task, in execution order
    pub task_results: Vec<TaskResult>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub state: RunState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_task: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn task_result(&self, task_id: &str) -> Option<&TaskResult> {
        self.task_results.iter().find(|r| r.task_id == task_id)
    }

    /// Number of tasks with the given outcome.
    pub fn count(&self, outcome: TaskOutcome) -> usize {
        self.task_results
            .iter()
            .filter(|r| r.status == outcome)
            .count()
    }

    /// Percentage of tasks that succeeded.
    pub fn completion_percentage(&self) -> f64 {
        if self.task_results.is_empty() {
            return 100.0;
        }
        (self.count(TaskOutcome::Succeeded) as f64 / self.task_results.len() as f64) * 100.0
    }

    /// Text suitable for an end user.
    ///
    /// Successful runs yield the final output. Failed runs yield a generic apology;
    /// the recorded error is appended only when `expose_errors` is set.
    pub fn user_message(&self, expose_errors: bool) -> String {
        if self.success {
            return self.final_output.clone();
        }
        match (&self.error, expose_errors) {
            (Some(error), true) => format!("{}\n\nError: {}", APOLOGY_MESSAGE, error),
            _ => APOLOGY_MESSAGE.to_string(),
        }
    }
}

/// Tracks execution timing.
pub struct ExecutionTimer {
    start: Instant,
    started_at: DateTime<Utc>,
}

impl ExecutionTimer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

fn elapsed_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
    (end - start).to_std().unwrap_or_default()
}

/// Serde helpers for Duration serialization as milliseconds.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(task_results: Vec<TaskResult>, error: Option<&str>) -> ExecutionResult {
        let success = task_results.iter().all(|r| r.success);
        let now = Utc::now();
        ExecutionResult {
            id: "run".to_string(),
            graph_id: "g".to_string(),
            graph_name: "G".to_string(),
            input: String::new(),
            final_output: if success { "done".to_string() } else { String::new() },
            task_results,
            success,
            error: error.map(String::from),
            state: if success {
                RunState::Completed
            } else {
                RunState::Failed
            },
            terminal_task: None,
            start_time: now,
            end_time: now,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_task_result_success() {
        let result = TaskResult::success("t1", "a", "in".into(), "out".into(), Utc::now(), 1);
        assert!(result.is_success());
        assert_eq!(result.status, TaskOutcome::Succeeded);
        assert!(result.error().is_none());
        assert!(result.end_time >= result.start_time);
    }

    #[test]
    fn test_task_result_failure() {
        let result = TaskResult::failure("t1", "a", "in".into(), "rate limited", Utc::now(), 3);
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("rate limited"));
        assert_eq!(result.attempts, 3);
        assert!(result.output.is_empty());
    }

    #[test]
    fn test_interrupted_result_keeps_attempts() {
        let result = TaskResult::interrupted("t1", "a", "in".into(), "run cancelled", Utc::now(), 2);
        assert_eq!(result.status, TaskOutcome::Cancelled);
        assert!(!result.is_success());
        assert_eq!(result.attempts, 2);
        assert_eq!(result.input, "in");
    }

    #[test]
    fn test_skipped_result_never_ran() {
        let result = TaskResult::skipped("t2", "w", "upstream task t1 failed");
        assert_eq!(result.status, TaskOutcome::Skipped);
        assert_eq!(result.attempts, 0);
        assert_eq!(result.duration, Duration::ZERO);
    }

    #[test]
    fn test_counts_and_percentage() {
        let result = result_with(
            vec![
                TaskResult::success("a", "x", String::new(), "1".into(), Utc::now(), 1),
                TaskResult::failure("b", "x", String::new(), "err", Utc::now(), 1),
                TaskResult::skipped("c", "x", "upstream task b failed"),
                TaskResult::success("d", "x", String::new(), "2".into(), Utc::now(), 1),
            ],
            Some("err"),
        );
        assert_eq!(result.count(TaskOutcome::Succeeded), 2);
        assert_eq!(result.count(TaskOutcome::Skipped), 1);
        assert_eq!(result.completion_percentage(), 50.0);
        assert_eq!(result.task_result("b").unwrap().error(), Some("err"));
    }

    #[test]
    fn test_user_message_hides_errors_by_default() {
        let result = result_with(
            vec![TaskResult::failure("a", "x", String::new(), "401 invalid key sk-123", Utc::now(), 1)],
            Some("401 invalid key sk-123"),
        );
        assert_eq!(result.user_message(false), APOLOGY_MESSAGE);
        assert!(result.user_message(true).contains("401 invalid key"));
    }

    #[test]
    fn test_user_message_on_success_is_final_output() {
        let result = result_with(
            vec![TaskResult::success("a", "x", String::new(), "done".into(), Utc::now(), 1)],
            None,
        );
        assert_eq!(result.user_message(false), "done");
    }

    #[test]
    fn test_duration_serializes_as_millis() {
        let mut result = TaskResult::skipped("t", "a", "x");
        result.duration = Duration::from_millis(1500);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration"], 1500);
        assert_eq!(json["status"], "skipped");
    }
}
