//! Incremental update events produced while a run executes.
//!
//! Consumers either pass a synchronous callback to
//! [`CrewExecutor::run_graph_streaming`](crate::crew::CrewExecutor::run_graph_streaming)
//! or pull from a [`RunHandle`] returned by
//! [`CrewExecutor::spawn_streaming`](crate::crew::CrewExecutor::spawn_streaming).
//! Events for one task always arrive in generation order. The sequence is finite
//! and cannot be restarted.

use crate::crew::ExecutionResult;
use crate::errors::TaskError;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A discrete update delivered to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateEvent {
    /// A task started, retried, finished or was skipped
    Progress { task_id: String, message: String },
    /// One delta of backend output
    Content {
        task_id: String,
        content: String,
        /// All text produced so far for the current attempt of this task
        accumulated_content: String,
    },
    /// The whole run finished; carries the final output
    Complete { result: String },
    /// Mid-stream transport failure or failed run
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
        error: String,
    },
}

impl UpdateEvent {
    pub fn progress(task_id: &str, message: impl Into<String>) -> Self {
        Self::Progress {
            task_id: task_id.to_string(),
            message: message.into(),
        }
    }

    /// Task the event belongs to, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::Progress { task_id, .. } | Self::Content { task_id, .. } => Some(task_id),
            Self::Error { task_id, .. } => task_id.as_deref(),
            Self::Complete { .. } => None,
        }
    }
}

/// Signal back to a running executor to stop issuing tasks.
///
/// In-flight backend calls finish; every task not yet issued is recorded as
/// cancelled. Cloning yields a handle to the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// A run executing on a background task, consumed by pulling events.
pub struct RunHandle {
    events: mpsc::UnboundedReceiver<UpdateEvent>,
    cancel: CancelHandle,
    join: JoinHandle<ExecutionResult>,
}

impl RunHandle {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<UpdateEvent>,
        cancel: CancelHandle,
        join: JoinHandle<ExecutionResult>,
    ) -> Self {
        Self {
            events,
            cancel,
            join,
        }
    }

    /// Next event, or `None` once the run has finished and all events were drained.
    pub async fn next_event(&mut self) -> Option<UpdateEvent> {
        self.events.recv().await
    }

    /// Stop issuing further tasks.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait for the run to finish, discarding any events not yet pulled.
    pub async fn wait(self) -> Result<ExecutionResult, TaskError> {
        drop(self.events);
        self.join
            .await
            .map_err(|e| TaskError::StreamingTransport(format!("run task aborted: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_event_serialization() {
        let event = UpdateEvent::Content {
            task_id: "t1".to_string(),
            content: " world".to_string(),
            accumulated_content: "Hello world".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "content");
        assert_eq!(json["accumulated_content"], "Hello world");
    }

    #[test]
    fn test_error_event_without_task_omits_field() {
        let event = UpdateEvent::Error {
            task_id: None,
            error: "run failed".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"error","error":"run failed"}"#);
    }

    #[test]
    fn test_parse_progress_event() {
        let json = r#"{"type":"progress","task_id":"t2","message":"Starting task t2"}"#;
        let event: UpdateEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, UpdateEvent::progress("t2", "Starting task t2"));
        assert_eq!(event.task_id(), Some("t2"));
    }

    #[test]
    fn test_cancel_handle_clones_share_signal() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        assert!(clone.is_cancelled());
    }
}
