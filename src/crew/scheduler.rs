//! Per-task state machine and ready-set computation.
//!
//! The scheduler tracks one [`TaskStatus`] per task of a [`CrewPlan`] and answers
//! which tasks may be issued next. Failure propagates eagerly: marking a task
//! failed marks every transitive dependent skipped.

use crate::graph::{CrewPlan, TaskIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Status of a task within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet considered
    #[default]
    Pending,
    /// Waiting on dependencies that have not completed
    Blocked { waiting_on: Vec<String> },
    /// Dependencies satisfied, not yet issued
    Ready,
    /// Issued to the backend
    Running { started_at_ms: u64 },
    Succeeded,
    Failed { error: String },
    /// Never issued because a dependency failed
    Skipped { upstream: String },
    /// Not issued, or interrupted during retry backoff, because the run was cancelled
    Cancelled,
}

impl TaskStatus {
    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed { .. } | Self::Skipped { .. } | Self::Cancelled
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Failed or skipped: dependents must not run.
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Skipped { .. })
    }
}

/// Tracks task statuses for one run of a plan.
#[derive(Debug)]
pub struct CrewScheduler {
    plan: Arc<CrewPlan>,
    statuses: Vec<TaskStatus>,
    completed: HashSet<TaskIndex>,
}

impl CrewScheduler {
    pub fn new(plan: Arc<CrewPlan>) -> Self {
        let mut scheduler = Self {
            statuses: vec![TaskStatus::Pending; plan.len()],
            plan,
            completed: HashSet::new(),
        };
        scheduler.refresh();
        scheduler
    }

    pub fn plan(&self) -> &CrewPlan {
        &self.plan
    }

    pub fn status(&self, index: TaskIndex) -> Option<&TaskStatus> {
        self.statuses.get(index)
    }

    pub fn status_of(&self, task_id: &str) -> Option<&TaskStatus> {
        self.plan.index_of(task_id).and_then(|i| self.statuses.get(i))
    }

    /// Move waiting tasks between `Blocked` and `Ready`.
    fn refresh(&mut self) {
        for index in 0..self.statuses.len() {
            if !matches!(
                self.statuses[index],
                TaskStatus::Pending | TaskStatus::Blocked { .. } | TaskStatus::Ready
            ) {
                continue;
            }
            let waiting_on: Vec<String> = self
                .plan
                .dependencies(index)
                .iter()
                .filter(|dep| !self.completed.contains(dep))
                .filter_map(|&dep| self.plan.task(dep).map(|t| t.id.clone()))
                .collect();

            self.statuses[index] = if waiting_on.is_empty() {
                TaskStatus::Ready
            } else {
                TaskStatus::Blocked { waiting_on }
            };
        }
    }

    /// Ready tasks in execution order.
    pub fn ready_tasks(&self) -> Vec<TaskIndex> {
        self.plan
            .execution_order()
            .iter()
            .copied()
            .filter(|&i| matches!(self.statuses[i], TaskStatus::Ready))
            .collect()
    }

    /// The earliest ready task in execution order.
    pub fn next_ready(&self) -> Option<TaskIndex> {
        self.plan
            .execution_order()
            .iter()
            .copied()
            .find(|&i| matches!(self.statuses[i], TaskStatus::Ready))
    }

    /// Group tasks into waves that could run concurrently.
    pub fn compute_waves(&self) -> Vec<Vec<String>> {
        let mut waves = Vec::new();
        let mut done: HashSet<TaskIndex> = HashSet::new();

        loop {
            let ready: Vec<TaskIndex> = self
                .plan
                .execution_order()
                .iter()
                .copied()
                .filter(|i| !done.contains(i) && self.plan.dependencies_satisfied(*i, &done))
                .collect();

            if ready.is_empty() {
                break;
            }
            done.extend(ready.iter().copied());
            waves.push(
                ready
                    .into_iter()
                    .filter_map(|i| self.plan.task(i).map(|t| t.id.clone()))
                    .collect(),
            );
        }
        waves
    }

    pub fn mark_running(&mut self, index: TaskIndex) {
        if let Some(status) = self.statuses.get_mut(index) {
            *status = TaskStatus::Running {
                started_at_ms: std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64,
            };
        }
    }

    pub fn mark_succeeded(&mut self, index: TaskIndex) {
        if let Some(status) = self.statuses.get_mut(index) {
            *status = TaskStatus::Succeeded;
            self.completed.insert(index);
        }
        self.refresh();
    }

    /// Mark a task failed and skip its transitive dependents.
    ///
    /// Returns the newly skipped tasks paired with the id of the upstream task
    /// that blocked each of them, in execution order.
    pub fn mark_failed(&mut self, index: TaskIndex, error: &str) -> Vec<(TaskIndex, String)> {
        if let Some(status) = self.statuses.get_mut(index) {
            *status = TaskStatus::Failed {
                error: error.to_string(),
            };
        }
        let mut skipped = Vec::new();
        self.skip_dependents(index, &mut skipped);

        let order = self.plan.execution_order();
        skipped.sort_by_key(|(i, _)| order.iter().position(|x| x == i));
        skipped
    }

    /// Skip all tasks that depend on a failed or skipped task.
    fn skip_dependents(&mut self, failed: TaskIndex, skipped: &mut Vec<(TaskIndex, String)>) {
        let upstream = match self.plan.task(failed) {
            Some(task) => task.id.clone(),
            None => return,
        };
        let dependents: Vec<TaskIndex> = self.plan.dependents(failed).to_vec();
        for dep in dependents {
            if let Some(status) = self.statuses.get_mut(dep)
                && !status.is_terminal()
                && !status.is_running()
            {
                *status = TaskStatus::Skipped {
                    upstream: upstream.clone(),
                };
                skipped.push((dep, upstream.clone()));
                self.skip_dependents(dep, skipped);
            }
        }
    }

    /// Mark an in-flight task as cancelled. Its dependents are left for
    /// [`cancel_remaining`](Self::cancel_remaining).
    pub fn mark_cancelled(&mut self, index: TaskIndex) {
        if let Some(status) = self.statuses.get_mut(index) {
            *status = TaskStatus::Cancelled;
        }
    }

    /// Mark every task that has not been issued as cancelled.
    ///
    /// Returns the affected tasks in execution order.
    pub fn cancel_remaining(&mut self) -> Vec<TaskIndex> {
        let mut cancelled = Vec::new();
        for &index in self.plan.execution_order() {
            let status = &mut self.statuses[index];
            if !status.is_terminal() && !status.is_running() {
                *status = TaskStatus::Cancelled;
                cancelled.push(index);
            }
        }
        cancelled
    }

    pub fn all_complete(&self) -> bool {
        self.statuses.iter().all(TaskStatus::is_terminal)
    }

    pub fn all_success(&self) -> bool {
        self.statuses.iter().all(TaskStatus::is_success)
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.statuses.is_empty() {
            return 100.0;
        }
        let terminal = self.statuses.iter().filter(|s| s.is_terminal()).count();
        (terminal as f64 / self.statuses.len() as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentDefinition;
    use crate::graph::{GraphBuilder, Task, TaskGraph};

    fn scheduler(tasks: Vec<(&str, Vec<&str>)>) -> CrewScheduler {
        let mut graph =
            TaskGraph::new("g", "G").with_agent(AgentDefinition::new("a", "a", "x"));
        for (id, deps) in tasks {
            let mut task = Task::new(id, id, "a");
            for dep in deps {
                task = task.depends_on(dep);
            }
            graph = graph.with_task(task);
        }
        CrewScheduler::new(Arc::new(GraphBuilder::new(&graph).build().unwrap()))
    }

    #[test]
    fn test_wave_computation_diamond() {
        let s = scheduler(vec![
            ("01", vec![]),
            ("02", vec!["01"]),
            ("03", vec!["01"]),
            ("04", vec!["02", "03"]),
        ]);
        let waves = s.compute_waves();
        assert_eq!(waves, vec![vec!["01"], vec!["02", "03"], vec!["04"]]);
    }

    #[test]
    fn test_initial_statuses() {
        let s = scheduler(vec![("01", vec![]), ("02", vec!["01"])]);
        assert_eq!(s.status_of("01"), Some(&TaskStatus::Ready));
        assert_eq!(
            s.status_of("02"),
            Some(&TaskStatus::Blocked {
                waiting_on: vec!["01".to_string()]
            })
        );
    }

    #[test]
    fn test_ready_tasks_follow_completion() {
        let mut s = scheduler(vec![
            ("01", vec![]),
            ("02", vec!["01"]),
            ("03", vec!["01"]),
        ]);
        assert_eq!(s.ready_tasks(), vec![0]);

        s.mark_running(0);
        assert!(s.ready_tasks().is_empty());

        s.mark_succeeded(0);
        assert_eq!(s.ready_tasks(), vec![1, 2]);
        assert_eq!(s.next_ready(), Some(1));
    }

    #[test]
    fn test_failure_skips_transitive_dependents_only() {
        let mut s = scheduler(vec![
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["b"]),
            ("independent", vec![]),
        ]);
        s.mark_running(0);
        let skipped = s.mark_failed(0, "boom");

        assert_eq!(
            skipped,
            vec![(1, "a".to_string()), (2, "b".to_string())]
        );
        assert!(matches!(s.status_of("c"), Some(TaskStatus::Skipped { .. })));
        assert_eq!(s.status_of("independent"), Some(&TaskStatus::Ready));
        assert!(!s.all_complete());
    }

    #[test]
    fn test_mark_cancelled_keeps_dependents_pending() {
        let mut s = scheduler(vec![("a", vec![]), ("b", vec!["a"])]);
        s.mark_running(0);
        s.mark_cancelled(0);
        assert_eq!(s.status(0), Some(&TaskStatus::Cancelled));
        assert!(!s.status(1).unwrap().is_terminal());
        assert_eq!(s.cancel_remaining(), vec![1]);
        assert!(s.all_complete());
    }

    #[test]
    fn test_cancel_remaining_leaves_running_tasks() {
        let mut s = scheduler(vec![("a", vec![]), ("b", vec![]), ("c", vec!["a"])]);
        s.mark_running(0);
        let cancelled = s.cancel_remaining();
        assert_eq!(cancelled, vec![1, 2]);
        assert!(s.status(0).unwrap().is_running());
    }

    #[test]
    fn test_completion_tracking() {
        let mut s = scheduler(vec![("01", vec![]), ("02", vec!["01"])]);
        assert_eq!(s.completion_percentage(), 0.0);

        s.mark_succeeded(0);
        assert_eq!(s.completion_percentage(), 50.0);

        s.mark_succeeded(1);
        assert_eq!(s.completion_percentage(), 100.0);
        assert!(s.all_complete());
        assert!(s.all_success());
    }
}
