//! Best-effort in-memory cache of past runs, keyed by graph or workflow.
//!
//! Each key keeps at most `limit` results; the oldest is evicted first. Nothing is
//! persisted.

use crate::crew::{ExecutionResult, RunState};
use std::collections::{HashMap, VecDeque};

/// Bounded per-key history of execution results.
#[derive(Debug, Clone)]
pub struct ExecutionHistory {
    limit: usize,
    runs: HashMap<String, VecDeque<ExecutionResult>>,
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new(50)
    }
}

impl ExecutionHistory {
    /// A history keeping up to `limit` runs per key (at least one).
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            runs: HashMap::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Store a result under `key`, evicting the oldest beyond the limit.
    pub fn record(&mut self, key: &str, result: ExecutionResult) {
        let runs = self.runs.entry(key.to_string()).or_default();
        runs.push_back(result);
        while runs.len() > self.limit {
            runs.pop_front();
        }
    }

    /// Results for `key`, oldest first.
    pub fn results_for(&self, key: &str) -> Vec<&ExecutionResult> {
        self.runs
            .get(key)
            .map(|runs| runs.iter().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, key: &str) -> Option<&ExecutionResult> {
        self.runs.get(key).and_then(|runs| runs.back())
    }

    /// Look up a run by its id across all keys.
    pub fn find(&self, run_id: &str) -> Option<&ExecutionResult> {
        self.runs
            .values()
            .flat_map(|runs| runs.iter())
            .find(|r| r.id == run_id)
    }

    /// Number of stored runs for `key` that ended in `state`.
    pub fn count_with_state(&self, key: &str, state: RunState) -> usize {
        self.runs
            .get(key)
            .map(|runs| runs.iter().filter(|r| r.state == state).count())
            .unwrap_or(0)
    }

    /// Keys with at least one stored run, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.runs.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn clear(&mut self, key: &str) -> usize {
        self.runs.remove(key).map(|runs| runs.len()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.runs.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn run(id: &str, state: RunState) -> ExecutionResult {
        let now = Utc::now();
        ExecutionResult {
            id: id.to_string(),
            graph_id: "g".to_string(),
            graph_name: "G".to_string(),
            input: String::new(),
            final_output: String::new(),
            task_results: Vec::new(),
            success: state == RunState::Completed,
            error: None,
            state,
            terminal_task: None,
            start_time: now,
            end_time: now,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_record_and_query() {
        let mut history = ExecutionHistory::new(10);
        history.record("blog", run("r1", RunState::Completed));
        history.record("blog", run("r2", RunState::Failed));
        history.record("other", run("r3", RunState::Completed));

        let ids: Vec<&str> = history.results_for("blog").iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
        assert_eq!(history.latest("blog").unwrap().id, "r2");
        assert_eq!(history.count_with_state("blog", RunState::Failed), 1);
        assert_eq!(history.find("r3").unwrap().id, "r3");
        assert_eq!(history.keys(), vec!["blog", "other"]);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_oldest_evicted_beyond_limit() {
        let mut history = ExecutionHistory::new(2);
        for id in ["r1", "r2", "r3"] {
            history.record("wf", run(id, RunState::Completed));
        }
        let ids: Vec<&str> = history.results_for("wf").iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r3"]);
    }

    #[test]
    fn test_unknown_key_is_empty() {
        let mut history = ExecutionHistory::new(0);
        assert_eq!(history.limit(), 1);
        assert!(history.results_for("nope").is_empty());
        assert!(history.latest("nope").is_none());
        assert_eq!(history.clear("nope"), 0);
        assert!(history.is_empty());
    }
}
