//! Graph validation and construction of executable plans.
//!
//! [`GraphBuilder`] checks a [`TaskGraph`] once and produces a [`CrewPlan`]: the
//! tasks with their agents resolved, forward and reverse dependency edges, and a
//! stable topological execution order. No partial plans are ever produced.

use crate::agent::AgentDefinition;
use crate::errors::ConfigurationError;
use crate::graph::task::{Process, RetryPolicy, Task, TaskGraph};
use crate::registry::AgentRegistry;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Index into the plan's task list (declaration order).
pub type TaskIndex = usize;

/// A validated, immutable task graph ready for execution.
#[derive(Debug, Clone)]
pub struct CrewPlan {
    graph_id: String,
    graph_name: String,
    process: Process,
    /// Tasks in declaration order
    tasks: Vec<Task>,
    /// Resolved agent for each task, by task index
    agents: Vec<AgentDefinition>,
    /// Map from task id to index
    index_map: HashMap<String, TaskIndex>,
    /// index -> tasks that depend on it
    forward_edges: Vec<Vec<TaskIndex>>,
    /// index -> tasks it depends on
    reverse_edges: Vec<Vec<TaskIndex>>,
    /// Stable topological order
    order: Vec<TaskIndex>,
}

impl CrewPlan {
    pub fn graph_id(&self) -> &str {
        &self.graph_id
    }

    pub fn graph_name(&self) -> &str {
        &self.graph_name
    }

    pub fn process(&self) -> Process {
        self.process
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, index: TaskIndex) -> Option<&Task> {
        self.tasks.get(index)
    }

    pub fn task_by_id(&self, id: &str) -> Option<&Task> {
        self.index_of(id).and_then(|i| self.tasks.get(i))
    }

    pub fn index_of(&self, id: &str) -> Option<TaskIndex> {
        self.index_map.get(id).copied()
    }

    /// The agent a task is bound to.
    pub fn agent_for(&self, index: TaskIndex) -> Option<&AgentDefinition> {
        self.agents.get(index)
    }

    /// Like [`agent_for`](Self::agent_for) for indices known to be in range.
    pub(crate) fn agent_at(&self, index: TaskIndex) -> &AgentDefinition {
        &self.agents[index]
    }

    /// Tasks that depend on the given task.
    pub fn dependents(&self, index: TaskIndex) -> &[TaskIndex] {
        self.forward_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Tasks the given task depends on, in declared order.
    pub fn dependencies(&self, index: TaskIndex) -> &[TaskIndex] {
        self.reverse_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Tasks with no dependencies.
    pub fn root_tasks(&self) -> Vec<TaskIndex> {
        self.reverse_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Tasks nothing depends on.
    pub fn leaf_tasks(&self) -> Vec<TaskIndex> {
        self.forward_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Stable topological order: dependencies first, ties broken by declaration order.
    pub fn execution_order(&self) -> &[TaskIndex] {
        &self.order
    }

    /// Task ids in execution order.
    pub fn execution_order_ids(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&i| self.tasks[i].id.as_str())
            .collect()
    }

    /// The task whose output becomes the run's final output: the last task in
    /// execution order that nothing depends on.
    pub fn terminal_task(&self) -> Option<TaskIndex> {
        self.order
            .iter()
            .rev()
            .copied()
            .find(|&i| self.dependents(i).is_empty())
    }

    pub fn dependencies_satisfied(&self, index: TaskIndex, completed: &HashSet<TaskIndex>) -> bool {
        self.dependencies(index)
            .iter()
            .all(|dep| completed.contains(dep))
    }
}

/// Validates a [`TaskGraph`] and builds its [`CrewPlan`].
pub struct GraphBuilder<'a> {
    graph: &'a TaskGraph,
    registry: Option<&'a AgentRegistry>,
    default_retry: Option<RetryPolicy>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(graph: &'a TaskGraph) -> Self {
        Self {
            graph,
            registry: None,
            default_retry: None,
        }
    }

    /// Resolve agents not declared in the graph against this registry.
    pub fn with_registry(mut self, registry: &'a AgentRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Retry policy for tasks that declare none.
    pub fn with_default_retry(mut self, retry: Option<RetryPolicy>) -> Self {
        self.default_retry = retry;
        self
    }

    /// Build the plan.
    ///
    /// This validates the graph structure:
    /// - The graph has at least one task
    /// - Task ids and graph-local agent ids are unique
    /// - Every task's agent resolves (graph-local first, then the registry)
    /// - Every dependency references another task in the graph
    /// - No cycles are allowed
    pub fn build(self) -> Result<CrewPlan, ConfigurationError> {
        let graph = self.graph;

        if graph.id.trim().is_empty() {
            return Err(ConfigurationError::EmptyId { kind: "graph" });
        }
        if graph.tasks.is_empty() {
            return Err(ConfigurationError::EmptyGraph {
                graph: graph.id.clone(),
            });
        }

        let mut local_agents: HashMap<&str, &AgentDefinition> = HashMap::new();
        for agent in &graph.agents {
            if agent.id.trim().is_empty() {
                return Err(ConfigurationError::EmptyId { kind: "agent" });
            }
            if local_agents.insert(agent.id.as_str(), agent).is_some() {
                return Err(ConfigurationError::DuplicateAgent {
                    agent: agent.id.clone(),
                });
            }
        }

        let mut index_map = HashMap::new();
        for (i, task) in graph.tasks.iter().enumerate() {
            if task.id.trim().is_empty() {
                return Err(ConfigurationError::EmptyId { kind: "task" });
            }
            if index_map.insert(task.id.clone(), i).is_some() {
                return Err(ConfigurationError::DuplicateTask {
                    task: task.id.clone(),
                });
            }
        }

        let mut tasks = Vec::with_capacity(graph.tasks.len());
        let mut agents = Vec::with_capacity(graph.tasks.len());
        for task in &graph.tasks {
            let agent = local_agents
                .get(task.agent_id.as_str())
                .copied()
                .or_else(|| self.registry.and_then(|r| r.get(&task.agent_id)))
                .ok_or_else(|| ConfigurationError::UnknownAgent {
                    task: task.id.clone(),
                    agent: task.agent_id.clone(),
                })?;
            agents.push(agent.clone());

            let mut task = task.clone();
            if task.retry.is_none() {
                task.retry = self.default_retry.clone();
            }
            if let Some(retry) = &task.retry {
                retry.validate(&task.id)?;
            }
            tasks.push(task);
        }

        let mut forward_edges: Vec<Vec<TaskIndex>> = vec![Vec::new(); tasks.len()];
        let mut reverse_edges: Vec<Vec<TaskIndex>> = vec![Vec::new(); tasks.len()];

        for (to_idx, task) in tasks.iter().enumerate() {
            for dep in &task.dependencies {
                if dep == &task.id {
                    return Err(ConfigurationError::SelfDependency {
                        task: task.id.clone(),
                    });
                }
                let from_idx = *index_map.get(dep).ok_or_else(|| {
                    ConfigurationError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    }
                })?;

                // A repeated dependency adds one edge
                if !reverse_edges[to_idx].contains(&from_idx) {
                    forward_edges[from_idx].push(to_idx);
                    reverse_edges[to_idx].push(from_idx);
                }
            }
        }

        if let Some(path) = find_cycle(&tasks, &reverse_edges) {
            return Err(ConfigurationError::Cycle { path });
        }

        let order = stable_topological_order(&forward_edges, &reverse_edges);

        Ok(CrewPlan {
            graph_id: graph.id.clone(),
            graph_name: if graph.name.is_empty() {
                graph.id.clone()
            } else {
                graph.name.clone()
            },
            process: graph.process,
            tasks,
            agents,
            index_map,
            forward_edges,
            reverse_edges,
            order,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Depth-first search over dependency edges with a visiting marker.
///
/// Returns the cycle as task ids, closed on the first repeated id (`a -> b -> a`).
fn find_cycle(tasks: &[Task], reverse_edges: &[Vec<TaskIndex>]) -> Option<Vec<String>> {
    fn visit(
        node: TaskIndex,
        reverse_edges: &[Vec<TaskIndex>],
        marks: &mut [Mark],
        stack: &mut Vec<TaskIndex>,
    ) -> Option<Vec<TaskIndex>> {
        marks[node] = Mark::Visiting;
        stack.push(node);

        for &dep in &reverse_edges[node] {
            match marks[dep] {
                Mark::Visiting => {
                    let start = stack.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(dep);
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = visit(dep, reverse_edges, marks, stack) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        stack.pop();
        marks[node] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::Unvisited; tasks.len()];
    let mut stack = Vec::new();

    for start in 0..tasks.len() {
        if marks[start] == Mark::Unvisited
            && let Some(cycle) = visit(start, reverse_edges, &mut marks, &mut stack)
        {
            return Some(cycle.into_iter().map(|i| tasks[i].id.clone()).collect());
        }
    }
    None
}

/// Kahn's algorithm, always taking the earliest-declared ready task.
fn stable_topological_order(
    forward_edges: &[Vec<TaskIndex>],
    reverse_edges: &[Vec<TaskIndex>],
) -> Vec<TaskIndex> {
    let mut in_degree: Vec<usize> = reverse_edges.iter().map(|deps| deps.len()).collect();

    let mut ready: BinaryHeap<Reverse<TaskIndex>> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, deg)| *deg == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &dependent in &forward_edges[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }
    order
}
