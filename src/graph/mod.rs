//! Task graphs: the data model and its one-time validation.
//!
//! A [`TaskGraph`] (a crew or workflow) names a set of agents and the tasks bound
//! to them. Before anything runs, [`GraphBuilder`] validates it and produces an
//! immutable [`CrewPlan`] with a stable topological order.
//!
//! # Example
//!
//! ```no_run
//! use agent_crew::agent::AgentDefinition;
//! use agent_crew::graph::{GraphBuilder, Task, TaskGraph};
//!
//! let graph = TaskGraph::new("blog", "Blog crew")
//!     .with_agent(AgentDefinition::new("r", "Researcher", "research"))
//!     .with_agent(AgentDefinition::new("w", "Writer", "write"))
//!     .with_task(Task::new("t1", "Research the topic", "r"))
//!     .with_task(Task::new("t2", "Write the article", "w").depends_on("t1"));
//!
//! let plan = GraphBuilder::new(&graph).build()?;
//! assert_eq!(plan.execution_order_ids(), vec!["t1", "t2"]);
//! # Ok::<(), agent_crew::errors::ConfigurationError>(())
//! ```

pub mod builder;
pub mod task;

pub use builder::{CrewPlan, GraphBuilder, TaskIndex};
pub use task::{Backoff, Process, RetryPolicy, Task, TaskGraph};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentDefinition;
    use crate::errors::ConfigurationError;

    fn scenario_graph() -> TaskGraph {
        TaskGraph::new("scenario", "Scenario")
            .with_agent(AgentDefinition::new("r", "r", "research"))
            .with_agent(AgentDefinition::new("w", "w", "write"))
            .with_task(Task::new("t1", "Research", "r"))
            .with_task(Task::new("t2", "Write", "w").depends_on("t1"))
    }

    #[test]
    fn test_every_task_follows_its_dependencies() {
        let graph = TaskGraph::new("wide", "Wide")
            .with_agent(AgentDefinition::new("a", "a", "x"))
            .with_task(Task::new("e", "e", "a").depends_on("d").depends_on("b"))
            .with_task(Task::new("d", "d", "a").depends_on("c"))
            .with_task(Task::new("c", "c", "a"))
            .with_task(Task::new("b", "b", "a").depends_on("a"))
            .with_task(Task::new("a", "a", "a"));

        let plan = GraphBuilder::new(&graph).build().unwrap();
        let order = plan.execution_order();
        let position = |i: TaskIndex| order.iter().position(|&x| x == i).unwrap();

        for (index, _) in plan.tasks().iter().enumerate() {
            for &dep in plan.dependencies(index) {
                assert!(position(dep) < position(index));
            }
        }
    }

    #[test]
    fn test_scenario_graph_builds() {
        let plan = GraphBuilder::new(&scenario_graph()).build().unwrap();
        assert_eq!(plan.graph_name(), "Scenario");
        assert_eq!(plan.process(), Process::Sequential);
        assert_eq!(plan.terminal_task(), plan.index_of("t2"));
    }

    #[test]
    fn test_two_node_cycle() {
        let graph = TaskGraph::new("cyc", "Cycle")
            .with_agent(AgentDefinition::new("a", "a", "x"))
            .with_task(Task::new("a", "a", "a").depends_on("b"))
            .with_task(Task::new("b", "b", "a").depends_on("a"));

        let err = GraphBuilder::new(&graph).build().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cycle detected in task dependencies: a -> b -> a"
        );
        assert!(matches!(err, ConfigurationError::Cycle { .. }));
    }
}
