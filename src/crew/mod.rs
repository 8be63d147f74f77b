//! Crew execution: scheduling, retries, input assembly and result aggregation.
//!
//! [`CrewExecutor`] takes a validated [`CrewPlan`](crate::graph::CrewPlan) (or a raw
//! [`TaskGraph`](crate::graph::TaskGraph), validated on the way in) and drives every
//! task to a terminal state:
//!
//! - Tasks are issued in the plan's stable topological order, never before all
//!   of their dependencies succeeded.
//! - A failed task marks all transitive dependents skipped; independent branches
//!   keep running.
//! - Retryable backend errors are retried per the task's [`RetryPolicy`](crate::graph::RetryPolicy).
//! - Cancellation stops issuing new tasks; in-flight calls finish.
//!
//! Only configuration errors abort a run. Every other failure is recorded in the
//! returned [`ExecutionResult`].

pub mod executor;
pub mod input;
pub mod retry;
pub mod scheduler;
pub mod state;

pub use executor::{CrewExecutor, ExecutorSettings, RunOptions};
pub use scheduler::{CrewScheduler, TaskStatus};
pub use state::{APOLOGY_MESSAGE, ExecutionResult, RunState, TaskOutcome, TaskResult};
