//! Agent crew orchestration.
//!
//! A [`TaskGraph`](graph::TaskGraph) binds tasks to [`AgentDefinition`](agent::AgentDefinition)s
//! and declares which task outputs feed which inputs. [`GraphBuilder`](graph::GraphBuilder)
//! validates it once into a [`CrewPlan`](graph::CrewPlan), and a
//! [`CrewExecutor`](crew::CrewExecutor) runs the plan against a
//! [`CompletionBackend`](llm::CompletionBackend), streaming [`UpdateEvent`](stream::UpdateEvent)s
//! as tasks progress.

pub mod adapters;
pub mod agent;
pub mod config;
pub mod crew;
pub mod errors;
pub mod graph;
pub mod history;
pub mod llm;
pub mod logging;
pub mod registry;
pub mod stream;
pub mod templates;
pub mod ui;
