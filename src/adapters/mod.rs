//! Alternate public shapes translated into task graphs.
//!
//! | Shape | Module | Translation |
//! |-------|--------|-------------|
//! | Swarm workflow | [`swarm`] | one agent and one task per step, linear or independent |
//! | Copilot | [`copilot`] | one-step workflow with the UI context in the prompt; actions parsed from the reply |

pub mod copilot;
pub mod swarm;

pub use copilot::{
    ActionKind, CopilotAction, CopilotConfig, CopilotReply, CopilotSession, UiActionRequest,
    UiActionSpec, UiCapabilities, UiContext, parse_actions, strip_actions,
};
pub use swarm::{SwarmAgent, SwarmProcess, SwarmRunner, SwarmStep, SwarmWorkflow};
