//! Id-keyed in-memory registries.
//!
//! A [`Registry`] is an owned value tied to a session: the caller constructs it,
//! mutates it through `&mut`, and passes it by reference to whatever needs lookups.
//! There is no process-wide state and no locking; runs copy what they need into
//! their plan before executing, so re-registering an id only affects later runs.

use crate::errors::ConfigurationError;
use std::collections::HashMap;

/// Something stored in a [`Registry`] under its own id.
pub trait Identified {
    /// Human-readable kind used in error messages ("agent", "crew", ...).
    const KIND: &'static str;

    fn id(&self) -> &str;
}

/// Ordered map of definitions keyed by id.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    entries: HashMap<String, T>,
    /// Ids in first-registration order
    order: Vec<String>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T: Identified> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a definition, overwriting any previous one with the same id.
    ///
    /// Returns the replaced definition, if any. An overwritten entry keeps its
    /// original position in [`list`](Self::list).
    pub fn register(&mut self, item: T) -> Result<Option<T>, ConfigurationError> {
        let id = item.id().to_string();
        if id.trim().is_empty() {
            return Err(ConfigurationError::EmptyId { kind: T::KIND });
        }
        if !self.entries.contains_key(&id) {
            self.order.push(id.clone());
        }
        Ok(self.entries.insert(id, item))
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.entries.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let removed = self.entries.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    /// All definitions in registration order.
    pub fn list(&self) -> Vec<&T> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .collect()
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Registry of reusable agent personas.
pub type AgentRegistry = Registry<crate::agent::AgentDefinition>;
/// Registry of crews (task graphs) by id.
pub type CrewRegistry = Registry<crate::graph::TaskGraph>;
/// Registry of copilot personas.
pub type CopilotRegistry = Registry<crate::adapters::copilot::CopilotConfig>;
/// Registry of swarm workflows by name.
pub type SwarmRegistry = Registry<crate::adapters::swarm::SwarmWorkflow>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentDefinition;

    fn agent(id: &str, prompt: &str) -> AgentDefinition {
        AgentDefinition::new(id, id, prompt)
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = AgentRegistry::new();
        registry.register(agent("r", "research")).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("r").unwrap().system_prompt, "research");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_register_overwrites_and_keeps_position() {
        let mut registry = AgentRegistry::new();
        registry.register(agent("a", "first")).unwrap();
        registry.register(agent("b", "second")).unwrap();

        let previous = registry.register(agent("a", "replaced")).unwrap();
        assert_eq!(previous.unwrap().system_prompt, "first");

        let ids: Vec<&str> = registry.list().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(registry.get("a").unwrap().system_prompt, "replaced");
    }

    #[test]
    fn test_register_rejects_empty_id() {
        let mut registry = AgentRegistry::new();
        let err = registry.register(agent("  ", "x")).unwrap_err();
        assert_eq!(err, ConfigurationError::EmptyId { kind: "agent" });
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_drops_from_listing() {
        let mut registry = AgentRegistry::new();
        registry.register(agent("a", "x")).unwrap();
        registry.register(agent("b", "y")).unwrap();

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert_eq!(registry.ids(), &["b".to_string()]);
    }

    #[test]
    fn test_get_mut_edits_in_place() {
        let mut registry = AgentRegistry::new();
        registry.register(agent("a", "x")).unwrap();
        registry.get_mut("a").unwrap().temperature = Some(0.2);
        assert_eq!(registry.get("a").unwrap().temperature, Some(0.2));
    }
}
