//! Agent type registry, fixed after startup

use serde::Serialize;
use std::sync::Arc;

use crate::domain::AgentType;
use crate::error::{AgentError, Result};
use crate::runtime::Agent;

pub struct RegistryEntry {
    pub agent_type: AgentType,
    pub binding: Arc<dyn Agent>,
    pub description: String,
    pub capabilities: Vec<String>,
}

/// Serializable view of one entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub agent_type: AgentType,
    pub description: String,
    pub capabilities: Vec<String>,
}

/// Entries in registration order; the order breaks routing ties
#[derive(Default)]
pub struct AgentRegistry {
    entries: Vec<RegistryEntry>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_agents(agents: Vec<Arc<dyn Agent>>) -> Result<Self> {
        let mut registry = Self::new();
        for agent in agents {
            registry.register(agent)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, agent: Arc<dyn Agent>) -> Result<()> {
        let agent_type = agent.agent_type();
        if self.get(agent_type).is_some() {
            return Err(AgentError::Validation(format!(
                "agent type {} registered twice",
                agent_type
            )));
        }
        self.entries.push(RegistryEntry {
            agent_type,
            description: agent.description().to_string(),
            capabilities: agent.capabilities(),
            binding: agent,
        });
        Ok(())
    }

    pub fn get(&self, agent_type: AgentType) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.agent_type == agent_type)
    }

    pub fn types(&self) -> Vec<AgentType> {
        self.entries.iter().map(|e| e.agent_type).collect()
    }

    pub fn describe(&self) -> Vec<AgentInfo> {
        self.entries
            .iter()
            .map(|e| AgentInfo {
                agent_type: e.agent_type,
                description: e.description.clone(),
                capabilities: e.capabilities.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
