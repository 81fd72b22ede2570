use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::agent::DecisionMode;
use crate::tools::{builtin_tools, ToolDescriptor};

/// A registered agent class: a name resolvable from configuration plus the
/// decision mode the constructed session will run with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentArchetype {
    pub name: &'static str,
    pub mode: DecisionMode,
}

/// The agent classes shipped with the crate. The deprecated tool-calling
/// variations of the original project are intentionally not carried over.
pub fn builtin_agents() -> Vec<AgentArchetype> {
    vec![
        AgentArchetype { name: "sgr_agent", mode: DecisionMode::Sgr },
        AgentArchetype { name: "sgr_tool_calling_agent", mode: DecisionMode::ToolCalling },
    ]
}

static TOOLS: Lazy<RwLock<HashMap<String, ToolDescriptor>>> = Lazy::new(|| {
    let mut items = HashMap::new();
    for descriptor in builtin_tools() {
        items.insert(descriptor.name.to_ascii_lowercase(), descriptor);
    }
    RwLock::new(items)
});

static AGENTS: Lazy<RwLock<HashMap<String, AgentArchetype>>> = Lazy::new(|| {
    let mut items = HashMap::new();
    for archetype in builtin_agents() {
        items.insert(archetype.name.to_ascii_lowercase(), archetype);
    }
    RwLock::new(items)
});

/// Process-wide registry of tool types, seeded with the built-in toolset at
/// first use. Lookup is case-insensitive.
pub struct ToolRegistry;

impl ToolRegistry {
    /// Registers a tool type. An already-registered name is left untouched.
    pub fn register(descriptor: ToolDescriptor) {
        let mut items = TOOLS.write().expect("tool registry poisoned");
        items.entry(descriptor.name.to_ascii_lowercase()).or_insert(descriptor);
    }

    pub fn get(name: &str) -> Option<ToolDescriptor> {
        TOOLS
            .read()
            .expect("tool registry poisoned")
            .get(&name.to_ascii_lowercase())
            .copied()
    }

    pub fn list() -> Vec<ToolDescriptor> {
        let mut items: Vec<ToolDescriptor> = TOOLS
            .read()
            .expect("tool registry poisoned")
            .values()
            .copied()
            .collect();
        items.sort_by_key(|d| d.name);
        items
    }

    /// Resolves names to descriptors, splitting out the ones not found.
    pub fn resolve(names: &[String]) -> (Vec<ToolDescriptor>, Vec<String>) {
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for name in names {
            match Self::get(name) {
                Some(descriptor) => found.push(descriptor),
                None => {
                    tracing::warn!(tool = %name, "tool not found in registry");
                    missing.push(name.clone());
                }
            }
        }
        (found, missing)
    }
}

/// Process-wide registry of agent classes, seeded with the built-in
/// archetypes at first use. Lookup is case-insensitive.
pub struct AgentRegistry;

impl AgentRegistry {
    pub fn register(archetype: AgentArchetype) {
        let mut items = AGENTS.write().expect("agent registry poisoned");
        items.entry(archetype.name.to_ascii_lowercase()).or_insert(archetype);
    }

    pub fn get(name: &str) -> Option<AgentArchetype> {
        AGENTS
            .read()
            .expect("agent registry poisoned")
            .get(&name.to_ascii_lowercase())
            .copied()
    }

    pub fn list() -> Vec<AgentArchetype> {
        let mut items: Vec<AgentArchetype> = AGENTS
            .read()
            .expect("agent registry poisoned")
            .values()
            .copied()
            .collect();
        items.sort_by_key(|a| a.name);
        items
    }
}
