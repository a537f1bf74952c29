//! Process-wide skill registry.
//!
//! Populated once at startup (built-ins, then user skill documents) and
//! read-only afterwards; the lock exists for the initialization phase and
//! cheap concurrent reads, not for runtime mutation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::schema::input_schema;
use crate::types::Skill;
use llamar_domain::envelope::ToolDefinition;

#[derive(Default)]
pub struct SkillRegistry {
    entries: RwLock<HashMap<String, Arc<Skill>>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a skill, replacing any existing one of the same name.
    pub fn register(&self, skill: Skill) {
        let name = skill.name.clone();
        let replaced = self
            .entries
            .write()
            .insert(name.clone(), Arc::new(skill))
            .is_some();
        if replaced {
            tracing::warn!(skill = %name, "skill re-registered, previous definition replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Skill>> {
        self.entries.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// MCP tool definitions, optionally filtered by an allow-set, sorted
    /// by name for stable listings.
    pub fn list(&self, allow: Option<&HashSet<String>>) -> Vec<ToolDefinition> {
        let entries = self.entries.read();
        let mut defs: Vec<ToolDefinition> = entries
            .values()
            .filter(|skill| allow.is_none_or(|set| set.contains(&skill.name)))
            .map(|skill| ToolDefinition {
                name: skill.name.clone(),
                description: skill.description.clone(),
                input_schema: input_schema(skill),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}
