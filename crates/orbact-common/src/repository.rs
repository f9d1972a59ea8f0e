//! The implementation repository boundary.
//!
//! The repository is the catalog mapping a server id (or an interface id) to
//! the definition needed to launch it. Persistence of definitions is outside
//! the mediator; [`MemoryRepository`] is the in-process implementation used
//! by embedders and tests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// How a server definition is brought up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationMode {
    /// Started on demand and mediated by the activation mediator.
    Mediated,
    /// Managed outside the mediator; never started on demand.
    External,
}

/// A server's launch definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplDef {
    name: String,
    command: String,
    mode: ActivationMode,
    interfaces: Vec<String>,
}

impl ImplDef {
    pub fn new(name: impl Into<String>, command: impl Into<String>, mode: ActivationMode) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            mode,
            interfaces: Vec::new(),
        }
    }

    /// Interface ids this server hosts objects for; consulted by broadcast
    /// binds.
    pub fn with_interfaces(mut self, interfaces: Vec<String>) -> Self {
        self.interfaces = interfaces;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Launch command line, without the mediator-supplied flags. May be empty
    /// for servers registered at connect time, which are never started on
    /// demand.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn mode(&self) -> ActivationMode {
        self.mode
    }

    pub fn serves(&self, interface_id: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface_id)
    }
}

/// Catalog of server launch definitions.
pub trait Repository: Send + Sync {
    /// Definitions named `name`. Empty when unknown.
    fn find_by_name(&self, name: &str) -> Vec<ImplDef>;

    /// Definitions hosting `interface_id` objects matching `tag`.
    fn find_by_interface_tag(&self, interface_id: &str, tag: &[u8]) -> Vec<ImplDef>;

    /// Store a definition, replacing any previous one of the same name.
    fn create(&self, def: ImplDef);
}

/// In-memory repository. Interface matching ignores the tag: definitions do
/// not carry per-object tags, so every definition serving the interface is a
/// candidate.
#[derive(Default)]
pub struct MemoryRepository {
    defs: RwLock<HashMap<String, ImplDef>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for MemoryRepository {
    fn find_by_name(&self, name: &str) -> Vec<ImplDef> {
        let defs = self.defs.read().expect("repository lock poisoned");
        defs.get(name).cloned().into_iter().collect()
    }

    fn find_by_interface_tag(&self, interface_id: &str, _tag: &[u8]) -> Vec<ImplDef> {
        let defs = self.defs.read().expect("repository lock poisoned");
        let mut found: Vec<ImplDef> = defs
            .values()
            .filter(|d| d.serves(interface_id))
            .cloned()
            .collect();
        // deterministic candidate order
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    fn create(&self, def: ImplDef) {
        let mut defs = self.defs.write().expect("repository lock poisoned");
        defs.insert(def.name.clone(), def);
    }
}
