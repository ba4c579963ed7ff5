//! Unit definitions and the dependency graph
//!
//! Parses the subset of systemd .service and .target files needed for boot
//! ordering and merges them with the built-in units.

mod builtin;
mod graph;
mod parser;

pub use builtin::Builtin;
pub use graph::{build_graph, find_cycles, Graph};
pub use parser::parse_unit;

use std::collections::BTreeSet;

/// Restart policy (only `Restart=always` is honoured)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    #[default]
    No,
    Always,
}

impl RestartPolicy {
    pub fn parse(s: &str) -> Self {
        match s {
            "always" => Self::Always,
            _ => Self::No,
        }
    }
}

/// What happens once a unit's dependencies are ready
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StartAction {
    /// Spawn this command line (split on whitespace)
    Command(String),
    /// Nothing to run: a target, or a service without ExecStart
    #[default]
    Reach,
    /// Native action implemented by the init itself
    Builtin(Builtin),
}

/// A parsed or built-in unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitDefinition {
    pub dependencies: BTreeSet<String>,
    pub start: StartAction,
    pub restart: RestartPolicy,
}

impl UnitDefinition {
    pub fn exec_start(&self) -> Option<&str> {
        match &self.start {
            StartAction::Command(cmd) => Some(cmd),
            _ => None,
        }
    }
}

/// Only these suffixes are loaded from unit directories
pub fn is_unit_file(name: &str) -> bool {
    name.ends_with(".service") || name.ends_with(".target")
}
