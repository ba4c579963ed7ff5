//! Service orchestration
//!
//! The `Manager` owns everything that lives for the machine's uptime: the
//! unit graph, the process supervisor, one readiness signal per requested
//! unit, and the rescue-shell marker. It is built once and shared as
//! `Rc<Manager>`; all tasks run on one thread inside a `LocalSet`, so the
//! tables use `RefCell` and no borrow is held across an `.await`.

mod actions;
mod readiness;
mod restart;
mod scheduler;
mod supervisor;

pub use readiness::ReadinessSignal;
pub use restart::{RestartDecision, RestartTracker};
pub use supervisor::{Completion, Supervisor, Tick};

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tokio::sync::watch;

use crate::config::InitConfig;
use crate::pid1::{Host, Kernel};
use crate::units::{find_cycles, Graph};
use readiness::Readiness;

/// Why a unit did not become ready
///
/// Shared by every waiter on the unit's signal, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error("Unit {name} not found {}", .chain.join(","))]
    NotFound { name: String, chain: Vec<String> },

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("{unit}: dependency {dependency} failed: {reason}")]
    Dependency {
        unit: String,
        dependency: String,
        reason: String,
    },

    #[error("{unit}: failed to spawn: {reason}")]
    Spawn { unit: String, reason: String },

    #[error("{unit}: {reason}")]
    Action { unit: String, reason: String },

    #[error("{0}: start sequence abandoned")]
    Abandoned(String),

    #[error("{0}: not started, shutting down")]
    ShuttingDown(String),
}

impl StartError {
    fn spawn(unit: &str, err: impl std::fmt::Display) -> Self {
        StartError::Spawn {
            unit: unit.to_string(),
            reason: err.to_string(),
        }
    }

    fn action(unit: &str, err: impl std::fmt::Display) -> Self {
        StartError::Action {
            unit: unit.to_string(),
            reason: err.to_string(),
        }
    }
}

pub struct Manager {
    config: InitConfig,
    graph: Rc<Graph>,
    kernel: Rc<dyn Kernel>,
    host: Rc<dyn Host>,
    supervisor: Supervisor,
    /// One entry per unit ever requested; inserted before any work starts
    readiness: RefCell<HashMap<String, watch::Sender<Readiness>>>,
    /// Unit -> members of the cycle it belongs to
    cycles: HashMap<String, Vec<String>>,
    /// Set while the rescue shell is in the foreground
    suspended: Cell<bool>,
}

impl Manager {
    pub fn new(
        config: InitConfig,
        graph: Graph,
        kernel: Rc<dyn Kernel>,
        host: Rc<dyn Host>,
    ) -> Rc<Self> {
        let graph = Rc::new(graph);

        let mut cycles = HashMap::new();
        for cycle in find_cycles(&graph) {
            log::error!("Dependency cycle detected: {}", cycle.join(" -> "));
            for member in &cycle {
                cycles.insert(member.clone(), cycle.clone());
            }
        }

        let supervisor = Supervisor::new(Rc::clone(&kernel), Rc::clone(&graph), &config);

        Rc::new(Self {
            config,
            graph,
            kernel,
            host,
            supervisor,
            readiness: RefCell::new(HashMap::new()),
            cycles,
            suspended: Cell::new(false),
        })
    }

    pub fn config(&self) -> &InitConfig {
        &self.config
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub(crate) fn kernel(&self) -> &dyn Kernel {
        self.kernel.as_ref()
    }

    /// True while a rescue shell is waiting for the operator
    pub fn is_suspended(&self) -> bool {
        self.suspended.get()
    }

    pub(crate) fn set_suspended(&self, suspended: bool) {
        self.suspended.set(suspended);
    }
}
