//! Dependency-ordered unit start
//!
//! Each requested unit gets exactly one start task. Its readiness signal is
//! stored before the task requests any dependency, so a diamond or a
//! concurrent request joins the existing signal instead of starting the
//! unit twice.

use std::rc::Rc;

use tokio::sync::watch;

use super::{Manager, ReadinessSignal, StartError};
use crate::units::StartAction;

impl Manager {
    /// Request `name`, returning a handle on its readiness
    ///
    /// `chain` is the list of units that pulled this one in, nearest first.
    pub fn start_unit(self: &Rc<Self>, name: &str, chain: &[String]) -> ReadinessSignal {
        if let Some(tx) = self.readiness.borrow().get(name) {
            return ReadinessSignal::new(name, tx.subscribe());
        }

        let rejected = match self.graph.get(name) {
            _ if self.supervisor.is_stopping() => Some(StartError::ShuttingDown(name.to_string())),
            None => Some(StartError::NotFound {
                name: name.to_string(),
                chain: chain.to_vec(),
            }),
            Some(_) => self
                .cycles
                .get(name)
                .map(|cycle| StartError::Cycle(cycle.clone())),
        };

        let (tx, rx) = watch::channel(rejected.clone().map(Err));
        self.readiness.borrow_mut().insert(name.to_string(), tx);
        let signal = ReadinessSignal::new(name, rx);

        if let Some(err) = rejected {
            log::warn!("{}", err);
            return signal;
        }

        let this = Rc::clone(self);
        let name = name.to_string();
        let chain = chain.to_vec();
        tokio::task::spawn_local(async move {
            let result = this.run_start(&name, &chain).await;
            if let Err(e) = &result {
                log::error!("Failed to start {}: {}", name, e);
            }
            this.resolve(&name, result);
        });

        signal
    }

    async fn run_start(self: &Rc<Self>, name: &str, chain: &[String]) -> Result<(), StartError> {
        let graph = Rc::clone(&self.graph);
        let unit = graph.get(name).ok_or_else(|| StartError::NotFound {
            name: name.to_string(),
            chain: chain.to_vec(),
        })?;

        let mut dep_chain = Vec::with_capacity(chain.len() + 1);
        dep_chain.push(name.to_string());
        dep_chain.extend_from_slice(chain);

        // Request everything first so dependencies start concurrently
        let pending: Vec<(&String, ReadinessSignal)> = unit
            .dependencies
            .iter()
            .map(|dep| (dep, self.start_unit(dep, &dep_chain)))
            .collect();

        for (dep, signal) in pending {
            signal.wait().await.map_err(|e| StartError::Dependency {
                unit: name.to_string(),
                dependency: dep.clone(),
                reason: e.to_string(),
            })?;
        }

        if self.supervisor.is_stopping() {
            return Err(StartError::ShuttingDown(name.to_string()));
        }

        log::info!("[{}] starting due to {}", name, describe_chain(chain));

        match &unit.start {
            StartAction::Builtin(builtin) => self.run_builtin(*builtin).await,
            _ => self
                .supervisor
                .spawn_service(name, unit)
                .await
                .map_err(|e| StartError::spawn(name, e)),
        }
    }

    fn resolve(&self, name: &str, result: Result<(), StartError>) {
        if let Some(tx) = self.readiness.borrow().get(name) {
            tx.send_replace(Some(result));
        }
    }
}

fn describe_chain(chain: &[String]) -> String {
    if chain.is_empty() {
        "boot".to_string()
    } else {
        chain.join(",")
    }
}
