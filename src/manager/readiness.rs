use tokio::sync::watch;

use super::StartError;

/// `None` while the unit is starting, then its final outcome
pub(crate) type Readiness = Option<Result<(), StartError>>;

/// Handle on a unit's start outcome
///
/// Any number of waiters may hold one. The outcome is set once and never
/// changes, so waiting after resolution returns immediately.
#[derive(Debug, Clone)]
pub struct ReadinessSignal {
    unit: String,
    rx: watch::Receiver<Readiness>,
}

impl ReadinessSignal {
    pub(crate) fn new(unit: &str, rx: watch::Receiver<Readiness>) -> Self {
        Self {
            unit: unit.to_string(),
            rx,
        }
    }

    /// Outcome so far, without waiting
    pub fn outcome(&self) -> Readiness {
        (*self.rx.borrow()).clone()
    }

    pub async fn wait(mut self) -> Result<(), StartError> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(state) => (*state).clone().unwrap_or(Ok(())),
            Err(_) => Err(StartError::Abandoned(self.unit)),
        }
    }
}
