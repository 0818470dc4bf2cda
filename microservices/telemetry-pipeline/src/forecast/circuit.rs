//! Online/offline flag for the forecast service

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatus {
    pub online: bool,
    pub last_transition: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct CircuitState {
    online: AtomicBool,
    last_transition: RwLock<Option<DateTime<Utc>>>,
}

impl Default for CircuitState {
    /// Starts online so the first automatic call is attempted
    fn default() -> Self {
        Self::new(true)
    }
}

impl CircuitState {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            last_transition: RwLock::new(None),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Apply the outcome of a forecast call. Returns true on a transition.
    pub fn record(&self, success: bool) -> bool {
        let was_online = self.online.swap(success, Ordering::SeqCst);
        if was_online == success {
            return false;
        }

        *self.last_transition.write() = Some(Utc::now());
        if success {
            info!("Forecast service back online");
        } else {
            warn!("Forecast service marked offline");
        }
        true
    }

    pub fn status(&self) -> CircuitStatus {
        CircuitStatus {
            online: self.is_online(),
            last_transition: *self.last_transition.read(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_only_on_change() {
        let circuit = CircuitState::default();
        assert!(circuit.is_online());
        assert!(!circuit.record(true));
        assert!(circuit.status().last_transition.is_none());

        assert!(circuit.record(false));
        assert!(!circuit.is_online());
        assert!(circuit.status().last_transition.is_some());

        assert!(!circuit.record(false));
        assert!(circuit.record(true));
        assert!(circuit.is_online());
    }
}
