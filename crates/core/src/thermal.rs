use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Device thermal pressure, mildest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThermalLevel {
    #[default]
    Nominal,
    Fair,
    Serious,
    Critical,
}

impl fmt::Display for ThermalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThermalLevel::Nominal => write!(f, "nominal"),
            ThermalLevel::Fair => write!(f, "fair"),
            ThermalLevel::Serious => write!(f, "serious"),
            ThermalLevel::Critical => write!(f, "critical"),
        }
    }
}

pub type ThermalListener = Box<dyn Fn(ThermalLevel) + Send + Sync>;

/// Source of thermal state changes.
pub trait ThermalSignal: Send + Sync {
    fn current(&self) -> ThermalLevel;

    /// Register a listener called on every subsequent change.
    fn subscribe(&self, listener: ThermalListener);
}

/// In-process signal driven by `set`. Used by hosts that poll their own sensors,
/// and by tests.
#[derive(Default)]
pub struct ThermalBroadcaster {
    level: Mutex<ThermalLevel>,
    listeners: Mutex<Vec<ThermalListener>>,
}

impl ThermalBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new level and notify every listener, even if the level is unchanged.
    pub fn set(&self, level: ThermalLevel) {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner) = level;
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(level);
        }
    }
}

impl ThermalSignal for ThermalBroadcaster {
    fn current(&self) -> ThermalLevel {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(&self, listener: ThermalListener) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }
}
