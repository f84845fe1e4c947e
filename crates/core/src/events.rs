use std::sync::mpsc;

use serde::Serialize;

use crate::domain::{ScanProgress, SimilarGroup};
use crate::thermal::ThermalLevel;

/// Everything the engine reports to its host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "body", rename_all = "camelCase")]
pub enum ScanEvent {
    Progress(ScanProgress),
    GroupFound(SimilarGroup),
    /// Carries the last published progress, if any.
    ScanPaused(Option<ScanProgress>),
    #[serde(rename_all = "camelCase")]
    ScanCompleted {
        total_groups: usize,
    },
    ThermalWarning {
        level: ThermalLevel,
    },
}

impl ScanEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ScanEvent::Progress(_) => "progress",
            ScanEvent::GroupFound(_) => "groupFound",
            ScanEvent::ScanPaused(_) => "scanPaused",
            ScanEvent::ScanCompleted { .. } => "scanCompleted",
            ScanEvent::ThermalWarning { .. } => "thermalWarning",
        }
    }
}

/// Receives engine events. Called from the scan thread and from the thread that
/// issued a command, so implementations must not block for long.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ScanEvent);
}

impl EventSink for mpsc::Sender<ScanEvent> {
    fn emit(&self, event: ScanEvent) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.send(event);
    }
}

impl<F> EventSink for F
where
    F: Fn(ScanEvent) + Send + Sync,
{
    fn emit(&self, event: ScanEvent) {
        self(event)
    }
}

/// Discards every event.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: ScanEvent) {}
}
