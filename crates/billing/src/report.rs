//! Batch run reporting.

use serde::Serialize;
use uuid::Uuid;

/// Error captured while processing a single service. The batch keeps going;
/// these are surfaced to the caller for logging and alerting.
#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub service_id: Uuid,
    pub message: String,
}

/// Aggregated outcome of one scheduler run. Ephemeral: returned to the
/// caller and logged, never persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub processed: usize,
    pub created: usize,
    pub skipped: usize,
    pub errors: Vec<RunError>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
