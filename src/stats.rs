use std::time::Instant;

use serde::Serialize;

use crate::error::CleanupResult;
use crate::queue::{ProcessingQueue, ProcessingStatus};

/// Aggregate figures for one cascade run, handed to the reporting layer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CascadeStats {
    pub tables_processed: usize,
    pub relationships_processed: usize,
    pub total_records_found: usize,
    pub max_level_reached: u32,
    pub processing_time_seconds: f64,
}

impl CascadeStats {
    /// Refresh the queue-derived figures from final queue state.
    pub fn update_from_queue(&mut self, queue: &ProcessingQueue) {
        self.tables_processed = queue
            .tasks()
            .filter(|t| t.status == ProcessingStatus::Completed)
            .count();
        self.total_records_found = queue.total_records();
        self.max_level_reached = queue.max_level();
    }

    pub fn to_json(&self) -> CleanupResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Wall-clock timer for [`CascadeStats::processing_time_seconds`]
pub struct CascadeTimer {
    start: Instant,
}

impl CascadeTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
