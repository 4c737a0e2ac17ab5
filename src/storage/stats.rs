// History statistics
// Per-database summaries recomputed from the audit trail on every call

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::history::{ExecutionStatus, QueryAuditor};
use super::store::StorageResult;

/// Aggregate timings over the successful executions of one database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub database: String,
    pub count: usize,
    pub average_ms: f64,
    pub total_ms: f64,
    pub fastest_ms: f64,
    pub slowest_ms: f64,
    pub last_success: DateTime<Utc>,
}

pub struct HistoryAggregator {
    auditor: Arc<QueryAuditor>,
}

impl HistoryAggregator {
    pub fn new(auditor: Arc<QueryAuditor>) -> Self {
        Self { auditor }
    }

    /// Summarize successful executions for `database`.
    ///
    /// Returns `Ok(None)` when there is nothing to summarize, never a zeroed summary.
    pub fn get_stats(&self, database: &str) -> StorageResult<Option<HistorySummary>> {
        let entries = self.auditor.query(database, Some(ExecutionStatus::Success))?;

        if entries.is_empty() {
            tracing::info!("No successful history for {}", database);
            return Ok(None);
        }

        let count = entries.len();
        let total: f64 = entries.iter().map(|e| e.execution_time).sum();
        let fastest = entries.iter().map(|e| e.execution_time).fold(f64::INFINITY, f64::min);
        let slowest = entries.iter().map(|e| e.execution_time).fold(f64::NEG_INFINITY, f64::max);
        let last_success = entries
            .iter()
            .map(|e| e.timestamp)
            .max()
            .unwrap_or_else(Utc::now);

        let summary = HistorySummary {
            database: database.to_string(),
            count,
            average_ms: round2(total / count as f64),
            total_ms: round2(total),
            fastest_ms: fastest,
            slowest_ms: slowest,
            last_success,
        };

        tracing::info!(
            "History for {}: {} queries, avg {:.2} ms",
            database,
            summary.count,
            summary.average_ms
        );
        Ok(Some(summary))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
