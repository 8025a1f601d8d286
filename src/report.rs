// src/report.rs

//! Per-endpoint error report combining totals and status-code breakdown.

use serde::Serialize;

use crate::history::{EndpointStats, ErrorCodeCounts, GroupCount, HistoryStore};
use crate::types::TimeRange;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub endpoint: String,
    pub total: i64,
    pub success_count: i64,
    pub error_count: i64,
    /// Percentage of errors, two decimals; `0.0` when nothing was recorded.
    pub error_rate: f64,
    pub error_details: Vec<GroupCount<i64>>,
}

/// Either a full report or the fault that prevented it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ErrorReportOutcome {
    Report(ErrorReport),
    Fault { endpoint: String, error_message: String },
}

impl ErrorReportOutcome {
    pub fn report(&self) -> Option<&ErrorReport> {
        match self {
            ErrorReportOutcome::Report(r) => Some(r),
            ErrorReportOutcome::Fault { .. } => None,
        }
    }
}

/// `100 * errors / total` rounded to two decimals.
pub fn error_rate(errors: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let pct = errors as f64 * 100.0 / total as f64;
    (pct * 100.0).round() / 100.0
}

/// Combine the two halves; a fault in either one wins.
pub fn assemble(stats: EndpointStats, codes: ErrorCodeCounts) -> ErrorReportOutcome {
    if let Some(message) = stats.error_message.or(codes.error_message) {
        return ErrorReportOutcome::Fault {
            endpoint: stats.endpoint,
            error_message: message,
        };
    }

    ErrorReportOutcome::Report(ErrorReport {
        error_rate: error_rate(stats.error_count, stats.total),
        endpoint: stats.endpoint,
        total: stats.total,
        success_count: stats.success_count,
        error_count: stats.error_count,
        error_details: codes.details,
    })
}

/// Collect stats and status codes for `endpoint` concurrently.
pub async fn error_report(
    store: &HistoryStore,
    endpoint: &str,
    range: TimeRange,
) -> ErrorReportOutcome {
    let (stats, codes) = tokio::join!(
        store.endpoint_stats(endpoint, range),
        store.error_code_counts(endpoint, range)
    );
    assemble(stats, codes)
}
