//! Source/target row-count reconciliation.
//!
//! A best-effort data-quality gate: it detects count drift after a load, not
//! row-content corruption. The source count is captured before extraction
//! begins so a long-running transfer does not skew the baseline.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::core::schema::SourceTable;
use crate::error::{Result, StageError};
use crate::source::MssqlPool;
use crate::target::WarehousePool;

/// Result of comparing source and target counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReconciliationResult {
    pub source_count: i64,
    pub target_count: i64,
    pub absolute_diff: i64,
    pub relative_diff: f64,
}

/// Compare counts. A zero source count uses denominator 1, so an empty table
/// passes only when the target is also empty.
pub fn evaluate(source_count: i64, target_count: i64) -> ReconciliationResult {
    let absolute_diff = source_count - target_count;
    let denominator = if source_count != 0 { source_count } else { 1 };

    ReconciliationResult {
        source_count,
        target_count,
        absolute_diff,
        relative_diff: absolute_diff as f64 / denominator as f64,
    }
}

impl ReconciliationResult {
    /// The gate passes when the magnitude of the relative discrepancy does
    /// not exceed the threshold. Strictly greater fails; exactly at the
    /// threshold passes. Surplus target rows count as drift too.
    pub fn within(&self, pct_threshold: f64) -> bool {
        self.relative_diff.abs() <= pct_threshold
    }
}

/// Captures and verifies row counts around a table migration.
pub struct CountReconciler {
    source: Arc<MssqlPool>,
    target: Arc<WarehousePool>,
    pct_threshold: f64,
}

impl CountReconciler {
    pub fn new(source: Arc<MssqlPool>, target: Arc<WarehousePool>, pct_threshold: f64) -> Self {
        Self {
            source,
            target,
            pct_threshold,
        }
    }

    /// Capture the source count; run before extraction begins.
    pub async fn capture_source(&self, table: &SourceTable) -> Result<i64> {
        info!("Capturing source count for {}", table.qualified());
        let count = self.source.row_count(table).await?;
        info!("source count: {}", count);
        Ok(count)
    }

    /// Verify the target count against the captured source count.
    pub async fn verify(
        &self,
        source_count: i64,
        target_table: &str,
    ) -> Result<ReconciliationResult> {
        info!("Count reconciliation starting for {}", target_table);
        let target_count = self.target.row_count(target_table).await?;

        let result = evaluate(source_count, target_count);
        if !result.within(self.pct_threshold) {
            return Err(StageError::Reconciliation {
                source_count: result.source_count,
                target_count: result.target_count,
                absolute_diff: result.absolute_diff,
                relative_diff: result.relative_diff,
                threshold: self.pct_threshold,
            });
        }

        info!(
            "Passed count check: diff={} pct={:.4}",
            result.absolute_diff, result.relative_diff
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_passes() {
        let r = evaluate(1000, 1000);
        assert_eq!(r.absolute_diff, 0);
        assert_eq!(r.relative_diff, 0.0);
        assert!(r.within(0.01));
    }

    #[test]
    fn test_threshold_boundary_is_exclusive() {
        // Exactly at the threshold passes (the gate is >, not >=).
        let at_threshold = evaluate(1000, 990);
        assert!((at_threshold.relative_diff - 0.01).abs() < 1e-12);
        assert!(at_threshold.within(0.01));

        // One more missing row fails.
        let over = evaluate(1000, 989);
        assert!(over.relative_diff > 0.01);
        assert!(!over.within(0.01));
    }

    #[test]
    fn test_zero_source_count_uses_unit_denominator() {
        let empty_both = evaluate(0, 0);
        assert_eq!(empty_both.relative_diff, 0.0);
        assert!(empty_both.within(0.01));

        // Extra target rows with an empty source fail loudly.
        let extra_target = evaluate(0, 1);
        assert_eq!(extra_target.absolute_diff, -1);
        assert_eq!(extra_target.relative_diff, -1.0);
        assert!(!extra_target.within(0.01));
    }

    #[test]
    fn test_target_shortfall_fails() {
        let r = evaluate(100, 50);
        assert_eq!(r.absolute_diff, 50);
        assert!(r.relative_diff > 0.01);
        assert!(!r.within(0.01));
    }
}
