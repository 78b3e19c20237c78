//! Rolling-window diagnostics folded from the extraction event trail.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::store::PurchaseStore;

/// Event names counted as failures in the breakdown.
const ERROR_EVENTS: [&str; 4] = [
    "stage_failed",
    "oracle_failed",
    "fatal_parse_failure",
    "strategies_exhausted",
];

/// Diagnostics over the most recent pipeline runs.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineMetrics {
    /// Window size requested.
    pub window: usize,

    /// Runs actually found.
    pub runs: usize,

    pub average_confidence: f32,

    pub oracle_invocations: usize,

    /// Accepted oracle responses over invocations.
    pub success_rate: f32,

    pub lines_added_by_oracle: u64,

    /// Failure event counts by name.
    pub error_breakdown: BTreeMap<String, usize>,
}

/// Fold events of the last `window` purchases into counters.
pub fn collect(store: &PurchaseStore, window: usize) -> Result<PipelineMetrics> {
    let ids = store.recent_purchase_ids(window)?;

    let mut confidence_sum = 0.0f64;
    let mut confidence_count = 0usize;
    let mut oracle_invocations = 0usize;
    let mut oracle_accepted = 0usize;
    let mut lines_added_by_oracle = 0u64;
    let mut error_breakdown: BTreeMap<String, usize> = BTreeMap::new();

    for id in &ids {
        for event in store.events_for(*id)? {
            match event.name.as_str() {
                "confidence_scored" => {
                    if let Some(c) = event.payload.get("classic_confidence").and_then(|v| v.as_f64())
                    {
                        confidence_sum += c;
                        confidence_count += 1;
                    }
                }
                "oracle_attempt" => oracle_invocations += 1,
                "oracle_accepted" => oracle_accepted += 1,
                "oracle_lines_merged" => {
                    if let Some(n) = event.payload.get("lines").and_then(|v| v.as_u64()) {
                        lines_added_by_oracle += n;
                    }
                }
                name if ERROR_EVENTS.contains(&name) => {
                    *error_breakdown.entry(name.to_string()).or_insert(0) += 1;
                }
                _ => {}
            }
        }
    }

    Ok(PipelineMetrics {
        window,
        runs: ids.len(),
        average_confidence: if confidence_count == 0 {
            0.0
        } else {
            (confidence_sum / confidence_count as f64) as f32
        },
        oracle_invocations,
        success_rate: if oracle_invocations == 0 {
            0.0
        } else {
            oracle_accepted as f32 / oracle_invocations as f32
        },
        lines_added_by_oracle,
        error_breakdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::draft::{PurchaseDraft, PurchaseHeader};
    use crate::models::events::{EventTrail, PipelineStage};
    use serde_json::json;

    fn store_with_runs() -> PurchaseStore {
        let store = PurchaseStore::open_in_memory().unwrap();

        // Run 1: confident classic extraction.
        let mut a = PurchaseDraft::new(PurchaseHeader::empty("acme"));
        a.header.invoice_number = "A".to_string();
        let id_a = store.insert_draft(&mut a, None).unwrap();
        let mut trail = EventTrail::new();
        trail.record(
            PipelineStage::Confidence,
            "confidence_scored",
            json!({"classic_confidence": 0.9}),
        );
        store.append_events(id_a, trail.events()).unwrap();

        // Run 2: exhausted classic, oracle filled in three lines.
        let mut b = PurchaseDraft::new(PurchaseHeader::empty("acme"));
        b.header.invoice_number = "B".to_string();
        let id_b = store.insert_draft(&mut b, None).unwrap();
        let mut trail = EventTrail::new();
        trail.record(PipelineStage::Optical, "stage_failed", json!({"error": "x"}));
        trail.record(PipelineStage::Relaxed, "strategies_exhausted", json!({}));
        trail.record(
            PipelineStage::Confidence,
            "confidence_scored",
            json!({"classic_confidence": 0.1}),
        );
        trail.record(PipelineStage::Oracle, "oracle_attempt", json!({}));
        trail.record(PipelineStage::Oracle, "oracle_accepted", json!({"lines": 3}));
        trail.record(PipelineStage::Merge, "oracle_lines_merged", json!({"lines": 3}));
        store.append_events(id_b, trail.events()).unwrap();

        store
    }

    #[test]
    fn test_window_fold() {
        let store = store_with_runs();
        let metrics = collect(&store, 10).unwrap();

        assert_eq!(metrics.runs, 2);
        assert!((metrics.average_confidence - 0.5).abs() < 1e-6);
        assert_eq!(metrics.oracle_invocations, 1);
        assert_eq!(metrics.success_rate, 1.0);
        assert_eq!(metrics.lines_added_by_oracle, 3);
        assert_eq!(metrics.error_breakdown.get("stage_failed"), Some(&1));
        assert_eq!(metrics.error_breakdown.get("strategies_exhausted"), Some(&1));
    }

    #[test]
    fn test_window_limits_runs() {
        let store = store_with_runs();
        let metrics = collect(&store, 1).unwrap();
        // Only the newest run (the oracle one) is in the window.
        assert_eq!(metrics.runs, 1);
        assert_eq!(metrics.oracle_invocations, 1);
        assert!((metrics.average_confidence - 0.1).abs() < 1e-6);
    }
}
