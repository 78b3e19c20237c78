//! Append-only extraction event trail.
//!
//! Every pipeline decision is recorded as an [`ExtractionEvent`]; the trail
//! is persisted verbatim and later folded into rolling-window metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Document,
    Structured,
    Heuristic,
    Header,
    SkuRecovery,
    Confidence,
    Optical,
    Relaxed,
    Oracle,
    Merge,
    Persist,
    Confirm,
    Rollback,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Document => "document",
            PipelineStage::Structured => "structured",
            PipelineStage::Heuristic => "heuristic",
            PipelineStage::Header => "header",
            PipelineStage::SkuRecovery => "sku_recovery",
            PipelineStage::Confidence => "confidence",
            PipelineStage::Optical => "optical",
            PipelineStage::Relaxed => "relaxed",
            PipelineStage::Oracle => "oracle",
            PipelineStage::Merge => "merge",
            PipelineStage::Persist => "persist",
            PipelineStage::Confirm => "confirm",
            PipelineStage::Rollback => "rollback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document" => Some(PipelineStage::Document),
            "structured" => Some(PipelineStage::Structured),
            "heuristic" => Some(PipelineStage::Heuristic),
            "header" => Some(PipelineStage::Header),
            "sku_recovery" => Some(PipelineStage::SkuRecovery),
            "confidence" => Some(PipelineStage::Confidence),
            "optical" => Some(PipelineStage::Optical),
            "relaxed" => Some(PipelineStage::Relaxed),
            "oracle" => Some(PipelineStage::Oracle),
            "merge" => Some(PipelineStage::Merge),
            "persist" => Some(PipelineStage::Persist),
            "confirm" => Some(PipelineStage::Confirm),
            "rollback" => Some(PipelineStage::Rollback),
            _ => None,
        }
    }
}

/// One recorded pipeline decision. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionEvent {
    /// Ordinal within one pipeline run.
    pub seq: u32,

    pub stage: PipelineStage,

    /// Event name, e.g. `stage_failed` or `oracle_accepted`.
    pub name: String,

    /// Structured payload for diagnostics.
    pub payload: Value,

    pub created_at: DateTime<Utc>,
}

/// Ordered event collector threaded through a pipeline run.
#[derive(Debug, Default)]
pub struct EventTrail {
    events: Vec<ExtractionEvent>,
}

impl EventTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: PipelineStage, name: &str, payload: Value) {
        tracing::debug!(stage = stage.as_str(), event = name, "pipeline event");
        self.events.push(ExtractionEvent {
            seq: self.events.len() as u32,
            stage,
            name: name.to_string(),
            payload,
            created_at: Utc::now(),
        });
    }

    pub fn events(&self) -> &[ExtractionEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<ExtractionEvent> {
        self.events
    }

    /// Count events with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.events.iter().filter(|e| e.name == name).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trail_is_ordered_and_append_only() {
        let mut trail = EventTrail::new();
        trail.record(PipelineStage::Structured, "attempt_started", json!({}));
        trail.record(PipelineStage::Structured, "stage_failed", json!({"error": "x"}));
        trail.record(PipelineStage::Heuristic, "attempt_started", json!({}));

        let seqs: Vec<u32> = trail.events().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(trail.count("attempt_started"), 2);
    }

    #[test]
    fn test_stage_round_trip() {
        for stage in [
            PipelineStage::Structured,
            PipelineStage::Oracle,
            PipelineStage::SkuRecovery,
            PipelineStage::Rollback,
        ] {
            assert_eq!(PipelineStage::parse(stage.as_str()), Some(stage));
        }
    }
}
