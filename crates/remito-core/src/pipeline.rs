//! Cascading extraction pipeline.
//!
//! An ordered list of interchangeable strategies, coordinated by a
//! controller that stops at the first sufficient result. A stage failure
//! continues the cascade; only total exhaustion yields an empty draft,
//! which is a valid terminal state for human review.

use serde_json::json;
use tracing::{info, warn};

use crate::catalog::CatalogLookup;
use crate::config::{ExtractionConfig, RemitoConfig};
use crate::error::ExtractError;
use crate::extract::confidence::{self, ConfidenceReport};
use crate::extract::header::HeaderResolver;
use crate::extract::heuristic::HeuristicParser;
use crate::extract::numbers::clamp_quantity;
use crate::extract::optical::OpticalCapability;
use crate::extract::sku::{SkuDecision, SkuRecovery};
use crate::extract::structured::StructuredExtractor;
use crate::models::document::PurchaseDocument;
use crate::models::draft::{LineSource, PurchaseDraft, PurchaseLine};
use crate::models::events::{EventTrail, ExtractionEvent, PipelineStage};
use crate::oracle::{OracleAdapter, OracleRequest};
use crate::pdf::{PdfExtractor, PdfProcessor, PdfType};

/// Extraction context shared by the strategies of one run.
pub struct StrategyContext<'a> {
    pub document: &'a [u8],
    pub digital_text: Option<&'a str>,
    pub recovered_text: Option<&'a str>,
    pub config: &'a ExtractionConfig,
}

impl StrategyContext<'_> {
    /// Optically recovered text wins over embedded text once present.
    pub fn best_text(&self) -> Option<&str> {
        self.recovered_text.or(self.digital_text)
    }
}

/// Output of one strategy attempt.
#[derive(Debug, Default)]
pub struct StrategyOutcome {
    pub lines: Vec<PurchaseLine>,
    pub scanned: usize,
    pub strict_matches: usize,
    pub sufficient: bool,
    /// Text recovered by this strategy, kept for later stages.
    pub recovered_text: Option<String>,
}

/// One interchangeable "attempt extraction" implementation.
pub trait ExtractionStrategy {
    fn name(&self) -> &'static str;
    fn stage(&self) -> PipelineStage;
    fn attempt(&self, ctx: &StrategyContext<'_>) -> Result<StrategyOutcome, ExtractError>;
}

struct StructuredStrategy;

impl ExtractionStrategy for StructuredStrategy {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Structured
    }

    fn attempt(&self, ctx: &StrategyContext<'_>) -> Result<StrategyOutcome, ExtractError> {
        let Some(text) = ctx.digital_text else {
            return Ok(StrategyOutcome::default());
        };

        let extractor = StructuredExtractor::new(
            ctx.config.min_table_rows,
            ctx.config.quantity_clamp,
            ctx.config.unit_cost_ceiling,
        );
        let out = extractor.extract(text);
        let sufficient = out.consistent && out.lines.len() >= ctx.config.min_lines;

        Ok(StrategyOutcome {
            scanned: out.rows_seen,
            strict_matches: out.lines.len(),
            sufficient,
            lines: out.lines,
            recovered_text: None,
        })
    }
}

struct HeuristicStrategy;

impl ExtractionStrategy for HeuristicStrategy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Heuristic
    }

    fn attempt(&self, ctx: &StrategyContext<'_>) -> Result<StrategyOutcome, ExtractError> {
        let Some(text) = ctx.best_text() else {
            return Ok(StrategyOutcome::default());
        };

        let parser = HeuristicParser::new(ctx.config.quantity_clamp, ctx.config.unit_cost_ceiling);
        let out = parser.parse(text);

        Ok(StrategyOutcome {
            sufficient: out.lines.len() >= ctx.config.min_lines,
            scanned: out.scanned,
            strict_matches: out.strict_matches,
            lines: out.lines,
            recovered_text: None,
        })
    }
}

struct OpticalStrategy<'a> {
    capability: &'a dyn OpticalCapability,
}

impl ExtractionStrategy for OpticalStrategy<'_> {
    fn name(&self) -> &'static str {
        "optical"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Optical
    }

    fn attempt(&self, ctx: &StrategyContext<'_>) -> Result<StrategyOutcome, ExtractError> {
        let recovered = self.capability.rasterize_and_extract(ctx.document)?;

        let parser = HeuristicParser::new(ctx.config.quantity_clamp, ctx.config.unit_cost_ceiling);
        let out = parser.parse(&recovered);

        Ok(StrategyOutcome {
            sufficient: out.lines.len() >= ctx.config.min_lines,
            scanned: out.scanned,
            strict_matches: out.strict_matches,
            lines: out.lines,
            recovered_text: Some(recovered),
        })
    }
}

struct RelaxedStrategy;

impl ExtractionStrategy for RelaxedStrategy {
    fn name(&self) -> &'static str {
        "relaxed"
    }

    fn stage(&self) -> PipelineStage {
        PipelineStage::Relaxed
    }

    fn attempt(&self, ctx: &StrategyContext<'_>) -> Result<StrategyOutcome, ExtractError> {
        let Some(text) = ctx.best_text() else {
            return Ok(StrategyOutcome::default());
        };

        let parser = HeuristicParser::new(ctx.config.quantity_clamp, ctx.config.unit_cost_ceiling)
            .with_relaxed(true);
        let out = parser.parse(text);

        Ok(StrategyOutcome {
            sufficient: out.lines.len() >= ctx.config.min_lines,
            scanned: out.scanned,
            strict_matches: out.strict_matches,
            lines: out.lines,
            recovered_text: None,
        })
    }
}

/// Result of one pipeline run over one document.
#[derive(Debug)]
pub struct PipelineRun {
    pub draft: PurchaseDraft,
    pub confidence: ConfidenceReport,
    pub events: Vec<ExtractionEvent>,
    pub oracle_lines_added: usize,
    /// Catastrophic parse failure, surfaced while still producing a
    /// zero-line draft with its full event trail.
    pub fatal: Option<String>,
}

/// Pipeline controller: one synchronous unit of work per document.
pub struct ExtractionPipeline<'a> {
    config: &'a RemitoConfig,
    catalog: &'a dyn CatalogLookup,
    optical: Option<&'a dyn OpticalCapability>,
    oracle: Option<&'a OracleAdapter>,
}

impl<'a> ExtractionPipeline<'a> {
    pub fn new(config: &'a RemitoConfig, catalog: &'a dyn CatalogLookup) -> Self {
        Self {
            config,
            catalog,
            optical: None,
            oracle: None,
        }
    }

    pub fn with_optical(mut self, optical: &'a dyn OpticalCapability) -> Self {
        self.optical = Some(optical);
        self
    }

    pub fn with_oracle(mut self, oracle: &'a OracleAdapter) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Run the full cascade over a PDF document.
    pub fn run(&self, document: &PurchaseDocument, bytes: &[u8]) -> PipelineRun {
        let mut fatal = None;
        let mut digital_text = None;

        let mut extractor = PdfExtractor::new();
        match extractor.load(bytes) {
            Ok(()) => match extractor.analyze(self.config.pdf.min_text_length) {
                PdfType::Digital => match extractor.extract_text() {
                    Ok(text) => digital_text = Some(text),
                    Err(e) => warn!(error = %e, "text extraction failed on digital PDF"),
                },
                PdfType::Scanned | PdfType::Empty => {}
            },
            Err(e) => {
                warn!(error = %e, "catastrophic PDF parse failure");
                fatal = Some(e.to_string());
            }
        }

        self.run_cascade(document, bytes, digital_text, fatal)
    }

    /// Cascade entry point with text acquisition already done; lets tests
    /// and non-PDF callers drive the same path.
    pub(crate) fn run_cascade(
        &self,
        document: &PurchaseDocument,
        bytes: &[u8],
        digital_text: Option<String>,
        fatal: Option<String>,
    ) -> PipelineRun {
        let mut trail = EventTrail::new();
        trail.record(
            PipelineStage::Document,
            "pipeline_started",
            json!({
                "filename": document.filename,
                "supplier_id": document.supplier_id,
                "digital_text": digital_text.is_some(),
            }),
        );
        if let Some(reason) = &fatal {
            trail.record(
                PipelineStage::Document,
                "fatal_parse_failure",
                json!({"error": reason}),
            );
        }

        let mut recovered_text: Option<String> = None;
        let mut best = StrategyOutcome::default();
        let mut strategy_used = "none".to_string();

        let structured = StructuredStrategy;
        let heuristic = HeuristicStrategy;
        let optical = self.optical.map(|capability| OpticalStrategy { capability });
        let relaxed = RelaxedStrategy;

        let mut strategies: Vec<&dyn ExtractionStrategy> = vec![&structured, &heuristic];
        if let Some(optical) = &optical {
            strategies.push(optical);
        }
        strategies.push(&relaxed);

        for strategy in strategies {
            if best.sufficient {
                break;
            }

            let ctx = StrategyContext {
                document: bytes,
                digital_text: digital_text.as_deref(),
                recovered_text: recovered_text.as_deref(),
                config: &self.config.extraction,
            };

            trail.record(strategy.stage(), "attempt_started", json!({}));

            match strategy.attempt(&ctx) {
                Ok(mut outcome) => {
                    trail.record(
                        strategy.stage(),
                        "attempt_finished",
                        json!({
                            "lines": outcome.lines.len(),
                            "scanned": outcome.scanned,
                            "strict_matches": outcome.strict_matches,
                            "sufficient": outcome.sufficient,
                        }),
                    );

                    if let Some(text) = outcome.recovered_text.take() {
                        recovered_text = Some(text);
                    }

                    if outcome.sufficient || outcome.lines.len() > best.lines.len() {
                        strategy_used = strategy.name().to_string();
                        best = outcome;
                    }
                }
                Err(e) => {
                    trail.record(
                        strategy.stage(),
                        "stage_failed",
                        json!({"error": e.to_string()}),
                    );
                }
            }
        }

        if best.lines.is_empty() {
            trail.record(PipelineStage::Relaxed, "strategies_exhausted", json!({}));
        }

        // Header resolution runs independently of line extraction.
        let header_text = recovered_text
            .as_deref()
            .or(digital_text.as_deref())
            .unwrap_or("");
        let resolver = HeaderResolver::new(self.config.extraction.tax_id_digits);
        let resolution = resolver.resolve(&document.supplier_id, header_text, document.stem());
        for token in &resolution.rejected_tax_tokens {
            trail.record(
                PipelineStage::Header,
                "tax_id_candidate_rejected",
                json!({"token": token}),
            );
        }
        trail.record(
            PipelineStage::Header,
            "header_resolved",
            json!({
                "invoice_number": resolution.header.invoice_number,
                "trust": resolution.header.number_trust.as_str(),
            }),
        );

        // Per-line SKU recovery and normalization flags.
        let recovery = SkuRecovery::new(self.catalog);
        let mut classic_lines = best.lines;
        for line in &mut classic_lines {
            line.source = LineSource::Classic;
            for decision in recovery.recover(&document.supplier_id, line) {
                let (name, payload) = match decision {
                    SkuDecision::RejectedUnitAdjacent { token } => {
                        ("sku_rejected_unit_adjacent", json!({"token": token}))
                    }
                    SkuDecision::Compacted { from, to } => {
                        ("sku_compacted", json!({"from": from, "to": to}))
                    }
                    SkuDecision::FromTitleMemory { sku } => {
                        ("sku_from_title_memory", json!({"sku": sku}))
                    }
                };
                trail.record(PipelineStage::SkuRecovery, name, payload);
            }

            if line.qty_clamped {
                trail.record(
                    PipelineStage::Heuristic,
                    "quantity_clamped",
                    json!({"title": line.title, "quantity": line.quantity.to_string()}),
                );
            }
            if line.cost_outlier {
                trail.record(
                    PipelineStage::Heuristic,
                    "unit_cost_outlier_excluded",
                    json!({"title": line.title, "unit_cost": line.unit_cost.to_string()}),
                );
            }
        }

        let clamped_count = classic_lines.iter().filter(|l| l.qty_clamped).count() as u32;
        let header_found = resolution.header.number_trust != crate::models::draft::NumberTrust::Filename;

        let confidence = confidence::score(
            &strategy_used,
            header_text,
            best.scanned,
            best.strict_matches,
            header_found,
            clamped_count,
        );
        trail.record(
            PipelineStage::Confidence,
            "confidence_scored",
            json!({
                "classic_confidence": confidence.classic_confidence,
                "strategy_used": confidence.strategy_used,
                "numeric_density": confidence.numeric_density,
                "grammar_match_ratio": confidence.grammar_match_ratio,
            }),
        );

        // AI fallback, only under low confidence or an empty classic result.
        let mut oracle_lines_added = 0usize;
        let oracle_wanted = classic_lines.is_empty()
            || confidence.classic_confidence < self.config.oracle.trigger_confidence;

        if oracle_wanted {
            let adapter = if self.config.oracle.enabled {
                self.oracle
            } else {
                None
            };
            match (adapter, header_text.is_empty()) {
                (Some(adapter), false) => {
                    trail.record(
                        PipelineStage::Oracle,
                        "oracle_attempt",
                        json!({
                            "classic_lines": classic_lines.len(),
                            "classic_confidence": confidence.classic_confidence,
                        }),
                    );

                    let request = OracleRequest {
                        raw_text: header_text.to_string(),
                        hint_lines: classic_lines.len(),
                        hint_confidence: confidence.classic_confidence,
                    };

                    match adapter.extract(&request) {
                        Ok(extraction) => {
                            trail.record(
                                PipelineStage::Oracle,
                                "oracle_accepted",
                                json!({"lines": extraction.lines.len()}),
                            );

                            // Safe merge: oracle lines are appended only when
                            // the classic list is empty, never deduplicated
                            // against or substituted for classic lines.
                            if classic_lines.is_empty() {
                                for oracle_line in extraction.lines {
                                    let mut line = oracle_line.into_purchase_line();
                                    let (qty, clamped) = clamp_quantity(
                                        line.quantity,
                                        self.config.extraction.quantity_clamp,
                                    );
                                    line.quantity = qty;
                                    line.qty_clamped = clamped;
                                    line.cost_outlier =
                                        line.unit_cost > self.config.extraction.unit_cost_ceiling;
                                    classic_lines.push(line);
                                    oracle_lines_added += 1;
                                }
                                trail.record(
                                    PipelineStage::Merge,
                                    "oracle_lines_merged",
                                    json!({"lines": oracle_lines_added}),
                                );
                            } else {
                                trail.record(
                                    PipelineStage::Merge,
                                    "oracle_merge_skipped",
                                    json!({"reason": "classic lines present"}),
                                );
                            }
                        }
                        Err(e) => {
                            trail.record(
                                PipelineStage::Oracle,
                                "oracle_failed",
                                json!({"error": e.to_string()}),
                            );
                        }
                    }
                }
                (Some(_), true) => {
                    trail.record(
                        PipelineStage::Oracle,
                        "oracle_skipped_no_text",
                        json!({}),
                    );
                }
                (None, _) => {
                    trail.record(
                        PipelineStage::Oracle,
                        "oracle_skipped_disabled",
                        json!({}),
                    );
                }
            }
        }

        let mut draft = PurchaseDraft::new(resolution.header);
        draft.lines = classic_lines;

        trail.record(
            PipelineStage::Merge,
            "draft_assembled",
            json!({
                "line_count": draft.lines.len(),
                "oracle_lines": oracle_lines_added,
            }),
        );

        info!(
            supplier = %document.supplier_id,
            filename = %document.filename,
            lines = draft.lines.len(),
            confidence = confidence.classic_confidence,
            strategy = %strategy_used,
            "pipeline run finished"
        );

        PipelineRun {
            draft,
            confidence,
            events: trail.into_events(),
            oracle_lines_added,
            fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::extract::optical::FixedOptical;
    use crate::models::draft::{LineSource, NumberTrust};
    use crate::oracle::OracleClient;
    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use std::str::FromStr;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CLEAN_TABLE: &str = "\
REMITO N° 0001-00012345
Fecha: 15/03/2024
CODIGO  CANTIDAD  DESCRIPCION  P.UNITARIO  IMPORTE
YER-500 2 YERBA SUAVE 500 GR 1.850,00 3.700,00
AZ-1201 5 AZUCAR COMUN 1KG 950,00 4.750,00
FID-235 12 FIDEOS GUISEROS 980,50 11.766,00
LAV-055 3 LAVANDINA 1L 720,00 2.160,00
GAS-225 6 GASEOSA COLA 2.25L 1.500,00 9.000,00
TOTAL 31.376,00
";

    struct CountingClient {
        calls: AtomicUsize,
        responses: Mutex<Vec<Result<Value, crate::error::OracleError>>>,
    }

    impl CountingClient {
        fn new(responses: Vec<Result<Value, crate::error::OracleError>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                responses: Mutex::new(responses),
            }
        }
    }

    impl OracleClient for CountingClient {
        fn extract(&self, _request: &OracleRequest) -> Result<Value, crate::error::OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(crate::error::OracleError::Transport("exhausted".to_string()))
            } else {
                responses.remove(0)
            }
        }
    }

    fn three_line_response() -> Value {
        json!({
            "header": {"invoice_number": "0002-00000007"},
            "lines": [
                {"sku": "YER-500", "title": "YERBA SUAVE", "qty": 2, "unit_cost": 1850.0},
                {"title": "AZUCAR COMUN", "qty": 5, "unit_cost": 950.0},
                {"title": "FIDEOS GUISEROS", "qty": 12, "unit_cost": 980.5}
            ]
        })
    }

    fn doc() -> PurchaseDocument {
        PurchaseDocument::new("acme", "remito-scan.pdf", b"%PDF-")
    }

    fn count_stage(run: &PipelineRun, stage: PipelineStage) -> usize {
        run.events.iter().filter(|e| e.stage == stage).count()
    }

    fn count_event(run: &PipelineRun, name: &str) -> usize {
        run.events.iter().filter(|e| e.name == name).count()
    }

    #[test]
    fn test_scenario_digital_table_needs_no_fallbacks() {
        let mut config = RemitoConfig::default();
        config.oracle.enabled = true;
        let catalog = MemoryCatalog::new();
        let optical = FixedOptical::with_text("should never be consulted");
        let adapter = OracleAdapter::new(
            Box::new(CountingClient::new(vec![Ok(three_line_response())])),
            2,
        );
        let pipeline = ExtractionPipeline::new(&config, &catalog)
            .with_optical(&optical)
            .with_oracle(&adapter);

        let run = pipeline.run_cascade(&doc(), b"%PDF-", Some(CLEAN_TABLE.to_string()), None);

        assert_eq!(run.draft.lines.len(), 5);
        assert!(run.confidence.classic_confidence >= 0.8);
        assert_eq!(run.confidence.strategy_used, "structured");
        assert_eq!(run.draft.header.invoice_number, "0001-00012345");
        assert_eq!(run.draft.header.number_trust, NumberTrust::Canonical);

        assert_eq!(count_stage(&run, PipelineStage::Optical), 0);
        assert_eq!(count_event(&run, "oracle_attempt"), 0);
        assert_eq!(run.oracle_lines_added, 0);
    }

    #[test]
    fn test_scenario_scanned_empty_classic_oracle_fills_in() {
        let mut config = RemitoConfig::default();
        config.oracle.enabled = true;
        let catalog = MemoryCatalog::new();
        let optical = FixedOptical::with_text("manchas ilegibles sin datos");
        let adapter = OracleAdapter::new(
            Box::new(CountingClient::new(vec![Ok(three_line_response())])),
            2,
        );
        let pipeline = ExtractionPipeline::new(&config, &catalog)
            .with_optical(&optical)
            .with_oracle(&adapter);

        let run = pipeline.run_cascade(&doc(), b"%PDF-", None, None);

        assert_eq!(run.draft.lines.len(), 3);
        assert!(run.draft.lines.iter().all(|l| l.source == LineSource::Oracle));
        assert_eq!(run.oracle_lines_added, 3);

        assert!(count_stage(&run, PipelineStage::Optical) > 0);
        assert_eq!(count_event(&run, "strategies_exhausted"), 1);
        assert_eq!(count_event(&run, "oracle_lines_merged"), 1);
    }

    #[test]
    fn test_merge_exclusivity_keeps_classic_lines() {
        let mut config = RemitoConfig::default();
        config.oracle.enabled = true;
        // Force the oracle to be consulted even with classic output.
        config.oracle.trigger_confidence = 1.0;

        let catalog = MemoryCatalog::new();
        let adapter = OracleAdapter::new(
            Box::new(CountingClient::new(vec![Ok(three_line_response())])),
            2,
        );
        let pipeline = ExtractionPipeline::new(&config, &catalog).with_oracle(&adapter);

        let text = "2 YERBA SUAVE 1.850,00\n5 AZUCAR COMUN 950,00".to_string();
        let run = pipeline.run_cascade(&doc(), b"%PDF-", Some(text), None);

        assert_eq!(run.draft.lines.len(), 2);
        assert!(run.draft.lines.iter().all(|l| l.source == LineSource::Classic));
        assert_eq!(run.oracle_lines_added, 0);
        assert_eq!(count_event(&run, "oracle_merge_skipped"), 1);
    }

    #[test]
    fn test_optical_failure_continues_cascade() {
        let config = RemitoConfig::default();
        let catalog = MemoryCatalog::new();
        let optical = FixedOptical::failing();
        let pipeline = ExtractionPipeline::new(&config, &catalog).with_optical(&optical);

        let run = pipeline.run_cascade(&doc(), b"%PDF-", None, None);

        assert!(run.draft.lines.is_empty());
        assert_eq!(count_event(&run, "stage_failed"), 1);
        assert_eq!(count_event(&run, "strategies_exhausted"), 1);
    }

    #[test]
    fn test_fatal_parse_still_yields_draft_with_trail() {
        let config = RemitoConfig::default();
        let catalog = MemoryCatalog::new();
        let pipeline = ExtractionPipeline::new(&config, &catalog);

        let run = pipeline.run_cascade(
            &doc(),
            b"garbage",
            None,
            Some("failed to parse PDF: bad xref".to_string()),
        );

        assert!(run.fatal.is_some());
        assert!(run.draft.lines.is_empty());
        assert_eq!(run.draft.header.number_trust, NumberTrust::Filename);
        assert_eq!(count_event(&run, "fatal_parse_failure"), 1);
        assert!(count_event(&run, "draft_assembled") == 1);
    }

    #[test]
    fn test_oracle_quantities_are_clamped_and_flagged() {
        let mut config = RemitoConfig::default();
        config.oracle.enabled = true;
        config.extraction.quantity_clamp = Decimal::from_str("10").unwrap();

        let catalog = MemoryCatalog::new();
        let response = json!({
            "lines": [{"title": "TORNILLOS", "qty": 5000, "unit_cost": 1.0}]
        });
        let adapter = OracleAdapter::new(Box::new(CountingClient::new(vec![Ok(response)])), 2);
        let pipeline = ExtractionPipeline::new(&config, &catalog).with_oracle(&adapter);

        let run = pipeline.run_cascade(&doc(), b"%PDF-", Some("sin lineas aca".to_string()), None);

        assert_eq!(run.draft.lines.len(), 1);
        assert_eq!(run.draft.lines[0].quantity, Decimal::from_str("10").unwrap());
        assert!(run.draft.lines[0].qty_clamped);
    }
}
