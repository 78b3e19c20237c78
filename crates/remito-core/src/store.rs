//! SQLite-backed purchase store.
//!
//! Draft rows carry a schema-constrained status enum; ledger and event
//! rows are append-only. A single connection behind a mutex serializes
//! writers, which is what makes sequential `balance_after` enforcement and
//! the at-most-one-confirm guarantee hold.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::catalog::CatalogLookup;
use crate::error::{RemitoError, Result, StoreError};
use crate::ledger::{self, StockLedgerEntry};
use crate::models::document::PurchaseDocument;
use crate::models::draft::{
    DraftStatus, LineSource, LinkState, NumberTrust, PurchaseDraft, PurchaseHeader, PurchaseLine,
};
use crate::models::events::{ExtractionEvent, PipelineStage};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS suppliers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    supplier_id TEXT NOT NULL REFERENCES suppliers(id),
    supplier_sku TEXT NOT NULL,
    title TEXT NOT NULL,
    UNIQUE (supplier_id, supplier_sku)
);
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    supplier_id TEXT NOT NULL,
    filename TEXT NOT NULL,
    content BLOB NOT NULL,
    byte_len INTEGER NOT NULL,
    uploaded_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS purchases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER REFERENCES documents(id),
    supplier_id TEXT NOT NULL,
    invoice_number TEXT NOT NULL,
    number_trust TEXT NOT NULL CHECK (number_trust IN ('canonical','labelled','filename')),
    invoice_date TEXT,
    global_discount_pct TEXT NOT NULL,
    vat_rate TEXT NOT NULL,
    declared_total TEXT,
    status TEXT NOT NULL CHECK (status IN ('draft','validated','confirmed','voided')),
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS purchase_lines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    purchase_id INTEGER NOT NULL REFERENCES purchases(id),
    supplier_sku TEXT,
    product_id INTEGER,
    title TEXT NOT NULL,
    quantity TEXT NOT NULL,
    unit_cost TEXT NOT NULL,
    discount_pct TEXT,
    source TEXT NOT NULL CHECK (source IN ('classic','oracle','manual')),
    confidence REAL NOT NULL,
    link_state TEXT NOT NULL CHECK (link_state IN ('matched','unmatched','deleted')),
    qty_clamped INTEGER NOT NULL DEFAULT 0,
    cost_outlier INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS stock_ledger (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER NOT NULL,
    source_type TEXT NOT NULL,
    source_id INTEGER NOT NULL,
    line_id INTEGER,
    delta TEXT NOT NULL,
    balance_after TEXT NOT NULL,
    reversal_of INTEGER REFERENCES stock_ledger(id),
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ledger_product_time ON stock_ledger(product_id, created_at);
CREATE TABLE IF NOT EXISTS stock_balances (
    product_id INTEGER PRIMARY KEY,
    balance TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS extraction_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    purchase_id INTEGER NOT NULL,
    seq INTEGER NOT NULL,
    stage TEXT NOT NULL,
    name TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_purchase_stage ON extraction_events(purchase_id, stage);
";

/// SQLite-backed store for drafts, ledger, events, and the seed catalog.
pub struct PurchaseStore {
    conn: Mutex<Connection>,
}

impl PurchaseStore {
    /// Open (and migrate) a store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(StoreError::from)?;
        Self::init(conn)
    }

    /// Open an in-memory store, used in tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(StoreError::from)?;
        debug!("purchase store schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn guard(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn raw_conn(&self) -> MutexGuard<'_, Connection> {
        self.guard()
    }

    /// Run a closure inside one transaction; any error rolls it back.
    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.guard();
        let tx = conn.transaction().map_err(StoreError::from)?;
        let out = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }

    // ----- seed catalog ----------------------------------------------------

    pub fn add_supplier(&self, id: &str, name: &str) -> Result<()> {
        self.guard()
            .execute(
                "INSERT INTO suppliers (id, name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![id, name],
            )
            .map_err(StoreError::from)?;
        Ok(())
    }

    pub fn add_product(&self, supplier_id: &str, sku: &str, title: &str) -> Result<i64> {
        let conn = self.guard();
        conn.execute(
            "INSERT INTO products (supplier_id, supplier_sku, title) VALUES (?1, ?2, ?3)
             ON CONFLICT(supplier_id, supplier_sku) DO UPDATE SET title = excluded.title",
            params![supplier_id, sku.to_uppercase(), title],
        )
        .map_err(StoreError::from)?;

        let id: i64 = conn
            .query_row(
                "SELECT id FROM products WHERE supplier_id = ?1 AND supplier_sku = ?2",
                params![supplier_id, sku.to_uppercase()],
                |row| row.get(0),
            )
            .map_err(StoreError::from)?;
        Ok(id)
    }

    // ----- documents and drafts -------------------------------------------

    pub fn insert_document(&self, document: &PurchaseDocument, bytes: &[u8]) -> Result<i64> {
        let conn = self.guard();
        conn.execute(
            "INSERT INTO documents (supplier_id, filename, content, byte_len, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                document.supplier_id,
                document.filename,
                bytes,
                document.byte_len as i64,
                document.uploaded_at.to_rfc3339(),
            ],
        )
        .map_err(StoreError::from)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn document_bytes(&self, document_id: i64) -> Result<Vec<u8>> {
        let bytes: Option<Vec<u8>> = self
            .guard()
            .query_row(
                "SELECT content FROM documents WHERE id = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)?;
        bytes.ok_or_else(|| StoreError::Corrupt(format!("document {document_id} missing")).into())
    }

    /// Persist a draft with its lines, assigning ids.
    pub fn insert_draft(
        &self,
        draft: &mut PurchaseDraft,
        document_id: Option<i64>,
    ) -> Result<i64> {
        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO purchases
                     (document_id, supplier_id, invoice_number, number_trust, invoice_date,
                      global_discount_pct, vat_rate, declared_total, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    document_id,
                    draft.header.supplier_id,
                    draft.header.invoice_number,
                    draft.header.number_trust.as_str(),
                    draft.header.invoice_date.map(|d| d.to_string()),
                    draft.header.global_discount_pct.to_string(),
                    draft.header.vat_rate.to_string(),
                    draft.header.declared_total.map(|t| t.to_string()),
                    draft.status.as_str(),
                    draft.created_at.to_rfc3339(),
                ],
            )
            .map_err(StoreError::from)?;
            let purchase_id = tx.last_insert_rowid();

            for line in &mut draft.lines {
                insert_line(tx, purchase_id, line)?;
            }

            draft.id = Some(purchase_id);
            Ok(purchase_id)
        })
    }

    pub fn get_draft(&self, purchase_id: i64) -> Result<PurchaseDraft> {
        let conn = self.guard();
        load_draft(&conn, purchase_id)
    }

    /// Most recent purchase ids, newest first.
    pub fn recent_purchase_ids(&self, limit: usize) -> Result<Vec<i64>> {
        let conn = self.guard();
        let mut stmt = conn
            .prepare("SELECT id FROM purchases ORDER BY id DESC LIMIT ?1")
            .map_err(StoreError::from)?;
        let ids = stmt
            .query_map(params![limit as i64], |row| row.get(0))
            .map_err(StoreError::from)?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .map_err(StoreError::from)?;
        Ok(ids)
    }

    // ----- events ----------------------------------------------------------

    pub fn append_events(&self, purchase_id: i64, events: &[ExtractionEvent]) -> Result<()> {
        self.with_tx(|tx| {
            for event in events {
                append_event(tx, purchase_id, event.stage, &event.name, &event.payload)?;
            }
            Ok(())
        })
    }

    pub fn record_event(
        &self,
        purchase_id: i64,
        stage: PipelineStage,
        name: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let conn = self.guard();
        append_event(&conn, purchase_id, stage, name, payload)
    }

    pub fn events_for(&self, purchase_id: i64) -> Result<Vec<ExtractionEvent>> {
        let conn = self.guard();
        let mut stmt = conn
            .prepare(
                "SELECT seq, stage, name, payload, created_at
                 FROM extraction_events WHERE purchase_id = ?1 ORDER BY seq",
            )
            .map_err(StoreError::from)?;

        let rows = stmt
            .query_map(params![purchase_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(StoreError::from)?;

        let mut events = Vec::new();
        for row in rows {
            let (seq, stage, name, payload, created_at) = row.map_err(StoreError::from)?;
            events.push(ExtractionEvent {
                seq: seq as u32,
                stage: PipelineStage::parse(&stage)
                    .ok_or_else(|| StoreError::Corrupt(format!("stage: {stage}")))?,
                name,
                payload: serde_json::from_str(&payload)
                    .map_err(|_| StoreError::Corrupt("event payload".to_string()))?,
                created_at: ledger::parse_timestamp(&created_at)?,
            });
        }
        Ok(events)
    }

    // ----- stock -----------------------------------------------------------

    pub fn stock_balance(&self, product_id: i64) -> Result<rust_decimal::Decimal> {
        let conn = self.guard();
        Ok(ledger::balance(&conn, product_id)?)
    }

    pub fn ledger_for_purchase(&self, purchase_id: i64) -> Result<Vec<StockLedgerEntry>> {
        let conn = self.guard();
        Ok(ledger::entries_for_purchase(&conn, purchase_id)?)
    }
}

impl CatalogLookup for PurchaseStore {
    fn supplier_exists(&self, supplier_id: &str) -> bool {
        self.guard()
            .query_row(
                "SELECT 1 FROM suppliers WHERE id = ?1",
                params![supplier_id],
                |_| Ok(()),
            )
            .optional()
            .ok()
            .flatten()
            .is_some()
    }

    fn find_supplier_sku(&self, supplier_id: &str, code: &str) -> Option<i64> {
        self.guard()
            .query_row(
                "SELECT id FROM products WHERE supplier_id = ?1 AND supplier_sku = ?2",
                params![supplier_id, code.to_uppercase()],
                |row| row.get(0),
            )
            .optional()
            .ok()
            .flatten()
    }

    fn known_sku_for_title(&self, supplier_id: &str, title: &str) -> Option<String> {
        self.guard()
            .query_row(
                "SELECT supplier_sku FROM products WHERE supplier_id = ?1 AND UPPER(title) = ?2",
                params![supplier_id, title.trim().to_uppercase()],
                |row| row.get(0),
            )
            .optional()
            .ok()
            .flatten()
    }
}

// ----- row helpers shared with the confirmation engine ---------------------

pub(crate) fn insert_line(
    conn: &Connection,
    purchase_id: i64,
    line: &mut PurchaseLine,
) -> Result<()> {
    conn.execute(
        "INSERT INTO purchase_lines
             (purchase_id, supplier_sku, product_id, title, quantity, unit_cost,
              discount_pct, source, confidence, link_state, qty_clamped, cost_outlier)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            purchase_id,
            line.supplier_sku,
            line.product_id,
            line.title,
            line.quantity.to_string(),
            line.unit_cost.to_string(),
            line.discount_pct.map(|d| d.to_string()),
            line.source.as_str(),
            line.confidence as f64,
            line.link_state.as_str(),
            line.qty_clamped,
            line.cost_outlier,
        ],
    )
    .map_err(StoreError::from)?;
    line.id = Some(conn.last_insert_rowid());
    Ok(())
}

pub(crate) fn load_draft(conn: &Connection, purchase_id: i64) -> Result<PurchaseDraft> {
    let header_row = conn
        .query_row(
            "SELECT supplier_id, invoice_number, number_trust, invoice_date,
                    global_discount_pct, vat_rate, declared_total, status, created_at
             FROM purchases WHERE id = ?1",
            params![purchase_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            },
        )
        .optional()
        .map_err(StoreError::from)?
        .ok_or(StoreError::PurchaseNotFound(purchase_id))?;

    let (
        supplier_id,
        invoice_number,
        number_trust,
        invoice_date,
        global_discount_pct,
        vat_rate,
        declared_total,
        status,
        created_at,
    ) = header_row;

    let header = PurchaseHeader {
        supplier_id,
        invoice_number,
        number_trust: NumberTrust::parse(&number_trust)
            .ok_or_else(|| StoreError::Corrupt(format!("number_trust: {number_trust}")))?,
        invoice_date: invoice_date
            .map(|d| {
                d.parse::<chrono::NaiveDate>()
                    .map_err(|_| StoreError::Corrupt(format!("invoice_date: {d}")))
            })
            .transpose()?,
        global_discount_pct: ledger::parse_decimal(&global_discount_pct, "global_discount_pct")?,
        vat_rate: ledger::parse_decimal(&vat_rate, "vat_rate")?,
        declared_total: declared_total
            .map(|t| ledger::parse_decimal(&t, "declared_total"))
            .transpose()?,
    };

    let mut stmt = conn
        .prepare(
            "SELECT id, supplier_sku, product_id, title, quantity, unit_cost, discount_pct,
                    source, confidence, link_state, qty_clamped, cost_outlier
             FROM purchase_lines WHERE purchase_id = ?1 ORDER BY id",
        )
        .map_err(StoreError::from)?;

    let rows = stmt
        .query_map(params![purchase_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, f64>(8)?,
                row.get::<_, String>(9)?,
                row.get::<_, bool>(10)?,
                row.get::<_, bool>(11)?,
            ))
        })
        .map_err(StoreError::from)?;

    let mut lines = Vec::new();
    for row in rows {
        let (
            id,
            supplier_sku,
            product_id,
            title,
            quantity,
            unit_cost,
            discount_pct,
            source,
            confidence,
            link_state,
            qty_clamped,
            cost_outlier,
        ) = row.map_err(StoreError::from)?;

        lines.push(PurchaseLine {
            id: Some(id),
            supplier_sku,
            product_id,
            title,
            quantity: ledger::parse_decimal(&quantity, "quantity")?,
            unit_cost: ledger::parse_decimal(&unit_cost, "unit_cost")?,
            discount_pct: discount_pct
                .map(|d| ledger::parse_decimal(&d, "discount_pct"))
                .transpose()?,
            source: LineSource::parse(&source)
                .ok_or_else(|| StoreError::Corrupt(format!("source: {source}")))?,
            confidence: confidence as f32,
            link_state: LinkState::parse(&link_state)
                .ok_or_else(|| StoreError::Corrupt(format!("link_state: {link_state}")))?,
            qty_clamped,
            cost_outlier,
        });
    }

    Ok(PurchaseDraft {
        id: Some(purchase_id),
        header,
        lines,
        status: DraftStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("status: {status}")))?,
        created_at: ledger::parse_timestamp(&created_at)?,
    })
}

pub(crate) fn set_status(
    conn: &Connection,
    purchase_id: i64,
    status: DraftStatus,
) -> Result<()> {
    conn.execute(
        "UPDATE purchases SET status = ?1 WHERE id = ?2",
        params![status.as_str(), purchase_id],
    )
    .map_err(StoreError::from)?;
    Ok(())
}

pub(crate) fn set_line_link(
    conn: &Connection,
    line_id: i64,
    product_id: Option<i64>,
    link_state: LinkState,
) -> Result<()> {
    conn.execute(
        "UPDATE purchase_lines SET product_id = ?1, link_state = ?2 WHERE id = ?3",
        params![product_id, link_state.as_str(), line_id],
    )
    .map_err(StoreError::from)?;
    Ok(())
}

/// Catalog lookup against an already-held connection, for use inside the
/// confirmation engine's transactions.
pub(crate) fn find_supplier_sku_conn(
    conn: &Connection,
    supplier_id: &str,
    code: &str,
) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM products WHERE supplier_id = ?1 AND supplier_sku = ?2",
        params![supplier_id, code.to_uppercase()],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| StoreError::from(e).into())
}

pub(crate) fn append_event(
    conn: &Connection,
    purchase_id: i64,
    stage: PipelineStage,
    name: &str,
    payload: &serde_json::Value,
) -> Result<()> {
    let next_seq: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM extraction_events WHERE purchase_id = ?1",
            params![purchase_id],
            |row| row.get(0),
        )
        .map_err(StoreError::from)?;

    conn.execute(
        "INSERT INTO extraction_events (purchase_id, seq, stage, name, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            purchase_id,
            next_seq,
            stage.as_str(),
            name,
            payload.to_string(),
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(StoreError::from)?;
    Ok(())
}

// RemitoError conversions keep `?` usable against rusqlite in this module.
impl From<rusqlite::Error> for RemitoError {
    fn from(e: rusqlite::Error) -> Self {
        RemitoError::Store(StoreError::Sqlite(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    fn draft_with_line() -> PurchaseDraft {
        let mut draft = PurchaseDraft::new(PurchaseHeader::empty("acme"));
        draft.header.invoice_number = "0001-00000001".to_string();
        draft.header.number_trust = NumberTrust::Canonical;
        draft.header.declared_total = Some(Decimal::from_str("3700.00").unwrap());
        let mut line = PurchaseLine::new(
            "YERBA SUAVE",
            Decimal::from_str("2").unwrap(),
            Decimal::from_str("1850.00").unwrap(),
        );
        line.supplier_sku = Some("YER-500".to_string());
        draft.lines.push(line);
        draft
    }

    #[test]
    fn test_open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("remito.db");

        let store = PurchaseStore::open(&path).unwrap();
        store.add_supplier("acme", "ACME").unwrap();

        assert!(path.exists());
        drop(store);

        // Reopening sees the persisted rows.
        let reopened = PurchaseStore::open(&path).unwrap();
        assert!(reopened.supplier_exists("acme"));
    }

    #[test]
    fn test_draft_round_trip() {
        let store = PurchaseStore::open_in_memory().unwrap();
        let mut draft = draft_with_line();
        let id = store.insert_draft(&mut draft, None).unwrap();

        let loaded = store.get_draft(id).unwrap();
        assert_eq!(loaded.status, DraftStatus::Draft);
        assert_eq!(loaded.header.invoice_number, "0001-00000001");
        assert_eq!(loaded.lines.len(), 1);
        assert_eq!(loaded.lines[0].supplier_sku.as_deref(), Some("YER-500"));
        assert_eq!(
            loaded.header.declared_total,
            Some(Decimal::from_str("3700.00").unwrap())
        );
    }

    #[test]
    fn test_missing_draft_is_not_found() {
        let store = PurchaseStore::open_in_memory().unwrap();
        assert!(matches!(
            store.get_draft(99),
            Err(RemitoError::Store(StoreError::PurchaseNotFound(99)))
        ));
    }

    #[test]
    fn test_catalog_lookup_over_store() {
        let store = PurchaseStore::open_in_memory().unwrap();
        store.add_supplier("acme", "Distribuidora ACME").unwrap();
        let product_id = store.add_product("acme", "yer-500", "YERBA SUAVE").unwrap();

        assert!(store.supplier_exists("acme"));
        assert!(!store.supplier_exists("otro"));
        assert_eq!(store.find_supplier_sku("acme", "YER-500"), Some(product_id));
        assert_eq!(
            store.known_sku_for_title("acme", "yerba suave"),
            Some("YER-500".to_string())
        );
    }

    #[test]
    fn test_events_round_trip() {
        let store = PurchaseStore::open_in_memory().unwrap();
        let mut draft = draft_with_line();
        let id = store.insert_draft(&mut draft, None).unwrap();

        let mut trail = crate::models::events::EventTrail::new();
        trail.record(PipelineStage::Structured, "attempt_started", json!({}));
        trail.record(
            PipelineStage::Confidence,
            "confidence_scored",
            json!({"classic_confidence": 0.9}),
        );
        store.append_events(id, trail.events()).unwrap();

        let events = store.events_for(id).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "attempt_started");
        assert_eq!(events[1].stage, PipelineStage::Confidence);
    }
}
