//! Append-only stock ledger.
//!
//! Entries are only ever inserted, one per applied line delta; rollback
//! inserts inverse entries pointing back at the originals via
//! `reversal_of`. The running balance is denormalized in `stock_balances`
//! and updated in the same transaction as every insert.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::StoreError;

/// Source type recorded for purchase-driven deltas.
pub const SOURCE_PURCHASE: &str = "purchase";

/// One applied stock delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockLedgerEntry {
    pub id: i64,
    pub product_id: i64,
    pub source_type: String,
    pub source_id: i64,
    /// Purchase line the delta came from, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_id: Option<i64>,
    pub delta: Decimal,
    pub balance_after: Decimal,
    /// Set on rollback entries: the original entry being reversed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reversal_of: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Current balance for a product (zero when never seen).
pub(crate) fn balance(conn: &Connection, product_id: i64) -> Result<Decimal, StoreError> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT balance FROM stock_balances WHERE product_id = ?1",
            params![product_id],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        Some(s) => parse_decimal(&s, "stock_balances.balance"),
        None => Ok(Decimal::ZERO),
    }
}

/// Append one entry and move the running balance, in the caller's
/// transaction. `balance_after` is previous balance plus delta, enforced by
/// strictly sequential application under the store's single writer.
pub(crate) fn append(
    conn: &Connection,
    product_id: i64,
    source_id: i64,
    line_id: Option<i64>,
    delta: Decimal,
    reversal_of: Option<i64>,
) -> Result<StockLedgerEntry, StoreError> {
    let old = balance(conn, product_id)?;
    let balance_after = old + delta;
    let created_at = Utc::now();

    conn.execute(
        "INSERT INTO stock_ledger
             (product_id, source_type, source_id, line_id, delta, balance_after, reversal_of, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            product_id,
            SOURCE_PURCHASE,
            source_id,
            line_id,
            delta.to_string(),
            balance_after.to_string(),
            reversal_of,
            created_at.to_rfc3339(),
        ],
    )?;
    let id = conn.last_insert_rowid();

    conn.execute(
        "INSERT INTO stock_balances (product_id, balance) VALUES (?1, ?2)
         ON CONFLICT(product_id) DO UPDATE SET balance = excluded.balance",
        params![product_id, balance_after.to_string()],
    )?;

    Ok(StockLedgerEntry {
        id,
        product_id,
        source_type: SOURCE_PURCHASE.to_string(),
        source_id,
        line_id,
        delta,
        balance_after,
        reversal_of,
        created_at,
    })
}

/// All entries originated by a purchase, oldest first.
pub(crate) fn entries_for_purchase(
    conn: &Connection,
    purchase_id: i64,
) -> Result<Vec<StockLedgerEntry>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, product_id, source_type, source_id, line_id, delta, balance_after, reversal_of, created_at
         FROM stock_ledger
         WHERE source_type = ?1 AND source_id = ?2
         ORDER BY id",
    )?;

    let rows = stmt.query_map(params![SOURCE_PURCHASE, purchase_id], row_to_entry)?;
    collect_entries(rows)
}

/// Original (non-reversal) entries of a purchase that no reversal points at.
pub(crate) fn unreversed_entries_for_purchase(
    conn: &Connection,
    purchase_id: i64,
) -> Result<Vec<StockLedgerEntry>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.product_id, l.source_type, l.source_id, l.line_id, l.delta, l.balance_after, l.reversal_of, l.created_at
         FROM stock_ledger l
         WHERE l.source_type = ?1 AND l.source_id = ?2 AND l.reversal_of IS NULL
           AND NOT EXISTS (SELECT 1 FROM stock_ledger r WHERE r.reversal_of = l.id)
         ORDER BY l.id",
    )?;

    let rows = stmt.query_map(params![SOURCE_PURCHASE, purchase_id], row_to_entry)?;
    collect_entries(rows)
}

/// Whether a line's delta is still reflected in stock.
pub(crate) fn line_is_reflected(
    conn: &Connection,
    purchase_id: i64,
    line_id: i64,
) -> Result<bool, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*)
         FROM stock_ledger l
         WHERE l.source_type = ?1 AND l.source_id = ?2 AND l.line_id = ?3
           AND l.reversal_of IS NULL
           AND NOT EXISTS (SELECT 1 FROM stock_ledger r WHERE r.reversal_of = l.id)",
        params![SOURCE_PURCHASE, purchase_id, line_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<(StockLedgerEntry, String, String, String)> {
    Ok((
        StockLedgerEntry {
            id: row.get(0)?,
            product_id: row.get(1)?,
            source_type: row.get(2)?,
            source_id: row.get(3)?,
            line_id: row.get(4)?,
            delta: Decimal::ZERO,
            balance_after: Decimal::ZERO,
            reversal_of: row.get(7)?,
            created_at: Utc::now(),
        },
        row.get::<_, String>(5)?,
        row.get::<_, String>(6)?,
        row.get::<_, String>(8)?,
    ))
}

fn collect_entries(
    rows: impl Iterator<Item = rusqlite::Result<(StockLedgerEntry, String, String, String)>>,
) -> Result<Vec<StockLedgerEntry>, StoreError> {
    let mut entries = Vec::new();
    for row in rows {
        let (mut entry, delta, balance_after, created_at) = row?;
        entry.delta = parse_decimal(&delta, "stock_ledger.delta")?;
        entry.balance_after = parse_decimal(&balance_after, "stock_ledger.balance_after")?;
        entry.created_at = parse_timestamp(&created_at)?;
        entries.push(entry);
    }
    Ok(entries)
}

pub(crate) fn parse_decimal(s: &str, field: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(s).map_err(|_| StoreError::Corrupt(format!("{field}: {s}")))
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt(format!("timestamp: {s}")))
}
