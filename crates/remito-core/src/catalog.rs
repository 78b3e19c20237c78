//! Read-only catalog lookup consumed during recovery and validation.

use std::collections::{HashMap, HashSet};

/// Catalog lookup seam. Read-only; safe to share across concurrent
/// pipeline runs without locking.
pub trait CatalogLookup: Send + Sync {
    /// Whether the supplier is registered.
    fn supplier_exists(&self, supplier_id: &str) -> bool;

    /// Resolve a supplier's product code to a catalog product id.
    fn find_supplier_sku(&self, supplier_id: &str, code: &str) -> Option<i64>;

    /// Map a previously-seen title to its known supplier code.
    fn known_sku_for_title(&self, supplier_id: &str, title: &str) -> Option<String> {
        let _ = (supplier_id, title);
        None
    }
}

/// In-memory catalog, used in tests and small deployments.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    suppliers: HashSet<String>,
    by_sku: HashMap<(String, String), i64>,
    by_title: HashMap<(String, String), String>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_supplier(&mut self, supplier_id: impl Into<String>) {
        self.suppliers.insert(supplier_id.into());
    }

    pub fn add_product(&mut self, supplier_id: &str, sku: &str, product_id: i64) {
        self.suppliers.insert(supplier_id.to_string());
        self.by_sku
            .insert((supplier_id.to_string(), normalize(sku)), product_id);
    }

    pub fn add_title_alias(&mut self, supplier_id: &str, title: &str, sku: &str) {
        self.by_title
            .insert((supplier_id.to_string(), normalize(title)), sku.to_string());
    }
}

impl CatalogLookup for MemoryCatalog {
    fn supplier_exists(&self, supplier_id: &str) -> bool {
        self.suppliers.contains(supplier_id)
    }

    fn find_supplier_sku(&self, supplier_id: &str, code: &str) -> Option<i64> {
        self.by_sku
            .get(&(supplier_id.to_string(), normalize(code)))
            .copied()
    }

    fn known_sku_for_title(&self, supplier_id: &str, title: &str) -> Option<String> {
        self.by_title
            .get(&(supplier_id.to_string(), normalize(title)))
            .cloned()
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_uppercase()
}
