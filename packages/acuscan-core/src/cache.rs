//! Local item cache.
//!
//! Every successfully resolved item is written into a small SQLite database
//! so previously scanned items can be reviewed offline. Rows are keyed by
//! inventory id; a re-scan of the same item replaces the earlier row.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::erp::model::StockItem;

/// A cached item row, as stored on disk.
///
/// The ERP payload is flattened at write time: scalar fields become columns,
/// warehouse rows become a JSON array in `warehouse_details_json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedItem {
    pub inventory_id: String,
    pub description: String,
    pub item_class: String,
    pub item_status: String,
    pub base_unit: String,
    pub base_price: f64,
    pub qty_on_hand: f64,
    pub warehouse_details_json: String,
    pub cached_at: chrono::DateTime<chrono::Utc>,
}

/// SQLite-backed cache of resolved items.
pub struct ItemCache {
    conn: Connection,
}

impl ItemCache {
    /// Open (or create) the cache database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create cache directory")?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open cache database at {:?}", path))?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Open the cache at its default location
    /// (platform data dir, e.g. `~/.local/share/acuscan/items.db`).
    pub fn open_default() -> Result<Self> {
        Self::open(&default_cache_path()?)
    }

    /// In-memory cache, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS stock_items (
                    inventory_id TEXT PRIMARY KEY,
                    description TEXT NOT NULL DEFAULT '',
                    item_class TEXT NOT NULL DEFAULT '',
                    item_status TEXT NOT NULL DEFAULT '',
                    base_unit TEXT NOT NULL DEFAULT '',
                    base_price REAL NOT NULL DEFAULT 0,
                    qty_on_hand REAL NOT NULL DEFAULT 0,
                    warehouse_details_json TEXT NOT NULL DEFAULT '[]',
                    cached_at TEXT NOT NULL
                )",
                [],
            )
            .context("Failed to create stock_items table")?;
        Ok(())
    }

    /// Insert or replace the row for this item's inventory id.
    pub fn upsert(&self, item: &StockItem) -> Result<CachedItem> {
        let row = CachedItem::from_item(item)?;
        self.conn
            .execute(
                "INSERT INTO stock_items (
                    inventory_id, description, item_class, item_status,
                    base_unit, base_price, qty_on_hand, warehouse_details_json, cached_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(inventory_id) DO UPDATE SET
                    description = ?2,
                    item_class = ?3,
                    item_status = ?4,
                    base_unit = ?5,
                    base_price = ?6,
                    qty_on_hand = ?7,
                    warehouse_details_json = ?8,
                    cached_at = ?9",
                params![
                    row.inventory_id,
                    row.description,
                    row.item_class,
                    row.item_status,
                    row.base_unit,
                    row.base_price,
                    row.qty_on_hand,
                    row.warehouse_details_json,
                    row.cached_at.to_rfc3339(),
                ],
            )
            .context("Failed to upsert cached item")?;
        tracing::debug!("Cached item {}", row.inventory_id);
        Ok(row)
    }

    /// All cached items, most recently cached first.
    pub fn all(&self) -> Result<Vec<CachedItem>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT inventory_id, description, item_class, item_status,
                        base_unit, base_price, qty_on_hand, warehouse_details_json, cached_at
                 FROM stock_items ORDER BY cached_at DESC",
            )
            .context("Failed to prepare cache query")?;
        let rows = stmt
            .query_map([], row_to_item)
            .context("Failed to query cached items")?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row.context("Failed to read cached item row")?);
        }
        Ok(items)
    }

    /// Look up a single cached item by exact inventory id.
    pub fn get(&self, inventory_id: &str) -> Result<Option<CachedItem>> {
        self.conn
            .query_row(
                "SELECT inventory_id, description, item_class, item_status,
                        base_unit, base_price, qty_on_hand, warehouse_details_json, cached_at
                 FROM stock_items WHERE inventory_id = ?1",
                params![inventory_id],
                row_to_item,
            )
            .optional()
            .context("Failed to query cached item")
    }

    /// Number of cached items.
    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM stock_items", [], |r| r.get(0))
            .context("Failed to count cached items")?;
        Ok(n as usize)
    }

    /// Delete every cached item.
    pub fn clear(&self) -> Result<usize> {
        let n = self
            .conn
            .execute("DELETE FROM stock_items", [])
            .context("Failed to clear cache")?;
        Ok(n)
    }
}

impl CachedItem {
    fn from_item(item: &StockItem) -> Result<Self> {
        let warehouse_rows = item.flatten_warehouse_rows();
        let warehouse_details_json = serde_json::to_string(&warehouse_rows)
            .context("Failed to serialize warehouse rows")?;
        Ok(Self {
            inventory_id: item.inventory_id(),
            description: item.description(),
            item_class: item.item_class(),
            item_status: item.item_status(),
            base_unit: item.base_unit(),
            base_price: item.base_price(),
            qty_on_hand: item.total_qty_on_hand(),
            warehouse_details_json,
            cached_at: chrono::Utc::now(),
        })
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<CachedItem> {
    let cached_at_raw: String = row.get(8)?;
    let cached_at = chrono::DateTime::parse_from_rfc3339(&cached_at_raw)
        .map(|t| t.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now());
    Ok(CachedItem {
        inventory_id: row.get(0)?,
        description: row.get(1)?,
        item_class: row.get(2)?,
        item_status: row.get(3)?,
        base_unit: row.get(4)?,
        base_price: row.get(5)?,
        qty_on_hand: row.get(6)?,
        warehouse_details_json: row.get(7)?,
        cached_at,
    })
}

/// Default cache database path under the platform data directory.
pub fn default_cache_path() -> Result<PathBuf> {
    let dir = dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/share")))
        .context("Failed to find data directory")?;
    Ok(dir.join("acuscan").join("items.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erp::model::FlatWarehouseRow;

    fn item_from_json(json: &str) -> StockItem {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_upsert_and_get() {
        let cache = ItemCache::open_in_memory().unwrap();
        let item = item_from_json(
            r#"{
                "InventoryID": {"value": "AALEGO500"},
                "Description": {"value": "Lego 500 piece set"},
                "BasePrice": {"value": 20.5},
                "QtyOnHand": {"value": 12.0}
            }"#,
        );

        cache.upsert(&item).unwrap();

        let cached = cache.get("AALEGO500").unwrap().expect("item present");
        assert_eq!(cached.description, "Lego 500 piece set");
        assert_eq!(cached.base_price, 20.5);
        assert_eq!(cached.qty_on_hand, 12.0);
        assert_eq!(cache.count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_replaces_existing_row() {
        let cache = ItemCache::open_in_memory().unwrap();
        let before = item_from_json(
            r#"{"InventoryID": {"value": "X1"}, "Description": {"value": "old"}}"#,
        );
        let after = item_from_json(
            r#"{"InventoryID": {"value": "X1"}, "Description": {"value": "new"}}"#,
        );

        cache.upsert(&before).unwrap();
        cache.upsert(&after).unwrap();

        assert_eq!(cache.count().unwrap(), 1);
        let cached = cache.get("X1").unwrap().unwrap();
        assert_eq!(cached.description, "new");
    }

    #[test]
    fn test_warehouse_rows_flattened_to_json() {
        let cache = ItemCache::open_in_memory().unwrap();
        let item = item_from_json(
            r#"{
                "InventoryID": {"value": "W1"},
                "WarehouseDetails": [
                    {"WarehouseID": {"value": "MAIN"}, "QtyOnHand": {"value": 7.0}, "IsDefault": {"value": true}},
                    {"WarehouseID": {"value": "RETAIL"}, "QtyOnHand": {"value": 3.0}}
                ]
            }"#,
        );

        let row = cache.upsert(&item).unwrap();
        let rows: Vec<FlatWarehouseRow> =
            serde_json::from_str(&row.warehouse_details_json).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].warehouse_id, "MAIN");
        assert!(rows[0].is_default);
        assert_eq!(rows[1].qty_on_hand, 3.0);
        // Quantity rolls up across warehouses
        assert_eq!(row.qty_on_hand, 10.0);
    }

    #[test]
    fn test_open_creates_parent_directory_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("items.db");

        {
            let cache = ItemCache::open(&db_path).unwrap();
            let item = item_from_json(r#"{"InventoryID": {"value": "PERSIST1"}}"#);
            cache.upsert(&item).unwrap();
        }

        // Reopen from disk: the row is still there
        let cache = ItemCache::open(&db_path).unwrap();
        assert!(cache.get("PERSIST1").unwrap().is_some());
    }

    #[test]
    fn test_clear_empties_cache() {
        let cache = ItemCache::open_in_memory().unwrap();
        let item = item_from_json(r#"{"InventoryID": {"value": "Z1"}}"#);
        cache.upsert(&item).unwrap();

        assert_eq!(cache.clear().unwrap(), 1);
        assert_eq!(cache.count().unwrap(), 0);
        assert!(cache.get("Z1").unwrap().is_none());
    }
}
