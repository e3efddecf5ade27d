//! Data model for the ERP's entity REST API.
//!
//! The API wraps every field value in an object like `{ "value": "ABC" }`, and
//! the value itself may arrive as a string, number, boolean, or null depending
//! on the field and server version. `FieldValue` models that payload as a
//! tagged union with total conversion functions, so callers never have to
//! inspect raw JSON.

use serde::{Deserialize, Serialize};

/// The payload inside a boxed field wrapper. Untagged: whichever JSON type the
/// server sends is what we get.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
}

impl FieldValue {
    /// String rendering of the value. Numbers and booleans are formatted,
    /// null becomes the empty string.
    pub fn as_str(&self) -> String {
        match self {
            FieldValue::Str(s) => s.clone(),
            FieldValue::Num(n) => {
                // Render integral numbers without a trailing ".0"
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Null => String::new(),
        }
    }

    /// Numeric reading of the value. Strings are parsed when possible,
    /// everything else defaults to 0.0.
    pub fn as_f64(&self) -> f64 {
        match self {
            FieldValue::Num(n) => *n,
            FieldValue::Str(s) => s.trim().parse().unwrap_or(0.0),
            FieldValue::Bool(_) | FieldValue::Null => 0.0,
        }
    }

    /// Boolean reading. The server has been observed sending `true`, `"true"`
    /// and `"1"` for set flags.
    pub fn as_bool(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            FieldValue::Str(s) => {
                let s = s.trim().to_ascii_lowercase();
                s == "true" || s == "1"
            }
            FieldValue::Num(n) => *n != 0.0,
            FieldValue::Null => false,
        }
    }
}

/// The `{ "value": ... }` wrapper around every entity field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Field {
    #[serde(default)]
    pub value: Option<FieldValue>,
}

impl Field {
    pub fn as_str(&self) -> String {
        self.value.as_ref().map(FieldValue::as_str).unwrap_or_default()
    }

    pub fn as_f64(&self) -> f64 {
        self.value.as_ref().map(FieldValue::as_f64).unwrap_or(0.0)
    }

    pub fn as_bool(&self) -> bool {
        self.value.as_ref().map(FieldValue::as_bool).unwrap_or(false)
    }
}

fn field_str(field: &Option<Field>) -> String {
    field.as_ref().map(Field::as_str).unwrap_or_default()
}

fn field_f64(field: &Option<Field>) -> f64 {
    field.as_ref().map(Field::as_f64).unwrap_or(0.0)
}

/// OData collection envelope: `{ "value": [...] }` plus metadata annotations.
/// Some instances return a bare array instead; callers decode the envelope
/// first and fall back to the bare shape.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.context", default)]
    pub context: Option<String>,
    #[serde(rename = "@odata.count", default)]
    pub count: Option<i64>,
}

/// A stock item as returned by `GET /entity/Default/{version}/StockItem`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "InventoryID", default)]
    pub inventory_id: Option<Field>,
    #[serde(rename = "Description", default)]
    pub description: Option<Field>,
    #[serde(rename = "Type", default)]
    pub item_type: Option<Field>,
    #[serde(rename = "ItemClass", default)]
    pub item_class: Option<Field>,
    #[serde(rename = "PostingClass", default)]
    pub posting_class: Option<Field>,
    #[serde(rename = "TaxCategory", default)]
    pub tax_category: Option<Field>,
    #[serde(rename = "DefaultWarehouse", default)]
    pub default_warehouse: Option<Field>,
    #[serde(rename = "BaseUnit", default)]
    pub base_unit: Option<Field>,
    #[serde(rename = "DefaultPrice", default)]
    pub default_price: Option<Field>,
    #[serde(rename = "BasePrice", default)]
    pub base_price: Option<Field>,
    #[serde(rename = "ItemStatus", default)]
    pub item_status: Option<Field>,
    #[serde(rename = "PlanningMethod", default)]
    pub planning_method: Option<Field>,
    #[serde(rename = "QtyOnHand", default)]
    pub qty_on_hand: Option<Field>,
    #[serde(rename = "ValMethod", default)]
    pub val_method: Option<Field>,
    #[serde(rename = "LotSerialClass", default)]
    pub lot_serial_class: Option<Field>,
    #[serde(rename = "WarehouseDetails", default)]
    pub warehouse_details: Vec<WarehouseDetail>,
}

impl StockItem {
    /// The user-facing identifier; falls back to the raw entity id.
    pub fn inventory_id(&self) -> String {
        let id = field_str(&self.inventory_id);
        if !id.is_empty() {
            return id;
        }
        self.id.clone().unwrap_or_default()
    }

    pub fn description(&self) -> String {
        field_str(&self.description)
    }

    pub fn item_type(&self) -> String {
        field_str(&self.item_type)
    }

    pub fn item_class(&self) -> String {
        field_str(&self.item_class)
    }

    pub fn posting_class(&self) -> String {
        field_str(&self.posting_class)
    }

    pub fn tax_category(&self) -> String {
        field_str(&self.tax_category)
    }

    pub fn default_warehouse(&self) -> String {
        field_str(&self.default_warehouse)
    }

    pub fn base_unit(&self) -> String {
        field_str(&self.base_unit)
    }

    pub fn item_status(&self) -> String {
        field_str(&self.item_status)
    }

    /// Prices and quantities are display/cache data, not ledger arithmetic,
    /// so JSON-native f64 is used throughout.
    pub fn default_price(&self) -> f64 {
        field_f64(&self.default_price)
    }

    /// Base price, falling back to the default price when unset.
    pub fn base_price(&self) -> f64 {
        let price = field_f64(&self.base_price);
        if price != 0.0 {
            price
        } else {
            self.default_price()
        }
    }

    /// Total quantity on hand. Prefers the sum over per-warehouse rows;
    /// falls back to the item-level field.
    pub fn total_qty_on_hand(&self) -> f64 {
        if !self.warehouse_details.is_empty() {
            return self.warehouse_details.iter().map(WarehouseDetail::qty_on_hand).sum();
        }
        field_f64(&self.qty_on_hand)
    }

    /// Flat per-warehouse rows suitable for local storage.
    pub fn flatten_warehouse_rows(&self) -> Vec<FlatWarehouseRow> {
        self.warehouse_details
            .iter()
            .map(|w| FlatWarehouseRow {
                warehouse_id: w.warehouse_id(),
                qty_on_hand: w.qty_on_hand(),
                qty_available: w.qty_available(),
                is_default: w.is_default(),
            })
            .collect()
    }
}

/// Per-warehouse quantity breakdown, nested under a stock item when the query
/// expands `WarehouseDetails`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WarehouseDetail {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "WarehouseID", default)]
    pub warehouse_id: Option<Field>,
    #[serde(rename = "QtyOnHand", default)]
    pub qty_on_hand: Option<Field>,
    #[serde(rename = "QtyAvailable", default)]
    pub qty_available: Option<Field>,
    #[serde(rename = "QtyNotAvailable", default)]
    pub qty_not_available: Option<Field>,
    #[serde(rename = "QtyOnPOOrders", default)]
    pub qty_on_po_orders: Option<Field>,
    #[serde(rename = "QtyOnSOOrders", default)]
    pub qty_on_so_orders: Option<Field>,
    #[serde(rename = "IsDefault", default)]
    pub is_default: Option<Field>,
    #[serde(rename = "DefaultReceiptLocationID", default)]
    pub default_receipt_location_id: Option<Field>,
    #[serde(rename = "DefaultShipmentLocationID", default)]
    pub default_shipment_location_id: Option<Field>,
}

impl WarehouseDetail {
    pub fn warehouse_id(&self) -> String {
        field_str(&self.warehouse_id)
    }

    pub fn qty_on_hand(&self) -> f64 {
        field_f64(&self.qty_on_hand)
    }

    pub fn qty_available(&self) -> f64 {
        field_f64(&self.qty_available)
    }

    pub fn qty_not_available(&self) -> f64 {
        field_f64(&self.qty_not_available)
    }

    pub fn qty_on_po_orders(&self) -> f64 {
        field_f64(&self.qty_on_po_orders)
    }

    pub fn qty_on_so_orders(&self) -> f64 {
        field_f64(&self.qty_on_so_orders)
    }

    pub fn is_default(&self) -> bool {
        self.is_default.as_ref().map(Field::as_bool).unwrap_or(false)
    }
}

/// Flattened warehouse row stored in the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatWarehouseRow {
    pub warehouse_id: String,
    pub qty_on_hand: f64,
    pub qty_available: f64,
    pub is_default: bool,
}

/// OAuth token grant response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Body for the cookie-session login endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
    pub tenant: String,
}

/// Response from `GET /entity` listing available endpoint versions.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsResponse {
    #[serde(default)]
    pub version: Option<ServerVersion>,
    #[serde(default)]
    pub endpoints: Option<Vec<EndpointInfo>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerVersion {
    #[serde(rename = "acumaticaBuildVersion", default)]
    pub build_version: Option<String>,
    #[serde(rename = "databaseVersion", default)]
    pub database_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_string_coercions() {
        assert_eq!(FieldValue::Str("ABC".into()).as_str(), "ABC");
        assert_eq!(FieldValue::Num(42.0).as_str(), "42");
        assert_eq!(FieldValue::Num(1.5).as_str(), "1.5");
        assert_eq!(FieldValue::Bool(true).as_str(), "true");
        assert_eq!(FieldValue::Null.as_str(), "");
    }

    #[test]
    fn test_field_value_numeric_coercions() {
        assert_eq!(FieldValue::Num(12.5).as_f64(), 12.5);
        assert_eq!(FieldValue::Str("19.99".into()).as_f64(), 19.99);
        assert_eq!(FieldValue::Str("not a number".into()).as_f64(), 0.0);
        assert_eq!(FieldValue::Null.as_f64(), 0.0);
    }

    #[test]
    fn test_field_value_bool_coercions() {
        assert!(FieldValue::Bool(true).as_bool());
        assert!(FieldValue::Str("true".into()).as_bool());
        assert!(FieldValue::Str("1".into()).as_bool());
        assert!(!FieldValue::Str("false".into()).as_bool());
        assert!(!FieldValue::Null.as_bool());
    }

    #[test]
    fn test_stock_item_deserializes_boxed_fields() {
        let json = r#"{
            "id": "a1b2c3",
            "InventoryID": { "value": "AACOMPUT01" },
            "Description": { "value": "Acer Laptop Computer" },
            "DefaultPrice": { "value": 750.0 },
            "QtyOnHand": { "value": "12" }
        }"#;

        let item: StockItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.inventory_id(), "AACOMPUT01");
        assert_eq!(item.description(), "Acer Laptop Computer");
        assert_eq!(item.default_price(), 750.0);
        assert_eq!(item.total_qty_on_hand(), 12.0);
    }

    #[test]
    fn test_stock_item_identifier_falls_back_to_entity_id() {
        let json = r#"{ "id": "raw-guid" }"#;
        let item: StockItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.inventory_id(), "raw-guid");
    }

    #[test]
    fn test_base_price_falls_back_to_default_price() {
        let json = r#"{
            "InventoryID": { "value": "X" },
            "DefaultPrice": { "value": 10.0 },
            "BasePrice": { "value": null }
        }"#;
        let item: StockItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.base_price(), 10.0);
    }

    #[test]
    fn test_qty_on_hand_prefers_warehouse_rows() {
        let json = r#"{
            "InventoryID": { "value": "X" },
            "QtyOnHand": { "value": 99 },
            "WarehouseDetails": [
                { "WarehouseID": { "value": "MAIN" }, "QtyOnHand": { "value": 3 } },
                { "WarehouseID": { "value": "RETAIL" }, "QtyOnHand": { "value": 4 } }
            ]
        }"#;
        let item: StockItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.total_qty_on_hand(), 7.0);
    }

    #[test]
    fn test_warehouse_is_default_accepts_string_forms() {
        let json = r#"{ "IsDefault": { "value": "1" } }"#;
        let detail: WarehouseDetail = serde_json::from_str(json).unwrap();
        assert!(detail.is_default());

        let json = r#"{ "IsDefault": { "value": true } }"#;
        let detail: WarehouseDetail = serde_json::from_str(json).unwrap();
        assert!(detail.is_default());

        let json = r#"{ "IsDefault": { "value": "false" } }"#;
        let detail: WarehouseDetail = serde_json::from_str(json).unwrap();
        assert!(!detail.is_default());
    }

    #[test]
    fn test_envelope_and_bare_array_shapes() {
        let enveloped = r#"{ "@odata.context": "ctx", "value": [ { "InventoryID": { "value": "A" } } ] }"#;
        let envelope: Envelope<StockItem> = serde_json::from_str(enveloped).unwrap();
        assert_eq!(envelope.value.len(), 1);
        assert_eq!(envelope.context.as_deref(), Some("ctx"));

        let bare = r#"[ { "InventoryID": { "value": "A" } } ]"#;
        let items: Vec<StockItem> = serde_json::from_str(bare).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_token_response_deserializes() {
        let json = r#"{ "access_token": "eyJX.test", "expires_in": 3600, "token_type": "Bearer" }"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "eyJX.test");
        assert_eq!(token.expires_in, Some(3600));
    }

    #[test]
    fn test_flatten_warehouse_rows() {
        let json = r#"{
            "WarehouseDetails": [
                {
                    "WarehouseID": { "value": "MAIN" },
                    "QtyOnHand": { "value": 5 },
                    "QtyAvailable": { "value": 4 },
                    "IsDefault": { "value": true }
                }
            ]
        }"#;
        let item: StockItem = serde_json::from_str(json).unwrap();
        let rows = item.flatten_warehouse_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].warehouse_id, "MAIN");
        assert_eq!(rows[0].qty_on_hand, 5.0);
        assert_eq!(rows[0].qty_available, 4.0);
        assert!(rows[0].is_default);
    }
}
