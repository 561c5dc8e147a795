//! Wire types for the inventory feed.
//!
//! The feed is loose about casing and nesting across API revisions: identifiers
//! arrive as `id` or `Key`, codes as `ItemCode` or `Code`, quantities as
//! `qtyOnHand` or `qty` (sometimes stringified numbers), and the sales price in
//! a nested `salePrice.value` or one of three sibling spellings. Decoding is
//! tolerant by construction so one malformed item never aborts a run.

use serde::Deserialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NestedPrice {
    #[serde(default)]
    pub value: Option<JsonValue>,
}

/// One inventory item as listed by the feed.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FeedItem {
    #[serde(default, alias = "Key")]
    id: Option<JsonValue>,

    #[serde(default, rename = "ItemCode", alias = "Code")]
    code: Option<String>,

    #[serde(default, rename = "ItemName", alias = "Name")]
    name: Option<String>,

    #[serde(default, rename = "UnitName")]
    unit: Option<String>,

    #[serde(default, rename = "Description")]
    description: Option<String>,

    #[serde(default, rename = "qtyOnHand", alias = "qty")]
    qty_on_hand: Option<JsonValue>,

    #[serde(default, rename = "salePrice")]
    sale_price: Option<NestedPrice>,

    #[serde(default, rename = "DefaultSalesUnitPrice")]
    default_sales_unit_price: Option<JsonValue>,

    #[serde(default, rename = "salesPrice")]
    sales_price: Option<JsonValue>,

    #[serde(default, rename = "SalesPrice")]
    sales_price_alt: Option<JsonValue>,
}

fn as_clean_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl FeedItem {
    /// The feed's opaque identifier (`id`, falling back to `Key`).
    pub fn external_id(&self) -> Option<String> {
        self.id.as_ref().and_then(as_clean_string)
    }

    /// The item code; doubles as the local SKU.
    pub fn item_code(&self) -> Option<&str> {
        self.code.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    pub fn item_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    pub fn unit(&self) -> &str {
        self.unit.as_deref().unwrap_or("piece")
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref().filter(|d| !d.is_empty())
    }

    /// On-hand quantity; unparseable values become 0.
    pub fn quantity(&self) -> i64 {
        self.qty_on_hand
            .as_ref()
            .and_then(as_f64)
            .map(|q| q as i64)
            .unwrap_or(0)
    }

    /// Sales price in minor currency units.
    ///
    /// Tries the nested `salePrice.value` first, then the direct fields in
    /// their historical order; absent or malformed prices become 0.
    pub fn price_minor(&self) -> i64 {
        let candidates = [
            self.sale_price.as_ref().and_then(|p| p.value.as_ref()),
            self.default_sales_unit_price.as_ref(),
            self.sales_price.as_ref(),
            self.sales_price_alt.as_ref(),
        ];

        for candidate in candidates.into_iter().flatten() {
            if let Some(major) = as_f64(candidate) {
                return (major * 100.0).round() as i64;
            }
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(json: serde_json::Value) -> FeedItem {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn reads_modern_field_names() {
        let it = item(serde_json::json!({
            "id": "3f6a",
            "ItemCode": "FX5U-32MR/ES",
            "ItemName": "MELSEC iQ-F CPU",
            "qtyOnHand": 14,
            "salePrice": { "value": 85000.5 }
        }));
        assert_eq!(it.external_id().as_deref(), Some("3f6a"));
        assert_eq!(it.item_code(), Some("FX5U-32MR/ES"));
        assert_eq!(it.item_name(), Some("MELSEC iQ-F CPU"));
        assert_eq!(it.quantity(), 14);
        assert_eq!(it.price_minor(), 8_500_050);
    }

    #[test]
    fn reads_legacy_aliases() {
        let it = item(serde_json::json!({
            "Key": 1042,
            "Code": "FR-D720S",
            "Name": "Inverter",
            "qty": "7",
            "DefaultSalesUnitPrice": "1200"
        }));
        assert_eq!(it.external_id().as_deref(), Some("1042"));
        assert_eq!(it.item_code(), Some("FR-D720S"));
        assert_eq!(it.quantity(), 7);
        assert_eq!(it.price_minor(), 120_000);
    }

    #[test]
    fn malformed_values_degrade_to_defaults() {
        let it = item(serde_json::json!({
            "id": "x",
            "ItemCode": "  ",
            "qtyOnHand": {"weird": true},
            "salePrice": {"value": "n/a"},
            "SalesPrice": null
        }));
        assert_eq!(it.item_code(), None);
        assert_eq!(it.quantity(), 0);
        assert_eq!(it.price_minor(), 0);
        assert_eq!(it.unit(), "piece");
    }

    #[test]
    fn price_prefers_nested_form() {
        let it = item(serde_json::json!({
            "salePrice": { "value": 10 },
            "DefaultSalesUnitPrice": 999
        }));
        assert_eq!(it.price_minor(), 1_000);
    }
}
