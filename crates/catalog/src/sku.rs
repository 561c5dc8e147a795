//! Local SKU generation for manually entered products.

use uuid::Uuid;

/// Generate a SKU of the form `<BRAND3>-<MODEL|XXX>-<6 hex>`.
///
/// Only manually entered products get a generated SKU; imported products use
/// the feed's item code. The random tail keeps collisions away when a brand
/// sells several unnamed models.
pub fn generate_sku(brand: &str, model: Option<&str>) -> String {
    let prefix: String = brand
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_uppercase();
    let prefix = if prefix.is_empty() {
        "PRD".to_string()
    } else {
        prefix
    };

    let model = match model.filter(|m| !m.trim().is_empty()) {
        Some(m) => m.trim().to_string(),
        None => "XXX".to_string(),
    };

    // UUIDv7 front bits are a timestamp; the tail bits are random, so take
    // the tail to keep same-millisecond generations distinct.
    let hex = Uuid::now_v7().simple().to_string();
    let tail = hex[hex.len() - 6..].to_uppercase();

    format!("{prefix}-{model}-{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_brand_prefix_and_model() {
        let sku = generate_sku("Siemens", Some("S7-1200"));
        assert!(sku.starts_with("SIE-S7-1200-"), "{sku}");
        assert_eq!(sku.len(), "SIE-S7-1200-".len() + 6);
    }

    #[test]
    fn falls_back_for_missing_model_and_short_brand() {
        let sku = generate_sku("", None);
        assert!(sku.starts_with("PRD-XXX-"), "{sku}");
    }

    #[test]
    fn two_generations_differ() {
        assert_ne!(
            generate_sku("Acme", Some("M1")),
            generate_sku("Acme", Some("M1"))
        );
    }
}
