//! `forgecrm-catalog` — the product master.
//!
//! Products arrive two ways: entered by hand (locally generated SKU) or pulled
//! from the external inventory feed (the feed's item code becomes the SKU).
//! Brand and category classification for feed items is string-prefix
//! heuristics over the item code; see [`classify`].

pub mod classify;
pub mod product;
pub mod sku;

pub use classify::{Category, ParsedCode, brand_for_code, classify_category, is_oem_code, parse_product_code};
pub use product::{
    Product, ProductCommand, ProductDetails, ProductEvent, ProductId, ProductOrigin,
};
pub use sku::generate_sku;
