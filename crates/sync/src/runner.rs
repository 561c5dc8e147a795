//! The sync run: classify each fetched item and upsert it into the catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use forgecrm_catalog::{Category, brand_for_code, classify_category};

use crate::client::{PageSource, SyncError, fetch_all_items};
use crate::item::FeedItem;

/// A feed item normalized into what the catalog needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub external_id: String,
    /// The item code; doubles as the SKU and upsert key.
    pub code: String,
    pub name: String,
    pub brand: String,
    pub category: Category,
    pub description: Option<String>,
    pub price_minor: Option<i64>,
    pub quantity: i64,
}

impl ImportRecord {
    /// Classify a feed item; `None` when id or code is missing (skipped).
    pub fn from_item(item: &FeedItem) -> Option<Self> {
        let external_id = item.external_id()?;
        let code = item.item_code()?.to_string();
        let name = item
            .item_name()
            .map(str::to_string)
            .unwrap_or_else(|| code.clone());

        Some(Self {
            external_id,
            brand: brand_for_code(&code).to_string(),
            category: classify_category(&code),
            name,
            description: item.description().map(str::to_string),
            price_minor: Some(item.price_minor()),
            quantity: item.quantity(),
            code,
        })
    }
}

#[derive(Debug, Error)]
pub enum SyncWriteError {
    #[error("catalog rejected {code}: {reason}")]
    Rejected { code: String, reason: String },

    #[error("catalog write failed for {code}: {reason}")]
    Failed { code: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Where imported products land.
///
/// The API wires this to the command dispatcher + catalog read model; tests
/// use an in-memory fake. Keeping the runner behind this seam means the
/// pull/classify/upsert loop never sees HTTP or storage details.
pub trait CatalogWriter {
    /// Create the product if its code is unknown, update it otherwise.
    fn upsert_imported(&self, record: ImportRecord) -> Result<UpsertOutcome, SyncWriteError>;

    /// Update only the stock quantity of an already-known code.
    ///
    /// Returns `false` when the code is unknown locally (the item is ignored).
    fn refresh_stock(&self, code: &str, quantity: i64) -> Result<bool, SyncWriteError>;
}

/// Outcome of a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub total_fetched: usize,
    pub created: usize,
    pub updated: usize,
    /// Items without an id or code.
    pub skipped: usize,
    /// Items the catalog rejected or failed to write.
    pub failed: usize,
    pub completed_at: DateTime<Utc>,
}

/// Full sync: fetch everything, then upsert item by item.
///
/// Per-item failures are logged and counted, never fatal; a failed item is
/// simply retried by the next run.
pub async fn run_sync<S, W>(source: &S, writer: &W) -> Result<SyncReport, SyncError>
where
    S: PageSource,
    W: CatalogWriter,
{
    let items = fetch_all_items(source).await?;

    let mut report = SyncReport {
        total_fetched: items.len(),
        created: 0,
        updated: 0,
        skipped: 0,
        failed: 0,
        completed_at: Utc::now(),
    };

    for item in &items {
        let Some(record) = ImportRecord::from_item(item) else {
            report.skipped += 1;
            continue;
        };
        let code = record.code.clone();

        match writer.upsert_imported(record) {
            Ok(UpsertOutcome::Created) => {
                report.created += 1;
                tracing::info!(%code, "created product from feed");
            }
            Ok(UpsertOutcome::Updated) => {
                report.updated += 1;
                tracing::info!(%code, "updated product from feed");
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(%code, error = %e, "failed to upsert feed item, continuing");
            }
        }
    }

    report.completed_at = Utc::now();
    tracing::info!(
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        failed = report.failed,
        "product sync completed"
    );
    Ok(report)
}

/// Availability-only refresh: update stock for codes we already carry.
pub async fn run_refresh<S, W>(source: &S, writer: &W) -> Result<SyncReport, SyncError>
where
    S: PageSource,
    W: CatalogWriter,
{
    let items = fetch_all_items(source).await?;

    let mut report = SyncReport {
        total_fetched: items.len(),
        created: 0,
        updated: 0,
        skipped: 0,
        failed: 0,
        completed_at: Utc::now(),
    };

    for item in &items {
        let Some(code) = item.item_code() else {
            report.skipped += 1;
            continue;
        };

        match writer.refresh_stock(code, item.quantity()) {
            Ok(true) => report.updated += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(%code, error = %e, "failed to refresh stock, continuing");
            }
        }
    }

    report.completed_at = Utc::now();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeSource {
        items: Vec<FeedItem>,
    }

    impl PageSource for FakeSource {
        async fn fetch_page(
            &self,
            skip: usize,
            page_size: usize,
        ) -> Result<Vec<FeedItem>, SyncError> {
            Ok(self
                .items
                .iter()
                .skip(skip)
                .take(page_size)
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeCatalog {
        products: Mutex<HashMap<String, ImportRecord>>,
        reject_codes: Vec<String>,
    }

    impl CatalogWriter for FakeCatalog {
        fn upsert_imported(&self, record: ImportRecord) -> Result<UpsertOutcome, SyncWriteError> {
            if self.reject_codes.contains(&record.code) {
                return Err(SyncWriteError::Rejected {
                    code: record.code,
                    reason: "validation failed".to_string(),
                });
            }
            let mut products = self.products.lock().unwrap();
            match products.insert(record.code.clone(), record) {
                None => Ok(UpsertOutcome::Created),
                Some(_) => Ok(UpsertOutcome::Updated),
            }
        }

        fn refresh_stock(&self, code: &str, quantity: i64) -> Result<bool, SyncWriteError> {
            let mut products = self.products.lock().unwrap();
            match products.get_mut(code) {
                Some(record) => {
                    record.quantity = quantity;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    fn feed_item(json: serde_json::Value) -> FeedItem {
        serde_json::from_value(json).unwrap()
    }

    fn sample_items() -> Vec<FeedItem> {
        vec![
            feed_item(serde_json::json!({
                "id": "a1", "ItemCode": "FX5U-32MR/ES", "ItemName": "CPU",
                "qtyOnHand": 3, "salePrice": {"value": 850.0}
            })),
            feed_item(serde_json::json!({
                "id": "a2", "ItemCode": "CABLE-5M", "ItemName": "Cable"
            })),
            // No code: skipped.
            feed_item(serde_json::json!({ "id": "a3", "ItemName": "Mystery" })),
        ]
    }

    #[tokio::test]
    async fn sync_classifies_and_upserts() {
        let source = FakeSource {
            items: sample_items(),
        };
        let catalog = FakeCatalog::default();

        let report = run_sync(&source, &catalog).await.unwrap();
        assert_eq!(report.total_fetched, 3);
        assert_eq!(report.created, 2);
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);

        let products = catalog.products.lock().unwrap();
        let cpu = &products["FX5U-32MR/ES"];
        assert_eq!(cpu.brand, "Mitsubishi Electric");
        assert_eq!(cpu.category, Category::Plc);
        assert_eq!(cpu.price_minor, Some(85_000));
        assert_eq!(products["CABLE-5M"].category, Category::Other);
        assert_eq!(products["CABLE-5M"].brand, "Inventory Import");
    }

    #[tokio::test]
    async fn second_run_updates_instead_of_creating() {
        let source = FakeSource {
            items: sample_items(),
        };
        let catalog = FakeCatalog::default();

        run_sync(&source, &catalog).await.unwrap();
        let report = run_sync(&source, &catalog).await.unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.updated, 2);
    }

    #[tokio::test]
    async fn failing_item_is_counted_and_does_not_abort() {
        let source = FakeSource {
            items: sample_items(),
        };
        let catalog = FakeCatalog {
            reject_codes: vec!["FX5U-32MR/ES".to_string()],
            ..FakeCatalog::default()
        };

        let report = run_sync(&source, &catalog).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.created, 1);
        assert!(
            catalog
                .products
                .lock()
                .unwrap()
                .contains_key("CABLE-5M")
        );
    }

    #[tokio::test]
    async fn refresh_touches_only_known_codes() {
        let source = FakeSource {
            items: sample_items(),
        };
        let catalog = FakeCatalog::default();
        run_sync(&source, &catalog).await.unwrap();

        let refreshed = vec![
            feed_item(serde_json::json!({
                "id": "a1", "ItemCode": "FX5U-32MR/ES", "qtyOnHand": 99
            })),
            feed_item(serde_json::json!({
                "id": "zz", "ItemCode": "UNKNOWN-1", "qtyOnHand": 5
            })),
        ];
        let source = FakeSource { items: refreshed };

        let report = run_refresh(&source, &catalog).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(
            catalog.products.lock().unwrap()["FX5U-32MR/ES"].quantity,
            99
        );
    }
}
