use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use forgecrm_catalog::{Category, ProductDetails, ProductEvent, ProductId};
use forgecrm_events::EventEnvelope;

use super::{ProjectionError, SequenceCursors, aggregate_types};
use crate::read_model::Store;

/// Queryable product catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReadModel {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub brand: String,
    pub details: ProductDetails,
    pub stock_quantity: i64,
    pub active: bool,
    pub imported: bool,
    pub external_id: Option<String>,
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
}

/// Product catalog projection with a SKU index for the sync upsert path.
#[derive(Debug)]
pub struct ProductCatalogProjection<S>
where
    S: Store<ProductId, ProductReadModel>,
{
    store: S,
    cursors: SequenceCursors,
    by_sku: RwLock<HashMap<String, ProductId>>,
}

impl<S> ProductCatalogProjection<S>
where
    S: Store<ProductId, ProductReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: SequenceCursors::new(),
            by_sku: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, product_id: &ProductId) -> Option<ProductReadModel> {
        self.store.get(product_id)
    }

    pub fn find_by_sku(&self, sku: &str) -> Option<ProductReadModel> {
        let id = *self.by_sku.read().ok()?.get(sku)?;
        self.store.get(&id)
    }

    /// Live products, sorted by brand then name.
    pub fn list(&self) -> Vec<ProductReadModel> {
        let mut products: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|p| !p.deleted)
            .collect();
        products.sort_by(|a, b| a.brand.cmp(&b.brand).then(a.name.cmp(&b.name)));
        products
    }

    /// Case-insensitive substring search over name, model, and SKU.
    ///
    /// Only active, live products are searched; results are capped by `limit`.
    pub fn search(&self, query: &str, limit: usize) -> Vec<ProductReadModel> {
        let q = query.to_lowercase();
        self.list()
            .into_iter()
            .filter(|p| p.active)
            .filter(|p| {
                p.name.to_lowercase().contains(&q)
                    || p.sku.to_lowercase().contains(&q)
                    || p.details
                        .model
                        .as_deref()
                        .is_some_and(|m| m.to_lowercase().contains(&q))
            })
            .take(limit)
            .collect()
    }

    /// Per-category (code, count) pairs over live products; used by reports.
    pub fn category_counts(&self) -> Vec<(Category, usize)> {
        let mut counts: HashMap<Category, usize> = HashMap::new();
        for product in self.list() {
            *counts.entry(product.details.category).or_default() += 1;
        }
        let mut counts: Vec<_> = counts.into_iter().collect();
        counts.sort_by_key(|(category, _)| category.code());
        counts
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != aggregate_types::PRODUCT {
            return Ok(());
        }
        if !self
            .cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number())?
        {
            return Ok(());
        }

        let event: ProductEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        match event {
            ProductEvent::ProductCreated(e) => {
                let (imported, external_id) = match &e.origin {
                    forgecrm_catalog::ProductOrigin::Manual => (false, None),
                    forgecrm_catalog::ProductOrigin::Imported { external_id } => {
                        (true, Some(external_id.clone()))
                    }
                };

                if let Ok(mut by_sku) = self.by_sku.write() {
                    by_sku.insert(e.sku.clone(), e.product_id);
                }
                self.store.upsert(
                    e.product_id,
                    ProductReadModel {
                        product_id: e.product_id,
                        sku: e.sku,
                        name: e.name,
                        brand: e.brand,
                        details: e.details,
                        stock_quantity: e.stock_quantity,
                        active: true,
                        imported,
                        external_id,
                        deleted: false,
                        updated_at: e.occurred_at,
                    },
                );
            }
            ProductEvent::ProductUpdated(e) => {
                if let Some(mut rm) = self.store.get(&e.product_id) {
                    rm.name = e.name;
                    rm.brand = e.brand;
                    rm.details = e.details;
                    rm.stock_quantity = e.stock_quantity;
                    rm.active = e.active;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.product_id, rm);
                }
            }
            ProductEvent::StockSet(e) => {
                if let Some(mut rm) = self.store.get(&e.product_id) {
                    rm.stock_quantity = e.quantity;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.product_id, rm);
                }
            }
            ProductEvent::ProductDeleted(e) => {
                if let Some(mut rm) = self.store.get(&e.product_id) {
                    rm.deleted = true;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.product_id, rm);
                }
            }
            ProductEvent::ProductRestored(e) => {
                if let Some(mut rm) = self.store.get(&e.product_id) {
                    rm.deleted = false;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(e.product_id, rm);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryStore;
    use forgecrm_catalog::ProductOrigin;
    use forgecrm_catalog::product::ProductCreated;
    use forgecrm_core::AggregateId;
    use std::sync::Arc;
    use uuid::Uuid;

    fn projection() -> ProductCatalogProjection<Arc<InMemoryStore<ProductId, ProductReadModel>>> {
        ProductCatalogProjection::new(Arc::new(InMemoryStore::new()))
    }

    fn created(sku: &str, name: &str) -> (AggregateId, ProductEvent) {
        let agg = AggregateId::new();
        (
            agg,
            ProductEvent::ProductCreated(ProductCreated {
                product_id: ProductId::new(agg),
                sku: sku.to_string(),
                name: name.to_string(),
                brand: "Mitsubishi Electric".to_string(),
                details: ProductDetails {
                    model: Some(sku.to_string()),
                    category: Category::Plc,
                    ..ProductDetails::default()
                },
                stock_quantity: 5,
                origin: ProductOrigin::Imported {
                    external_id: "x1".to_string(),
                },
                occurred_at: Utc::now(),
            }),
        )
    }

    fn envelope(
        event: &ProductEvent,
        aggregate_id: AggregateId,
        seq: u64,
    ) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            None,
            aggregate_id,
            aggregate_types::PRODUCT,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    #[test]
    fn sku_index_supports_the_upsert_path() {
        let projection = projection();
        let (agg, event) = created("FX5U-32MR/ES", "MELSEC CPU");
        projection.apply_envelope(&envelope(&event, agg, 1)).unwrap();

        let rm = projection.find_by_sku("FX5U-32MR/ES").unwrap();
        assert!(rm.imported);
        assert_eq!(rm.external_id.as_deref(), Some("x1"));
        assert!(projection.find_by_sku("UNKNOWN").is_none());
    }

    #[test]
    fn search_matches_name_model_and_sku_with_cap() {
        let projection = projection();
        for i in 0..30 {
            let (agg, event) = created(&format!("FX5U-{i:02}MR"), "MELSEC CPU");
            projection.apply_envelope(&envelope(&event, agg, 1)).unwrap();
        }

        assert_eq!(projection.search("melsec", 20).len(), 20);
        assert_eq!(projection.search("fx5u-07", 20).len(), 1);
        assert!(projection.search("siemens", 20).is_empty());
    }
}
