//! Bridges the inventory sync runner onto the command pipeline.
//!
//! The runner decides *what* to upsert; this writer turns each record into
//! catalog commands (attributed to the system actor), dispatches them, and
//! applies the committed events straight back into the product projection so
//! the next item in the same run sees them.

use chrono::Utc;
use serde_json::Value as JsonValue;

use forgecrm_catalog::{Product, ProductCommand, ProductDetails, ProductId, product};
use forgecrm_core::AggregateId;
use forgecrm_events::{EventBus, EventEnvelope};
use forgecrm_sync::{CatalogWriter, ImportRecord, UpsertOutcome};
use forgecrm_sync::runner::SyncWriteError;

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::{ProductCatalogProjection, aggregate_types};
use crate::read_model::Store;

pub struct DispatchingCatalogWriter<'a, S, B, PS>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    PS: Store<ProductId, crate::projections::ProductReadModel>,
{
    dispatcher: &'a CommandDispatcher<S, B>,
    products: &'a ProductCatalogProjection<PS>,
}

impl<'a, S, B, PS> DispatchingCatalogWriter<'a, S, B, PS>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    PS: Store<ProductId, crate::projections::ProductReadModel>,
{
    pub fn new(
        dispatcher: &'a CommandDispatcher<S, B>,
        products: &'a ProductCatalogProjection<PS>,
    ) -> Self {
        Self {
            dispatcher,
            products,
        }
    }

    fn dispatch(
        &self,
        aggregate_id: AggregateId,
        command: ProductCommand,
        code: &str,
    ) -> Result<(), SyncWriteError> {
        let committed = self
            .dispatcher
            .dispatch::<Product>(None, aggregate_id, aggregate_types::PRODUCT, command, |id| {
                Product::empty(ProductId::new(id))
            })
            .map_err(|e| map_dispatch_error(code, e))?;

        // Read-your-writes within the run; the bus delivery of the same
        // envelopes is dropped by the projection's sequence cursor.
        for stored in &committed {
            if let Err(e) = self.products.apply_envelope(&stored.to_envelope()) {
                tracing::warn!(code, error = %e, "product projection apply failed");
            }
        }
        Ok(())
    }

    fn details_for(record: &ImportRecord) -> ProductDetails {
        ProductDetails {
            model: Some(record.code.clone()),
            capacity: None,
            category: record.category,
            technical_specs: JsonValue::Object(Default::default()),
            description: record.description.clone(),
            price_minor: record.price_minor,
        }
    }
}

impl<S, B, PS> CatalogWriter for DispatchingCatalogWriter<'_, S, B, PS>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    PS: Store<ProductId, crate::projections::ProductReadModel>,
{
    fn upsert_imported(&self, record: ImportRecord) -> Result<UpsertOutcome, SyncWriteError> {
        let occurred_at = Utc::now();
        let code = record.code.clone();

        match self.products.find_by_sku(&record.code) {
            Some(existing) => {
                let command = ProductCommand::UpdateProduct(product::UpdateProduct {
                    product_id: existing.product_id,
                    name: Some(record.name.clone()),
                    brand: Some(record.brand.clone()),
                    details: Some(Self::details_for(&record)),
                    stock_quantity: Some(record.quantity),
                    active: Some(true),
                    occurred_at,
                });
                self.dispatch(existing.product_id.0, command, &code)?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let aggregate_id = AggregateId::new();
                let command = ProductCommand::ImportProduct(product::ImportProduct {
                    product_id: ProductId::new(aggregate_id),
                    sku: record.code.clone(),
                    external_id: record.external_id.clone(),
                    name: record.name.clone(),
                    brand: record.brand.clone(),
                    details: Some(Self::details_for(&record)),
                    stock_quantity: record.quantity,
                    occurred_at,
                });
                self.dispatch(aggregate_id, command, &code)?;
                Ok(UpsertOutcome::Created)
            }
        }
    }

    fn refresh_stock(&self, code: &str, quantity: i64) -> Result<bool, SyncWriteError> {
        let Some(existing) = self.products.find_by_sku(code) else {
            return Ok(false);
        };

        let command = ProductCommand::SetStock(product::SetStock {
            product_id: existing.product_id,
            quantity,
            occurred_at: Utc::now(),
        });
        self.dispatch(existing.product_id.0, command, code)?;
        Ok(true)
    }
}

fn map_dispatch_error(code: &str, err: DispatchError) -> SyncWriteError {
    match err {
        DispatchError::Validation(reason) | DispatchError::InvariantViolation(reason) => {
            SyncWriteError::Rejected {
                code: code.to_string(),
                reason,
            }
        }
        other => SyncWriteError::Failed {
            code: code.to_string(),
            reason: format!("{other:?}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use crate::read_model::InMemoryStore;
    use forgecrm_events::InMemoryEventBus;
    use forgecrm_sync::{FeedItem, run_sync};
    use forgecrm_sync::client::{PageSource, SyncError};
    use std::sync::Arc;

    struct FakeSource(Vec<FeedItem>);

    impl PageSource for FakeSource {
        async fn fetch_page(
            &self,
            skip: usize,
            page_size: usize,
        ) -> Result<Vec<FeedItem>, SyncError> {
            Ok(self.0.iter().skip(skip).take(page_size).cloned().collect())
        }
    }

    fn feed_item(json: serde_json::Value) -> FeedItem {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn full_sync_round_trips_through_the_event_store() {
        let store = Arc::new(InMemoryEventStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = CommandDispatcher::new(store.clone(), bus);
        let products = ProductCatalogProjection::new(Arc::new(InMemoryStore::new()));
        let writer = DispatchingCatalogWriter::new(&dispatcher, &products);

        let source = FakeSource(vec![
            feed_item(serde_json::json!({
                "id": "a1", "ItemCode": "FX5U-32MR/ES", "ItemName": "CPU",
                "qtyOnHand": 3, "salePrice": {"value": 850.0}
            })),
            feed_item(serde_json::json!({
                "id": "a2", "ItemCode": "CABLE-5M", "ItemName": "Cable", "qtyOnHand": 10
            })),
        ]);

        let report = run_sync(&source, &writer).await.unwrap();
        assert_eq!(report.created, 2);

        let cpu = products.find_by_sku("FX5U-32MR/ES").unwrap();
        assert!(cpu.imported);
        assert_eq!(cpu.stock_quantity, 3);
        assert_eq!(cpu.details.price_minor, Some(85_000));

        // Second run updates in place, attributed to the system actor.
        let source = FakeSource(vec![feed_item(serde_json::json!({
            "id": "a1", "ItemCode": "FX5U-32MR/ES", "ItemName": "CPU", "qtyOnHand": 5
        }))]);
        let report = run_sync(&source, &writer).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(products.find_by_sku("FX5U-32MR/ES").unwrap().stock_quantity, 5);

        let events = store.load_all().unwrap();
        assert!(events.iter().all(|e| e.actor.is_none()));
        assert_eq!(events.len(), 3);
    }
}
