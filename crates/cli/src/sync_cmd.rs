//! Inventory sync entry point.
//!
//! Writes go through the same command pipeline as the API, attributed to the
//! system actor, so every created or updated product leaves the usual audit
//! record in the event store.

use std::sync::Arc;

use anyhow::{Context, bail};

use forgecrm_catalog::ProductId;
use forgecrm_events::InMemoryEventBus;
use forgecrm_infra::command_dispatcher::CommandDispatcher;
use forgecrm_infra::event_store::{EventStore, PostgresEventStore};
use forgecrm_infra::projections::{ProductCatalogProjection, ProductReadModel};
use forgecrm_infra::read_model::InMemoryStore;
use forgecrm_infra::sync_writer::DispatchingCatalogWriter;
use forgecrm_sync::{InventoryClient, run_refresh, run_sync};

fn client_from_env() -> anyhow::Result<InventoryClient> {
    let base_url =
        std::env::var("INVENTORY_API_URL").context("INVENTORY_API_URL must be set")?;
    let api_key =
        std::env::var("INVENTORY_API_KEY").context("INVENTORY_API_KEY must be set")?;
    InventoryClient::new(base_url, api_key).context("failed to build inventory client")
}

pub async fn run(test: bool, refresh_stock: bool) -> anyhow::Result<()> {
    let client = client_from_env()?;

    println!("Testing inventory API connection...");
    client
        .test_connection()
        .await
        .context("connection test failed; check the API URL and key")?;
    println!("API connection successful.");

    if test {
        println!("\nFetching sample items...");
        let items = client.fetch_all().await?;
        println!("Found {} items in the feed", items.len());
        for item in items.iter().take(5) {
            println!(
                "- {} ({})",
                item.item_name().unwrap_or("<unnamed>"),
                item.item_code().unwrap_or("<no code>"),
            );
        }
        return Ok(());
    }

    // Writes need the persistent store and a warmed product read model.
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set for a sync run")?;
    let pool = sqlx::PgPool::connect(&database_url)
        .await
        .context("failed to connect to the database")?;
    let store = Arc::new(PostgresEventStore::new(pool));
    store.ensure_schema().await?;

    let products: ProductCatalogProjection<Arc<InMemoryStore<ProductId, ProductReadModel>>> =
        ProductCatalogProjection::new(Arc::new(InMemoryStore::new()));
    for stored in store.load_all()? {
        let _ = products.apply_envelope(&stored.to_envelope());
    }

    let bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(store, bus);
    let writer = DispatchingCatalogWriter::new(&dispatcher, &products);

    if refresh_stock {
        println!("\nRefreshing stock quantities from the feed...");
        let report = run_refresh(&client, &writer).await?;
        println!(
            "Refreshed {} products ({} unknown codes skipped, {} failed)",
            report.updated, report.skipped, report.failed
        );
        if report.failed > 0 {
            bail!("{} items failed to refresh", report.failed);
        }
        return Ok(());
    }

    println!("\nStarting product sync from the inventory feed...");
    println!("This may take a while depending on the number of items.");
    let report = run_sync(&client, &writer).await?;

    println!("\nSync completed:");
    println!("- Products created: {}", report.created);
    println!("- Products updated: {}", report.updated);
    println!("- Items skipped (missing id/code): {}", report.skipped);
    println!("- Items failed: {}", report.failed);
    println!("- Total items in feed: {}", report.total_fetched);
    println!("- Completed at: {}", report.completed_at);

    if report.failed > 0 {
        bail!("{} items failed to sync; see the log for details", report.failed);
    }
    Ok(())
}
