//! Infrastructure wiring for the HTTP app.
//!
//! The write path is the dispatcher (store + bus); the read path is a set of
//! in-memory projections. Handlers get read-your-writes by applying committed
//! events synchronously after dispatch; the background bus subscriber applies
//! the same envelopes again and the projections' sequence cursors drop the
//! duplicates (at-least-once, idempotent consumers).
//!
//! With the `postgres` feature and `DATABASE_URL` set, events persist to
//! Postgres and the read models are rebuilt by replaying the store at boot —
//! they are disposable views, the store is the source of truth.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use forgecrm_activities::ActivityId;
use forgecrm_catalog::ProductId;
use forgecrm_core::{Aggregate, AggregateId, DomainError, UserId};
use forgecrm_directory::{CompanyId, ContactId, StakeholderId};
use forgecrm_documents::DocumentId;
use forgecrm_events::{EventBus, EventEnvelope, InMemoryEventBus};
use forgecrm_infra::{
    CommandDispatcher, DispatchError, EventStore, InMemoryEventStore, InMemoryLeadNumberAllocator,
    InMemoryStore, LeadNumberAllocator, StoredEvent,
    projections::{
        ActivityBoardProjection, ActivityReadModel, AuditTrailProjection,
        CompanyDirectoryProjection, CompanyReadModel, ContactDirectoryProjection, ContactReadModel,
        DocumentLibraryProjection, DocumentReadModel, LeadPipelineProjection, LeadReadModel,
        ProductCatalogProjection, ProductReadModel, StakeholderDirectoryProjection,
        StakeholderReadModel,
    },
};
use forgecrm_pipeline::{LeadId, StageCatalog};

pub type JsonEnvelope = EventEnvelope<JsonValue>;
pub type Dispatcher = CommandDispatcher<Arc<dyn EventStore>, Arc<InMemoryEventBus<JsonEnvelope>>>;

pub type CompanyProjection =
    CompanyDirectoryProjection<Arc<InMemoryStore<CompanyId, CompanyReadModel>>>;
pub type ContactProjection =
    ContactDirectoryProjection<Arc<InMemoryStore<ContactId, ContactReadModel>>>;
pub type StakeholderProjection =
    StakeholderDirectoryProjection<Arc<InMemoryStore<StakeholderId, StakeholderReadModel>>>;
pub type ProductProjection = ProductCatalogProjection<Arc<InMemoryStore<ProductId, ProductReadModel>>>;
pub type LeadProjection = LeadPipelineProjection<Arc<InMemoryStore<LeadId, LeadReadModel>>>;
pub type ActivityProjection =
    ActivityBoardProjection<Arc<InMemoryStore<ActivityId, ActivityReadModel>>>;
pub type DocumentProjection =
    DocumentLibraryProjection<Arc<InMemoryStore<DocumentId, DocumentReadModel>>>;

pub struct AppServices {
    pub dispatcher: Dispatcher,
    pub store: Arc<dyn EventStore>,
    pub bus: Arc<InMemoryEventBus<JsonEnvelope>>,

    pub companies: Arc<CompanyProjection>,
    pub contacts: Arc<ContactProjection>,
    pub stakeholders: Arc<StakeholderProjection>,
    pub products: Arc<ProductProjection>,
    pub leads: Arc<LeadProjection>,
    pub activities: Arc<ActivityProjection>,
    pub documents: Arc<DocumentProjection>,
    pub audit: Arc<AuditTrailProjection>,

    pub lead_numbers: Arc<dyn LeadNumberAllocator>,
    pub stage_catalog: StageCatalog,
}

impl AppServices {
    /// Dispatch a command and apply the committed events synchronously.
    pub fn dispatch<A>(
        &self,
        actor: Option<UserId>,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: forgecrm_events::Event + Serialize + DeserializeOwned,
    {
        let committed =
            self.dispatcher
                .dispatch::<A>(actor, aggregate_id, aggregate_type, command, make_aggregate)?;
        for stored in &committed {
            self.apply_envelope(&stored.to_envelope());
        }
        Ok(committed)
    }

    /// Apply one envelope to every projection; failures are logged, never fatal.
    pub fn apply_envelope(&self, envelope: &JsonEnvelope) {
        macro_rules! apply {
            ($projection:expr) => {
                if let Err(e) = $projection.apply_envelope(envelope) {
                    tracing::warn!(
                        aggregate_type = envelope.aggregate_type(),
                        error = %e,
                        "projection apply failed"
                    );
                }
            };
        }

        apply!(self.companies);
        apply!(self.contacts);
        apply!(self.stakeholders);
        apply!(self.products);
        apply!(self.leads);
        apply!(self.activities);
        apply!(self.documents);
        apply!(self.audit);
    }
}

fn assemble(store: Arc<dyn EventStore>, lead_numbers: Arc<dyn LeadNumberAllocator>) -> AppServices {
    let bus: Arc<InMemoryEventBus<JsonEnvelope>> = Arc::new(InMemoryEventBus::new());

    let companies: Arc<CompanyProjection> =
        Arc::new(CompanyDirectoryProjection::new(Arc::new(InMemoryStore::new())));
    let contacts: Arc<ContactProjection> =
        Arc::new(ContactDirectoryProjection::new(Arc::new(InMemoryStore::new())));
    let stakeholders: Arc<StakeholderProjection> =
        Arc::new(StakeholderDirectoryProjection::new(Arc::new(InMemoryStore::new())));
    let products: Arc<ProductProjection> =
        Arc::new(ProductCatalogProjection::new(Arc::new(InMemoryStore::new())));
    let leads: Arc<LeadProjection> = Arc::new(
        LeadPipelineProjection::new(Arc::new(InMemoryStore::new()))
            .with_allocator(lead_numbers.clone()),
    );
    let activities: Arc<ActivityProjection> =
        Arc::new(ActivityBoardProjection::new(Arc::new(InMemoryStore::new())));
    let documents: Arc<DocumentProjection> =
        Arc::new(DocumentLibraryProjection::new(Arc::new(InMemoryStore::new())));
    let audit = Arc::new(AuditTrailProjection::new());

    let services = AppServices {
        dispatcher: CommandDispatcher::new(store.clone(), bus.clone()),
        store,
        bus: bus.clone(),
        companies,
        contacts,
        stakeholders,
        products,
        leads,
        activities,
        documents,
        audit,
        lead_numbers,
        stage_catalog: StageCatalog::standard(),
    };

    // Warm the read models from the store (no-op for a fresh in-memory store).
    match services.store.load_all() {
        Ok(events) => {
            for stored in &events {
                services.apply_envelope(&stored.to_envelope());
            }
            if !events.is_empty() {
                tracing::info!(count = events.len(), "replayed events into read models");
            }
        }
        Err(e) => tracing::error!(error = %e, "event replay failed; read models start empty"),
    }

    services
}

fn spawn_subscriber(services: &Arc<AppServices>) {
    let sub = services.bus.subscribe();
    let services = Arc::clone(services);
    tokio::task::spawn_blocking(move || {
        loop {
            match sub.recv() {
                Ok(envelope) => services.apply_envelope(&envelope),
                Err(_) => break,
            }
        }
    });
}

/// Build services from the environment.
///
/// Default: in-memory store and allocator. With the `postgres` feature and
/// `DATABASE_URL` set, events and lead-number counters persist to Postgres.
pub async fn build_services() -> Arc<AppServices> {
    #[cfg(feature = "postgres")]
    if let Ok(database_url) = std::env::var("DATABASE_URL") {
        return build_postgres_services(&database_url).await;
    }

    let services = Arc::new(assemble(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryLeadNumberAllocator::new()),
    ));
    spawn_subscriber(&services);
    services
}

#[cfg(feature = "postgres")]
async fn build_postgres_services(database_url: &str) -> Arc<AppServices> {
    use forgecrm_infra::event_store::PostgresEventStore;
    use forgecrm_infra::lead_numbers::PostgresLeadNumberAllocator;

    let pool = sqlx::PgPool::connect(database_url)
        .await
        .expect("failed to connect to Postgres");

    let store = PostgresEventStore::new(pool.clone());
    store
        .ensure_schema()
        .await
        .expect("failed to ensure events schema");

    let allocator = PostgresLeadNumberAllocator::new(pool);
    allocator
        .ensure_schema()
        .await
        .expect("failed to ensure lead_numbers schema");

    let services = Arc::new(assemble(Arc::new(store), Arc::new(allocator)));
    spawn_subscriber(&services);
    services
}
