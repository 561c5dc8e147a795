use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use forgecrm_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use forgecrm_events::Event;

use crate::classify::Category;

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Where a product record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ProductOrigin {
    /// Entered by a user; SKU was generated locally.
    Manual,
    /// Pulled from the external inventory feed; SKU is the feed's item code.
    Imported {
        /// The feed's opaque identifier for the item.
        external_id: String,
    },
}

impl ProductOrigin {
    pub fn is_imported(&self) -> bool {
        matches!(self, ProductOrigin::Imported { .. })
    }
}

/// Descriptive fields shared by create/import/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProductDetails {
    pub model: Option<String>,
    pub capacity: Option<String>,
    pub category: Category,
    pub technical_specs: JsonValue,
    pub description: Option<String>,
    /// Unit price in minor currency units.
    pub price_minor: Option<i64>,
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    sku: String,
    name: String,
    brand: String,
    details: ProductDetails,
    stock_quantity: i64,
    origin: ProductOrigin,
    active: bool,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            sku: String::new(),
            name: String::new(),
            brand: String::new(),
            details: ProductDetails::default(),
            stock_quantity: 0,
            origin: ProductOrigin::Manual,
            active: true,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn details(&self) -> &ProductDetails {
        &self.details
    }

    pub fn stock_quantity(&self) -> i64 {
        self.stock_quantity
    }

    pub fn origin(&self) -> &ProductOrigin {
        &self.origin
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct (manual entry).
///
/// The SKU must already be allocated (see `sku::generate_sku`); aggregates stay
/// deterministic, so the random tail is produced by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub brand: String,
    pub details: Option<ProductDetails>,
    pub stock_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ImportProduct (first sight of a feed item).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportProduct {
    pub product_id: ProductId,
    /// The feed's item code; doubles as the SKU.
    pub sku: String,
    pub external_id: String,
    pub name: String,
    pub brand: String,
    pub details: Option<ProductDetails>,
    pub stock_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProduct (manual edit or feed refresh).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub product_id: ProductId,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub details: Option<ProductDetails>,
    pub stock_quantity: Option<i64>,
    pub active: Option<bool>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetStock (availability refresh).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetStock {
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SoftDeleteProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteProduct {
    pub product_id: ProductId,
    pub deleted_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RestoreProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreProduct {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    ImportProduct(ImportProduct),
    UpdateProduct(UpdateProduct),
    SetStock(SetStock),
    SoftDeleteProduct(SoftDeleteProduct),
    RestoreProduct(RestoreProduct),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub brand: String,
    pub details: ProductDetails,
    pub stock_quantity: i64,
    pub origin: ProductOrigin,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUpdated (full post-update state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub brand: String,
    pub details: ProductDetails,
    pub stock_quantity: i64,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSet {
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDeleted (soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeleted {
    pub product_id: ProductId,
    pub deleted_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductRestored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRestored {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductUpdated(ProductUpdated),
    StockSet(StockSet),
    ProductDeleted(ProductDeleted),
    ProductRestored(ProductRestored),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "catalog.product.created",
            ProductEvent::ProductUpdated(_) => "catalog.product.updated",
            ProductEvent::StockSet(_) => "catalog.product.stock_set",
            ProductEvent::ProductDeleted(_) => "catalog.product.deleted",
            ProductEvent::ProductRestored(_) => "catalog.product.restored",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::StockSet(e) => e.occurred_at,
            ProductEvent::ProductDeleted(e) => e.occurred_at,
            ProductEvent::ProductRestored(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.sku = e.sku.clone();
                self.name = e.name.clone();
                self.brand = e.brand.clone();
                self.details = e.details.clone();
                self.stock_quantity = e.stock_quantity;
                self.origin = e.origin.clone();
                self.active = true;
                self.deleted = false;
                self.created = true;
            }
            ProductEvent::ProductUpdated(e) => {
                self.name = e.name.clone();
                self.brand = e.brand.clone();
                self.details = e.details.clone();
                self.stock_quantity = e.stock_quantity;
                self.active = e.active;
            }
            ProductEvent::StockSet(e) => {
                self.stock_quantity = e.quantity;
            }
            ProductEvent::ProductDeleted(_) => {
                self.deleted = true;
            }
            ProductEvent::ProductRestored(_) => {
                self.deleted = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::ImportProduct(cmd) => self.handle_import(cmd),
            ProductCommand::UpdateProduct(cmd) => self.handle_update(cmd),
            ProductCommand::SetStock(cmd) => self.handle_set_stock(cmd),
            ProductCommand::SoftDeleteProduct(cmd) => self.handle_delete(cmd),
            ProductCommand::RestoreProduct(cmd) => self.handle_restore(cmd),
        }
    }
}

impl Product {
    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.deleted {
            return Err(DomainError::conflict("product is deleted"));
        }
        Ok(())
    }

    fn check_new_product(sku: &str, name: &str, brand: &str) -> Result<(), DomainError> {
        if sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if brand.trim().is_empty() {
            return Err(DomainError::validation("brand cannot be empty"));
        }
        Ok(())
    }

    fn check_price(details: &ProductDetails) -> Result<(), DomainError> {
        if details.price_minor.is_some_and(|p| p < 0) {
            return Err(DomainError::validation("price cannot be negative"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        Self::check_new_product(&cmd.sku, &cmd.name, &cmd.brand)?;
        let details = cmd.details.clone().unwrap_or_default();
        Self::check_price(&details)?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            sku: cmd.sku.clone(),
            name: cmd.name.clone(),
            brand: cmd.brand.clone(),
            details,
            stock_quantity: cmd.stock_quantity,
            origin: ProductOrigin::Manual,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_import(&self, cmd: &ImportProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        Self::check_new_product(&cmd.sku, &cmd.name, &cmd.brand)?;
        if cmd.external_id.trim().is_empty() {
            return Err(DomainError::validation("external_id cannot be empty"));
        }
        let details = cmd.details.clone().unwrap_or_default();
        Self::check_price(&details)?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            sku: cmd.sku.clone(),
            name: cmd.name.clone(),
            brand: cmd.brand.clone(),
            details,
            stock_quantity: cmd.stock_quantity,
            origin: ProductOrigin::Imported {
                external_id: cmd.external_id.clone(),
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_product_id(cmd.product_id)?;

        let name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        let brand = cmd.brand.clone().unwrap_or_else(|| self.brand.clone());
        if name.trim().is_empty() || brand.trim().is_empty() {
            return Err(DomainError::validation("name and brand cannot be empty"));
        }
        let details = cmd.details.clone().unwrap_or_else(|| self.details.clone());
        Self::check_price(&details)?;

        Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
            product_id: cmd.product_id,
            name,
            brand,
            details,
            stock_quantity: cmd.stock_quantity.unwrap_or(self.stock_quantity),
            active: cmd.active.unwrap_or(self.active),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_stock(&self, cmd: &SetStock) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_product_id(cmd.product_id)?;
        if cmd.quantity < 0 {
            return Err(DomainError::validation("stock quantity cannot be negative"));
        }
        if cmd.quantity == self.stock_quantity {
            // Refresh with no change; nothing to record.
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::StockSet(StockSet {
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &SoftDeleteProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_product_id(cmd.product_id)?;
        if self.deleted {
            return Err(DomainError::conflict("product is already deleted"));
        }

        Ok(vec![ProductEvent::ProductDeleted(ProductDeleted {
            product_id: cmd.product_id,
            deleted_by: cmd.deleted_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestoreProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_product_id(cmd.product_id)?;
        if !self.deleted {
            return Err(DomainError::conflict("product is not deleted"));
        }

        Ok(vec![ProductEvent::ProductRestored(ProductRestored {
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
