//! Product lookup used when pricing new orders.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::DomainError;
use crate::money::Money;

use super::{Currency, ProductId};

/// What an order needs to know about a product at placement time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    pub name_ar: Option<String>,
    pub sku: Option<String>,
    pub price: Money,
    pub currency: Currency,
    pub active: bool,
}

impl ProductSnapshot {
    /// Creates an active product.
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        price: Money,
        currency: Currency,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            name_ar: None,
            sku: None,
            price,
            currency,
            active: true,
        }
    }

    pub fn with_name_ar(mut self, name_ar: impl Into<String>) -> Self {
        self.name_ar = Some(name_ar.into());
        self
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Read access to the product catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Returns the current product data, or None if the product doesn't exist.
    async fn find_product(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<ProductSnapshot>, DomainError>;
}

/// In-memory catalog for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductCatalog {
    products: Arc<RwLock<HashMap<ProductId, ProductSnapshot>>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub async fn upsert(&self, product: ProductSnapshot) {
        self.products
            .write()
            .await
            .insert(product.product_id.clone(), product);
    }

    /// Changes a product's price.
    pub async fn set_price(&self, product_id: &ProductId, price: Money) {
        if let Some(product) = self.products.write().await.get_mut(product_id) {
            product.price = price;
        }
    }

    pub async fn remove(&self, product_id: &ProductId) {
        self.products.write().await.remove(product_id);
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn find_product(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<ProductSnapshot>, DomainError> {
        Ok(self.products.read().await.get(product_id).cloned())
    }
}
