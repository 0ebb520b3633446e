//! Per-chat shopping cart built from product-selection events.

use std::sync::Arc;

use teloxide::types::ChatId;
use tracing::debug;

use crate::catalog::{Catalog, Product, ProductId};
use crate::errors::StoreError;
use crate::store::{CartItem, Store};

/// A product in the cart with its quantity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub product: Product,
    pub quantity: u32,
}

impl CartLine {
    pub fn line_total(&self) -> u64 {
        self.product.price * u64::from(self.quantity)
    }
}

/// Cart contents grouped by product, with the grand total
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CartSummary {
    pub lines: Vec<CartLine>,
    pub total: u64,
}

impl CartSummary {
    /// Resolve stored items against the catalog. Items whose product is no
    /// longer in the catalog are skipped.
    pub fn from_items(items: &[CartItem], catalog: &Catalog) -> Self {
        let lines: Vec<CartLine> = items
            .iter()
            .filter(|item| item.quantity > 0)
            .filter_map(|item| {
                catalog.find_by_id(item.product_id).map(|product| CartLine {
                    product: product.clone(),
                    quantity: item.quantity,
                })
            })
            .collect();
        let total = lines.iter().map(CartLine::line_total).sum();
        Self { lines, total }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Cart operations for the chat adapter and the payment adapter
#[derive(Clone)]
pub struct Cart {
    store: Arc<dyn Store>,
    catalog: Arc<Catalog>,
}

impl Cart {
    pub fn new(store: Arc<dyn Store>, catalog: Arc<Catalog>) -> Self {
        Self { store, catalog }
    }

    /// Add one unit of a product. Returns `None` for products not in the catalog.
    pub async fn add(
        &self,
        chat_id: ChatId,
        product_id: ProductId,
    ) -> Result<Option<CartLine>, StoreError> {
        let Some(product) = self.catalog.find_by_id(product_id) else {
            return Ok(None);
        };
        let quantity = self.store.add_cart_item(chat_id, product_id).await?;
        debug!(chat_id = %chat_id, product_id, quantity, "Product added to cart");
        Ok(Some(CartLine {
            product: product.clone(),
            quantity,
        }))
    }

    pub async fn summary(&self, chat_id: ChatId) -> Result<CartSummary, StoreError> {
        let items = self.store.cart_items(chat_id).await?;
        Ok(CartSummary::from_items(&items, &self.catalog))
    }

    pub async fn clear(&self, chat_id: ChatId) -> Result<(), StoreError> {
        self.store.clear_cart(chat_id).await
    }
}
