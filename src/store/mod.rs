//! Storage backends for conversation history, carts, the invoice ledger and
//! group-order membership.
//!
//! The bot talks to storage only through the [`Store`] trait:
//! - `memory`: process-local maps, used by tests and when no database is configured
//! - `postgres`: durable PostgreSQL backend that survives restarts

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use teloxide::types::ChatId;

use crate::catalog::ProductId;
use crate::errors::StoreError;
use crate::session::ChatMessage;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// One cart entry: a product and how many units were selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A member of a product's group order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMember {
    pub chat_id: ChatId,
    pub paid: bool,
}

/// Ledger entry linking a gateway invoice to the chat that requested it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// Gateway-assigned invoice id
    pub invoice_id: String,
    /// Our reference sent to the gateway as `external_id`
    pub external_id: String,
    pub chat_id: ChatId,
    pub amount: u64,
    pub invoice_url: String,
    /// Products bought through a group order on this invoice
    pub group_products: Vec<ProductId>,
    pub paid: bool,
    pub created_at: DateTime<Utc>,
}

/// Key-value repository behind every piece of mutable bot state.
///
/// Implementations must be safe to share between tasks. Operations on a single
/// key are atomic; callers serialize multi-step updates per chat with
/// [`crate::session::ChatLocks`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Stored history for a chat, oldest first. Unknown chats have an empty history.
    async fn load_history(&self, chat_id: ChatId) -> Result<Vec<ChatMessage>, StoreError>;

    /// Append messages in order, then drop the oldest ones beyond `keep_last`.
    async fn append_messages(
        &self,
        chat_id: ChatId,
        messages: &[ChatMessage],
        keep_last: Option<usize>,
    ) -> Result<(), StoreError>;

    /// Add one unit of a product to the chat's cart, returning the new quantity.
    async fn add_cart_item(&self, chat_id: ChatId, product_id: ProductId)
        -> Result<u32, StoreError>;

    /// Cart contents ordered by product id
    async fn cart_items(&self, chat_id: ChatId) -> Result<Vec<CartItem>, StoreError>;

    async fn clear_cart(&self, chat_id: ChatId) -> Result<(), StoreError>;

    async fn record_invoice(&self, invoice: &InvoiceRecord) -> Result<(), StoreError>;

    /// Find an invoice by gateway id or, failing that, by external id.
    async fn find_invoice(&self, reference: &str) -> Result<Option<InvoiceRecord>, StoreError>;

    /// Flag an invoice as paid and append `confirmation` to the owning chat's
    /// history as one atomic step, trimming the history to `keep_last`.
    /// Returns `false`, changing nothing, if it was already paid or is unknown.
    async fn confirm_invoice(
        &self,
        invoice_id: &str,
        confirmation: &ChatMessage,
        keep_last: Option<usize>,
    ) -> Result<bool, StoreError>;

    /// Add a member. Returns `false` if the chat was already a member.
    async fn join_group_order(
        &self,
        product_id: ProductId,
        chat_id: ChatId,
    ) -> Result<bool, StoreError>;

    /// Members in join order
    async fn group_order_members(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<GroupMember>, StoreError>;

    /// Mark a member as paid. Returns `false` if the chat is not a member.
    async fn mark_group_member_paid(
        &self,
        product_id: ProductId,
        chat_id: ChatId,
    ) -> Result<bool, StoreError>;
}
