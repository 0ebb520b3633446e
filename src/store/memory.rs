//! In-process storage backend. State is lost when the process exits.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use teloxide::types::ChatId;
use tokio::sync::RwLock;

use super::{CartItem, GroupMember, InvoiceRecord, Store};
use crate::catalog::ProductId;
use crate::errors::StoreError;
use crate::session::ChatMessage;

#[derive(Default)]
struct State {
    sessions: HashMap<ChatId, Vec<ChatMessage>>,
    carts: HashMap<ChatId, BTreeMap<ProductId, u32>>,
    invoices: Vec<InvoiceRecord>,
    group_orders: HashMap<ProductId, Vec<GroupMember>>,
}

/// [`Store`] backed by in-memory maps behind a single `RwLock`
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_history(&self, chat_id: ChatId) -> Result<Vec<ChatMessage>, StoreError> {
        let state = self.state.read().await;
        Ok(state.sessions.get(&chat_id).cloned().unwrap_or_default())
    }

    async fn append_messages(
        &self,
        chat_id: ChatId,
        messages: &[ChatMessage],
        keep_last: Option<usize>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        append_trimmed(state.sessions.entry(chat_id).or_default(), messages, keep_last);
        Ok(())
    }

    async fn add_cart_item(
        &self,
        chat_id: ChatId,
        product_id: ProductId,
    ) -> Result<u32, StoreError> {
        let mut state = self.state.write().await;
        let quantity = state
            .carts
            .entry(chat_id)
            .or_default()
            .entry(product_id)
            .or_insert(0);
        *quantity += 1;
        Ok(*quantity)
    }

    async fn cart_items(&self, chat_id: ChatId) -> Result<Vec<CartItem>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .carts
            .get(&chat_id)
            .map(|cart| {
                cart.iter()
                    .map(|(product_id, quantity)| CartItem {
                        product_id: *product_id,
                        quantity: *quantity,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn clear_cart(&self, chat_id: ChatId) -> Result<(), StoreError> {
        self.state.write().await.carts.remove(&chat_id);
        Ok(())
    }

    async fn record_invoice(&self, invoice: &InvoiceRecord) -> Result<(), StoreError> {
        self.state.write().await.invoices.push(invoice.clone());
        Ok(())
    }

    async fn find_invoice(&self, reference: &str) -> Result<Option<InvoiceRecord>, StoreError> {
        let state = self.state.read().await;
        let by_id = state
            .invoices
            .iter()
            .find(|invoice| invoice.invoice_id == reference);
        let found = by_id.or_else(|| {
            state
                .invoices
                .iter()
                .find(|invoice| invoice.external_id == reference)
        });
        Ok(found.cloned())
    }

    async fn confirm_invoice(
        &self,
        invoice_id: &str,
        confirmation: &ChatMessage,
        keep_last: Option<usize>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let chat_id = match state
            .invoices
            .iter_mut()
            .find(|invoice| invoice.invoice_id == invoice_id)
        {
            Some(invoice) if !invoice.paid => {
                invoice.paid = true;
                invoice.chat_id
            }
            _ => return Ok(false),
        };
        append_trimmed(
            state.sessions.entry(chat_id).or_default(),
            std::slice::from_ref(confirmation),
            keep_last,
        );
        Ok(true)
    }

    async fn join_group_order(
        &self,
        product_id: ProductId,
        chat_id: ChatId,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let members = state.group_orders.entry(product_id).or_default();
        if members.iter().any(|member| member.chat_id == chat_id) {
            return Ok(false);
        }
        members.push(GroupMember {
            chat_id,
            paid: false,
        });
        Ok(true)
    }

    async fn group_order_members(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<GroupMember>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .group_orders
            .get(&product_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn mark_group_member_paid(
        &self,
        product_id: ProductId,
        chat_id: ChatId,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let member = state
            .group_orders
            .get_mut(&product_id)
            .and_then(|members| members.iter_mut().find(|member| member.chat_id == chat_id));
        match member {
            Some(member) => {
                member.paid = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn append_trimmed(history: &mut Vec<ChatMessage>, messages: &[ChatMessage], keep_last: Option<usize>) {
    history.extend_from_slice(messages);
    if let Some(limit) = keep_last {
        if history.len() > limit {
            let excess = history.len() - limit;
            history.drain(..excess);
        }
    }
}
