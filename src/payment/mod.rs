//! # Payment Adapter
//!
//! Creates invoices through the payment gateway, records them in the ledger
//! and reconciles the gateway's payment notifications with chats.

pub mod ledger;
pub mod webhook;
pub mod xendit;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::types::ChatId;
use tracing::{debug, info, warn};

use crate::cart::Cart;
use crate::catalog::ProductId;
use crate::errors::{GatewayError, PaymentError, StoreError};
use crate::group_order::{GroupOrderRegistry, GroupOrderStatus};
use crate::localization::t_lang;
use crate::session::{ChatLocks, ChatMessage, SessionStore};
use crate::store::InvoiceRecord;

pub use ledger::InvoiceLedger;
pub use xendit::XenditClient;

/// One invoice line as sent to the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub name: String,
    /// Unit price after discounts, in rupiah
    pub price: u64,
    pub quantity: u32,
}

/// Invoice to create for a chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRequest {
    pub chat_id: ChatId,
    /// Our reference, echoed back by the gateway as `external_id`
    pub external_id: String,
    pub customer_name: String,
    pub phone_number: String,
    pub amount: u64,
    pub items: Vec<LineItem>,
    /// Products bought through their group order
    pub group_products: Vec<ProductId>,
}

impl InvoiceRequest {
    /// External id unique per chat and creation time
    pub fn external_id_for(chat_id: ChatId, now: DateTime<Utc>) -> String {
        format!("frosala-{}-{}", chat_id.0, now.timestamp_millis())
    }
}

/// Gateway response to a created invoice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedInvoice {
    pub invoice_id: String,
    pub invoice_url: String,
}

/// A hosted-invoice payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<CreatedInvoice, GatewayError>;
}

/// What a payment notification did
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationOutcome {
    /// First notification for a ledger invoice
    Confirmed {
        chat_id: ChatId,
        invoice_id: String,
        /// Confirmation appended to the chat's history
        message: String,
        /// Group orders that became ready to process with this payment
        ready_groups: Vec<GroupOrderStatus>,
    },
    /// Redelivery for an invoice already marked paid
    AlreadyConfirmed,
    /// No ledger entry matches the notification
    Unknown,
}

pub struct PaymentAdapter {
    gateway: Arc<dyn PaymentGateway>,
    ledger: InvoiceLedger,
    sessions: SessionStore,
    cart: Cart,
    group_orders: Arc<GroupOrderRegistry>,
    locks: ChatLocks,
}

impl PaymentAdapter {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        ledger: InvoiceLedger,
        sessions: SessionStore,
        cart: Cart,
        group_orders: Arc<GroupOrderRegistry>,
        locks: ChatLocks,
    ) -> Self {
        Self {
            gateway,
            ledger,
            sessions,
            cart,
            group_orders,
            locks,
        }
    }

    pub fn ledger(&self) -> &InvoiceLedger {
        &self.ledger
    }

    /// Create an invoice at the gateway and record it. Nothing is recorded
    /// when the gateway fails.
    ///
    /// Called from inside a conversation turn, which already holds the chat lock.
    pub async fn create_invoice(
        &self,
        request: InvoiceRequest,
        now: DateTime<Utc>,
    ) -> Result<InvoiceRecord, PaymentError> {
        let created = self.gateway.create_invoice(&request).await?;
        let record = InvoiceRecord {
            invoice_id: created.invoice_id,
            external_id: request.external_id,
            chat_id: request.chat_id,
            amount: request.amount,
            invoice_url: created.invoice_url,
            group_products: request.group_products,
            paid: false,
            created_at: now,
        };
        self.ledger.record(&record).await?;
        Ok(record)
    }

    /// Reconcile a "paid" notification with the chat that owns the invoice.
    ///
    /// Unknown invoices are logged and acknowledged. Redeliveries change nothing.
    pub async fn on_payment_notification(
        &self,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<NotificationOutcome, StoreError> {
        let Some(invoice) = self.ledger.find(reference).await? else {
            warn!(reference, "ReconciliationMiss: payment notification for unknown invoice");
            return Ok(NotificationOutcome::Unknown);
        };
        if invoice.paid {
            debug!(invoice_id = %invoice.invoice_id, "Invoice already confirmed");
            return Ok(NotificationOutcome::AlreadyConfirmed);
        }

        let chat_id = invoice.chat_id;
        let _guard = self.locks.acquire(chat_id).await;
        let paid_meanwhile = self
            .ledger
            .find(&invoice.invoice_id)
            .await?
            .map_or(true, |current| current.paid);
        if paid_meanwhile {
            debug!(invoice_id = %invoice.invoice_id, "Invoice confirmed concurrently");
            return Ok(NotificationOutcome::AlreadyConfirmed);
        }

        // Clearing the cart and marking group members paid can be replayed, so
        // they run before the paid flag: a delivery that fails part way leaves
        // the invoice unpaid and the gateway's retry finishes the job.
        self.cart.clear(chat_id).await?;

        let mut ready_groups = Vec::new();
        for product_id in &invoice.group_products {
            if let Some(status) = self.group_orders.mark_paid(*product_id, chat_id, now).await? {
                info!(
                    product_id,
                    paid = status.paid_count,
                    quota = status.minimum_members,
                    "Group order ready to process"
                );
                ready_groups.push(status);
            }
        }

        let message = t_lang("payment-confirmed", None);
        let confirmed = self
            .ledger
            .confirm(
                &invoice.invoice_id,
                &ChatMessage::assistant(message.clone()),
                self.sessions.history_limit(),
            )
            .await?;
        if !confirmed {
            debug!(invoice_id = %invoice.invoice_id, "Invoice confirmed concurrently");
            return Ok(NotificationOutcome::AlreadyConfirmed);
        }

        info!(
            chat_id = %chat_id,
            invoice_id = %invoice.invoice_id,
            amount = invoice.amount,
            "Payment confirmed"
        );
        Ok(NotificationOutcome::Confirmed {
            chat_id,
            invoice_id: invoice.invoice_id,
            message,
            ready_groups,
        })
    }
}
