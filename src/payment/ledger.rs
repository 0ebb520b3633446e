//! Invoice ledger: which chat owns which gateway invoice.
//!
//! Records are append-only. The only mutation is flipping `paid` once, in the
//! same store write that appends the chat's payment confirmation.

use std::sync::Arc;

use tracing::info;

use crate::errors::StoreError;
use crate::session::ChatMessage;
use crate::store::{InvoiceRecord, Store};

#[derive(Clone)]
pub struct InvoiceLedger {
    store: Arc<dyn Store>,
}

impl InvoiceLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn record(&self, invoice: &InvoiceRecord) -> Result<(), StoreError> {
        self.store.record_invoice(invoice).await?;
        info!(
            chat_id = %invoice.chat_id,
            invoice_id = %invoice.invoice_id,
            amount = invoice.amount,
            "Invoice recorded"
        );
        Ok(())
    }

    /// Look up by gateway invoice id, then by our external id
    pub async fn find(&self, reference: &str) -> Result<Option<InvoiceRecord>, StoreError> {
        self.store.find_invoice(reference).await
    }

    /// Flag the invoice paid together with the chat's confirmation message.
    /// Returns `false` when the invoice was already paid.
    pub async fn confirm(
        &self,
        invoice_id: &str,
        confirmation: &ChatMessage,
        keep_last: Option<usize>,
    ) -> Result<bool, StoreError> {
        self.store
            .confirm_invoice(invoice_id, confirmation, keep_last)
            .await
    }
}
