//! Fakes shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use teloxide::types::ChatId;

use frosala_bot::app::Services;
use frosala_bot::catalog::CatalogFile;
use frosala_bot::config::RecoveryConfig;
use frosala_bot::catalog::ProductId;
use frosala_bot::errors::{CompletionError, GatewayError, StoreError, TransportError};
use frosala_bot::llm::{Completion, CompletionRequest, CompletionService, ToolCall};
use frosala_bot::orchestrator::OrchestratorConfig;
use frosala_bot::payment::webhook::ChatNotifier;
use frosala_bot::payment::{CreatedInvoice, InvoiceRequest, PaymentGateway};
use frosala_bot::session::ChatMessage;
use frosala_bot::store::{CartItem, GroupMember, InvoiceRecord, MemoryStore, Store};

/// Completion service answering from a script, recording every request
#[derive(Default)]
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<Result<Completion, CompletionError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push(&self, response: Result<Completion, CompletionError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn push_text(&self, text: &str) {
        self.push(Ok(Completion::Text(text.to_string())));
    }

    pub fn push_tool_call(&self, name: &str, arguments: Value) {
        self.push(Ok(Completion::ToolCall {
            call: ToolCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
            content: None,
        }));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(CompletionError::Empty))
    }
}

/// Payment gateway returning predictable invoice ids
#[derive(Default)]
pub struct FakeGateway {
    pub fail: bool,
    requests: Mutex<Vec<InvoiceRequest>>,
}

impl FakeGateway {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<InvoiceRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<CreatedInvoice, GatewayError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        if self.fail {
            return Err(GatewayError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let invoice_id = format!("inv-{}", requests.len());
        Ok(CreatedInvoice {
            invoice_url: format!("https://checkout.example/{invoice_id}"),
            invoice_id,
        })
    }
}

/// Notifier collecting delivered messages
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(ChatId, String)>>,
}

#[async_trait]
impl ChatNotifier for RecordingNotifier {
    async fn notify(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

/// In-memory store whose operations can be made to fail once, the way a
/// dropped database connection fails a single query
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    armed: Mutex<HashMap<&'static str, u32>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of `operation`
    pub fn fail_next(&self, operation: &'static str) {
        *self.armed.lock().unwrap().entry(operation).or_default() += 1;
    }

    fn check(&self, operation: &'static str) -> Result<(), StoreError> {
        let mut armed = self.armed.lock().unwrap();
        match armed.get_mut(operation) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Err(StoreError::Corrupt(format!("{operation}: connection reset")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn load_history(&self, chat_id: ChatId) -> Result<Vec<ChatMessage>, StoreError> {
        self.check("load_history")?;
        self.inner.load_history(chat_id).await
    }

    async fn append_messages(
        &self,
        chat_id: ChatId,
        messages: &[ChatMessage],
        keep_last: Option<usize>,
    ) -> Result<(), StoreError> {
        self.check("append_messages")?;
        self.inner.append_messages(chat_id, messages, keep_last).await
    }

    async fn add_cart_item(&self, chat_id: ChatId, product_id: ProductId) -> Result<u32, StoreError> {
        self.check("add_cart_item")?;
        self.inner.add_cart_item(chat_id, product_id).await
    }

    async fn cart_items(&self, chat_id: ChatId) -> Result<Vec<CartItem>, StoreError> {
        self.check("cart_items")?;
        self.inner.cart_items(chat_id).await
    }

    async fn clear_cart(&self, chat_id: ChatId) -> Result<(), StoreError> {
        self.check("clear_cart")?;
        self.inner.clear_cart(chat_id).await
    }

    async fn record_invoice(&self, invoice: &InvoiceRecord) -> Result<(), StoreError> {
        self.check("record_invoice")?;
        self.inner.record_invoice(invoice).await
    }

    async fn find_invoice(&self, reference: &str) -> Result<Option<InvoiceRecord>, StoreError> {
        self.check("find_invoice")?;
        self.inner.find_invoice(reference).await
    }

    async fn confirm_invoice(
        &self,
        invoice_id: &str,
        confirmation: &ChatMessage,
        keep_last: Option<usize>,
    ) -> Result<bool, StoreError> {
        self.check("confirm_invoice")?;
        self.inner.confirm_invoice(invoice_id, confirmation, keep_last).await
    }

    async fn join_group_order(&self, product_id: ProductId, chat_id: ChatId) -> Result<bool, StoreError> {
        self.check("join_group_order")?;
        self.inner.join_group_order(product_id, chat_id).await
    }

    async fn group_order_members(&self, product_id: ProductId) -> Result<Vec<GroupMember>, StoreError> {
        self.check("group_order_members")?;
        self.inner.group_order_members(product_id).await
    }

    async fn mark_group_member_paid(
        &self,
        product_id: ProductId,
        chat_id: ChatId,
    ) -> Result<bool, StoreError> {
        self.check("mark_group_member_paid")?;
        self.inner.mark_group_member_paid(product_id, chat_id).await
    }
}

pub struct Harness {
    pub services: Services,
    pub store: Arc<dyn Store>,
    pub completion: Arc<ScriptedCompletion>,
    pub gateway: Arc<FakeGateway>,
}

/// Frosala catalog with every group order open for another week
pub fn open_catalog() -> CatalogFile {
    let mut file = CatalogFile::frosala();
    for group in &mut file.group_orders {
        group.closes_at = Utc::now() + chrono::Duration::days(7);
    }
    file
}

pub fn harness_with(
    catalog: CatalogFile,
    completion: ScriptedCompletion,
    gateway: FakeGateway,
    config: OrchestratorConfig,
) -> Harness {
    harness_on(Arc::new(MemoryStore::new()), catalog, completion, gateway, config)
}

pub fn harness_on(
    store: Arc<dyn Store>,
    catalog: CatalogFile,
    completion: ScriptedCompletion,
    gateway: FakeGateway,
    config: OrchestratorConfig,
) -> Harness {
    let completion = Arc::new(completion);
    let gateway = Arc::new(gateway);
    let (catalog, group_orders) = catalog.into_parts().unwrap();
    let services = Services::assemble(
        store.clone(),
        catalog,
        group_orders,
        completion.clone(),
        gateway.clone(),
        None,
        config,
    );
    Harness {
        services,
        store,
        completion,
        gateway,
    }
}

/// Harness over a [`FlakyStore`], returned alongside for arming failures
pub fn flaky_harness(catalog: CatalogFile) -> (Harness, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::new());
    let h = harness_on(
        store.clone(),
        catalog,
        ScriptedCompletion::new(),
        FakeGateway::default(),
        test_config(),
    );
    (h, store)
}

pub fn harness() -> Harness {
    harness_with(
        open_catalog(),
        ScriptedCompletion::new(),
        FakeGateway::default(),
        test_config(),
    )
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        completion_timeout: Duration::from_secs(5),
        menu_tool_enabled: false,
        bot_username: "firmAi_bot".to_string(),
        recovery: RecoveryConfig::default(),
    }
}
