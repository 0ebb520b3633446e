//! # Conversation Orchestrator
//!
//! Runs one conversation turn per inbound message: builds the prompt from the
//! stored history and live catalog state, asks the completion service, executes
//! a requested tool and stores the finished turn.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use teloxide::types::ChatId;
use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, Product, ProductId};
use crate::circuit_breaker::CircuitBreaker;
use crate::config::RecoveryConfig;
use crate::errors::{CompletionError, GroupOrderError, PaymentError, ToolArgumentError, TurnError};
use crate::group_order::{GroupOrderRegistry, JoinOutcome};
use crate::llm::tools::{self, InvoiceOrder, MenuArgs};
use crate::llm::{Completion, CompletionRequest, CompletionService, ToolDefinition, ToolInvocation};
use crate::localization::{t_args_lang, t_lang};
use crate::payment::{InvoiceRequest, LineItem, PaymentAdapter};
use crate::prompt;
use crate::session::{ChatLocks, ChatMessage, SessionStore};

/// One selectable product in a menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub product_id: ProductId,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionMenu {
    pub entries: Vec<MenuEntry>,
}

/// Link to a created invoice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentAction {
    pub invoice_id: String,
    pub url: String,
}

/// What the chat adapter renders for a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub menu: Option<SelectionMenu>,
    pub payment: Option<PaymentAction>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            menu: None,
            payment: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub completion_timeout: Duration,
    /// Declare the product-menu tool to the model
    pub menu_tool_enabled: bool,
    pub bot_username: String,
    pub recovery: RecoveryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            completion_timeout: Duration::from_secs(60),
            menu_tool_enabled: false,
            bot_username: crate::config::DEFAULT_BOT_USERNAME.to_string(),
            recovery: RecoveryConfig::default(),
        }
    }
}

/// Invoice lines priced from the catalog
struct PricedOrder {
    items: Vec<LineItem>,
    amount: u64,
    group_products: Vec<ProductId>,
}

pub struct Orchestrator {
    completion: Arc<dyn CompletionService>,
    sessions: SessionStore,
    catalog: Arc<Catalog>,
    group_orders: Arc<GroupOrderRegistry>,
    payments: Arc<PaymentAdapter>,
    locks: ChatLocks,
    breaker: CircuitBreaker,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        sessions: SessionStore,
        catalog: Arc<Catalog>,
        group_orders: Arc<GroupOrderRegistry>,
        payments: Arc<PaymentAdapter>,
        locks: ChatLocks,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            completion,
            sessions,
            catalog,
            group_orders,
            payments,
            locks,
            breaker: CircuitBreaker::new(config.recovery.clone()),
            config,
        }
    }

    /// Answer a customer's text message
    pub async fn handle_user_message(
        &self,
        chat_id: ChatId,
        text: &str,
        language: Option<&str>,
    ) -> Reply {
        let pending = ChatMessage::user(text);
        self.turn_or_apology(chat_id, pending, language).await
    }

    /// Run a turn after the customer returns from the payment page. No user
    /// message is stored, only the post-payment note and the reply.
    pub async fn confirm_payment_return(&self, chat_id: ChatId, language: Option<&str>) -> Reply {
        let joined = match self.group_orders.memberships(chat_id).await {
            Ok(joined) => joined,
            Err(err) => {
                error!(chat_id = %chat_id, error = %err, "Failed to load group memberships");
                return Reply::text(t_lang("completion-failed", language));
            }
        };
        let note = prompt::payment_success_note(&self.config.bot_username, &joined);
        self.turn_or_apology(chat_id, note, language).await
    }

    /// Join the chat to a product's group order through an invite link
    pub async fn join_group_order(
        &self,
        chat_id: ChatId,
        product_id: ProductId,
        language: Option<&str>,
    ) -> Reply {
        let Some(product) = self.catalog.find_by_id(product_id) else {
            return Reply::text(t_lang("product-unknown", language));
        };
        let product_name = product.name.as_str();

        let _guard = self.locks.acquire(chat_id).await;
        let now = Utc::now();
        let outcome = match self.group_orders.join(product_id, chat_id, now).await {
            Ok(outcome) => outcome,
            Err(GroupOrderError::UnknownProduct(_)) => {
                return Reply::text(t_lang("group-unknown", language))
            }
            Err(GroupOrderError::Closed(_)) => {
                return Reply::text(t_args_lang("group-closed", &[("product", product_name)], language))
            }
            Err(GroupOrderError::Store(err)) => {
                error!(chat_id = %chat_id, product_id, error = %err, "Failed to join group order");
                return Reply::text(t_lang("completion-failed", language));
            }
        };

        if outcome == JoinOutcome::AlreadyMember {
            return Reply::text(t_args_lang(
                "group-already-joined",
                &[("product", product_name)],
                language,
            ));
        }

        let status = match self.group_orders.status(product_id, now).await {
            Ok(Some(status)) => status,
            Ok(None) => return Reply::text(t_lang("group-unknown", language)),
            Err(err) => {
                error!(chat_id = %chat_id, product_id, error = %err, "Failed to read group order");
                return Reply::text(t_lang("completion-failed", language));
            }
        };
        if let Err(err) = self
            .sessions
            .append(chat_id, prompt::group_join_note(product, &status))
            .await
        {
            warn!(chat_id = %chat_id, error = %err, "Failed to record group join note");
        }

        let quota = status.minimum_members.to_string();
        let discount = format!("{}%", (status.discount * 100.0).round());
        let deadline = status.closes_at.format("%d-%m-%Y").to_string();
        Reply::text(t_args_lang(
            "group-joined",
            &[
                ("product", product_name),
                ("quota", &quota),
                ("discount", &discount),
                ("deadline", &deadline),
            ],
            language,
        ))
    }

    /// Every catalog product as a selection menu
    pub fn product_menu(&self) -> SelectionMenu {
        self.menu_for(&[])
    }

    async fn turn_or_apology(
        &self,
        chat_id: ChatId,
        pending: ChatMessage,
        language: Option<&str>,
    ) -> Reply {
        match self.run_turn(chat_id, pending, language).await {
            Ok(reply) => reply,
            Err(err) => {
                error!(chat_id = %chat_id, error = %err, "Conversation turn failed");
                Reply::text(t_lang("completion-failed", language))
            }
        }
    }

    async fn run_turn(
        &self,
        chat_id: ChatId,
        pending: ChatMessage,
        language: Option<&str>,
    ) -> Result<Reply, TurnError> {
        let _guard = self.locks.acquire(chat_id).await;
        let now = Utc::now();

        let history = self.sessions.get_or_create(chat_id).await?;
        let statuses = self.group_orders.snapshot(now).await?;
        let joined = self.group_orders.memberships(chat_id).await?;

        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(prompt::business_rules());
        messages.push(prompt::constraints(&self.catalog, &statuses, &joined));
        messages.extend(history);
        messages.push(pending.clone());

        debug!(chat_id = %chat_id, messages = messages.len(), "Requesting completion");
        let completion = self
            .complete(CompletionRequest {
                messages,
                tools: self.tools(),
            })
            .await?;

        let reply = match completion {
            Completion::Text(text) => Reply::text(text),
            Completion::ToolCall { call, content } => match ToolInvocation::parse(&call) {
                Ok(ToolInvocation::GenerateInvoice(order)) => {
                    self.generate_invoice(chat_id, order, now, language).await?
                }
                Ok(ToolInvocation::ShowProducts(args)) => self.selection_reply(args, content, language),
                Err(err) => {
                    warn!(chat_id = %chat_id, tool = %call.name, error = %err, "Invalid tool call");
                    Reply::text(t_lang("tool-arguments-invalid", language))
                }
            },
        };

        let stored = self
            .sessions
            .append_turn(chat_id, Some(pending), ChatMessage::assistant(reply.text.clone()))
            .await;
        match stored {
            Ok(()) => Ok(reply),
            // A created invoice is always delivered
            Err(err) if reply.payment.is_some() => {
                error!(chat_id = %chat_id, error = %err, "Failed to store invoice turn");
                Ok(reply)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        let mut declared = vec![tools::invoice_tool()];
        if self.config.menu_tool_enabled {
            declared.push(tools::product_menu_tool());
        }
        declared
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
        if self.breaker.is_open() {
            return Err(CompletionError::CircuitOpen);
        }

        let timeout = self.config.completion_timeout;
        let result = match tokio::time::timeout(timeout, self.completion.complete(request)).await {
            Ok(Ok(Completion::Text(text))) if text.trim().is_empty() => Err(CompletionError::Empty),
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(timeout)),
        };

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        result
    }

    async fn generate_invoice(
        &self,
        chat_id: ChatId,
        order: InvoiceOrder,
        now: DateTime<Utc>,
        language: Option<&str>,
    ) -> Result<Reply, TurnError> {
        let priced = match self.price_order(&order, now) {
            Ok(priced) => priced,
            Err(err) => {
                warn!(chat_id = %chat_id, error = %err, "Invoice items rejected");
                return Ok(Reply::text(t_lang("tool-arguments-invalid", language)));
            }
        };
        if priced.amount != order.amount {
            warn!(
                chat_id = %chat_id,
                requested = order.amount,
                priced = priced.amount,
                "Invoice amount differs from catalog prices"
            );
        }

        let request = InvoiceRequest {
            chat_id,
            external_id: InvoiceRequest::external_id_for(chat_id, now),
            customer_name: order.customer_name,
            phone_number: order.phone_number,
            amount: priced.amount,
            items: priced.items,
            group_products: priced.group_products,
        };

        let record = match self.payments.create_invoice(request, now).await {
            Ok(record) => record,
            Err(PaymentError::Gateway(err)) => {
                warn!(chat_id = %chat_id, error = %err, "Invoice creation failed");
                return Ok(Reply::text(t_lang("payment-setup-failed", language)));
            }
            Err(err) => return Err(err.into()),
        };

        // The invoice exists from here on; its link reaches the customer even if
        // the join fails. Payment of the invoice adds a missing member.
        for product_id in &record.group_products {
            if let Err(err) = self.group_orders.join(*product_id, chat_id, now).await {
                warn!(chat_id = %chat_id, product_id, error = %err, "Group order join skipped");
            }
        }

        info!(
            chat_id = %chat_id,
            invoice_id = %record.invoice_id,
            amount = record.amount,
            "Invoice sent to customer"
        );
        Ok(Reply {
            text: t_args_lang("invoice-created", &[("url", &record.invoice_url)], language),
            menu: None,
            payment: Some(PaymentAction {
                invoice_id: record.invoice_id,
                url: record.invoice_url,
            }),
        })
    }

    /// Price every item from the catalog, applying the group discount to
    /// products whose group order is still open.
    fn price_order(
        &self,
        order: &InvoiceOrder,
        now: DateTime<Utc>,
    ) -> Result<PricedOrder, ToolArgumentError> {
        let mut items = Vec::with_capacity(order.items.len());
        let mut group_products = Vec::new();

        for item in &order.items {
            let product = self
                .catalog
                .find_by_name(&item.name)
                .ok_or_else(|| ToolArgumentError::InvalidItem {
                    name: item.name.clone(),
                    reason: "not in the catalog",
                })?;

            let group = order
                .group_order
                .then(|| self.group_orders.config(product.id))
                .flatten()
                .filter(|config| config.is_open(now));
            let price = match group {
                Some(config) => {
                    if !group_products.contains(&product.id) {
                        group_products.push(product.id);
                    }
                    config.discounted_price(product.price)
                }
                None => product.price,
            };

            items.push(LineItem {
                name: product.name.clone(),
                price,
                quantity: item.quantity,
            });
        }

        let amount = items
            .iter()
            .map(|item| item.price * u64::from(item.quantity))
            .sum();
        Ok(PricedOrder {
            items,
            amount,
            group_products,
        })
    }

    fn selection_reply(
        &self,
        args: MenuArgs,
        content: Option<String>,
        language: Option<&str>,
    ) -> Reply {
        let text = Some(args.message)
            .filter(|message| !message.trim().is_empty())
            .or(content)
            .unwrap_or_else(|| t_lang("menu-prompt", language));
        Reply {
            text,
            menu: Some(self.menu_for(&args.product_ids)),
            payment: None,
        }
    }

    /// Menu over the given products, or the whole catalog when none of them
    /// is known. Labels always come from the catalog.
    fn menu_for(&self, product_ids: &[ProductId]) -> SelectionMenu {
        let entry = |product: &Product| MenuEntry {
            product_id: product.id,
            label: product.name.clone(),
        };
        let mut entries: Vec<MenuEntry> = product_ids
            .iter()
            .filter_map(|id| self.catalog.find_by_id(*id))
            .map(entry)
            .collect();
        if entries.is_empty() {
            entries = self.catalog.list().iter().map(entry).collect();
        }
        SelectionMenu { entries }
    }
}
