//! Service wiring shared by the binary and the integration tests.

use std::sync::Arc;

use crate::cart::Cart;
use crate::catalog::Catalog;
use crate::group_order::{GroupOrderConfig, GroupOrderRegistry};
use crate::llm::CompletionService;
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::payment::{InvoiceLedger, PaymentAdapter, PaymentGateway};
use crate::session::{ChatLocks, SessionStore};
use crate::store::Store;

/// Everything the chat handlers and the webhook need, built over one store
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<Catalog>,
    pub sessions: SessionStore,
    pub cart: Cart,
    pub group_orders: Arc<GroupOrderRegistry>,
    pub payments: Arc<PaymentAdapter>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Services {
    pub fn assemble(
        store: Arc<dyn Store>,
        catalog: Catalog,
        group_orders: Vec<GroupOrderConfig>,
        completion: Arc<dyn CompletionService>,
        gateway: Arc<dyn PaymentGateway>,
        history_limit: Option<usize>,
        config: OrchestratorConfig,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let locks = ChatLocks::new();
        let sessions = SessionStore::new(store.clone(), history_limit);
        let cart = Cart::new(store.clone(), catalog.clone());
        let group_orders = Arc::new(GroupOrderRegistry::new(group_orders, store.clone()));
        let payments = Arc::new(PaymentAdapter::new(
            gateway,
            InvoiceLedger::new(store),
            sessions.clone(),
            cart.clone(),
            group_orders.clone(),
            locks.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            completion,
            sessions.clone(),
            catalog.clone(),
            group_orders.clone(),
            payments.clone(),
            locks,
            config,
        ));

        Self {
            catalog,
            sessions,
            cart,
            group_orders,
            payments,
            orchestrator,
        }
    }
}
