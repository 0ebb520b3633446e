use std::sync::Arc;
use std::time::Duration;

use crate::cart::Cart;
use crate::orchestrator::Orchestrator;

/// Shared services injected into every handler by the dispatcher
#[derive(Clone)]
pub struct AppContext {
    pub orchestrator: Arc<Orchestrator>,
    pub cart: Cart,
    /// Delay before telling the user a reply is still being prepared
    pub slow_reply_notice: Duration,
}
