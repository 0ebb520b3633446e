//! Bot module for handling Telegram interactions
//!
//! - `message_handler`: text messages, commands and deep links
//! - `callback_handler`: inline keyboard callback queries
//! - `ui_builder`: keyboards and message formatting
//! - `callback_data`: callback tokens and `/start` payloads

pub mod callback_data;
pub mod callback_handler;
pub mod context;
pub mod message_handler;
pub mod ui_builder;

use async_trait::async_trait;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;

use crate::errors::TransportError;
use crate::payment::webhook::ChatNotifier;

pub use callback_handler::callback_handler;
pub use context::AppContext;
pub use message_handler::message_handler;

/// Update routing: messages and callback queries, with [`AppContext`] injected
pub fn schema() -> UpdateHandler<anyhow::Error> {
    dptree::entry()
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_callback_query().endpoint(callback_handler))
}

/// Delivers payment confirmations outside of a conversation turn
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatNotifier for TelegramNotifier {
    async fn notify(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        self.bot.send_message(chat_id, text).await?;
        Ok(())
    }
}
