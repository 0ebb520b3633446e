//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{debug, warn};

use super::callback_data::CallbackCommand;
use super::context::AppContext;
use super::ui_builder::{create_view_cart_keyboard, format_cart_summary};
use crate::localization::{t_args_lang, t_lang};

/// Handle callback queries from inline keyboards
pub async fn callback_handler(bot: Bot, q: CallbackQuery, ctx: AppContext) -> Result<()> {
    debug!(user_id = %q.from.id, data = ?q.data, "Received callback query from user");
    let language_code = q.from.language_code.as_deref();

    // Stop the button's loading spinner whatever happens next
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!(user_id = %q.from.id, error = %e, "Failed to answer callback query");
    }

    let Some(message) = q.message.as_ref() else {
        debug!(user_id = %q.from.id, "Callback query without message");
        return Ok(());
    };
    let chat_id = message.chat().id;

    let Some(command) = q.data.as_deref().and_then(CallbackCommand::parse) else {
        debug!(chat_id = %chat_id, data = ?q.data, "Ignoring unknown callback data");
        return Ok(());
    };

    match command {
        CallbackCommand::Select(product_id) => match ctx.cart.add(chat_id, product_id).await? {
            Some(line) => {
                let text = t_args_lang(
                    "cart-item-added",
                    &[
                        ("product", &line.product.name),
                        ("quantity", &line.quantity.to_string()),
                    ],
                    language_code,
                );
                bot.send_message(chat_id, text)
                    .reply_markup(create_view_cart_keyboard(language_code))
                    .await?;
            }
            None => {
                bot.send_message(chat_id, t_lang("product-unknown", language_code))
                    .await?;
            }
        },
        CallbackCommand::ViewCart => {
            let summary = ctx.cart.summary(chat_id).await?;
            bot.send_message(chat_id, format_cart_summary(&summary, language_code))
                .await?;

            if let Err(e) = bot.delete_message(chat_id, message.id()).await {
                debug!(chat_id = %chat_id, error = %e, "Could not delete view-cart prompt");
            }
        }
    }

    Ok(())
}
