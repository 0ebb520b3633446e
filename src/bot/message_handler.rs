//! Message Handler module for processing incoming Telegram messages

use std::future::Future;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InlineKeyboardMarkup, ParseMode};
use teloxide::{ApiError, RequestError};
use tracing::{debug, info, warn};

use super::callback_data::StartParam;
use super::context::AppContext;
use super::ui_builder::{create_menu_keyboard, format_cart_summary, reply_keyboard};
use crate::localization::{t_args_lang, t_lang};
use crate::orchestrator::Reply;

// Legacy Markdown: model replies are not escaped for MarkdownV2
#[allow(deprecated)]
const REPLY_PARSE_MODE: ParseMode = ParseMode::Markdown;

/// Entry point for every message update
pub async fn message_handler(bot: Bot, msg: Message, ctx: AppContext) -> Result<()> {
    let language_code = msg
        .from
        .as_ref()
        .and_then(|user| user.language_code.as_deref());

    match msg.text() {
        Some(text) if text.starts_with('/') => {
            handle_command(&bot, &msg, &ctx, text, language_code).await
        }
        Some(text) => handle_text_message(&bot, &msg, &ctx, text, language_code).await,
        None => handle_unsupported_message(&bot, &msg, language_code).await,
    }
}

async fn handle_text_message(
    bot: &Bot,
    msg: &Message,
    ctx: &AppContext,
    text: &str,
    language_code: Option<&str>,
) -> Result<()> {
    let chat_id = msg.chat.id;
    debug!(user_id = %chat_id, message_length = text.len(), "Received text message from user");

    let reply = with_slow_notice(
        bot,
        ctx,
        chat_id,
        language_code,
        ctx.orchestrator.handle_user_message(chat_id, text, language_code),
    )
    .await;
    send_reply(bot, chat_id, &reply, language_code).await
}

async fn handle_command(
    bot: &Bot,
    msg: &Message,
    ctx: &AppContext,
    text: &str,
    language_code: Option<&str>,
) -> Result<()> {
    let chat_id = msg.chat.id;
    let (command, argument) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    // Commands in groups arrive as `/start@botname`
    let command = command.split('@').next().unwrap_or(command);
    debug!(user_id = %chat_id, command, "Received command from user");

    match command {
        "/start" => match StartParam::parse(argument) {
            Some(StartParam::PaymentSuccess) => {
                info!(user_id = %chat_id, "Customer returned from payment page");
                let reply = with_slow_notice(
                    bot,
                    ctx,
                    chat_id,
                    language_code,
                    ctx.orchestrator.confirm_payment_return(chat_id, language_code),
                )
                .await;
                send_reply(bot, chat_id, &reply, language_code).await?;
            }
            Some(StartParam::Product(product_id)) => {
                let reply = ctx
                    .orchestrator
                    .join_group_order(chat_id, product_id, language_code)
                    .await;
                send_reply(bot, chat_id, &reply, language_code).await?;
            }
            None => {
                let name = msg
                    .from
                    .as_ref()
                    .map(|user| user.first_name.clone())
                    .unwrap_or_default();
                bot.send_message(
                    chat_id,
                    t_args_lang("welcome", &[("name", &name)], language_code),
                )
                .await?;
            }
        },
        "/menu" => {
            let menu = ctx.orchestrator.product_menu();
            bot.send_message(chat_id, t_lang("menu-prompt", language_code))
                .reply_markup(create_menu_keyboard(&menu))
                .await?;
        }
        "/cart" => {
            let summary = ctx.cart.summary(chat_id).await?;
            bot.send_message(chat_id, format_cart_summary(&summary, language_code))
                .await?;
        }
        "/help" => {
            bot.send_message(chat_id, t_lang("help-text", language_code))
                .await?;
        }
        _ => debug!(user_id = %chat_id, command, "Ignoring unknown command"),
    }

    Ok(())
}

async fn handle_unsupported_message(
    bot: &Bot,
    msg: &Message,
    language_code: Option<&str>,
) -> Result<()> {
    debug!(user_id = %msg.chat.id, "Received unsupported message type from user");
    bot.send_message(msg.chat.id, t_lang("text-only", language_code))
        .await?;
    Ok(())
}

/// Await a conversation turn, telling the user to wait if it runs long
async fn with_slow_notice<F>(
    bot: &Bot,
    ctx: &AppContext,
    chat_id: ChatId,
    language_code: Option<&str>,
    turn: F,
) -> Reply
where
    F: Future<Output = Reply>,
{
    if let Err(e) = bot.send_chat_action(chat_id, ChatAction::Typing).await {
        debug!(user_id = %chat_id, error = %e, "Failed to send typing action");
    }

    tokio::pin!(turn);
    tokio::select! {
        reply = &mut turn => reply,
        _ = tokio::time::sleep(ctx.slow_reply_notice) => {
            if let Err(e) = bot.send_message(chat_id, t_lang("still-working", language_code)).await {
                warn!(user_id = %chat_id, error = %e, "Failed to send still-working notice");
            }
            turn.await
        }
    }
}

/// Send a reply as Markdown, retrying as plain text when Telegram rejects the entities
pub async fn send_reply(
    bot: &Bot,
    chat_id: ChatId,
    reply: &Reply,
    language_code: Option<&str>,
) -> Result<()> {
    let keyboard = reply_keyboard(reply, language_code);

    match send_text(bot, chat_id, &reply.text, keyboard.clone(), Some(REPLY_PARSE_MODE)).await {
        Ok(()) => Ok(()),
        Err(RequestError::Api(ApiError::CantParseEntities(details))) => {
            warn!(user_id = %chat_id, details = %details, "Markdown rejected, resending as plain text");
            send_text(bot, chat_id, &reply.text, keyboard, None).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn send_text(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    keyboard: Option<InlineKeyboardMarkup>,
    parse_mode: Option<ParseMode>,
) -> Result<(), RequestError> {
    let mut request = bot.send_message(chat_id, text);
    if let Some(mode) = parse_mode {
        request = request.parse_mode(mode);
    }
    if let Some(keyboard) = keyboard {
        request = request.reply_markup(keyboard);
    }
    request.await?;
    Ok(())
}
