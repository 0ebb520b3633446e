use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use frosala_bot::app::Services;
use frosala_bot::bot::{schema, AppContext, TelegramNotifier};
use frosala_bot::catalog::CatalogFile;
use frosala_bot::config::AppConfig;
use frosala_bot::llm::OpenAiClient;
use frosala_bot::localization::init_localization;
use frosala_bot::orchestrator::OrchestratorConfig;
use frosala_bot::payment::webhook::{self, WebhookState};
use frosala_bot::payment::XenditClient;
use frosala_bot::store::{MemoryStore, PgStore, Store};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    init_tracing();

    info!("Starting Frosala order bot");

    let config = AppConfig::from_env().context("Invalid configuration")?;
    init_localization(&config.default_language)?;

    let catalog_file = match &config.catalog_path {
        Some(path) => {
            info!(path = %path, "Loading catalog file");
            CatalogFile::load(path)?
        }
        None => CatalogFile::frosala(),
    };
    let (catalog, group_orders) = catalog_file.into_parts()?;
    info!(
        products = catalog.list().len(),
        group_orders = group_orders.len(),
        "Catalog loaded"
    );

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url)
                .await
                .context("Failed to connect to database")?;
            store.init_schema().await?;
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, bot state is kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    // The completion call is bounded by the orchestrator's own timeout
    let completion_http = reqwest::Client::builder().build()?;
    let gateway_http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()?;

    let services = Services::assemble(
        store,
        catalog,
        group_orders,
        Arc::new(OpenAiClient::new(completion_http, &config.openai)),
        Arc::new(XenditClient::new(
            gateway_http,
            &config.xendit,
            &config.bot_username,
        )),
        config.history_limit,
        OrchestratorConfig {
            completion_timeout: config.completion_timeout,
            menu_tool_enabled: config.menu_tool_enabled,
            bot_username: config.bot_username.clone(),
            recovery: config.recovery.clone(),
        },
    );

    let bot = Bot::new(&config.telegram_token);

    let webhook_state = WebhookState {
        payments: services.payments.clone(),
        notifier: Some(Arc::new(TelegramNotifier::new(bot.clone()))),
        callback_token: config.xendit.callback_token.clone(),
    };
    if webhook_state.callback_token.is_none() {
        warn!("XENDIT_CALLBACK_TOKEN not set, webhook calls are not verified");
    }
    let listen_addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind webhook server to {listen_addr}"))?;
    info!(address = %listen_addr, "Webhook server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, webhook::router(webhook_state)).await {
            error!(error = %e, "Webhook server stopped");
        }
    });

    let ctx = AppContext {
        orchestrator: services.orchestrator.clone(),
        cart: services.cart.clone(),
        slow_reply_notice: config.slow_reply_notice,
    };

    info!("Bot initialized, starting dispatcher");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
