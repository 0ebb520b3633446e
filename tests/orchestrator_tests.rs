//! # Conversation Orchestrator Tests
//!
//! Full conversation turns against a scripted completion service and a fake
//! payment gateway, over the in-memory store.

mod common;

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use teloxide::types::ChatId;

use common::{
    flaky_harness, harness, harness_with, open_catalog, test_config, FakeGateway,
    ScriptedCompletion,
};
use frosala_bot::catalog::CatalogFile;
use frosala_bot::config::RecoveryConfig;
use frosala_bot::errors::CompletionError;
use frosala_bot::llm::tools::{GENERATE_INVOICE, SHOW_PRODUCTS};
use frosala_bot::localization::t_lang;
use frosala_bot::orchestrator::OrchestratorConfig;
use frosala_bot::session::{ChatMessage, Role};
use frosala_bot::store::Store;

const EN: Option<&str> = Some("en");

fn invoice_args() -> serde_json::Value {
    json!({
        "name": "Budi",
        "amount": 5000,
        "items": [
            {"name": "DORI GLZ 0%", "price": 1000, "quantity": 2},
            {"name": "DORI GLZ 50-55%", "price": 3000, "quantity": 1}
        ],
        "phoneNumber": "08123456789"
    })
}

#[tokio::test]
async fn test_text_reply_stores_one_turn() {
    let h = harness();
    let chat = ChatId(1);
    h.completion.push_text("Halo kak, mau pesan apa?");

    let reply = h.services.orchestrator.handle_user_message(chat, "halo", EN).await;
    assert_eq!(reply.text, "Halo kak, mau pesan apa?");
    assert!(reply.menu.is_none());
    assert!(reply.payment.is_none());

    let history = h.services.sessions.get_or_create(chat).await.unwrap();
    assert_eq!(
        history,
        vec![
            ChatMessage::user("halo"),
            ChatMessage::assistant("Halo kak, mau pesan apa?")
        ]
    );

    let requests = h.completion.requests();
    assert_eq!(requests.len(), 1);
    let messages = &requests[0].messages;
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[1].role, Role::System);
    assert!(messages[1].content.contains("SALMON FILLET"));
    assert_eq!(messages[2], ChatMessage::user("halo"));
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].function.name, GENERATE_INVOICE);
}

#[tokio::test]
async fn test_history_is_sent_on_next_turn() {
    let h = harness();
    let chat = ChatId(2);
    h.completion.push_text("first answer");
    h.completion.push_text("second answer");

    h.services.orchestrator.handle_user_message(chat, "one", EN).await;
    h.services.orchestrator.handle_user_message(chat, "two", EN).await;

    let requests = h.completion.requests();
    let second = &requests[1].messages;
    assert_eq!(second.len(), 5);
    assert_eq!(second[2], ChatMessage::user("one"));
    assert_eq!(second[3], ChatMessage::assistant("first answer"));
    assert_eq!(second[4], ChatMessage::user("two"));
    assert_eq!(h.services.sessions.get_or_create(chat).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_completion_failure_leaves_history_untouched() {
    let h = harness();
    let chat = ChatId(3);
    h.completion.push(Err(CompletionError::Status {
        status: 500,
        body: "boom".to_string(),
    }));

    let reply = h.services.orchestrator.handle_user_message(chat, "halo", EN).await;
    assert_eq!(reply.text, t_lang("completion-failed", EN));
    assert!(h.services.sessions.get_or_create(chat).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_completion_is_a_failure() {
    let h = harness();
    let chat = ChatId(4);
    h.completion.push_text("   ");

    let reply = h.services.orchestrator.handle_user_message(chat, "halo", EN).await;
    assert_eq!(reply.text, t_lang("completion-failed", EN));
    assert!(h.services.sessions.get_or_create(chat).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_completion_timeout() {
    let config = OrchestratorConfig {
        completion_timeout: Duration::from_millis(50),
        ..test_config()
    };
    let h = harness_with(
        open_catalog(),
        ScriptedCompletion::with_delay(Duration::from_secs(5)),
        FakeGateway::default(),
        config,
    );
    h.completion.push_text("too late");

    let reply = h.services.orchestrator.handle_user_message(ChatId(5), "halo", EN).await;
    assert_eq!(reply.text, t_lang("completion-failed", EN));
    assert!(h.services.sessions.get_or_create(ChatId(5)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_circuit_breaker_stops_calling_after_failures() {
    let config = OrchestratorConfig {
        recovery: RecoveryConfig {
            circuit_breaker_threshold: 2,
            circuit_breaker_reset_secs: 60,
        },
        ..test_config()
    };
    let h = harness_with(open_catalog(), ScriptedCompletion::new(), FakeGateway::default(), config);

    // Empty script: every call fails
    for _ in 0..3 {
        h.services.orchestrator.handle_user_message(ChatId(6), "halo", EN).await;
    }
    assert_eq!(h.completion.requests().len(), 2);
}

#[tokio::test]
async fn test_valid_invoice_call_records_one_invoice() {
    let h = harness();
    let chat = ChatId(42);
    h.completion.push_tool_call(GENERATE_INVOICE, invoice_args());

    let reply = h.services.orchestrator.handle_user_message(chat, "ya, lanjut bayar", EN).await;

    let payment = reply.payment.expect("payment action");
    assert_eq!(payment.url, "https://checkout.example/inv-1");
    assert!(reply.text.contains("[Invoice](https://checkout.example/inv-1)"));

    let gateway_requests = h.gateway.requests();
    assert_eq!(gateway_requests.len(), 1);
    assert_eq!(gateway_requests[0].amount, 5000);
    assert_eq!(gateway_requests[0].customer_name, "Budi");
    assert!(gateway_requests[0].group_products.is_empty());

    let record = h.store.find_invoice("inv-1").await.unwrap().expect("ledger record");
    assert_eq!(record.chat_id, chat);
    assert!(!record.paid);
    assert_eq!(h.store.find_invoice(&gateway_requests[0].external_id).await.unwrap(), Some(record));

    let history = h.services.sessions.get_or_create(chat).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1], ChatMessage::assistant(reply.text));
}

#[tokio::test]
async fn test_invalid_invoice_arguments_skip_gateway() {
    let h = harness();
    let chat = ChatId(7);

    let mut zero_amount = invoice_args();
    zero_amount["amount"] = json!(0);
    let mut no_items = invoice_args();
    no_items["items"] = json!([]);
    let mut no_phone = invoice_args();
    no_phone["phoneNumber"] = json!("");

    for args in [zero_amount, no_items, no_phone] {
        h.completion.push_tool_call(GENERATE_INVOICE, args);
        let reply = h.services.orchestrator.handle_user_message(chat, "bayar", EN).await;
        assert_eq!(reply.text, t_lang("tool-arguments-invalid", EN));
        assert!(reply.payment.is_none());
    }

    assert!(h.gateway.requests().is_empty());
    // The clarification is still a completed turn
    assert_eq!(h.services.sessions.get_or_create(chat).await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_unknown_product_in_invoice_skips_gateway() {
    let h = harness();
    let mut args = invoice_args();
    args["items"] = json!([{"name": "LOBSTER", "price": 100000, "quantity": 1}]);
    h.completion.push_tool_call(GENERATE_INVOICE, args);

    let reply = h.services.orchestrator.handle_user_message(ChatId(8), "bayar", EN).await;
    assert_eq!(reply.text, t_lang("tool-arguments-invalid", EN));
    assert!(h.gateway.requests().is_empty());
}

#[tokio::test]
async fn test_gateway_failure_records_nothing() {
    let h = harness_with(
        open_catalog(),
        ScriptedCompletion::new(),
        FakeGateway::failing(),
        test_config(),
    );
    let chat = ChatId(9);
    h.completion.push_tool_call(GENERATE_INVOICE, invoice_args());

    let reply = h.services.orchestrator.handle_user_message(chat, "bayar", EN).await;
    assert_eq!(reply.text, t_lang("payment-setup-failed", EN));
    assert!(reply.payment.is_none());

    let external_id = &h.gateway.requests()[0].external_id;
    assert!(h.store.find_invoice(external_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_group_order_invoice_is_discounted_and_joins() {
    let h = harness();
    let chat = ChatId(10);
    let mut args = invoice_args();
    args["amount"] = json!(3000);
    args["groupOrder"] = json!(true);
    h.completion.push_tool_call(GENERATE_INVOICE, args);

    let reply = h.services.orchestrator.handle_user_message(chat, "ikut group order", EN).await;
    assert!(reply.payment.is_some());

    let request = &h.gateway.requests()[0];
    // 40% off: 2 x 600 + 1 x 1800
    assert_eq!(request.items[0].price, 600);
    assert_eq!(request.items[1].price, 1800);
    assert_eq!(request.amount, 3000);
    assert_eq!(request.group_products, vec![1, 3]);

    let status = h
        .services
        .group_orders
        .status(1, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.member_count, 1);
    assert_eq!(status.paid_count, 0);
    assert!(!status.ready_to_process);
}

#[tokio::test]
async fn test_closed_group_order_is_not_discounted() {
    // The built-in catalog's group orders closed in October 2024
    let h = harness_with(
        CatalogFile::frosala(),
        ScriptedCompletion::new(),
        FakeGateway::default(),
        test_config(),
    );
    let mut args = invoice_args();
    args["groupOrder"] = json!(true);
    h.completion.push_tool_call(GENERATE_INVOICE, args);

    h.services.orchestrator.handle_user_message(ChatId(11), "bayar", EN).await;

    let request = &h.gateway.requests()[0];
    assert_eq!(request.amount, 5000);
    assert!(request.group_products.is_empty());
}

#[tokio::test]
async fn test_menu_tool_renders_catalog_names() {
    let config = OrchestratorConfig {
        menu_tool_enabled: true,
        ..test_config()
    };
    let h = harness_with(open_catalog(), ScriptedCompletion::new(), FakeGateway::default(), config);
    h.completion.push_tool_call(
        SHOW_PRODUCTS,
        json!({"message": "Silakan pilih produk", "productIds": [7, 99]}),
    );

    let reply = h.services.orchestrator.handle_user_message(ChatId(12), "ada apa saja?", EN).await;
    assert_eq!(reply.text, "Silakan pilih produk");
    let menu = reply.menu.expect("menu");
    assert_eq!(menu.entries.len(), 1);
    assert_eq!(menu.entries[0].product_id, 7);
    assert_eq!(menu.entries[0].label, "UDANG PUD 500gr");

    assert_eq!(h.completion.requests()[0].tools.len(), 2);
    let history = h.services.sessions.get_or_create(ChatId(12)).await.unwrap();
    assert_eq!(history[1], ChatMessage::assistant("Silakan pilih produk"));
}

#[tokio::test]
async fn test_payment_return_stores_note_without_user_message() {
    let h = harness();
    let chat = ChatId(13);
    h.completion.push_text("Terima kasih sudah membayar!");

    let reply = h.services.orchestrator.confirm_payment_return(chat, EN).await;
    assert_eq!(reply.text, "Terima kasih sudah membayar!");

    let history = h.services.sessions.get_or_create(chat).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::System);
    assert!(history[0].content.contains("https://t.me/firmAi_bot?start=product_"));
    assert_eq!(history[1].role, Role::Assistant);
    assert!(history.iter().all(|message| message.role != Role::User));
}

#[tokio::test]
async fn test_join_group_order_via_link_is_idempotent() {
    let h = harness();
    let chat = ChatId(14);

    let first = h.services.orchestrator.join_group_order(chat, 5, EN).await;
    assert!(first.text.contains("SALMON FILLET"));
    let second = h.services.orchestrator.join_group_order(chat, 5, EN).await;
    assert_ne!(first.text, second.text);

    let status = h
        .services
        .group_orders
        .status(5, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.member_count, 1);

    // Only the first join leaves a note for the model
    let history = h.services.sessions.get_or_create(chat).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::System);

    let unknown = h.services.orchestrator.join_group_order(chat, 99, EN).await;
    assert_eq!(unknown.text, t_lang("product-unknown", EN));
}

#[tokio::test]
async fn test_invoice_reaches_customer_when_group_join_fails() {
    let (h, store) = flaky_harness(open_catalog());
    let chat = ChatId(15);
    let mut args = invoice_args();
    args["amount"] = json!(3000);
    args["groupOrder"] = json!(true);
    h.completion.push_tool_call(GENERATE_INVOICE, args);

    store.fail_next("join_group_order");
    let reply = h.services.orchestrator.handle_user_message(chat, "ikut group order", EN).await;
    let payment = reply.payment.expect("invoice delivered");
    let status = h.services.group_orders.status(1, Utc::now()).await.unwrap().unwrap();
    assert_eq!(status.member_count, 0);

    // Paying the invoice adds the chat the join missed
    h.services
        .payments
        .on_payment_notification(&payment.invoice_id, Utc::now())
        .await
        .unwrap();
    for product in [1, 3] {
        let status = h
            .services
            .group_orders
            .status(product, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.member_count, 1);
        assert_eq!(status.paid_count, 1);
    }
}

#[tokio::test]
async fn test_invoice_reaches_customer_when_history_write_fails() {
    let (h, store) = flaky_harness(open_catalog());
    let chat = ChatId(16);
    h.completion.push_tool_call(GENERATE_INVOICE, invoice_args());

    store.fail_next("append_messages");
    let reply = h.services.orchestrator.handle_user_message(chat, "bayar", EN).await;
    let payment = reply.payment.expect("invoice delivered");
    assert!(h.store.find_invoice(&payment.invoice_id).await.unwrap().is_some());
    assert_eq!(h.gateway.requests().len(), 1);
}
