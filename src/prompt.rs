//! System messages sent ahead of the conversation history on every completion
//! request, plus the notes injected into a session by deep links.

use serde::Serialize;
use serde_json::json;

use crate::catalog::{Catalog, Product, ProductId};
use crate::group_order::GroupOrderStatus;
use crate::session::ChatMessage;

const BUSINESS_RULES: &str = "\
You are a shopping assistant helping customers choose products from Frosala, a seafood retailer.
After guiding the customer through product selection, ask for their name, phone number and delivery address before proceeding to payment.
Once the customer confirms the order and the details are complete, call generate_invoice with catalog product names and prices.
A group order is a shared purchase that lets buyers get a lower price by buying in bulk. Every group order participant pays for their own order.
A group order is processed when its quota of paid members is met or when ordering closes (see closes_at).
Group orders are optional: customers may also buy on their own.
When the customer buys through a group order, set groupOrder to true in generate_invoice; the group discount is applied to the invoice.
The cart is cleared after payment completes.
Reply in the customer's language; when unsure, reply in Indonesian.";

#[derive(Serialize)]
struct Snapshot<'a> {
    available_products: &'a [Product],
    available_locations: &'a [String],
    group_orders: &'a [GroupOrderStatus],
    joined_group_orders: &'a [ProductId],
}

/// Fixed business rules
pub fn business_rules() -> ChatMessage {
    ChatMessage::system(BUSINESS_RULES)
}

/// Live catalog and group-order state for this request
pub fn constraints(
    catalog: &Catalog,
    group_orders: &[GroupOrderStatus],
    joined: &[ProductId],
) -> ChatMessage {
    let snapshot = Snapshot {
        available_products: catalog.list(),
        available_locations: catalog.locations(),
        group_orders,
        joined_group_orders: joined,
    };
    let snapshot = serde_json::to_string(&snapshot).unwrap_or_else(|_| json!({}).to_string());

    ChatMessage::system(format!(
        "The constraints are:\n\
         {snapshot}\n\
         Prices are in rupiah. group_orders lists every group order with its member_count, paid_count and discount; joined_group_orders lists the group orders this customer joined.\n\
         Shipping costs are paid by the buyer.\n\
         Individual orders are delivered 1 day after payment is received.\n\
         Group orders are delivered in 1-7 days depending on when the quota is met.\n\
         Do not respond to irrelevant messages."
    ))
}

/// Invite link that joins a friend to a product's group order
pub fn group_invite_link(bot_username: &str, product_id: ProductId) -> String {
    format!("https://t.me/{bot_username}?start=product_{product_id}")
}

/// Note injected when the customer returns from the payment page
pub fn payment_success_note(bot_username: &str, joined: &[ProductId]) -> ChatMessage {
    let mut note = String::from(
        "The payment succeeded, thank the customer. If the order is a group order, \
         it will be processed once the quota is met.\n",
    );
    if joined.is_empty() {
        note.push_str(&format!(
            "Give the link in the format https://t.me/{bot_username}?start=product_{{product_id}} \
             to invite friends to a group order."
        ));
    } else {
        note.push_str("Share these links so the customer can invite friends to their group orders:");
        for product_id in joined {
            note.push('\n');
            note.push_str(&group_invite_link(bot_username, *product_id));
        }
    }
    ChatMessage::system(note)
}

/// Note recorded when a chat joins a group order through an invite link
pub fn group_join_note(product: &Product, status: &GroupOrderStatus) -> ChatMessage {
    ChatMessage::system(format!(
        "The customer joined the group order for {} (product id {}) through an invite link. \
         {} of {} members so far, {} paid. Offer to prepare their group order.",
        product.name, product.id, status.member_count, status.minimum_members, status.paid_count
    ))
}
