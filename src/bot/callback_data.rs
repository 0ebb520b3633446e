//! Callback tokens carried by inline buttons and `/start` deep-link payloads.
//!
//! Callback data has the form `<command>|<value>`; both directions live here.

use std::fmt;

use crate::catalog::ProductId;

const SELECT: &str = "select";
const VIEW_CART: &str = "view_cart";

/// Every inline-button action the bot understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackCommand {
    /// Add one unit of a product to the cart
    Select(ProductId),
    ViewCart,
}

impl CallbackCommand {
    pub fn parse(data: &str) -> Option<Self> {
        let (command, value) = match data.split_once('|') {
            Some((command, value)) => (command, Some(value)),
            None => (data, None),
        };
        match (command, value) {
            (SELECT, Some(value)) => value.trim().parse().ok().map(CallbackCommand::Select),
            (VIEW_CART, _) => Some(CallbackCommand::ViewCart),
            _ => None,
        }
    }
}

impl fmt::Display for CallbackCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackCommand::Select(product_id) => write!(f, "{SELECT}|{product_id}"),
            CallbackCommand::ViewCart => f.write_str(VIEW_CART),
        }
    }
}

/// Payload of a `/start` deep link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartParam {
    /// Customer returned from the payment page
    PaymentSuccess,
    /// Invite to a product's group order
    Product(ProductId),
}

impl StartParam {
    /// Accepts `payment_success` and `product_<id>`, plus `product-<id>` and
    /// `product,<id>` from older links. Telegram only delivers payloads made of
    /// `[A-Za-z0-9_-]`.
    pub fn parse(payload: &str) -> Option<Self> {
        let payload = payload.trim();
        if payload == "payment_success" {
            return Some(StartParam::PaymentSuccess);
        }
        let id = payload.strip_prefix("product")?;
        let id = id.strip_prefix(|c: char| matches!(c, ',' | '_' | '-'))?;
        id.trim().parse().ok().map(StartParam::Product)
    }
}
