//! UI Builder module for creating keyboards and formatting messages

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::warn;

use super::callback_data::CallbackCommand;
use crate::cart::{CartLine, CartSummary};
use crate::catalog::format_rupiah;
use crate::localization::{t_args_lang, t_lang};
use crate::orchestrator::{PaymentAction, Reply, SelectionMenu};

/// One button per product, each adding the product to the cart
pub fn create_menu_keyboard(menu: &SelectionMenu) -> InlineKeyboardMarkup {
    let rows = menu.entries.iter().map(|entry| {
        vec![InlineKeyboardButton::callback(
            entry.label.clone(),
            CallbackCommand::Select(entry.product_id).to_string(),
        )]
    });
    InlineKeyboardMarkup::new(rows)
}

pub fn create_view_cart_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[InlineKeyboardButton::callback(
        t_lang("view-cart-button", language_code),
        CallbackCommand::ViewCart.to_string(),
    )]])
}

/// URL button opening the hosted invoice. `None` if the gateway sent an invalid URL.
pub fn create_payment_keyboard(
    payment: &PaymentAction,
    language_code: Option<&str>,
) -> Option<InlineKeyboardMarkup> {
    match payment.url.parse::<reqwest::Url>() {
        Ok(url) => Some(InlineKeyboardMarkup::new([[InlineKeyboardButton::url(
            t_lang("invoice-button", language_code),
            url,
        )]])),
        Err(e) => {
            warn!(invoice_id = %payment.invoice_id, error = %e, "Invoice URL is not a valid URL");
            None
        }
    }
}

/// Keyboard attached to a reply: the selection menu, else the payment button
pub fn reply_keyboard(reply: &Reply, language_code: Option<&str>) -> Option<InlineKeyboardMarkup> {
    if let Some(menu) = reply.menu.as_ref().filter(|menu| !menu.entries.is_empty()) {
        return Some(create_menu_keyboard(menu));
    }
    reply
        .payment
        .as_ref()
        .and_then(|payment| create_payment_keyboard(payment, language_code))
}

/// Cart contents grouped by product, with line totals and the grand total
pub fn format_cart_summary(summary: &CartSummary, language_code: Option<&str>) -> String {
    if summary.is_empty() {
        return t_lang("cart-empty", language_code);
    }

    let mut result = t_lang("cart-title", language_code);
    for line in &summary.lines {
        result.push('\n');
        result.push_str(&format_cart_line(line, language_code));
    }
    result.push('\n');
    result.push_str(&t_args_lang(
        "cart-total",
        &[("total", &format_rupiah(summary.total))],
        language_code,
    ));
    result
}

fn format_cart_line(line: &CartLine, language_code: Option<&str>) -> String {
    t_args_lang(
        "cart-line",
        &[
            ("product", &line.product.name),
            ("price", &format_rupiah(line.product.price)),
            ("quantity", &line.quantity.to_string()),
            ("total", &format_rupiah(line.line_total())),
        ],
        language_code,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Product;
    use crate::orchestrator::MenuEntry;
    use teloxide::types::InlineKeyboardButtonKind;

    fn line(id: u32, price: u64, quantity: u32) -> CartLine {
        CartLine {
            product: Product {
                id,
                name: format!("Produk {id}"),
                price,
            },
            quantity,
        }
    }

    #[test]
    fn test_menu_keyboard_uses_select_tokens() {
        let menu = SelectionMenu {
            entries: vec![MenuEntry {
                product_id: 7,
                label: "UDANG PUD 500gr".to_string(),
            }],
        };
        let keyboard = create_menu_keyboard(&menu);
        let button = &keyboard.inline_keyboard[0][0];
        assert_eq!(button.text, "UDANG PUD 500gr");
        assert!(matches!(
            &button.kind,
            InlineKeyboardButtonKind::CallbackData(data) if data == "select|7"
        ));
    }

    #[test]
    fn test_payment_keyboard() {
        let payment = PaymentAction {
            invoice_id: "inv-1".to_string(),
            url: "https://checkout.xendit.co/web/inv-1".to_string(),
        };
        let keyboard = create_payment_keyboard(&payment, Some("en")).unwrap();
        assert!(matches!(
            &keyboard.inline_keyboard[0][0].kind,
            InlineKeyboardButtonKind::Url(url) if url.as_str() == "https://checkout.xendit.co/web/inv-1"
        ));

        let invalid = PaymentAction {
            invoice_id: "inv-2".to_string(),
            url: "not a url".to_string(),
        };
        assert!(create_payment_keyboard(&invalid, Some("en")).is_none());
    }

    #[test]
    fn test_cart_summary_formatting() {
        let lines = vec![line(1, 1000, 2), line(3, 3000, 1)];
        let summary = CartSummary {
            total: lines.iter().map(CartLine::line_total).sum(),
            lines,
        };
        let text = format_cart_summary(&summary, Some("en"));
        assert!(text.contains("Produk 1 - Rp 1.000 x 2 = Rp 2.000"));
        assert!(text.contains("Produk 3 - Rp 3.000 x 1 = Rp 3.000"));
        assert!(text.ends_with("Total: Rp 5.000"));
    }

    #[test]
    fn test_empty_cart() {
        assert_eq!(
            format_cart_summary(&CartSummary::default(), Some("en")),
            t_lang("cart-empty", Some("en"))
        );
    }
}
