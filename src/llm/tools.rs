//! Tools declared to the model and the typed invocations parsed from its calls.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ToolCall;
use crate::catalog::ProductId;
use crate::errors::ToolArgumentError;

pub const GENERATE_INVOICE: &str = "generate_invoice";
pub const SHOW_PRODUCTS: &str = "show_products";

/// A function tool in the completion service's wire format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// `generate_invoice(name, amount, items[{name, price, quantity}], phoneNumber, groupOrder?)`
pub fn invoice_tool() -> ToolDefinition {
    ToolDefinition {
        kind: "function",
        function: FunctionDefinition {
            name: GENERATE_INVOICE,
            description: "Generate a payment invoice once the customer has confirmed their order, name and phone number",
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Name of the customer" },
                    "amount": { "type": "number", "description": "Total amount in rupiah" },
                    "items": {
                        "type": "array",
                        "description": "Ordered items",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": { "type": "string", "description": "Product name as listed in the catalog" },
                                "price": { "type": "number", "description": "Unit price in rupiah" },
                                "quantity": { "type": "number", "description": "Quantity" }
                            },
                            "required": ["name", "price", "quantity"]
                        }
                    },
                    "phoneNumber": { "type": "string", "description": "Phone number of the customer" },
                    "groupOrder": { "type": "boolean", "description": "True when the customer buys through the group order" }
                },
                "required": ["name", "amount", "items", "phoneNumber"]
            }),
        },
    }
}

/// `show_products(message, productIds?)`: present a product-selection menu
pub fn product_menu_tool() -> ToolDefinition {
    ToolDefinition {
        kind: "function",
        function: FunctionDefinition {
            name: SHOW_PRODUCTS,
            description: "Prompt the customer to select products when they want to see what is available",
            parameters: json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string", "description": "Friendly message to the customer with a short explanation" },
                    "productIds": {
                        "type": "array",
                        "description": "Catalog ids of the products to offer; all products when omitted",
                        "items": { "type": "integer" }
                    }
                },
                "required": ["message"]
            }),
        },
    }
}

/// Raw `generate_invoice` arguments as the model sent them
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceArgs {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub items: Vec<InvoiceItemArgs>,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub group_order: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceItemArgs {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default = "one")]
    pub quantity: f64,
}

fn one() -> f64 {
    1.0
}

/// Validated invoice request ready for pricing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceOrder {
    pub customer_name: String,
    pub phone_number: String,
    /// Total the model computed
    pub amount: u64,
    pub items: Vec<OrderItem>,
    pub group_order: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub name: String,
    pub price: u64,
    pub quantity: u32,
}

impl InvoiceArgs {
    pub fn validate(self) -> Result<InvoiceOrder, ToolArgumentError> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ToolArgumentError::NonPositiveAmount);
        }
        if self.items.is_empty() {
            return Err(ToolArgumentError::NoItems);
        }
        let phone_number = self.phone_number.trim();
        if phone_number.is_empty() {
            return Err(ToolArgumentError::MissingPhoneNumber);
        }
        let customer_name = self.name.trim();
        if customer_name.is_empty() {
            return Err(ToolArgumentError::MissingCustomerName);
        }

        let items = self
            .items
            .into_iter()
            .map(InvoiceItemArgs::validate)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(InvoiceOrder {
            customer_name: customer_name.to_string(),
            phone_number: phone_number.to_string(),
            amount: self.amount.round() as u64,
            items,
            group_order: self.group_order,
        })
    }
}

impl InvoiceItemArgs {
    fn validate(self) -> Result<OrderItem, ToolArgumentError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ToolArgumentError::InvalidItem {
                name,
                reason: "missing name",
            });
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(ToolArgumentError::InvalidItem {
                name,
                reason: "price must be positive",
            });
        }
        if !self.quantity.is_finite() || self.quantity < 1.0 || self.quantity.fract() != 0.0 {
            return Err(ToolArgumentError::InvalidItem {
                name,
                reason: "quantity must be a whole number of at least one",
            });
        }
        Ok(OrderItem {
            name,
            price: self.price.round() as u64,
            quantity: self.quantity as u32,
        })
    }
}

/// `show_products` arguments
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuArgs {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub product_ids: Vec<ProductId>,
}

/// Every tool the bot can execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    GenerateInvoice(InvoiceOrder),
    ShowProducts(MenuArgs),
}

impl ToolInvocation {
    /// Parse and validate a raw tool call
    pub fn parse(call: &ToolCall) -> Result<Self, ToolArgumentError> {
        let arguments = match call.arguments.trim() {
            "" => "{}",
            raw => raw,
        };
        match call.name.as_str() {
            GENERATE_INVOICE => {
                let args: InvoiceArgs = serde_json::from_str(arguments)?;
                Ok(ToolInvocation::GenerateInvoice(args.validate()?))
            }
            SHOW_PRODUCTS => Ok(ToolInvocation::ShowProducts(serde_json::from_str(arguments)?)),
            other => Err(ToolArgumentError::UnknownTool(other.to_string())),
        }
    }
}
