//! # Error Types Module
//!
//! Error types used throughout the order bot. Every error is scoped to the
//! single event (chat message, callback or payment notification) that raised
//! it; none of them is fatal to the process once it is running.

use std::time::Duration;

use thiserror::Error;

use crate::catalog::ProductId;

/// Message delivery failure on the chat transport. Logged and dropped.
pub type TransportError = teloxide::RequestError;

/// Storage backend errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database query or connection failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A stored row could not be mapped back into a domain value
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Failures of the LLM completion service
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request timed out after {0:?}")]
    Timeout(Duration),
    #[error("completion service unavailable: circuit breaker open")]
    CircuitOpen,
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion response contained no usable content")]
    Empty,
}

/// Malformed or missing arguments in a tool call requested by the model
#[derive(Debug, Error)]
pub enum ToolArgumentError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("malformed tool arguments: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invoice amount must be positive")]
    NonPositiveAmount,
    #[error("invoice has no line items")]
    NoItems,
    #[error("customer phone number is missing")]
    MissingPhoneNumber,
    #[error("customer name is missing")]
    MissingCustomerName,
    #[error("invalid line item {name:?}: {reason}")]
    InvalidItem { name: String, reason: &'static str },
}

/// Invoice creation failures reported by the payment gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("payment gateway rejected the invoice (status {status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Errors of the payment adapter: either the gateway failed (nothing was
/// recorded) or the ledger write after a successful gateway call failed.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("failed to record invoice: {0}")]
    Store(#[from] StoreError),
}

/// Group-order membership errors
#[derive(Debug, Error)]
pub enum GroupOrderError {
    #[error("product {0} has no group order")]
    UnknownProduct(ProductId),
    #[error("group order for product {0} is closed")]
    Closed(ProductId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything that can go wrong while processing one conversation turn
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Startup configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("invalid catalog: {0}")]
    Catalog(String),
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_formatting() {
        assert_eq!(
            ToolArgumentError::NonPositiveAmount.to_string(),
            "invoice amount must be positive"
        );
        assert_eq!(
            GatewayError::Rejected {
                status: 400,
                body: "bad".to_string()
            }
            .to_string(),
            "payment gateway rejected the invoice (status 400): bad"
        );
        assert_eq!(
            ConfigError::Missing("TELEGRAM_BOT_TOKEN").to_string(),
            "TELEGRAM_BOT_TOKEN must be set"
        );
    }

    #[test]
    fn test_turn_error_is_transparent() {
        let err = TurnError::from(CompletionError::CircuitOpen);
        assert_eq!(
            err.to_string(),
            "completion service unavailable: circuit breaker open"
        );
    }
}
