//! # Frosala Order Bot
//!
//! A Telegram bot that takes seafood orders through an LLM conversation,
//! collects payment with hosted invoices and runs group orders with a
//! member quota and discount.

pub mod app;
pub mod bot;
pub mod cart;
pub mod catalog;
pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod group_order;
pub mod llm;
pub mod localization;
pub mod orchestrator;
pub mod payment;
pub mod prompt;
pub mod session;
pub mod store;
