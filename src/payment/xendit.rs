//! Xendit hosted-invoice client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{CreatedInvoice, InvoiceRequest, PaymentGateway};
use crate::config::XenditConfig;
use crate::errors::GatewayError;

#[derive(Serialize)]
struct CreateInvoiceBody<'a> {
    external_id: &'a str,
    amount: u64,
    currency: &'static str,
    items: Vec<InvoiceItem<'a>>,
    success_redirect_url: String,
    customer: Customer<'a>,
}

#[derive(Serialize)]
struct InvoiceItem<'a> {
    name: &'a str,
    quantity: u32,
    price: u64,
}

#[derive(Serialize)]
struct Customer<'a> {
    given_names: &'a str,
    mobile_number: &'a str,
}

#[derive(Deserialize)]
struct CreateInvoiceResponse {
    id: String,
    invoice_url: String,
}

/// `POST {base_url}/v2/invoices`, authenticated with the secret key
#[derive(Clone)]
pub struct XenditClient {
    http: Client,
    base_url: String,
    secret_key: String,
    bot_username: String,
}

impl XenditClient {
    pub fn new(http: Client, config: &XenditConfig, bot_username: &str) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            bot_username: bot_username.to_string(),
        }
    }

    /// Where the gateway sends the customer after paying
    pub fn success_redirect_url(&self) -> String {
        format!("https://t.me/{}?start=payment_success", self.bot_username)
    }
}

#[async_trait]
impl PaymentGateway for XenditClient {
    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<CreatedInvoice, GatewayError> {
        let body = CreateInvoiceBody {
            external_id: &request.external_id,
            amount: request.amount,
            currency: "IDR",
            items: request
                .items
                .iter()
                .map(|item| InvoiceItem {
                    name: &item.name,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
            success_redirect_url: self.success_redirect_url(),
            customer: Customer {
                given_names: &request.customer_name,
                mobile_number: &request.phone_number,
            },
        };

        let response = self
            .http
            .post(format!("{}/v2/invoices", self.base_url))
            .basic_auth(&self.secret_key, None::<&str>)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                chat_id = %request.chat_id,
                status = status.as_u16(),
                "Xendit rejected invoice"
            );
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreateInvoiceResponse = response.json().await?;
        info!(
            chat_id = %request.chat_id,
            invoice_id = %created.id,
            amount = request.amount,
            "Xendit invoice created"
        );
        Ok(CreatedInvoice {
            invoice_id: created.id,
            invoice_url: created.invoice_url,
        })
    }
}
