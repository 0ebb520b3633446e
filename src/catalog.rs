//! # Catalog Module
//!
//! Static registry of purchasable products and delivery locations. The catalog
//! is loaded once at startup, either from a JSON file or from the built-in
//! Frosala product list, and never mutated afterwards.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::group_order::GroupOrderConfig;

/// Catalog product identifier
pub type ProductId = u32;

/// A purchasable item. Prices are whole rupiah.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: u64,
}

/// Read-only product catalog
#[derive(Debug, Clone)]
pub struct Catalog {
    products: Vec<Product>,
    locations: Vec<String>,
}

impl Catalog {
    /// All products in catalog order
    pub fn list(&self) -> &[Product] {
        &self.products
    }

    pub fn find_by_id(&self, id: ProductId) -> Option<&Product> {
        self.products.iter().find(|product| product.id == id)
    }

    /// Look up a product by name, ignoring case and repeated whitespace.
    ///
    /// The model echoes product names back in tool calls, so this is the
    /// bridge between its free-form items and catalog prices.
    pub fn find_by_name(&self, name: &str) -> Option<&Product> {
        let wanted = normalize_name(name);
        self.products
            .iter()
            .find(|product| normalize_name(&product.name) == wanted)
    }

    /// Delivery locations
    pub fn locations(&self) -> &[String] {
        &self.locations
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// On-disk catalog format, also used for the built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub products: Vec<Product>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub group_orders: Vec<GroupOrderConfig>,
}

impl CatalogFile {
    /// Load a catalog from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// The Frosala frozen seafood catalog
    pub fn frosala() -> Self {
        let products = [
            (1, "DORI GLZ 0%", 1000),
            (2, "DORI GLZ 20%", 2000),
            (3, "DORI GLZ 50-55%", 3000),
            (4, "CUMI TUBE GLZ 40%", 4000),
            (5, "SALMON FILLET", 5000),
            (6, "UDANG HOSO", 6000),
            (7, "UDANG PUD 500gr", 7000),
            (8, "TILAPIA (1kg)", 8000),
            (9, "FIB/CUCUT (1kg)", 9000),
        ]
        .into_iter()
        .map(|(id, name, price)| Product {
            id,
            name: name.to_string(),
            price,
        })
        .collect::<Vec<_>>();

        // 27-10-2024 00:00 Asia/Jakarta
        let closes_at: DateTime<Utc> =
            DateTime::from_timestamp(1_729_962_000, 0).unwrap_or_default();

        let group_orders = products
            .iter()
            .map(|product| GroupOrderConfig {
                product_id: product.id,
                minimum_members: 10,
                discount: 0.4,
                closes_at,
            })
            .collect();

        Self {
            products,
            locations: vec!["Yogyakarta".to_string()],
            group_orders,
        }
    }

    /// Validate and split into the catalog and the group-order configuration
    pub fn into_parts(self) -> Result<(Catalog, Vec<GroupOrderConfig>), ConfigError> {
        let mut ids = HashSet::new();
        for product in &self.products {
            if product.id == 0 {
                return Err(ConfigError::Catalog(format!(
                    "product {:?} must have a positive id",
                    product.name
                )));
            }
            if !ids.insert(product.id) {
                return Err(ConfigError::Catalog(format!(
                    "duplicate product id {}",
                    product.id
                )));
            }
            if product.price == 0 {
                return Err(ConfigError::Catalog(format!(
                    "product {} must have a positive price",
                    product.id
                )));
            }
        }

        let mut configured = HashSet::new();
        for config in &self.group_orders {
            if !ids.contains(&config.product_id) {
                return Err(ConfigError::Catalog(format!(
                    "group order for unknown product {}",
                    config.product_id
                )));
            }
            if !configured.insert(config.product_id) {
                return Err(ConfigError::Catalog(format!(
                    "more than one group order for product {}",
                    config.product_id
                )));
            }
            if config.minimum_members == 0 {
                return Err(ConfigError::Catalog(format!(
                    "group order for product {} needs a positive quota",
                    config.product_id
                )));
            }
            if !(0.0..1.0).contains(&config.discount) {
                return Err(ConfigError::Catalog(format!(
                    "group order discount for product {} must be in [0, 1)",
                    config.product_id
                )));
            }
        }

        let catalog = Catalog {
            products: self.products,
            locations: self.locations,
        };
        Ok((catalog, self.group_orders))
    }
}

/// Format an amount as rupiah with dot thousand separators, e.g. `Rp 12.500`
pub fn format_rupiah(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    format!("Rp {grouped}")
}
