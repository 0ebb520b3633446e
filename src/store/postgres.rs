//! PostgreSQL storage backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use teloxide::types::ChatId;
use tracing::{debug, info};

use super::{CartItem, GroupMember, InvoiceRecord, Store};
use crate::catalog::ProductId;
use crate::errors::StoreError;
use crate::session::{ChatMessage, Role};

/// [`Store`] backed by a PostgreSQL connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database at `database_url`
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        info!("Initializing database schema...");

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chat_messages (
                id BIGSERIAL PRIMARY KEY,
                chat_id BIGINT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_chat_id ON chat_messages (chat_id, id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cart_items (
                chat_id BIGINT NOT NULL,
                product_id BIGINT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity >= 0),
                PRIMARY KEY (chat_id, product_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS invoices (
                invoice_id TEXT PRIMARY KEY,
                external_id TEXT NOT NULL,
                chat_id BIGINT NOT NULL,
                amount BIGINT NOT NULL,
                invoice_url TEXT NOT NULL,
                group_products BIGINT[] NOT NULL DEFAULT '{}',
                paid BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_invoices_external_id ON invoices (external_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS group_order_members (
                seq BIGSERIAL,
                product_id BIGINT NOT NULL,
                chat_id BIGINT NOT NULL,
                paid BOOLEAN NOT NULL DEFAULT FALSE,
                joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (product_id, chat_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        info!("Database schema initialized successfully");
        Ok(())
    }
}

/// Insert messages in order, then prune the chat's history to `keep_last`
async fn insert_messages(
    conn: &mut PgConnection,
    chat_id: ChatId,
    messages: &[ChatMessage],
    keep_last: Option<usize>,
) -> Result<(), StoreError> {
    for message in messages {
        sqlx::query("INSERT INTO chat_messages (chat_id, role, content) VALUES ($1, $2, $3)")
            .bind(chat_id.0)
            .bind(message.role.as_str())
            .bind(&message.content)
            .execute(&mut *conn)
            .await?;
    }

    if let Some(limit) = keep_last {
        let pruned = sqlx::query(
            "DELETE FROM chat_messages
             WHERE chat_id = $1 AND id NOT IN (
                 SELECT id FROM chat_messages WHERE chat_id = $1 ORDER BY id DESC LIMIT $2
             )",
        )
        .bind(chat_id.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .execute(&mut *conn)
        .await?
        .rows_affected();
        if pruned > 0 {
            debug!(chat_id = %chat_id, pruned, "Pruned old chat messages");
        }
    }
    Ok(())
}

fn product_id_from(value: i64) -> Result<ProductId, StoreError> {
    ProductId::try_from(value)
        .map_err(|_| StoreError::Corrupt(format!("product id out of range: {value}")))
}

fn invoice_from_row(row: &PgRow) -> Result<InvoiceRecord, StoreError> {
    let amount: i64 = row.try_get("amount")?;
    let group_products: Vec<i64> = row.try_get("group_products")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(InvoiceRecord {
        invoice_id: row.try_get("invoice_id")?,
        external_id: row.try_get("external_id")?,
        chat_id: ChatId(row.try_get("chat_id")?),
        amount: u64::try_from(amount)
            .map_err(|_| StoreError::Corrupt(format!("negative invoice amount: {amount}")))?,
        invoice_url: row.try_get("invoice_url")?,
        group_products: group_products
            .into_iter()
            .map(product_id_from)
            .collect::<Result<_, _>>()?,
        paid: row.try_get("paid")?,
        created_at,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn load_history(&self, chat_id: ChatId) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT role, content FROM chat_messages WHERE chat_id = $1 ORDER BY id",
        )
        .bind(chat_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(role, content)| {
                let role = Role::parse(&role)
                    .ok_or_else(|| StoreError::Corrupt(format!("unknown message role: {role}")))?;
                Ok(ChatMessage { role, content })
            })
            .collect()
    }

    async fn append_messages(
        &self,
        chat_id: ChatId,
        messages: &[ChatMessage],
        keep_last: Option<usize>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_messages(&mut *tx, chat_id, messages, keep_last).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn add_cart_item(
        &self,
        chat_id: ChatId,
        product_id: ProductId,
    ) -> Result<u32, StoreError> {
        let quantity: i32 = sqlx::query_scalar(
            "INSERT INTO cart_items (chat_id, product_id, quantity) VALUES ($1, $2, 1)
             ON CONFLICT (chat_id, product_id)
             DO UPDATE SET quantity = cart_items.quantity + 1
             RETURNING quantity",
        )
        .bind(chat_id.0)
        .bind(i64::from(product_id))
        .fetch_one(&self.pool)
        .await?;

        u32::try_from(quantity)
            .map_err(|_| StoreError::Corrupt(format!("negative cart quantity: {quantity}")))
    }

    async fn cart_items(&self, chat_id: ChatId) -> Result<Vec<CartItem>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, i32)>(
            "SELECT product_id, quantity FROM cart_items
             WHERE chat_id = $1 AND quantity > 0 ORDER BY product_id",
        )
        .bind(chat_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(product_id, quantity)| {
                Ok(CartItem {
                    product_id: product_id_from(product_id)?,
                    quantity: u32::try_from(quantity).map_err(|_| {
                        StoreError::Corrupt(format!("negative cart quantity: {quantity}"))
                    })?,
                })
            })
            .collect()
    }

    async fn clear_cart(&self, chat_id: ChatId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cart_items WHERE chat_id = $1")
            .bind(chat_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_invoice(&self, invoice: &InvoiceRecord) -> Result<(), StoreError> {
        let group_products: Vec<i64> = invoice
            .group_products
            .iter()
            .map(|id| i64::from(*id))
            .collect();

        sqlx::query(
            "INSERT INTO invoices
                (invoice_id, external_id, chat_id, amount, invoice_url, group_products, paid, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&invoice.invoice_id)
        .bind(&invoice.external_id)
        .bind(invoice.chat_id.0)
        .bind(i64::try_from(invoice.amount).unwrap_or(i64::MAX))
        .bind(&invoice.invoice_url)
        .bind(group_products)
        .bind(invoice.paid)
        .bind(invoice.created_at)
        .execute(&self.pool)
        .await?;

        info!(chat_id = %invoice.chat_id, invoice_id = %invoice.invoice_id, "Invoice recorded");
        Ok(())
    }

    async fn find_invoice(&self, reference: &str) -> Result<Option<InvoiceRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT invoice_id, external_id, chat_id, amount, invoice_url, group_products, paid, created_at
             FROM invoices
             WHERE invoice_id = $1 OR external_id = $1
             ORDER BY (invoice_id = $1) DESC, created_at
             LIMIT 1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(invoice_from_row).transpose()
    }

    async fn confirm_invoice(
        &self,
        invoice_id: &str,
        confirmation: &ChatMessage,
        keep_last: Option<usize>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let chat_id: Option<i64> = sqlx::query_scalar(
            "UPDATE invoices SET paid = TRUE WHERE invoice_id = $1 AND paid = FALSE
             RETURNING chat_id",
        )
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(chat_id) = chat_id else {
            return Ok(false);
        };

        insert_messages(
            &mut *tx,
            ChatId(chat_id),
            std::slice::from_ref(confirmation),
            keep_last,
        )
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn join_group_order(
        &self,
        product_id: ProductId,
        chat_id: ChatId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO group_order_members (product_id, chat_id) VALUES ($1, $2)
             ON CONFLICT (product_id, chat_id) DO NOTHING",
        )
        .bind(i64::from(product_id))
        .bind(chat_id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn group_order_members(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<GroupMember>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, bool)>(
            "SELECT chat_id, paid FROM group_order_members WHERE product_id = $1 ORDER BY seq",
        )
        .bind(i64::from(product_id))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(chat_id, paid)| GroupMember {
                chat_id: ChatId(chat_id),
                paid,
            })
            .collect())
    }

    async fn mark_group_member_paid(
        &self,
        product_id: ProductId,
        chat_id: ChatId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE group_order_members SET paid = TRUE WHERE product_id = $1 AND chat_id = $2",
        )
        .bind(i64::from(product_id))
        .bind(chat_id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
