//! # Group-Order Registry
//!
//! A group order pools purchases of one product across several chats. Each
//! product may carry a quota, a discount and a closing deadline. Members join
//! explicitly and pay individually; only paid members count toward
//! fulfillment.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use teloxide::types::ChatId;
use tracing::{debug, info};

use crate::catalog::ProductId;
use crate::errors::{GroupOrderError, StoreError};
use crate::store::{GroupMember, Store};

/// Static group-order terms for one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupOrderConfig {
    pub product_id: ProductId,
    /// Minimum number of members before the order is processed
    pub minimum_members: u32,
    /// Discount fraction in `[0, 1)` applied to group-order purchases
    pub discount: f64,
    pub closes_at: DateTime<Utc>,
}

impl GroupOrderConfig {
    /// The deadline is inclusive: at `closes_at` the order is already closed.
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now >= self.closes_at
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        !self.deadline_passed(now)
    }

    /// Unit price after the group discount, rounded to whole rupiah
    pub fn discounted_price(&self, price: u64) -> u64 {
        (price as f64 * (1.0 - self.discount)).round() as u64
    }

    /// Evaluate the order against its current members
    pub fn evaluate(&self, members: &[GroupMember], now: DateTime<Utc>) -> GroupOrderStatus {
        let member_count = members.len() as u32;
        let paid_count = members.iter().filter(|member| member.paid).count() as u32;
        let quota_met = member_count >= self.minimum_members;
        let deadline_passed = self.deadline_passed(now);
        let ready_to_process =
            paid_count >= self.minimum_members || (deadline_passed && paid_count > 0);

        GroupOrderStatus {
            product_id: self.product_id,
            minimum_members: self.minimum_members,
            member_count,
            paid_count,
            quota_met,
            deadline_passed,
            ready_to_process,
            discount: self.discount,
            closes_at: self.closes_at,
        }
    }
}

/// Point-in-time view of a group order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupOrderStatus {
    pub product_id: ProductId,
    pub minimum_members: u32,
    pub member_count: u32,
    pub paid_count: u32,
    pub quota_met: bool,
    pub deadline_passed: bool,
    /// Enough members have paid, or the deadline passed with at least one paid member
    pub ready_to_process: bool,
    pub discount: f64,
    pub closes_at: DateTime<Utc>,
}

/// Result of a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
}

/// Group-order configuration plus the mutable member sets kept in the store
pub struct GroupOrderRegistry {
    configs: BTreeMap<ProductId, GroupOrderConfig>,
    store: Arc<dyn Store>,
}

impl GroupOrderRegistry {
    pub fn new(configs: Vec<GroupOrderConfig>, store: Arc<dyn Store>) -> Self {
        let configs = configs
            .into_iter()
            .map(|config| (config.product_id, config))
            .collect();
        Self { configs, store }
    }

    pub fn config(&self, product_id: ProductId) -> Option<&GroupOrderConfig> {
        self.configs.get(&product_id)
    }

    /// Add a chat to a product's group order. Joining twice is a no-op.
    pub async fn join(
        &self,
        product_id: ProductId,
        chat_id: ChatId,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, GroupOrderError> {
        let config = self
            .config(product_id)
            .ok_or(GroupOrderError::UnknownProduct(product_id))?;

        let members = self.store.group_order_members(product_id).await?;
        if members.iter().any(|member| member.chat_id == chat_id) {
            debug!(chat_id = %chat_id, product_id, "Chat already in group order");
            return Ok(JoinOutcome::AlreadyMember);
        }
        if config.deadline_passed(now) {
            return Err(GroupOrderError::Closed(product_id));
        }

        if self.store.join_group_order(product_id, chat_id).await? {
            info!(chat_id = %chat_id, product_id, "Chat joined group order");
            Ok(JoinOutcome::Joined)
        } else {
            Ok(JoinOutcome::AlreadyMember)
        }
    }

    /// Record a paid group-order purchase. A chat whose join was never stored
    /// is added first, so replaying the same payment gives the same result.
    ///
    /// Returns the updated status when this chat's payment is what makes the
    /// order ready to process.
    pub async fn mark_paid(
        &self,
        product_id: ProductId,
        chat_id: ChatId,
        now: DateTime<Utc>,
    ) -> Result<Option<GroupOrderStatus>, StoreError> {
        let Some(config) = self.config(product_id) else {
            return Ok(None);
        };
        if self.store.join_group_order(product_id, chat_id).await? {
            info!(chat_id = %chat_id, product_id, "Paying chat added to group order");
        }
        self.store.mark_group_member_paid(product_id, chat_id).await?;

        let members = self.store.group_order_members(product_id).await?;
        let status = config.evaluate(&members, now);
        let others_only: Vec<GroupMember> = members
            .iter()
            .map(|member| GroupMember {
                paid: member.paid && member.chat_id != chat_id,
                ..*member
            })
            .collect();
        let ready_without_this_payment = config.evaluate(&others_only, now).ready_to_process;

        Ok((status.ready_to_process && !ready_without_this_payment).then_some(status))
    }

    pub async fn status(
        &self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<Option<GroupOrderStatus>, StoreError> {
        let Some(config) = self.config(product_id) else {
            return Ok(None);
        };
        let members = self.store.group_order_members(product_id).await?;
        Ok(Some(config.evaluate(&members, now)))
    }

    /// Status of every configured group order, in product id order
    pub async fn snapshot(&self, now: DateTime<Utc>) -> Result<Vec<GroupOrderStatus>, StoreError> {
        let mut statuses = Vec::with_capacity(self.configs.len());
        for config in self.configs.values() {
            let members = self.store.group_order_members(config.product_id).await?;
            statuses.push(config.evaluate(&members, now));
        }
        Ok(statuses)
    }

    /// Products whose group order this chat has joined
    pub async fn memberships(&self, chat_id: ChatId) -> Result<Vec<ProductId>, StoreError> {
        let mut joined = Vec::new();
        for product_id in self.configs.keys() {
            let members = self.store.group_order_members(*product_id).await?;
            if members.iter().any(|member| member.chat_id == chat_id) {
                joined.push(*product_id);
            }
        }
        Ok(joined)
    }
}
