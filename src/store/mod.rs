//! Persistence seams for orders, email logs and the audit trail.
//!
//! `PgStore` backs production; `MemoryStore` keeps everything in-process and
//! is what the handler tests run against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    EmailLog, EmailType, NewEmailLog, NewOrder, Order, OrderFilter, OrderItem, OrderStatus,
    UpsertOutcome,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Orm(#[from] sea_orm::DbErr),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Order>>;

    async fn find_by_payment_intent(&self, payment_intent_id: &str) -> StoreResult<Option<Order>>;

    /// Most recent order for `email` with exactly `amount`, created at or after `since`.
    async fn find_recent_by_email_and_amount(
        &self,
        email: &str,
        amount: Decimal,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<Order>>;

    /// Inserts the order unless one already exists for its payment intent id,
    /// in which case the existing row is returned untouched.
    async fn insert_or_get(&self, order: NewOrder) -> StoreResult<UpsertOutcome>;

    /// Sets the status (and records the intent id) of the order with `id`.
    async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        payment_intent_id: Option<&str>,
    ) -> StoreResult<Option<Order>>;

    async fn update_status_by_payment_intent(
        &self,
        payment_intent_id: &str,
        status: OrderStatus,
    ) -> StoreResult<Option<Order>>;

    async fn items_for(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>>;

    /// Newest first; returns the page and the total match count.
    async fn list(
        &self,
        filter: &OrderFilter,
        limit: u64,
        offset: u64,
    ) -> StoreResult<(Vec<Order>, u64)>;
}

#[async_trait]
pub trait EmailLogStore: Send + Sync {
    async fn find_sent_for_order(
        &self,
        order_id: &str,
        email_type: EmailType,
    ) -> StoreResult<Option<EmailLog>>;

    async fn find_sent_to_recipient_since(
        &self,
        recipient: &str,
        email_type: EmailType,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<EmailLog>>;

    /// Insert or overwrite the row keyed by `(order_id, email_type)`.
    async fn upsert(&self, entry: NewEmailLog) -> StoreResult<EmailLog>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record(
        &self,
        action: &str,
        resource: Option<&str>,
        metadata: Option<Value>,
    ) -> StoreResult<()>;
}
