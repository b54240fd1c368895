use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    models::{
        EmailLog, EmailStatus, EmailType, NewEmailLog, NewOrder, Order, OrderFilter, OrderItem,
        OrderStatus, UpsertOutcome,
    },
    store::{AuditStore, EmailLogStore, OrderStore, StoreError, StoreResult},
};

/// Recorded audit event, kept for inspection.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: String,
    pub resource: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    orders: HashMap<Uuid, Order>,
    items: Vec<OrderItem>,
    email_logs: HashMap<(String, EmailType), EmailLog>,
    audit: Vec<AuditEntry>,
}

/// In-process store with the same uniqueness rules as the Postgres schema:
/// one order per payment intent id and one email log per order and type.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn order_count(&self) -> usize {
        self.tables().orders.len()
    }

    pub fn email_logs(&self) -> Vec<EmailLog> {
        self.tables().email_logs.values().cloned().collect()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.tables().audit.clone()
    }

    /// Moves every timestamp on the order and on email logs sent to its
    /// customer back by `by`, so time-window rules can be exercised.
    pub fn backdate(&self, order_id: Uuid, by: Duration) {
        let mut tables = self.tables();
        let Some(order) = tables.orders.get_mut(&order_id) else {
            return;
        };
        order.created_at -= by;
        order.updated_at -= by;
        let email = order.customer_email.clone();

        for log in tables
            .email_logs
            .values_mut()
            .filter(|log| log.recipient_email == email)
        {
            log.created_at -= by;
            log.sent_at = log.sent_at.map(|at| at - by);
        }
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.tables().orders.get(&id).cloned())
    }

    async fn find_by_payment_intent(&self, payment_intent_id: &str) -> StoreResult<Option<Order>> {
        Ok(self
            .tables()
            .orders
            .values()
            .find(|o| o.stripe_payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn find_recent_by_email_and_amount(
        &self,
        email: &str,
        amount: Decimal,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<Order>> {
        Ok(self
            .tables()
            .orders
            .values()
            .filter(|o| o.customer_email == email && o.total_amount == amount)
            .filter(|o| o.created_at >= since)
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn insert_or_get(&self, order: NewOrder) -> StoreResult<UpsertOutcome> {
        let mut tables = self.tables();

        if let Some(pi) = order.stripe_payment_intent_id.as_deref()
            && let Some(existing) = tables
                .orders
                .values()
                .find(|o| o.stripe_payment_intent_id.as_deref() == Some(pi))
        {
            return Ok(UpsertOutcome {
                order: existing.clone(),
                created: false,
            });
        }

        if tables.orders.contains_key(&order.id) {
            return Err(StoreError::Corrupt(format!(
                "duplicate order id {}",
                order.id
            )));
        }

        let now = Utc::now();
        let row = Order {
            id: order.id,
            stripe_payment_intent_id: order.stripe_payment_intent_id,
            customer_name: order.customer_name,
            customer_email: order.customer_email,
            total_amount: order.total_amount,
            currency: order.currency,
            status: order.status,
            order_items: order.order_items,
            shipping_address: order.shipping_address,
            billing_address: order.billing_address,
            metadata: order.metadata,
            created_at: now,
            updated_at: now,
        };

        for item in order.items {
            let total_price = item.total_price();
            tables.items.push(OrderItem {
                id: Uuid::new_v4(),
                order_id: row.id,
                product_name: item.product_name,
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price,
                product_snapshot: item.product_snapshot,
                created_at: now,
            });
        }
        tables.orders.insert(row.id, row.clone());

        Ok(UpsertOutcome {
            order: row,
            created: true,
        })
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        payment_intent_id: Option<&str>,
    ) -> StoreResult<Option<Order>> {
        let mut tables = self.tables();
        let Some(order) = tables.orders.get_mut(&id) else {
            return Ok(None);
        };
        order.status = status;
        if order.stripe_payment_intent_id.is_none() {
            order.stripe_payment_intent_id = payment_intent_id.map(str::to_string);
        }
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn update_status_by_payment_intent(
        &self,
        payment_intent_id: &str,
        status: OrderStatus,
    ) -> StoreResult<Option<Order>> {
        let mut tables = self.tables();
        let Some(order) = tables
            .orders
            .values_mut()
            .find(|o| o.stripe_payment_intent_id.as_deref() == Some(payment_intent_id))
        else {
            return Ok(None);
        };
        order.status = status;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn items_for(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
        Ok(self
            .tables()
            .items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn list(
        &self,
        filter: &OrderFilter,
        limit: u64,
        offset: u64,
    ) -> StoreResult<(Vec<Order>, u64)> {
        let tables = self.tables();
        let mut matching: Vec<&Order> = tables
            .orders
            .values()
            .filter(|o| {
                filter
                    .customer_email
                    .as_ref()
                    .is_none_or(|email| &o.customer_email == email)
            })
            .filter(|o| filter.order_id.is_none_or(|id| o.id == id))
            .filter(|o| filter.status.is_none_or(|status| o.status == status))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl EmailLogStore for MemoryStore {
    async fn find_sent_for_order(
        &self,
        order_id: &str,
        email_type: EmailType,
    ) -> StoreResult<Option<EmailLog>> {
        Ok(self
            .tables()
            .email_logs
            .get(&(order_id.to_string(), email_type))
            .filter(|log| log.status == EmailStatus::Sent)
            .cloned())
    }

    async fn find_sent_to_recipient_since(
        &self,
        recipient: &str,
        email_type: EmailType,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<EmailLog>> {
        Ok(self
            .tables()
            .email_logs
            .values()
            .filter(|log| log.recipient_email == recipient && log.email_type == email_type)
            .filter(|log| log.status == EmailStatus::Sent)
            .filter(|log| log.sent_at.is_some_and(|at| at >= since))
            .max_by_key(|log| log.sent_at)
            .cloned())
    }

    async fn upsert(&self, entry: NewEmailLog) -> StoreResult<EmailLog> {
        let now = Utc::now();
        let mut tables = self.tables();
        let key = (entry.order_id.clone(), entry.email_type);
        let (id, created_at) = tables
            .email_logs
            .get(&key)
            .map(|existing| (existing.id, existing.created_at))
            .unwrap_or_else(|| (Uuid::new_v4(), now));

        let log = EmailLog {
            id,
            order_id: entry.order_id,
            email_type: entry.email_type,
            recipient_email: entry.recipient_email,
            subject: entry.subject,
            sent_at: (entry.status == EmailStatus::Sent).then_some(now),
            status: entry.status,
            error: entry.error,
            created_at,
        };
        tables.email_logs.insert(key, log.clone());
        Ok(log)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn record(
        &self,
        action: &str,
        resource: Option<&str>,
        metadata: Option<Value>,
    ) -> StoreResult<()> {
        self.tables().audit.push(AuditEntry {
            action: action.to_string(),
            resource: resource.map(str::to_string),
            metadata,
            created_at: Utc::now(),
        });
        Ok(())
    }
}
