use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlxPostgresConnector, TransactionTrait,
    sea_query::OnConflict,
};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    entity::{
        email_logs::{
            ActiveModel as EmailLogActive, Column as EmailLogCol, Entity as EmailLogs,
            Model as EmailLogModel,
        },
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
    },
    models::{
        EmailLog, EmailStatus, EmailType, NewEmailLog, NewOrder, Order, OrderFilter, OrderItem,
        OrderStatus, UpsertOutcome,
    },
    store::{AuditStore, EmailLogStore, OrderStore, StoreError, StoreResult},
};

/// Postgres-backed store: sea-orm for order and email queries, raw sqlx for
/// the audit trail. Both share one connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    orm: DatabaseConnection,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        let orm = SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone());
        Self { pool, orm }
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Orders::find_by_id(id)
            .one(&self.orm)
            .await?
            .map(order_from_entity)
            .transpose()
    }

    async fn find_by_payment_intent(&self, payment_intent_id: &str) -> StoreResult<Option<Order>> {
        Orders::find()
            .filter(OrderCol::StripePaymentIntentId.eq(payment_intent_id))
            .one(&self.orm)
            .await?
            .map(order_from_entity)
            .transpose()
    }

    async fn find_recent_by_email_and_amount(
        &self,
        email: &str,
        amount: Decimal,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<Order>> {
        Orders::find()
            .filter(
                Condition::all()
                    .add(OrderCol::CustomerEmail.eq(email))
                    .add(OrderCol::TotalAmount.eq(amount))
                    .add(OrderCol::CreatedAt.gte(since)),
            )
            .order_by_desc(OrderCol::CreatedAt)
            .one(&self.orm)
            .await?
            .map(order_from_entity)
            .transpose()
    }

    async fn insert_or_get(&self, order: NewOrder) -> StoreResult<UpsertOutcome> {
        let txn = self.orm.begin().await?;
        let now = Utc::now();

        let active = OrderActive {
            id: Set(order.id),
            stripe_payment_intent_id: Set(order.stripe_payment_intent_id.clone()),
            customer_email: Set(order.customer_email.clone()),
            customer_name: Set(order.customer_name.clone()),
            total_amount: Set(order.total_amount),
            currency: Set(order.currency.clone()),
            status: Set(order.status.as_str().to_string()),
            order_items: Set(order.order_items.clone()),
            shipping_address: Set(order.shipping_address.clone()),
            billing_address: Set(order.billing_address.clone()),
            metadata: Set(order.metadata.clone()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let inserted = Orders::insert(active)
            .on_conflict(
                OnConflict::column(OrderCol::StripePaymentIntentId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        if inserted == 0 {
            txn.rollback().await?;
            let payment_intent_id = order.stripe_payment_intent_id.as_deref().ok_or_else(|| {
                StoreError::Corrupt(format!("order {} was not inserted", order.id))
            })?;
            let existing = self
                .find_by_payment_intent(payment_intent_id)
                .await?
                .ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "conflicting order for {payment_intent_id} disappeared"
                    ))
                })?;
            return Ok(UpsertOutcome {
                order: existing,
                created: false,
            });
        }

        for item in &order.items {
            OrderItemActive {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_name: Set(item.product_name.clone()),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                total_price: Set(item.total_price()),
                product_snapshot: Set(item.product_snapshot.clone()),
                created_at: Set(now.into()),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;

        let created = self
            .find_by_id(order.id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("order {} missing after insert", order.id)))?;
        Ok(UpsertOutcome {
            order: created,
            created: true,
        })
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        payment_intent_id: Option<&str>,
    ) -> StoreResult<Option<Order>> {
        let Some(model) = Orders::find_by_id(id).one(&self.orm).await? else {
            return Ok(None);
        };

        let record_intent = model.stripe_payment_intent_id.is_none();
        let mut active: OrderActive = model.into();
        active.status = Set(status.as_str().to_string());
        if let Some(pi) = payment_intent_id.filter(|_| record_intent) {
            active.stripe_payment_intent_id = Set(Some(pi.to_string()));
        }
        active.updated_at = Set(Utc::now().into());

        let model = active.update(&self.orm).await?;
        order_from_entity(model).map(Some)
    }

    async fn update_status_by_payment_intent(
        &self,
        payment_intent_id: &str,
        status: OrderStatus,
    ) -> StoreResult<Option<Order>> {
        let Some(model) = Orders::find()
            .filter(OrderCol::StripePaymentIntentId.eq(payment_intent_id))
            .one(&self.orm)
            .await?
        else {
            return Ok(None);
        };

        let mut active: OrderActive = model.into();
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Utc::now().into());
        let model = active.update(&self.orm).await?;
        order_from_entity(model).map(Some)
    }

    async fn items_for(&self, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
        let items = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(order_id))
            .order_by_asc(OrderItemCol::CreatedAt)
            .all(&self.orm)
            .await?
            .into_iter()
            .map(order_item_from_entity)
            .collect();
        Ok(items)
    }

    async fn list(
        &self,
        filter: &OrderFilter,
        limit: u64,
        offset: u64,
    ) -> StoreResult<(Vec<Order>, u64)> {
        let mut condition = Condition::all();
        if let Some(email) = filter.customer_email.as_ref() {
            condition = condition.add(OrderCol::CustomerEmail.eq(email.clone()));
        }
        if let Some(id) = filter.order_id {
            condition = condition.add(OrderCol::Id.eq(id));
        }
        if let Some(status) = filter.status {
            condition = condition.add(OrderCol::Status.eq(status.as_str()));
        }

        let finder = Orders::find()
            .filter(condition)
            .order_by_desc(OrderCol::CreatedAt);
        let total = finder.clone().count(&self.orm).await?;

        let orders = finder
            .limit(limit)
            .offset(offset)
            .all(&self.orm)
            .await?
            .into_iter()
            .map(order_from_entity)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok((orders, total))
    }
}

#[async_trait]
impl EmailLogStore for PgStore {
    async fn find_sent_for_order(
        &self,
        order_id: &str,
        email_type: EmailType,
    ) -> StoreResult<Option<EmailLog>> {
        EmailLogs::find()
            .filter(
                Condition::all()
                    .add(EmailLogCol::OrderId.eq(order_id))
                    .add(EmailLogCol::EmailType.eq(email_type.as_str()))
                    .add(EmailLogCol::Status.eq(EmailStatus::Sent.as_str())),
            )
            .order_by_desc(EmailLogCol::SentAt)
            .one(&self.orm)
            .await?
            .map(email_log_from_entity)
            .transpose()
    }

    async fn find_sent_to_recipient_since(
        &self,
        recipient: &str,
        email_type: EmailType,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<EmailLog>> {
        EmailLogs::find()
            .filter(
                Condition::all()
                    .add(EmailLogCol::RecipientEmail.eq(recipient))
                    .add(EmailLogCol::EmailType.eq(email_type.as_str()))
                    .add(EmailLogCol::Status.eq(EmailStatus::Sent.as_str()))
                    .add(EmailLogCol::SentAt.gte(since)),
            )
            .order_by_desc(EmailLogCol::SentAt)
            .one(&self.orm)
            .await?
            .map(email_log_from_entity)
            .transpose()
    }

    async fn upsert(&self, entry: NewEmailLog) -> StoreResult<EmailLog> {
        let now = Utc::now();
        let sent_at = (entry.status == EmailStatus::Sent).then(|| now.into());

        let active = EmailLogActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(entry.order_id.clone()),
            email_type: Set(entry.email_type.as_str().to_string()),
            recipient_email: Set(entry.recipient_email.clone()),
            subject: Set(entry.subject.clone()),
            status: Set(entry.status.as_str().to_string()),
            error: Set(entry.error.clone()),
            sent_at: Set(sent_at),
            created_at: Set(now.into()),
        };

        EmailLogs::insert(active)
            .on_conflict(
                OnConflict::columns([EmailLogCol::OrderId, EmailLogCol::EmailType])
                    .update_columns([
                        EmailLogCol::RecipientEmail,
                        EmailLogCol::Subject,
                        EmailLogCol::Status,
                        EmailLogCol::Error,
                        EmailLogCol::SentAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.orm)
            .await?;

        let row = EmailLogs::find()
            .filter(
                Condition::all()
                    .add(EmailLogCol::OrderId.eq(entry.order_id.as_str()))
                    .add(EmailLogCol::EmailType.eq(entry.email_type.as_str())),
            )
            .one(&self.orm)
            .await?
            .ok_or_else(|| {
                StoreError::Corrupt(format!("email log for {} missing after upsert", entry.order_id))
            })?;
        email_log_from_entity(row)
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn record(
        &self,
        action: &str,
        resource: Option<&str>,
        metadata: Option<Value>,
    ) -> StoreResult<()> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, action, resource, metadata)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(action)
        .bind(resource)
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn order_from_entity(model: OrderModel) -> StoreResult<Order> {
    let status = model
        .status
        .parse::<OrderStatus>()
        .map_err(StoreError::Corrupt)?;
    Ok(Order {
        id: model.id,
        stripe_payment_intent_id: model.stripe_payment_intent_id,
        customer_name: model.customer_name,
        customer_email: model.customer_email,
        total_amount: model.total_amount,
        currency: model.currency,
        status,
        order_items: model.order_items,
        shipping_address: model.shipping_address,
        billing_address: model.billing_address,
        metadata: model.metadata,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_name: model.product_name,
        quantity: model.quantity,
        unit_price: model.unit_price,
        total_price: model.total_price,
        product_snapshot: model.product_snapshot,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn email_log_from_entity(model: EmailLogModel) -> StoreResult<EmailLog> {
    let email_type = match model.email_type.as_str() {
        "order_confirmation" => EmailType::OrderConfirmation,
        other => return Err(StoreError::Corrupt(format!("unknown email type: {other}"))),
    };
    Ok(EmailLog {
        id: model.id,
        order_id: model.order_id,
        email_type,
        recipient_email: model.recipient_email,
        subject: model.subject,
        status: model.status.parse().map_err(StoreError::Corrupt)?,
        error: model.error,
        sent_at: model.sent_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
    })
}
