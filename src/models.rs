use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Paid,
    PaymentFailed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Paid => "paid",
            OrderStatus::PaymentFailed => "payment_failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "paid" => Ok(OrderStatus::Paid),
            "payment_failed" => Ok(OrderStatus::PaymentFailed),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub stripe_payment_intent_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub order_items: Value,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub product_snapshot: Value,
    pub created_at: DateTime<Utc>,
}

/// Line item captured at order time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub product_snapshot: Value,
}

impl NewOrderItem {
    pub fn total_price(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Everything needed to create an order row. `id` is chosen by the caller so
/// the same id can be threaded through payment metadata and emails.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub stripe_payment_intent_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub order_items: Value,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    pub metadata: Value,
    pub items: Vec<NewOrderItem>,
}

/// Result of the insert-or-get operation keyed on the payment intent id.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub order: Order,
    pub created: bool,
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub customer_email: Option<String>,
    pub order_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    OrderConfirmation,
}

impl EmailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailType::OrderConfirmation => "order_confirmation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Sent,
    Failed,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Sent => "sent",
            EmailStatus::Failed => "failed",
        }
    }
}

impl FromStr for EmailStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(EmailStatus::Sent),
            "failed" => Ok(EmailStatus::Failed),
            other => Err(format!("unknown email status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailLog {
    pub id: Uuid,
    pub order_id: String,
    pub email_type: EmailType,
    pub recipient_email: String,
    pub subject: String,
    pub status: EmailStatus,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEmailLog {
    pub order_id: String,
    pub email_type: EmailType,
    pub recipient_email: String,
    pub subject: String,
    pub status: EmailStatus,
    pub error: Option<String>,
}
