use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    dto::payments::OrderData,
    models::{Order, OrderItem, OrderStatus},
    response::Meta,
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveOrderRequest {
    pub payment_intent_id: Option<String>,
    /// Order id issued with the payment intent, reused as the row id when present.
    pub order_id: Option<Uuid>,
    pub order_data: Option<OrderData>,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    pub total_amount: Option<Decimal>,
    pub currency: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveOrderResponse {
    pub success: bool,
    pub order_id: Uuid,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    /// Milliseconds spent handling the request.
    pub processing_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Customization {
    pub face_deck: Option<String>,
    pub weight_system: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOrderItem {
    pub name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub customization: Option<Customization>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOrderRequest {
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    /// Client-side order reference; may be provisional.
    pub order_id: Option<String>,
    pub total_price: Option<Decimal>,
    pub order_date: Option<String>,
    pub order_items: Option<Vec<ConfirmOrderItem>>,
    pub face_deck: Option<String>,
    pub weight_system: Option<String>,
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub skip_order_creation: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOrderResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_only: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PaymentIntentQuery {
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderCheckResponse {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderProjection {
    pub id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub order_items: Value,
    pub items: Vec<OrderItem>,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    pub payment_intent_id: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderProjection {
    pub fn new(order: Order, items: Vec<OrderItem>) -> Self {
        Self {
            id: order.id,
            customer_name: order.customer_name,
            customer_email: order.customer_email,
            total_amount: order.total_amount,
            currency: order.currency,
            order_items: order.order_items,
            items,
            shipping_address: order.shipping_address,
            billing_address: order.billing_address,
            payment_intent_id: order.stripe_payment_intent_id,
            status: order.status,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderDetailResponse {
    pub success: bool,
    pub order: OrderProjection,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub success: bool,
    pub orders: Vec<Order>,
    pub meta: Meta,
}
