use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

impl ShippingAddress {
    pub fn is_complete(&self) -> bool {
        [&self.address, &self.city, &self.state, &self.zip_code]
            .iter()
            .all(|field| field.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }
}

/// Customer and putter configuration captured at checkout.
///
/// Fields are optional on the wire so missing values produce validation
/// messages instead of deserialization failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub face_deck: Option<Value>,
    pub weight_system: Option<Value>,
    pub total_price: Option<Decimal>,
}

impl OrderData {
    /// Display name of a selection that may be a plain string or `{ "name": .. }`.
    pub fn selection_name(selection: Option<&Value>) -> String {
        match selection {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Object(map)) => map
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub order_data: Option<OrderData>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentCreated {
    pub client_secret: String,
    pub payment_intent_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub order_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DemoPaymentIntent {
    pub demo_mode: bool,
    pub payment_intent_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum CreatePaymentIntentResponse {
    Live(PaymentIntentCreated),
    Demo(DemoPaymentIntent),
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}
