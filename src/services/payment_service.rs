use std::collections::BTreeMap;

use axum::{body::Bytes, http::HeaderMap};
use serde_json::json;
use uuid::Uuid;

use crate::{
    dto::payments::{
        CreatePaymentIntentRequest, CreatePaymentIntentResponse, DemoPaymentIntent, OrderData,
        PaymentIntentCreated,
    },
    error::{AppError, AppResult},
    payments::CreateIntent,
    security::{
        client_identifier, is_connection_secure, request_id, sanitize_for_logging,
        validate_request_headers,
    },
    state::AppState,
    validation::{to_minor_units, validate_currency, validate_payment_request},
};

/// Runs transport, header and rate-limit checks, validates the payload, then
/// creates the provider intent (or a demo stand-in when no key is configured).
pub async fn create_payment_intent(
    state: &AppState,
    headers: &HeaderMap,
    body: Bytes,
) -> AppResult<CreatePaymentIntentResponse> {
    let request_id = request_id(headers);
    let security = &state.config.security;

    if !is_connection_secure(headers, security) {
        tracing::warn!(request_id = %request_id, "insecure connection attempt");
        return Err(AppError::validation("Secure connection required"));
    }

    if let Err(errors) = validate_request_headers(headers, security, state.config.is_production()) {
        tracing::warn!(request_id = %request_id, ?errors, "request header validation failed");
        return Err(AppError::validation("Invalid request format"));
    }

    let client_id = client_identifier(headers);
    let decision = state.rate_limiter.check(&client_id).await;
    if !decision.allowed {
        tracing::warn!(
            request_id = %request_id,
            client_id = %client_id,
            reset_at = %decision.reset_at,
            "rate limit exceeded"
        );
        return Err(AppError::RateLimited {
            reset_at: decision.reset_at,
        });
    }

    let payload: CreatePaymentIntentRequest = serde_json::from_slice(&body).map_err(|err| {
        tracing::warn!(request_id = %request_id, error = %err, "payment intent body rejected");
        AppError::validation(format!("Invalid request body: {err}"))
    })?;
    let currency = payload
        .currency
        .clone()
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "usd".to_string())
        .to_ascii_lowercase();

    let logged = sanitize_for_logging(json!({
        "amount": payload.amount,
        "currency": currency,
        "customerName": payload.order_data.as_ref().and_then(|o| o.customer_name.clone()),
        "customerEmail": payload.order_data.as_ref().and_then(|o| o.customer_email.clone()),
        "clientId": client_id,
    }));
    tracing::debug!(request_id = %request_id, params = %logged, "payment intent requested");

    let mut report = validate_payment_request(payload.amount, payload.order_data.as_ref(), security);
    let currency_report = validate_currency(&currency, security);
    report.errors.extend(currency_report.errors);
    if let Some(message) = report.first_error() {
        tracing::info!(request_id = %request_id, errors = ?report.errors, "payment validation failed");
        return Err(AppError::validation(message));
    }
    if state.config.stripe.uses_test_keys() && state.config.is_production() {
        report.warnings.push("Stripe test keys in use".to_string());
    }
    if !report.warnings.is_empty() {
        tracing::warn!(request_id = %request_id, warnings = ?report.warnings, "payment validation warnings");
    }

    let Some(gateway) = state.payments.as_ref() else {
        tracing::info!(request_id = %request_id, "demo mode, stripe key not configured");
        return Ok(CreatePaymentIntentResponse::Demo(DemoPaymentIntent {
            demo_mode: true,
            payment_intent_id: format!("pi_demo_{}", Uuid::new_v4().simple()),
            message: "Demo mode: no real payment is processed".to_string(),
        }));
    };

    // Validation above guarantees both are present.
    let (Some(amount), Some(order)) = (payload.amount, payload.order_data) else {
        return Err(AppError::validation("Order data is required"));
    };
    let minor_units = to_minor_units(amount)
        .ok_or_else(|| AppError::validation("Payment amount must be a valid number"))?;

    let order_id = Uuid::new_v4();
    let params = CreateIntent {
        amount: minor_units,
        currency: currency.clone(),
        receipt_email: order.customer_email.clone(),
        description: intent_description(&order),
        metadata: intent_metadata(order_id, amount, &order),
    };

    let intent = gateway.create_payment_intent(params).await.map_err(|err| {
        tracing::error!(request_id = %request_id, error = %err, "stripe payment intent failed");
        AppError::Payment(err)
    })?;

    tracing::info!(
        request_id = %request_id,
        payment_intent_id = %intent.id,
        order_id = %order_id,
        amount = intent.amount,
        currency = %intent.currency,
        "payment intent created"
    );

    Ok(CreatePaymentIntentResponse::Live(PaymentIntentCreated {
        client_secret: intent.client_secret,
        payment_intent_id: intent.id,
        amount,
        currency,
        order_id,
    }))
}

fn intent_description(order: &OrderData) -> String {
    format!(
        "DVIT GOLF custom putter - {} - {}",
        OrderData::selection_name(order.face_deck.as_ref()),
        OrderData::selection_name(order.weight_system.as_ref()),
    )
}

fn intent_metadata(
    order_id: Uuid,
    amount: rust_decimal::Decimal,
    order: &OrderData,
) -> BTreeMap<String, String> {
    let address = order.shipping_address.clone().unwrap_or_default();
    let text = |value: Option<&String>| value.cloned().unwrap_or_default();
    let selection = |value: Option<&serde_json::Value>| {
        value.map(serde_json::Value::to_string).unwrap_or_default()
    };

    BTreeMap::from([
        ("orderId".to_string(), order_id.to_string()),
        ("customerName".to_string(), text(order.customer_name.as_ref())),
        ("customerEmail".to_string(), text(order.customer_email.as_ref())),
        ("customerPhone".to_string(), text(order.customer_phone.as_ref())),
        ("streetAddress".to_string(), text(address.address.as_ref())),
        ("city".to_string(), text(address.city.as_ref())),
        ("state".to_string(), text(address.state.as_ref())),
        ("zipCode".to_string(), text(address.zip_code.as_ref())),
        (
            "country".to_string(),
            address.country.clone().unwrap_or_else(|| "US".to_string()),
        ),
        ("faceDeck".to_string(), selection(order.face_deck.as_ref())),
        ("weightSystem".to_string(), selection(order.weight_system.as_ref())),
        ("originalAmount".to_string(), amount.to_string()),
    ])
}
