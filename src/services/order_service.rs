use std::time::Instant;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    audit::record_event,
    config::SecurityConfig,
    dto::{
        orders::{
            ConfirmOrderItem, ConfirmOrderRequest, ConfirmOrderResponse, Customization,
            OrderCheckResponse, OrderDetailResponse, OrderList, OrderProjection,
            PaymentIntentQuery, SaveOrderRequest, SaveOrderResponse,
        },
        payments::OrderData,
    },
    email::{ConfirmationLine, OrderConfirmation},
    error::{AppError, AppResult},
    models::{NewOrder, NewOrderItem, Order, OrderFilter, OrderStatus},
    response::Meta,
    routes::params::OrderListQuery,
    services::email_service::{self, DispatchOutcome},
    state::AppState,
    store::StoreResult,
    validation::{has_cent_precision, is_valid_email, validate_payment_request},
};

pub const DEFAULT_PRODUCT_NAME: &str = "Modular Putter";
/// How far back an order may be matched by email and amount alone.
pub const FUZZY_MATCH_WINDOW_MINUTES: i64 = 10;

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Persists the order for a settled payment intent. Safe to call repeatedly:
/// later calls for the same intent return the first order as a duplicate.
pub async fn save_order(
    state: &AppState,
    client_id: &str,
    payload: SaveOrderRequest,
) -> AppResult<SaveOrderResponse> {
    let started = Instant::now();
    record_event(
        state,
        "order_save_request",
        None,
        json!({ "clientId": client_id }),
    )
    .await;

    let Some(payment_intent_id) = payload.payment_intent_id.clone().filter(|id| !id.is_empty())
    else {
        return Err(save_rejected(state, client_id, started, "Payment intent id is required").await);
    };
    let Some(order_data) = payload.order_data.as_ref() else {
        return Err(save_rejected(state, client_id, started, "Order data is required").await);
    };

    let report = validate_payment_request(
        payload.total_amount,
        Some(order_data),
        &state.config.security,
    );
    if let Some(message) = report.first_error() {
        record_event(
            state,
            "order_save_validation_failed",
            None,
            json!({
                "clientId": client_id,
                "error": "Order validation failed",
                "validationErrors": report.errors,
                "processingTime": elapsed_ms(started),
            }),
        )
        .await;
        return Err(AppError::validation(message));
    }

    let existing = match state.orders.find_by_payment_intent(&payment_intent_id).await {
        Ok(existing) => existing,
        Err(err) => {
            record_event(
                state,
                "order_save_database_error",
                None,
                json!({
                    "clientId": client_id,
                    "error": "Failed to check existing order",
                    "details": err.to_string(),
                    "processingTime": elapsed_ms(started),
                }),
            )
            .await;
            return Err(state.persistence_error("Database query failed")(err));
        }
    };

    if let Some(existing) = existing {
        return Ok(save_duplicate(state, client_id, &payment_intent_id, &existing, started).await);
    }

    let order_id = match payload.order_id {
        Some(id) => {
            let taken = state
                .orders
                .find_by_id(id)
                .await
                .map_err(state.persistence_error("Database query failed"))?;
            if taken.is_some() {
                // Reused client id; the intent has no order yet, so it needs its own row.
                tracing::warn!(
                    requested_order_id = %id,
                    payment_intent_id = %payment_intent_id,
                    "order id already belongs to another payment intent, issuing a new one"
                );
                Uuid::new_v4()
            } else {
                id
            }
        }
        None => Uuid::new_v4(),
    };

    let new_order = build_saved_order(
        &payload,
        order_id,
        order_data,
        &payment_intent_id,
        client_id,
    );
    let outcome = match state.orders.insert_or_get(new_order).await {
        Ok(outcome) => outcome,
        Err(err) => {
            record_event(
                state,
                "order_save_failed",
                None,
                json!({
                    "clientId": client_id,
                    "paymentIntentId": payment_intent_id,
                    "error": err.to_string(),
                    "processingTime": elapsed_ms(started),
                }),
            )
            .await;
            return Err(state.persistence_error("Failed to save order")(err));
        }
    };

    if !outcome.created {
        return Ok(save_duplicate(state, client_id, &payment_intent_id, &outcome.order, started).await);
    }

    let processing_time = elapsed_ms(started);
    let order_id = outcome.order.id.to_string();
    record_event(
        state,
        "order_save_success",
        Some(&order_id),
        json!({
            "clientId": client_id,
            "orderId": order_id,
            "paymentIntentId": payment_intent_id,
            "processingTime": processing_time,
        }),
    )
    .await;
    tracing::info!(
        order_id = %outcome.order.id,
        payment_intent_id = %payment_intent_id,
        total_amount = %outcome.order.total_amount,
        processing_time,
        "order saved"
    );

    Ok(SaveOrderResponse {
        success: true,
        order_id: outcome.order.id,
        message: "Order saved successfully".to_string(),
        duplicate: None,
        processing_time,
    })
}

async fn save_rejected(
    state: &AppState,
    client_id: &str,
    started: Instant,
    message: &str,
) -> AppError {
    record_event(
        state,
        "order_save_validation_failed",
        None,
        json!({
            "clientId": client_id,
            "error": message,
            "processingTime": elapsed_ms(started),
        }),
    )
    .await;
    AppError::validation(message)
}

async fn save_duplicate(
    state: &AppState,
    client_id: &str,
    payment_intent_id: &str,
    existing: &Order,
    started: Instant,
) -> SaveOrderResponse {
    let processing_time = elapsed_ms(started);
    let order_id = existing.id.to_string();
    record_event(
        state,
        "order_save_duplicate_attempt",
        Some(&order_id),
        json!({
            "clientId": client_id,
            "paymentIntentId": payment_intent_id,
            "existingOrderId": order_id,
            "processingTime": processing_time,
        }),
    )
    .await;

    SaveOrderResponse {
        success: true,
        order_id: existing.id,
        message: "Order already exists".to_string(),
        duplicate: Some(true),
        processing_time,
    }
}

fn build_saved_order(
    payload: &SaveOrderRequest,
    order_id: Uuid,
    order_data: &OrderData,
    payment_intent_id: &str,
    client_id: &str,
) -> NewOrder {
    // Validation has already rejected a missing amount.
    let total = payload.total_amount.unwrap_or_default();
    let shipping_address = payload.shipping_address.clone().or_else(|| {
        order_data
            .shipping_address
            .as_ref()
            .and_then(|address| serde_json::to_value(address).ok())
    });

    NewOrder {
        id: order_id,
        stripe_payment_intent_id: Some(payment_intent_id.to_string()),
        customer_name: order_data.customer_name.clone().unwrap_or_default(),
        customer_email: order_data.customer_email.clone().unwrap_or_default(),
        total_amount: total,
        currency: payload
            .currency
            .clone()
            .unwrap_or_else(|| "USD".to_string())
            .to_ascii_uppercase(),
        status: OrderStatus::Completed,
        order_items: json!({
            "faceDeck": order_data.face_deck,
            "weightSystem": order_data.weight_system,
            "totalPrice": total,
        }),
        shipping_address,
        billing_address: payload.billing_address.clone(),
        metadata: json!({
            "customerPhone": order_data.customer_phone,
            "paymentMethod": "stripe",
            "processedAt": Utc::now().to_rfc3339(),
            "clientId": client_id,
        }),
        items: vec![NewOrderItem {
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            quantity: 1,
            unit_price: total,
            product_snapshot: json!({
                "faceDeck": order_data.face_deck,
                "weightSystem": order_data.weight_system,
            }),
        }],
    }
}

/// Order id reference, validated fields and the effective line items of a
/// confirm request.
struct ConfirmInput {
    customer_name: String,
    customer_email: String,
    client_order_id: String,
    total_price: Decimal,
    items: Vec<ConfirmOrderItem>,
}

fn confirm_input(
    payload: &ConfirmOrderRequest,
    limits: &SecurityConfig,
) -> AppResult<ConfirmInput> {
    let present = |value: &Option<String>| value.clone().filter(|v| !v.trim().is_empty());
    let (Some(customer_name), Some(customer_email), Some(client_order_id), Some(total_price)) = (
        present(&payload.customer_name),
        present(&payload.customer_email),
        present(&payload.order_id),
        payload.total_price,
    ) else {
        return Err(AppError::validation("Missing required order information"));
    };

    if !is_valid_email(&customer_email) {
        return Err(AppError::validation("Invalid email format"));
    }
    if total_price <= Decimal::ZERO {
        return Err(AppError::validation("Order amount must be greater than 0"));
    }
    let max_amount = Decimal::new(limits.max_amount_cents, 2);
    if !has_cent_precision(total_price) {
        return Err(AppError::validation(
            "Order amount cannot have more than 2 decimal places",
        ));
    }
    if total_price > max_amount {
        return Err(AppError::validation(format!(
            "Order amount must not exceed ${max_amount}"
        )));
    }

    let items = match payload.order_items.clone() {
        Some(items) if !items.is_empty() => {
            items
                .iter()
                .try_for_each(|item| check_item(item, max_amount))?;
            items
        }
        _ => vec![ConfirmOrderItem {
            name: DEFAULT_PRODUCT_NAME.to_string(),
            quantity: 1,
            price: total_price,
            customization: Some(Customization {
                face_deck: payload.face_deck.clone(),
                weight_system: payload.weight_system.clone(),
            }),
        }],
    };

    Ok(ConfirmInput {
        customer_name,
        customer_email,
        client_order_id,
        total_price,
        items,
    })
}

/// Line items come from the client; reject anything the order tables
/// would refuse instead of failing the insert.
fn check_item(item: &ConfirmOrderItem, max_amount: Decimal) -> AppResult<()> {
    if item.quantity < 1 {
        return Err(AppError::validation("Item quantity must be at least 1"));
    }
    if item.price <= Decimal::ZERO {
        return Err(AppError::validation("Item price must be greater than 0"));
    }
    if !has_cent_precision(item.price) {
        return Err(AppError::validation(
            "Item price cannot have more than 2 decimal places",
        ));
    }
    let line_total = item.price.checked_mul(Decimal::from(item.quantity));
    if line_total.is_none_or(|total| total > max_amount) {
        return Err(AppError::validation(format!(
            "Item total must not exceed ${max_amount}"
        )));
    }
    Ok(())
}

fn confirmation_for(
    state: &AppState,
    input: &ConfirmInput,
    order_id: String,
    order_date: Option<String>,
) -> OrderConfirmation {
    OrderConfirmation {
        site_url: state.config.base_url.clone(),
        order_id,
        customer_name: input.customer_name.clone(),
        customer_email: input.customer_email.clone(),
        total_price: input.total_price,
        order_date,
        lines: input
            .items
            .iter()
            .map(|item| ConfirmationLine {
                name: item.name.clone(),
                quantity: item.quantity,
                unit_price: item.price,
                face_deck: item.customization.as_ref().and_then(|c| c.face_deck.clone()),
                weight_system: item
                    .customization
                    .as_ref()
                    .and_then(|c| c.weight_system.clone()),
            })
            .collect(),
    }
}

/// Looks for an order this confirmation refers to: by intent id first, then
/// (when enabled) by email and exact amount within the recent window.
async fn find_existing_order(
    state: &AppState,
    payment_intent_id: Option<&str>,
    email: &str,
    amount: Decimal,
) -> StoreResult<Option<Order>> {
    if let Some(pi) = payment_intent_id
        && let Some(order) = state.orders.find_by_payment_intent(pi).await?
    {
        return Ok(Some(order));
    }

    if !state.config.fuzzy_order_match {
        return Ok(None);
    }
    let since = Utc::now() - Duration::minutes(FUZZY_MATCH_WINDOW_MINUTES);
    state
        .orders
        .find_recent_by_email_and_amount(email, amount, since)
        .await
}

pub async fn confirm_order(
    state: &AppState,
    payload: ConfirmOrderRequest,
) -> AppResult<ConfirmOrderResponse> {
    let input = confirm_input(&payload, &state.config.security)?;
    let payment_intent_id = payload.payment_intent_id.clone().filter(|id| !id.is_empty());
    tracing::info!(
        order_id = %input.client_order_id,
        item_count = input.items.len(),
        total_price = %input.total_price,
        "confirm order requested"
    );

    if payload.skip_order_creation {
        let confirmation = confirmation_for(
            state,
            &input,
            input.client_order_id.clone(),
            payload.order_date.clone(),
        );
        if let DispatchOutcome::Failed(err) =
            email_service::send_order_confirmation(state, &confirmation).await
        {
            return Err(AppError::Email {
                message: "Failed to send confirmation email".to_string(),
                detail: state.config.expose_error_details().then(|| err.to_string()),
            });
        }
        return Ok(ConfirmOrderResponse {
            success: true,
            message: "Confirmation email sent".to_string(),
            order_id: Some(input.client_order_id),
            db_order_id: None,
            original_order_id: None,
            duplicate: None,
            email_only: Some(true),
        });
    }

    let existing = find_existing_order(
        state,
        payment_intent_id.as_deref(),
        &input.customer_email,
        input.total_price,
    )
    .await
    .map_err(state.persistence_error("Failed to look up order"))?;

    if let Some(existing) = existing {
        let confirmation = confirmation_for(
            state,
            &input,
            existing.id.to_string(),
            payload.order_date.clone(),
        );
        let outcome = email_service::send_order_confirmation(state, &confirmation).await;
        tracing::info!(
            order_id = %existing.id,
            email_delivered = outcome.is_success(),
            "order already exists, email checked"
        );
        return Ok(ConfirmOrderResponse {
            success: true,
            message: "Order already exists, email status checked".to_string(),
            order_id: None,
            db_order_id: Some(existing.id),
            original_order_id: Some(input.client_order_id),
            duplicate: Some(true),
            email_only: None,
        });
    }

    let order_date = payload
        .order_date
        .clone()
        .unwrap_or_else(|| Utc::now().to_rfc3339());
    let new_order = NewOrder {
        id: Uuid::new_v4(),
        stripe_payment_intent_id: payment_intent_id,
        customer_name: input.customer_name.clone(),
        customer_email: input.customer_email.clone(),
        total_amount: input.total_price,
        currency: "USD".to_string(),
        status: OrderStatus::Processing,
        order_items: serde_json::to_value(&input.items).unwrap_or(Value::Array(Vec::new())),
        shipping_address: None,
        billing_address: None,
        metadata: json!({
            "faceDeck": payload.face_deck,
            "weightSystem": payload.weight_system,
            "orderDate": order_date,
        }),
        items: input
            .items
            .iter()
            .map(|item| NewOrderItem {
                product_name: item.name.clone(),
                quantity: item.quantity,
                unit_price: item.price,
                product_snapshot: serde_json::to_value(&item.customization).unwrap_or(Value::Null),
            })
            .collect(),
    };

    let outcome = state
        .orders
        .insert_or_get(new_order)
        .await
        .map_err(state.persistence_error("Failed to save order"))?;

    let confirmation = confirmation_for(
        state,
        &input,
        outcome.order.id.to_string(),
        Some(order_date),
    );
    let email = email_service::send_order_confirmation(state, &confirmation).await;
    if !email.is_success() {
        tracing::warn!(order_id = %outcome.order.id, "order saved but confirmation email failed");
    }

    Ok(ConfirmOrderResponse {
        success: true,
        message: "Order confirmed and saved".to_string(),
        order_id: Some(outcome.order.id.to_string()),
        db_order_id: None,
        original_order_id: Some(input.client_order_id),
        duplicate: (!outcome.created).then_some(true),
        email_only: None,
    })
}

fn required_intent_id(query: PaymentIntentQuery) -> AppResult<String> {
    query
        .payment_intent_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::validation("Payment intent id is required"))
}

pub async fn check_order(
    state: &AppState,
    query: PaymentIntentQuery,
) -> AppResult<OrderCheckResponse> {
    let payment_intent_id = required_intent_id(query)?;
    let order = state
        .orders
        .find_by_payment_intent(&payment_intent_id)
        .await
        .map_err(state.persistence_error("Failed to check order"))?;

    Ok(match order {
        Some(order) => OrderCheckResponse {
            exists: true,
            order_id: Some(order.id),
            status: Some(order.status),
            created_at: Some(order.created_at),
        },
        None => OrderCheckResponse {
            exists: false,
            order_id: None,
            status: None,
            created_at: None,
        },
    })
}

pub async fn order_by_payment_intent(
    state: &AppState,
    query: PaymentIntentQuery,
) -> AppResult<OrderDetailResponse> {
    let payment_intent_id = required_intent_id(query)?;
    let order = state
        .orders
        .find_by_payment_intent(&payment_intent_id)
        .await
        .map_err(state.persistence_error("Failed to load order"))?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
    let items = state
        .orders
        .items_for(order.id)
        .await
        .map_err(state.persistence_error("Failed to load order items"))?;

    Ok(OrderDetailResponse {
        success: true,
        order: OrderProjection::new(order, items),
    })
}

pub async fn list_orders(state: &AppState, query: OrderListQuery) -> AppResult<OrderList> {
    let (page, per_page, offset) = query.pagination().normalize();
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(AppError::Validation)?;
    let filter = OrderFilter {
        customer_email: query.email.filter(|e| !e.is_empty()),
        order_id: query.order_id,
        status,
    };

    let (orders, total) = state
        .orders
        .list(&filter, per_page as u64, offset as u64)
        .await
        .map_err(state.persistence_error("Failed to query orders"))?;

    Ok(OrderList {
        success: true,
        orders,
        meta: Meta::new(page, per_page, total as i64),
    })
}
