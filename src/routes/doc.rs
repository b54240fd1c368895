use utoipa::{OpenApi, openapi::OpenApi as OpenApiSpec};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        emails::{EmailInfo, EmailSentResponse},
        orders::{
            ConfirmOrderItem, ConfirmOrderRequest, ConfirmOrderResponse, Customization,
            OrderCheckResponse, OrderDetailResponse, OrderList, OrderProjection, SaveOrderRequest,
            SaveOrderResponse,
        },
        payments::{
            CreatePaymentIntentRequest, CreatePaymentIntentResponse, DemoPaymentIntent, OrderData,
            PaymentIntentCreated, ShippingAddress, WebhookAck,
        },
    },
    models::{EmailStatus, EmailType, Order, OrderItem, OrderStatus},
    response::{ErrorBody, Meta},
    routes::{emails, health, orders, params, payments, webhooks},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        payments::create_payment_intent,
        orders::save_order,
        orders::confirm_order,
        orders::check_order,
        orders::order_by_payment_intent,
        orders::list_orders,
        webhooks::stripe_webhook,
        emails::order_confirmation_status
    ),
    components(
        schemas(
            health::HealthData,
            Order,
            OrderItem,
            OrderStatus,
            EmailType,
            EmailStatus,
            ShippingAddress,
            OrderData,
            CreatePaymentIntentRequest,
            CreatePaymentIntentResponse,
            PaymentIntentCreated,
            DemoPaymentIntent,
            WebhookAck,
            SaveOrderRequest,
            SaveOrderResponse,
            Customization,
            ConfirmOrderItem,
            ConfirmOrderRequest,
            ConfirmOrderResponse,
            OrderCheckResponse,
            OrderProjection,
            OrderDetailResponse,
            OrderList,
            EmailInfo,
            EmailSentResponse,
            params::OrderListQuery,
            Meta,
            ErrorBody
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Payments", description = "Payment intent creation"),
        (name = "Orders", description = "Order persistence and confirmation"),
        (name = "Webhooks", description = "Stripe event intake"),
        (name = "Emails", description = "Confirmation email status"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
