//! Payment amount and order payload checks shared by the payment-intent,
//! save and confirm endpoints.
//!
//! Validators collect every problem they find; callers surface the first
//! error to the client and log the warnings.

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::{Decimal, prelude::ToPrimitive};

use crate::{config::SecurityConfig, dto::payments::OrderData};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex compiles")
});

/// Amounts above this are accepted but logged for review.
const LARGE_AMOUNT_WARNING: i64 = 5_000;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }

    fn merge(mut self, other: ValidationReport) -> Self {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// True when the amount has at most two decimal places.
pub fn has_cent_precision(amount: Decimal) -> bool {
    amount.normalize().scale() <= 2
}

/// Converts a major-unit amount into the provider's minor units (cents).
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED).round().to_i64()
}

pub fn validate_payment_amount(amount: Option<Decimal>) -> ValidationReport {
    validate_payment_amount_with(amount, &SecurityConfig::default())
}

pub fn validate_payment_amount_with(
    amount: Option<Decimal>,
    config: &SecurityConfig,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    let Some(amount) = amount else {
        report.errors.push("Payment amount must be a valid number".into());
        return report;
    };

    let min = Decimal::new(config.min_amount_cents, 2);
    let max = Decimal::new(config.max_amount_cents, 2);

    if amount <= Decimal::ZERO {
        report.errors.push("Payment amount must be greater than 0".into());
    } else if amount < min {
        report
            .errors
            .push(format!("Payment amount must be at least ${min}"));
    } else if amount > max {
        report
            .errors
            .push(format!("Payment amount must not exceed ${max}"));
    } else if amount > Decimal::from(LARGE_AMOUNT_WARNING) {
        report
            .warnings
            .push("Large payment amount, please double-check the order".into());
    }

    if !has_cent_precision(amount) {
        report
            .errors
            .push("Payment amount cannot have more than 2 decimal places".into());
    }

    report
}

pub fn validate_currency(currency: &str, config: &SecurityConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    let lowered = currency.to_ascii_lowercase();
    if !config.allowed_currencies.iter().any(|c| *c == lowered) {
        report
            .errors
            .push(format!("Currency {currency} is not supported"));
    }
    report
}

pub fn validate_order_data(order: Option<&OrderData>) -> ValidationReport {
    let mut report = ValidationReport::default();
    let Some(order) = order else {
        report.errors.push("Order data is required".into());
        return report;
    };

    match order.customer_name.as_deref().map(str::trim) {
        None | Some("") => report.errors.push("Customer name is required".into()),
        Some(name) if name.chars().count() < 2 => report
            .errors
            .push("Customer name must be at least 2 characters".into()),
        _ => {}
    }

    match order.customer_email.as_deref() {
        None | Some("") => report.errors.push("Customer email is required".into()),
        Some(email) if !is_valid_email(email) => {
            report.errors.push("Customer email format is invalid".into())
        }
        _ => {}
    }

    if order.face_deck.as_ref().is_none_or(serde_json::Value::is_null) {
        report.errors.push("Face deck selection is required".into());
    }
    if order
        .weight_system
        .as_ref()
        .is_none_or(serde_json::Value::is_null)
    {
        report.errors.push("Weight system selection is required".into());
    }

    if let Some(address) = &order.shipping_address
        && !address.is_complete()
    {
        report.errors.push("Shipping address is incomplete".into());
    }

    report
}

/// Amount and order checks combined, as run before any payment or write.
pub fn validate_payment_request(
    amount: Option<Decimal>,
    order: Option<&OrderData>,
    config: &SecurityConfig,
) -> ValidationReport {
    validate_payment_amount_with(amount, config).merge(validate_order_data(order))
}
