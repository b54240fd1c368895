//! Outbound mail: the `Mailer` seam, its SMTP implementation and the order
//! confirmation templates.

use askama::Template;
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

pub mod smtp;

pub use smtp::SmtpMailer;

pub const BRAND: &str = "DVIT GOLF";

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError>;
}

/// One purchased line as shown in the confirmation email.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationLine {
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub face_deck: Option<String>,
    pub weight_system: Option<String>,
}

/// Everything the order confirmation email needs.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub total_price: Decimal,
    pub order_date: Option<String>,
    pub lines: Vec<ConfirmationLine>,
    /// Storefront address used for the links in the email.
    pub site_url: String,
}

impl OrderConfirmation {
    pub fn subject(&self) -> String {
        format!("Order Confirmation - {} - {BRAND}", self.order_id)
    }

    pub fn render(&self) -> Result<OutgoingEmail, EmailError> {
        let view = ConfirmationView::from(self);
        let text_body = OrderConfirmationText { view: &view }.render()?;
        let html_body = OrderConfirmationHtml { view: &view }.render()?;

        Ok(OutgoingEmail {
            to: self.customer_email.clone(),
            subject: self.subject(),
            text_body,
            html_body,
        })
    }
}

struct ViewLine {
    name: String,
    quantity: i32,
    unit_price: String,
    customization: String,
}

struct ConfirmationView {
    brand: &'static str,
    order_id: String,
    customer_name: String,
    order_date: String,
    total_price: String,
    lines: Vec<ViewLine>,
    site_url: String,
    site_label: String,
}

impl From<&OrderConfirmation> for ConfirmationView {
    fn from(order: &OrderConfirmation) -> Self {
        let lines = order
            .lines
            .iter()
            .map(|line| ViewLine {
                name: line.name.clone(),
                quantity: line.quantity,
                unit_price: money(line.unit_price),
                customization: [line.face_deck.as_deref(), line.weight_system.as_deref()]
                    .into_iter()
                    .flatten()
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
                    .join(" "),
            })
            .collect();

        Self {
            brand: BRAND,
            order_id: order.order_id.clone(),
            customer_name: order.customer_name.clone(),
            order_date: order
                .order_date
                .clone()
                .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string()),
            total_price: money(order.total_price),
            lines,
            site_url: order.site_url.trim_end_matches('/').to_string(),
            site_label: site_label(&order.site_url),
        }
    }
}

fn site_label(site_url: &str) -> String {
    let trimmed = site_url.trim_end_matches('/');
    trimmed
        .split_once("://")
        .map_or(trimmed, |(_, host)| host)
        .to_string()
}

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationHtml<'a> {
    view: &'a ConfirmationView,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationText<'a> {
    view: &'a ConfirmationView,
}
