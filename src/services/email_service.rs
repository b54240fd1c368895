//! Order confirmation dispatch with at-most-once protection.
//!
//! A confirmation is skipped when a `sent` log exists for the same order id,
//! or for the same recipient within the last ten minutes. Every real send
//! attempt is written back to the email log.

use chrono::{Duration, Utc};

use crate::{
    dto::emails::{EmailInfo, EmailSentQuery, EmailSentResponse},
    email::{EmailError, OrderConfirmation},
    error::{AppError, AppResult},
    models::{EmailStatus, EmailType, NewEmailLog},
    state::AppState,
    store::StoreResult,
};

pub const RECENT_SEND_WINDOW_MINUTES: i64 = 10;

#[derive(Debug)]
pub enum DispatchOutcome {
    Sent,
    AlreadySent,
    /// SMTP is not configured; nothing was sent.
    Disabled,
    Failed(EmailError),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, DispatchOutcome::Failed(_))
    }
}

async fn already_sent(state: &AppState, order_id: &str, recipient: &str) -> StoreResult<bool> {
    let kind = EmailType::OrderConfirmation;
    if let Some(log) = state.email_logs.find_sent_for_order(order_id, kind).await? {
        tracing::info!(order_id, subject = %log.subject, "confirmation already sent for order");
        return Ok(true);
    }

    let since = Utc::now() - Duration::minutes(RECENT_SEND_WINDOW_MINUTES);
    if let Some(log) = state
        .email_logs
        .find_sent_to_recipient_since(recipient, kind, since)
        .await?
    {
        tracing::info!(
            order_id,
            previous_order_id = %log.order_id,
            "confirmation sent to recipient recently"
        );
        return Ok(true);
    }

    Ok(false)
}

pub async fn send_order_confirmation(
    state: &AppState,
    confirmation: &OrderConfirmation,
) -> DispatchOutcome {
    let Some(mailer) = state.mailer.as_ref() else {
        tracing::info!(order_id = %confirmation.order_id, "smtp not configured, skipping email");
        return DispatchOutcome::Disabled;
    };

    match already_sent(state, &confirmation.order_id, &confirmation.customer_email).await {
        Ok(true) => return DispatchOutcome::AlreadySent,
        Ok(false) => {}
        Err(err) => {
            tracing::warn!(error = %err, order_id = %confirmation.order_id, "email log lookup failed");
        }
    }

    let result = match confirmation.render() {
        Ok(email) => mailer.send(email).await,
        Err(err) => Err(err),
    };

    let (status, error) = match &result {
        Ok(()) => (EmailStatus::Sent, None),
        Err(err) => (EmailStatus::Failed, Some(err.to_string())),
    };
    let entry = NewEmailLog {
        order_id: confirmation.order_id.clone(),
        email_type: EmailType::OrderConfirmation,
        recipient_email: confirmation.customer_email.clone(),
        subject: confirmation.subject(),
        status,
        error,
    };
    if let Err(err) = state.email_logs.upsert(entry).await {
        tracing::warn!(error = %err, order_id = %confirmation.order_id, "email log write failed");
    }

    match result {
        Ok(()) => DispatchOutcome::Sent,
        Err(err) => {
            tracing::error!(error = %err, order_id = %confirmation.order_id, "confirmation email failed");
            DispatchOutcome::Failed(err)
        }
    }
}

pub async fn confirmation_status(
    state: &AppState,
    query: EmailSentQuery,
) -> AppResult<EmailSentResponse> {
    let (Some(order_id), Some(email)) = (
        query.order_id.filter(|v| !v.is_empty()),
        query.email.filter(|v| !v.is_empty()),
    ) else {
        return Err(AppError::validation(
            "Missing required parameters: orderId and email",
        ));
    };

    let log = state
        .email_logs
        .find_sent_for_order(&order_id, EmailType::OrderConfirmation)
        .await
        .map_err(state.persistence_error("Failed to check email status"))?
        .filter(|log| log.recipient_email.eq_ignore_ascii_case(&email));

    Ok(EmailSentResponse {
        success: true,
        email_sent: log.is_some(),
        email_info: log.map(|log| EmailInfo {
            sent_at: log.sent_at,
            subject: log.subject,
        }),
    })
}
