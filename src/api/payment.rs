//! Subscription payment endpoints.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Extension,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::{success, ApiJson, ApiResult};
use crate::auth::SessionUser;
use crate::errors::AppError;
use crate::models::{BillingCycle, PendingPayment, Plan};
use crate::payment::{
    event_type, paid_checkout, verify_webhook_signature, CheckoutRequest, CHECKOUT_PAID_EVENT,
    SIGNATURE_HEADER,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub billing_cycle: String,
    #[serde(default)]
    pub amount: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentResponse {
    pub message: String,
    pub checkout_url: String,
    pub payment_intent_id: Option<String>,
    pub checkout_session_id: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// POST /api/payment/initiate - Open a PayMongo checkout for a subscription plan.
pub async fn initiate_payment(
    State(state): State<AppState>,
    Extension(session): Extension<SessionUser>,
    ApiJson(request): ApiJson<InitiatePaymentRequest>,
) -> ApiResult<InitiatePaymentResponse> {
    let plan = Plan::parse(&request.plan)
        .ok_or_else(|| AppError::Validation("Invalid plan selected".to_string()))?;
    let billing_cycle = BillingCycle::parse(&request.billing_cycle)
        .ok_or_else(|| AppError::Validation("Invalid billing cycle".to_string()))?;
    let amount = request
        .amount
        .filter(|a| a.is_finite() && *a > 0.0)
        .ok_or_else(|| AppError::Validation("Invalid amount".to_string()))?;

    let start = Utc::now();
    let start_date = start.to_rfc3339_opts(SecondsFormat::Millis, true);
    let end_date = billing_cycle
        .period_end(start)
        .to_rfc3339_opts(SecondsFormat::Millis, true);

    let checkout = state
        .payment
        .create_checkout(
            &CheckoutRequest {
                plan,
                billing_cycle,
                amount,
                user_id: session.id(),
                start_date: &start_date,
                end_date: &end_date,
            },
            &state.config.public_url,
        )
        .await?;

    state
        .repo
        .set_pending_payment(
            session.id(),
            &PendingPayment {
                payment_intent_id: checkout.payment_intent_id.clone(),
                checkout_session_id: checkout.id.clone(),
                plan,
                billing_cycle,
                amount,
                start_date,
                end_date,
            },
        )
        .await?;

    success(InitiatePaymentResponse {
        message: "Payment initiated successfully".to_string(),
        checkout_url: checkout.checkout_url,
        payment_intent_id: checkout.payment_intent_id,
        checkout_session_id: checkout.id,
    })
}

/// POST /api/payment/webhook - PayMongo event delivery.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<WebhookAck> {
    if let Some(secret) = state.config.payment.webhook_secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_webhook_signature(signature, &body, secret) {
            tracing::warn!("Rejected webhook with invalid signature");
            return Err(AppError::Unauthorized(
                "Invalid webhook signature".to_string(),
            ));
        }
    }

    let event: serde_json::Value = serde_json::from_slice(&body)?;
    let kind = event_type(&event).unwrap_or_default();
    if kind != CHECKOUT_PAID_EVENT {
        tracing::debug!(event = kind, "Ignoring webhook event");
        return success(WebhookAck { received: true });
    }

    let paid = paid_checkout(&event)?;
    let user = state
        .repo
        .activate_subscription(&paid.user_id, paid.plan, &paid.start_date, &paid.end_date)
        .await?;
    if user.is_none() {
        tracing::error!(user_id = %paid.user_id, "User not found for payment webhook");
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!(
        user_id = %paid.user_id,
        plan = paid.plan.as_str(),
        cycle = paid.billing_cycle.as_str(),
        "Subscription activated"
    );
    success(WebhookAck { received: true })
}
