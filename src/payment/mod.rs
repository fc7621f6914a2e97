//! PayMongo checkout and webhook handling for subscriptions.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;

use crate::auth::constant_time_compare;
use crate::config::PaymentConfig;
use crate::errors::AppError;
use crate::models::{BillingCycle, Plan};

/// Webhook event that activates a subscription.
pub const CHECKOUT_PAID_EVENT: &str = "checkout_session.payment.paid";

/// Header PayMongo signs webhook deliveries with.
pub const SIGNATURE_HEADER: &str = "paymongo-signature";

const PAYMENT_METHODS: [&str; 4] = ["card", "gcash", "paymaya", "grab_pay"];

/// Payment failures.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("PayMongo secret key not configured")]
    NotConfigured,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("PayMongo returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid webhook payload: {0}")]
    InvalidEvent(String),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        tracing::error!("Payment error: {}", err);
        match err {
            PaymentError::NotConfigured => AppError::Internal(err.to_string()),
            PaymentError::InvalidEvent(msg) => AppError::BadRequest(msg),
            _ => AppError::Upstream("Payment processing failed".to_string()),
        }
    }
}

/// Subscription purchase to open a checkout for.
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub plan: Plan,
    pub billing_cycle: BillingCycle,
    /// Price in pesos
    pub amount: f64,
    pub user_id: &'a str,
    pub start_date: &'a str,
    pub end_date: &'a str,
}

/// Hosted checkout created by PayMongo.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub id: String,
    pub checkout_url: String,
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckoutEnvelope {
    data: CheckoutData,
}

#[derive(Debug, Deserialize)]
struct CheckoutData {
    id: String,
    attributes: CheckoutAttributes,
}

#[derive(Debug, Deserialize)]
struct CheckoutAttributes {
    checkout_url: String,
    #[serde(default)]
    payment_intent: Option<PaymentIntentRef>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentRef {
    id: String,
}

/// Subscription purchase confirmed by a paid-checkout webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidCheckout {
    pub user_id: String,
    pub plan: Plan,
    pub billing_cycle: BillingCycle,
    pub start_date: String,
    pub end_date: String,
}

/// PayMongo REST client.
#[derive(Debug, Clone)]
pub struct PayMongoClient {
    secret_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl PayMongoClient {
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            secret_key: config.secret_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Open a hosted checkout; `public_url` is the front end the user returns to.
    pub async fn create_checkout(
        &self,
        request: &CheckoutRequest<'_>,
        public_url: &str,
    ) -> Result<CheckoutSession, PaymentError> {
        let secret_key = self
            .secret_key
            .as_deref()
            .ok_or(PaymentError::NotConfigured)?;

        let plan = request.plan;
        let cycle = request.billing_cycle.as_str();
        let centavos = (request.amount * 100.0).round() as i64;
        let public_url = public_url.trim_end_matches('/');

        let body = json!({
            "data": {
                "attributes": {
                    "line_items": [{
                        "name": format!("Cuisinova {} Plan - {}", plan.title(), cycle),
                        "amount": centavos,
                        "currency": "PHP",
                        "quantity": 1
                    }],
                    "payment_method_types": PAYMENT_METHODS,
                    "description": format!("Cuisinova {} Plan Subscription", plan.title()),
                    "reference_number": format!("CUISINOVA-{}", chrono::Utc::now().timestamp_millis()),
                    "success_url": format!("{}/payment/success?session_id={{CHECKOUT_SESSION_ID}}", public_url),
                    "cancel_url": format!("{}/payment?plan={}", public_url, plan.as_str()),
                    "metadata": {
                        "plan": plan.as_str(),
                        "billingCycle": cycle,
                        "userId": request.user_id,
                        "startDate": request.start_date,
                        "endDate": request.end_date
                    }
                }
            }
        });

        let response = self
            .client
            .post(format!("{}/v1/checkout_sessions", self.base_url))
            .basic_auth(secret_key, Some(""))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: CheckoutEnvelope = response.json().await?;
        tracing::info!(
            checkout_id = %envelope.data.id,
            user_id = request.user_id,
            plan = plan.as_str(),
            "Created checkout session"
        );

        Ok(CheckoutSession {
            id: envelope.data.id,
            checkout_url: envelope.data.attributes.checkout_url,
            payment_intent_id: envelope.data.attributes.payment_intent.map(|p| p.id),
        })
    }
}

/// Check a `Paymongo-Signature` header (`t=<ts>,te=<sig>,li=<sig>`) against the raw body.
///
/// The live signature `li` is used when present, otherwise the test-mode `te`.
pub fn verify_webhook_signature(header: &str, body: &[u8], secret: &str) -> bool {
    let mut timestamp = None;
    let mut test_sig = "";
    let mut live_sig = "";
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = Some(v),
            Some(("te", v)) => test_sig = v,
            Some(("li", v)) => live_sig = v,
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return false;
    };
    let provided = if live_sig.is_empty() { test_sig } else { live_sig };
    if provided.is_empty() {
        return false;
    }

    constant_time_compare(&sign_payload(timestamp, body, secret), provided)
}

fn sign_payload(timestamp: &str, body: &[u8], secret: &str) -> String {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Event type of a webhook payload.
///
/// Accepts the flat `{type, data}` shape as well as PayMongo's `{data: {attributes: {type}}}`.
pub fn event_type(event: &serde_json::Value) -> Option<&str> {
    event
        .get("type")
        .and_then(|v| v.as_str())
        .or_else(|| event.pointer("/data/attributes/type").and_then(|v| v.as_str()))
}

/// Extract the purchase from a paid-checkout event.
pub fn paid_checkout(event: &serde_json::Value) -> Result<PaidCheckout, PaymentError> {
    let metadata = event
        .pointer("/data/metadata")
        .or_else(|| event.pointer("/data/attributes/data/attributes/metadata"))
        .and_then(|m| m.as_object())
        .ok_or_else(|| PaymentError::InvalidEvent("Missing checkout metadata".to_string()))?;

    let field = |name: &str| {
        metadata
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| PaymentError::InvalidEvent(format!("Missing metadata field {}", name)))
    };

    let plan_raw = field("plan")?;
    let plan = Plan::parse(&plan_raw)
        .ok_or_else(|| PaymentError::InvalidEvent(format!("Unknown plan {}", plan_raw)))?;
    let cycle_raw = field("billingCycle")?;
    let billing_cycle = BillingCycle::parse(&cycle_raw).ok_or_else(|| {
        PaymentError::InvalidEvent(format!("Unknown billing cycle {}", cycle_raw))
    })?;

    Ok(PaidCheckout {
        user_id: field("userId")?,
        plan,
        billing_cycle,
        start_date: field("startDate")?,
        end_date: field("endDate")?,
    })
}
