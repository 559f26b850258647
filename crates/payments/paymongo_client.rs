use std::collections::HashMap;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{
    StatusCode,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;
use tracing::error;
use url::Url;

use crate::domain::value_objects::{
    enums::payment_statuses::PaymentStatus,
    payments::{BillingDetails, PaymentMethodDetails, ProcessOutcome},
};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_BASE_URL: &str = "https://api.paymongo.com/";

/// How far a webhook `t=` timestamp may drift from the local clock.
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

pub const EVENT_PAYMENT_PAID: &str = "payment.paid";
pub const EVENT_PAYMENT_FAILED: &str = "payment.failed";

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered with a non-2xx status. `message` is the provider's own detail.
    #[error("{message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// 5xx, 408 or 429 from the provider. The request may or may not have
    /// been applied, so the caller must not treat it as a decline.
    #[error("{message}")]
    Unavailable { status: u16, message: String },
    #[error("payment provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid provider url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid provider payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid webhook signature: {0}")]
    Signature(String),
}

impl ProviderError {
    /// Outages and timeouts, where the outcome on the provider side is unknown.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Unavailable { .. } | ProviderError::Transport(_)
        )
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Minimal PayMongo client built on reqwest.
pub struct PayMongoClient {
    http: reqwest::Client,
    base_url: Url,
    secret_key: String,
    webhook_secret: String,
    webhook_tolerance_secs: i64,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Resource<T>,
}

#[derive(Debug, Deserialize)]
struct Resource<T> {
    id: String,
    attributes: T,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    errors: Vec<ErrorDetails>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    code: Option<String>,
    detail: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct IntentAttributes {
    status: String,
    #[serde(default)]
    next_action: Option<NextAction>,
    #[serde(default)]
    last_payment_error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct NextAction {
    #[serde(default)]
    redirect: Option<Redirect>,
}

#[derive(Debug, Clone, Deserialize)]
struct Redirect {
    url: Option<String>,
}

/// Provider-side view of a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIntent {
    pub id: String,
    pub status: String,
    pub redirect_url: Option<String>,
    pub last_error: Option<String>,
}

impl ProviderIntent {
    fn from_envelope(envelope: Envelope<IntentAttributes>) -> Self {
        let attributes = envelope.data.attributes;
        let redirect_url = attributes
            .next_action
            .and_then(|action| action.redirect)
            .and_then(|redirect| redirect.url);
        let last_error = attributes.last_payment_error.map(|value| {
            value
                .get("failed_message")
                .or_else(|| value.get("message"))
                .and_then(|message| message.as_str())
                .map(|message| message.to_string())
                .unwrap_or_else(|| value.to_string())
        });

        Self {
            id: envelope.data.id,
            status: attributes.status,
            redirect_url,
            last_error,
        }
    }

    /// Local status for the provider's status string. Unknown values are
    /// kept as processing so the intent is checked again.
    pub fn status(&self) -> PaymentStatus {
        match self.status.as_str() {
            "succeeded" => PaymentStatus::Succeeded,
            "awaiting_next_action" => PaymentStatus::RequiresAction,
            "awaiting_payment_method" if self.last_error.is_some() => PaymentStatus::Failed,
            "awaiting_payment_method" => PaymentStatus::Created,
            _ => PaymentStatus::Processing,
        }
    }

    pub fn outcome(&self) -> ProcessOutcome {
        match self.status() {
            PaymentStatus::Succeeded => ProcessOutcome::Succeeded,
            PaymentStatus::RequiresAction => match &self.redirect_url {
                Some(redirect_url) => ProcessOutcome::RequiresAction {
                    redirect_url: redirect_url.clone(),
                },
                None => ProcessOutcome::Processing,
            },
            PaymentStatus::Failed => ProcessOutcome::Failed {
                reason: self
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "payment failed".to_string()),
            },
            _ => ProcessOutcome::Processing,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct CardPayload<'a> {
    card_number: &'a str,
    exp_month: u8,
    exp_year: u16,
    cvc: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub id: String,
    pub attributes: WebhookEventAttributes,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventAttributes {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub livemode: bool,
    pub data: serde_json::Value,
}

impl WebhookEvent {
    pub fn event_type(&self) -> &str {
        &self.data.attributes.type_
    }

    /// Provider intent id referenced by a `payment.*` event.
    pub fn payment_intent_id(&self) -> Option<String> {
        self.data
            .attributes
            .data
            .pointer("/attributes/payment_intent_id")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string())
    }
}

impl PayMongoClient {
    pub fn new(secret_key: String, webhook_secret: String) -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_BASE_URL, secret_key, webhook_secret)
    }

    pub fn with_base_url(
        base_url: &str,
        secret_key: String,
        webhook_secret: String,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: Url::parse(base_url)?,
            secret_key,
            webhook_secret,
            webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
        })
    }

    pub fn with_webhook_tolerance(mut self, seconds: i64) -> Self {
        self.webhook_tolerance_secs = seconds;
        self
    }

    fn authorization(&self) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:", self.secret_key)))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<T, ProviderError> {
        let resp = request
            .header(AUTHORIZATION, self.authorization())
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let resp = Self::ensure_success(resp, context).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let (code, detail) = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => match envelope.errors.into_iter().next() {
                Some(details) => (details.code, details.detail),
                None => (None, None),
            },
            Err(_) => (None, None),
        };

        error!(
            status = %status,
            provider_error_code = ?code,
            provider_error_detail = ?detail,
            response_body = %body,
            context = %context,
            "paymongo: api request failed"
        );

        let message = detail.unwrap_or_else(|| format!("{context} failed with status {status}"));
        if is_transient_status(status) {
            return Err(ProviderError::Unavailable {
                status: status.as_u16(),
                message,
            });
        }

        Err(ProviderError::Rejected {
            status: status.as_u16(),
            code,
            message,
        })
    }

    /// https://developers.paymongo.com/reference/create-a-paymentintent
    pub async fn create_payment_intent(
        &self,
        amount_minor: i32,
        currency: &str,
        description: &str,
        metadata: HashMap<String, String>,
    ) -> Result<ProviderIntent, ProviderError> {
        let body = json!({
            "data": {
                "attributes": {
                    "amount": amount_minor,
                    "currency": currency,
                    "capture_type": "automatic",
                    "payment_method_allowed": ["card", "gcash"],
                    "description": description,
                    "metadata": metadata,
                }
            }
        });

        let request = self
            .http
            .post(self.base_url.join("v1/payment_intents")?)
            .header(CONTENT_TYPE, "application/json")
            .json(&body);
        let envelope: Envelope<IntentAttributes> =
            self.send(request, "create payment intent").await?;

        Ok(ProviderIntent::from_envelope(envelope))
    }

    /// Card data goes straight to the provider and is not kept anywhere locally.
    pub async fn create_payment_method(
        &self,
        details: &PaymentMethodDetails,
        billing: Option<&BillingDetails>,
    ) -> Result<String, ProviderError> {
        let mut attributes = match details {
            PaymentMethodDetails::Card(card) => json!({
                "type": "card",
                "details": CardPayload {
                    card_number: &card.card_number,
                    exp_month: card.exp_month,
                    exp_year: card.exp_year,
                    cvc: &card.cvc,
                },
            }),
            PaymentMethodDetails::GCash => json!({ "type": "gcash" }),
        };

        if let Some(billing) = billing {
            attributes["billing"] = json!({
                "name": billing.name,
                "email": billing.email,
                "phone": billing.phone,
            });
        }

        let request = self
            .http
            .post(self.base_url.join("v1/payment_methods")?)
            .header(CONTENT_TYPE, "application/json")
            .json(&json!({ "data": { "attributes": attributes } }));

        #[derive(Deserialize)]
        struct MethodAttributes {}

        let envelope: Envelope<MethodAttributes> =
            self.send(request, "create payment method").await?;
        Ok(envelope.data.id)
    }

    /// Attaching a method is what submits the payment for processing.
    pub async fn attach_payment_method(
        &self,
        provider_intent_id: &str,
        payment_method_id: &str,
        return_url: &str,
    ) -> Result<ProviderIntent, ProviderError> {
        let body = json!({
            "data": {
                "attributes": {
                    "payment_method": payment_method_id,
                    "return_url": return_url,
                }
            }
        });

        let request = self
            .http
            .post(
                self.base_url
                    .join(&format!("v1/payment_intents/{}/attach", provider_intent_id))?,
            )
            .header(CONTENT_TYPE, "application/json")
            .json(&body);
        let envelope: Envelope<IntentAttributes> =
            self.send(request, "attach payment method").await?;

        Ok(ProviderIntent::from_envelope(envelope))
    }

    pub async fn retrieve_payment_intent(
        &self,
        provider_intent_id: &str,
    ) -> Result<ProviderIntent, ProviderError> {
        let request = self.http.get(
            self.base_url
                .join(&format!("v1/payment_intents/{}", provider_intent_id))?,
        );
        let envelope: Envelope<IntentAttributes> =
            self.send(request, "retrieve payment intent").await?;

        Ok(ProviderIntent::from_envelope(envelope))
    }

    /// Verifies the `Paymongo-Signature` header (`t=<ts>,te=<test sig>,li=<live sig>`).
    /// https://developers.paymongo.com/docs/securing-a-webhook
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, ProviderError> {
        self.verify_webhook_signature_at(payload, signature_header, Utc::now().timestamp())
    }

    /// Same as [`Self::verify_webhook_signature`] with the clock passed in.
    pub fn verify_webhook_signature_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now_secs: i64,
    ) -> Result<WebhookEvent, ProviderError> {
        let mut timestamp: Option<&str> = None;
        let mut test_signature: Option<&str> = None;
        let mut live_signature: Option<&str> = None;

        for part in signature_header.split(',') {
            let part = part.trim();
            if let Some(rest) = part.strip_prefix("t=") {
                timestamp = Some(rest);
            } else if let Some(rest) = part.strip_prefix("te=") {
                test_signature = Some(rest).filter(|value| !value.is_empty());
            } else if let Some(rest) = part.strip_prefix("li=") {
                live_signature = Some(rest).filter(|value| !value.is_empty());
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| ProviderError::Signature("missing timestamp".to_string()))?;
        let signature = live_signature
            .or(test_signature)
            .ok_or_else(|| ProviderError::Signature("missing signature".to_string()))?;
        let provided = hex::decode(signature)
            .map_err(|err| ProviderError::Signature(format!("signature is not hex: {err}")))?;

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|err| ProviderError::Signature(err.to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&provided)
            .map_err(|_| ProviderError::Signature("signature mismatch".to_string()))?;

        let signed_at: i64 = timestamp
            .parse()
            .map_err(|_| ProviderError::Signature("timestamp is not a number".to_string()))?;
        if (now_secs - signed_at).abs() > self.webhook_tolerance_secs {
            return Err(ProviderError::Signature(format!(
                "timestamp {signed_at} is outside the {}s tolerance",
                self.webhook_tolerance_secs
            )));
        }

        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PayMongoClient {
        PayMongoClient::new("sk_test_key".to_string(), "whsk_test".to_string()).unwrap()
    }

    fn sign(secret: &str, timestamp: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    fn paid_event() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "data": {
                "id": "evt_1",
                "type": "event",
                "attributes": {
                    "type": "payment.paid",
                    "livemode": false,
                    "data": {
                        "id": "pay_1",
                        "type": "payment",
                        "attributes": { "payment_intent_id": "pi_123" }
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_signature_yields_event() {
        let payload = paid_event();
        let header = format!("t=1700000000,te={},li=", sign("whsk_test", "1700000000", &payload));

        let event = client()
            .verify_webhook_signature_at(&payload, &header, 1700000010)
            .unwrap();

        assert_eq!(event.event_type(), EVENT_PAYMENT_PAID);
        assert_eq!(event.payment_intent_id().as_deref(), Some("pi_123"));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let payload = paid_event();
        let header = format!("t=1700000000,te={},li=", sign("whsk_test", "1700000000", &payload));
        let mut tampered = payload.clone();
        tampered.push(b' ');

        let result = client().verify_webhook_signature_at(&tampered, &header, 1700000010);

        assert!(matches!(result, Err(ProviderError::Signature(_))));
    }

    #[test]
    fn test_header_without_signature_is_rejected() {
        let result =
            client().verify_webhook_signature_at(&paid_event(), "t=1700000000,te=,li=", 1700000010);

        assert!(matches!(result, Err(ProviderError::Signature(_))));
    }

    #[test]
    fn test_outage_statuses_are_transient() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::GATEWAY_TIMEOUT,
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
        ] {
            assert!(is_transient_status(status), "{status}");
        }
        for status in [StatusCode::BAD_REQUEST, StatusCode::PAYMENT_REQUIRED, StatusCode::NOT_FOUND] {
            assert!(!is_transient_status(status), "{status}");
        }
    }

    #[test]
    fn test_replayed_signature_outside_tolerance_is_rejected() {
        let payload = paid_event();
        let header = format!("t=1700000000,te={},li=", sign("whsk_test", "1700000000", &payload));
        let client = client().with_webhook_tolerance(60);

        assert!(client.verify_webhook_signature_at(&payload, &header, 1700000059).is_ok());
        let stale = client.verify_webhook_signature_at(&payload, &header, 1700000061);
        assert!(matches!(stale, Err(ProviderError::Signature(ref reason)) if reason.contains("tolerance")));
    }

    #[test]
    fn test_current_signature_passes_with_real_clock() {
        let payload = paid_event();
        let now = Utc::now().timestamp().to_string();
        let header = format!("t={now},te=,li={}", sign("whsk_test", &now, &payload));

        assert!(client().verify_webhook_signature(&payload, &header).is_ok());
    }

    fn intent(attributes: serde_json::Value) -> ProviderIntent {
        let envelope: Envelope<IntentAttributes> = serde_json::from_value(json!({
            "data": { "id": "pi_123", "type": "payment_intent", "attributes": attributes }
        }))
        .unwrap();
        ProviderIntent::from_envelope(envelope)
    }

    #[test]
    fn test_redirect_intent_maps_to_requires_action() {
        let intent = intent(json!({
            "status": "awaiting_next_action",
            "next_action": {
                "type": "redirect",
                "redirect": { "url": "https://pm.link/gcash/auth", "return_url": "https://app/return" }
            }
        }));

        assert_eq!(intent.status(), PaymentStatus::RequiresAction);
        assert_eq!(
            intent.outcome(),
            ProcessOutcome::RequiresAction {
                redirect_url: "https://pm.link/gcash/auth".to_string()
            }
        );
    }

    #[test]
    fn test_declined_attempt_maps_to_failed() {
        let intent = intent(json!({
            "status": "awaiting_payment_method",
            "last_payment_error": { "failed_code": "card_declined", "failed_message": "Card was declined." }
        }));

        assert_eq!(
            intent.outcome(),
            ProcessOutcome::Failed {
                reason: "Card was declined.".to_string()
            }
        );
    }

    #[test]
    fn test_fresh_and_unknown_statuses() {
        assert_eq!(
            intent(json!({ "status": "awaiting_payment_method" })).status(),
            PaymentStatus::Created
        );
        assert_eq!(
            intent(json!({ "status": "something_new" })).outcome(),
            ProcessOutcome::Processing
        );
        assert_eq!(
            intent(json!({ "status": "succeeded" })).outcome(),
            ProcessOutcome::Succeeded
        );
    }
}
