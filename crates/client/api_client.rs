use async_trait::async_trait;
use mockall::automock;
use reqwest::{StatusCode, header::AUTHORIZATION};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::domain::value_objects::{
    api_errors::{
        CODE_INSUFFICIENT_CREDITS, CODE_PAYMENT_METHOD, CODE_PAYMENT_PROCESSING,
        CODE_PROVIDER_UNAVAILABLE, ErrorResponse,
    },
    credits::{
        BalancesResponse, ConsumeCreditsRequest, ConsumeCreditsResponse, CreditBalanceDto,
        PurchaseCreditsRequest, PurchaseCreditsResponse,
    },
    entitlements::EntitlementsResponse,
    enums::credit_types::CreditType,
    payments::{
        CreatePaymentMethodRequest, CreatePaymentMethodResponse, PaymentStatusResponse,
        ProcessPaymentRequest, ProcessPaymentResponse,
    },
    subscriptions::{SubscribeRequest, SubscribeResponse},
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("insufficient credits: requested {requested}, available {available}")]
    InsufficientCredits { requested: i32, available: i32 },
    /// Card or wallet details were rejected. The caller may fix them and retry.
    #[error("{0}")]
    PaymentMethod(String),
    /// The payment itself failed. Retrying needs a new payment intent.
    #[error("{0}")]
    PaymentProcessing(String),
    /// Polling gave up while the provider still reported the payment as in flight.
    #[error("payment {payment_intent_id} is still processing")]
    PaymentTimeout { payment_intent_id: Uuid },
    #[error("network error: {0}")]
    Network(String),
    #[error("api error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
}

impl ClientError {
    /// Transport failures, gateway or timeout statuses and provider outages
    /// may clear up on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Api { status, code, .. } => {
                *status >= 500
                    || *status == StatusCode::REQUEST_TIMEOUT.as_u16()
                    || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
                    || code == CODE_PROVIDER_UNAVAILABLE
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Network(err.to_string())
    }
}

/// Server endpoints used by client-side flows.
#[automock]
#[async_trait]
pub trait EntitlementsApi {
    async fn balances(&self, credit_type: Option<CreditType>) -> Result<Vec<CreditBalanceDto>, ClientError>;

    async fn consume(&self, request: ConsumeCreditsRequest) -> Result<ConsumeCreditsResponse, ClientError>;

    async fn purchase(&self, request: PurchaseCreditsRequest) -> Result<PurchaseCreditsResponse, ClientError>;

    async fn subscribe(&self, request: SubscribeRequest) -> Result<SubscribeResponse, ClientError>;

    async fn entitlements(&self) -> Result<EntitlementsResponse, ClientError>;

    async fn create_payment_method(
        &self,
        request: CreatePaymentMethodRequest,
    ) -> Result<CreatePaymentMethodResponse, ClientError>;

    async fn process_payment(
        &self,
        request: ProcessPaymentRequest,
    ) -> Result<ProcessPaymentResponse, ClientError>;

    async fn payment_status(&self, payment_intent_id: Uuid) -> Result<PaymentStatusResponse, ClientError>;
}

/// `EntitlementsApi` over HTTP with a bearer token.
pub struct HttpEntitlementsApi {
    http: reqwest::Client,
    base_url: Url,
    access_token: String,
}

impl HttpEntitlementsApi {
    pub fn new(base_url: &str, access_token: String) -> Result<Self, url::ParseError> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: Url::parse(base_url)?,
            access_token,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|err| ClientError::Network(format!("invalid url {path}: {err}")))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .send()
            .await?;
        Self::read(resp).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, ClientError> {
        let resp = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .json(body)
            .send()
            .await?;
        Self::read(resp).await
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }

        let body = resp.text().await.unwrap_or_default();
        let error = error_from_body(status, &body);
        warn!(status = %status, error = %error, "entitlements client: request failed");
        Err(error)
    }
}

pub(crate) fn error_from_body(status: StatusCode, body: &str) -> ClientError {
    let Ok(response) = serde_json::from_str::<ErrorResponse>(body) else {
        if status.is_server_error() {
            return ClientError::Network(format!("server responded with {status}"));
        }
        return ClientError::Api {
            status: status.as_u16(),
            code: status.canonical_reason().unwrap_or("UNKNOWN").to_string(),
            message: body.to_string(),
        };
    };

    match response.code.as_str() {
        CODE_INSUFFICIENT_CREDITS => ClientError::InsufficientCredits {
            requested: response.requested.unwrap_or_default(),
            available: response.available.unwrap_or_default(),
        },
        CODE_PAYMENT_METHOD => ClientError::PaymentMethod(response.error),
        CODE_PAYMENT_PROCESSING => ClientError::PaymentProcessing(response.error),
        _ => ClientError::Api {
            status: status.as_u16(),
            code: response.code,
            message: response.error,
        },
    }
}

#[async_trait]
impl EntitlementsApi for HttpEntitlementsApi {
    async fn balances(&self, credit_type: Option<CreditType>) -> Result<Vec<CreditBalanceDto>, ClientError> {
        let mut url = self.url("api/credits/balance")?;
        if let Some(credit_type) = credit_type {
            url.query_pairs_mut()
                .append_pair("creditType", credit_type.as_str());
        }
        let response: BalancesResponse = self.get(url).await?;
        Ok(response.balances)
    }

    async fn consume(&self, request: ConsumeCreditsRequest) -> Result<ConsumeCreditsResponse, ClientError> {
        self.post(self.url("api/credits/consume")?, &request).await
    }

    async fn purchase(&self, request: PurchaseCreditsRequest) -> Result<PurchaseCreditsResponse, ClientError> {
        self.post(self.url("api/credits/purchase")?, &request).await
    }

    async fn subscribe(&self, request: SubscribeRequest) -> Result<SubscribeResponse, ClientError> {
        self.post(self.url("api/subscription/subscribe")?, &request)
            .await
    }

    async fn entitlements(&self) -> Result<EntitlementsResponse, ClientError> {
        self.get(self.url("api/entitlements")?).await
    }

    async fn create_payment_method(
        &self,
        request: CreatePaymentMethodRequest,
    ) -> Result<CreatePaymentMethodResponse, ClientError> {
        self.post(self.url("api/payment/method")?, &request).await
    }

    async fn process_payment(
        &self,
        request: ProcessPaymentRequest,
    ) -> Result<ProcessPaymentResponse, ClientError> {
        self.post(self.url("api/payment/process")?, &request).await
    }

    async fn payment_status(&self, payment_intent_id: Uuid) -> Result<PaymentStatusResponse, ClientError> {
        let mut url = self.url("api/payment/process")?;
        url.query_pairs_mut()
            .append_pair("paymentIntentId", &payment_intent_id.to_string());
        self.get(url).await
    }
}
