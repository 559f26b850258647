use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use entitlements::domain::value_objects::api_errors::{
    CODE_BAD_REQUEST, CODE_CONFLICT, CODE_FORBIDDEN, CODE_INTERNAL, CODE_NOT_FOUND, CODE_PAYMENT_METHOD,
    CODE_PAYMENT_PROCESSING, CODE_PROVIDER_UNAVAILABLE, CODE_UNAUTHORIZED, ErrorResponse,
};
use thiserror::Error;
use tracing::error;

use crate::usecases::{
    credits::CreditError, feature_gate::EntitlementsError, payments::PaymentError,
    subscriptions::SubscriptionError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("insufficient credits: requested {requested}, available {available}")]
    InsufficientCredits { requested: i32, available: i32 },

    #[error("{0}")]
    PaymentMethod(String),

    #[error("{0}")]
    PaymentProcessing(String),

    #[error("payment provider unavailable")]
    ProviderUnavailable,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::PaymentMethod(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PaymentProcessing(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::ProviderUnavailable => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            AppError::Unauthorized(_) => ErrorResponse::new(CODE_UNAUTHORIZED, "Unauthorized"),
            AppError::Forbidden(msg) => ErrorResponse::new(CODE_FORBIDDEN, msg.as_str()),
            AppError::BadRequest(msg) => ErrorResponse::new(CODE_BAD_REQUEST, msg.as_str()),
            AppError::Conflict(msg) => ErrorResponse::new(CODE_CONFLICT, msg.as_str()),
            AppError::NotFound(msg) => ErrorResponse::new(CODE_NOT_FOUND, msg.as_str()),
            AppError::InsufficientCredits {
                requested,
                available,
            } => ErrorResponse::insufficient_credits(*requested, *available),
            AppError::PaymentMethod(msg) => ErrorResponse::new(CODE_PAYMENT_METHOD, msg.as_str()),
            AppError::PaymentProcessing(msg) => {
                ErrorResponse::new(CODE_PAYMENT_PROCESSING, msg.as_str())
            }
            AppError::ProviderUnavailable => {
                ErrorResponse::new(CODE_PROVIDER_UNAVAILABLE, self.to_string())
            }
            // Don't leak internal error detail to client
            AppError::Internal(_) => ErrorResponse::new(CODE_INTERNAL, "Internal server error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(err) = &self {
            error!(error = ?err, "http: internal error");
        }

        (self.status_code(), Json(self.body())).into_response()
    }
}

impl From<CreditError> for AppError {
    fn from(err: CreditError) -> Self {
        match err {
            CreditError::InvalidAmount(_) => AppError::BadRequest(err.to_string()),
            CreditError::InsufficientCredits {
                requested,
                available,
            } => AppError::InsufficientCredits {
                requested,
                available,
            },
            CreditError::Forbidden => AppError::Forbidden(err.to_string()),
            CreditError::PackageNotFound => AppError::NotFound(err.to_string()),
            CreditError::Payment(err) => err.into(),
            CreditError::Internal(err) => AppError::Internal(err),
        }
    }
}

impl From<SubscriptionError> for AppError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::PlanNotFound | SubscriptionError::SubscriptionNotFound => {
                AppError::NotFound(err.to_string())
            }
            SubscriptionError::Payment(err) => err.into(),
            SubscriptionError::Internal(err) => AppError::Internal(err),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::IntentNotFound => AppError::NotFound(err.to_string()),
            PaymentError::PaymentMethod(msg) => AppError::PaymentMethod(msg),
            PaymentError::Processing(msg) => AppError::PaymentProcessing(msg),
            PaymentError::InvalidState(_) => AppError::Conflict(err.to_string()),
            PaymentError::InvalidWebhook(_) => AppError::BadRequest(err.to_string()),
            PaymentError::ProviderUnavailable(_) => AppError::ProviderUnavailable,
            PaymentError::Internal(err) => AppError::Internal(err),
        }
    }
}

impl From<EntitlementsError> for AppError {
    fn from(err: EntitlementsError) -> Self {
        match err {
            EntitlementsError::Internal(err) => AppError::Internal(err),
        }
    }
}
