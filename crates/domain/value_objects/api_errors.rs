use serde::{Deserialize, Serialize};

pub const CODE_BAD_REQUEST: &str = "BAD_REQUEST";
pub const CODE_UNAUTHORIZED: &str = "UNAUTHORIZED";
pub const CODE_FORBIDDEN: &str = "FORBIDDEN";
pub const CODE_NOT_FOUND: &str = "NOT_FOUND";
pub const CODE_CONFLICT: &str = "CONFLICT";
pub const CODE_INSUFFICIENT_CREDITS: &str = "INSUFFICIENT_CREDITS";
pub const CODE_PAYMENT_METHOD: &str = "PAYMENT_METHOD_ERROR";
pub const CODE_PAYMENT_PROCESSING: &str = "PAYMENT_PROCESSING_ERROR";
pub const CODE_PROVIDER_UNAVAILABLE: &str = "PROVIDER_UNAVAILABLE";
pub const CODE_INTERNAL: &str = "INTERNAL_ERROR";

/// Body of every non-2xx API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub code: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<i32>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.into(),
            error: error.into(),
            requested: None,
            available: None,
        }
    }

    pub fn insufficient_credits(requested: i32, available: i32) -> Self {
        Self {
            requested: Some(requested),
            available: Some(available),
            ..Self::new(
                CODE_INSUFFICIENT_CREDITS,
                format!("insufficient credits: requested {requested}, available {available}"),
            )
        }
    }
}
