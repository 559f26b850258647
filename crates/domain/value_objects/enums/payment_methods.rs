use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodKind {
    Card,
    #[serde(rename = "gcash")]
    GCash,
}

impl PaymentMethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethodKind::Card => "card",
            PaymentMethodKind::GCash => "gcash",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "card" => Some(PaymentMethodKind::Card),
            "gcash" => Some(PaymentMethodKind::GCash),
            _ => None,
        }
    }

    /// E-wallets settle out of band after the buyer approves on the wallet's page.
    pub fn requires_redirect(&self) -> bool {
        matches!(self, PaymentMethodKind::GCash)
    }
}

impl Display for PaymentMethodKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
