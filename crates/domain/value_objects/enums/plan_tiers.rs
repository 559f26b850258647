use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Subscription tiers ordered by entitlement: every tier grants a superset of
/// the tier below it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Basic,
    Premium,
    Enterprise,
}

impl PlanTier {
    pub const ALL: [PlanTier; 4] = [
        PlanTier::Free,
        PlanTier::Basic,
        PlanTier::Premium,
        PlanTier::Enterprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Basic => "basic",
            PlanTier::Premium => "premium",
            PlanTier::Enterprise => "enterprise",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "free" => Some(PlanTier::Free),
            "basic" => Some(PlanTier::Basic),
            "premium" => Some(PlanTier::Premium),
            "enterprise" => Some(PlanTier::Enterprise),
            _ => None,
        }
    }
}

impl Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
