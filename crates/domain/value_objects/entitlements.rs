use serde::{Deserialize, Serialize};

use crate::domain::value_objects::enums::{
    billing_cycles::BillingCycle, features::Feature, plan_tiers::PlanTier,
};

/// Answer of the feature gate for a single feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureLimits {
    pub feature: Feature,
    pub allowed: bool,
    /// `None` together with `unlimited: true` means no cap.
    pub limit: Option<u32>,
    pub unlimited: bool,
    pub used: u32,
    pub remaining: Option<u32>,
    pub period: Option<BillingCycle>,
}

impl FeatureLimits {
    pub fn denied(feature: Feature, used: u32) -> Self {
        Self {
            feature,
            allowed: false,
            limit: Some(0),
            unlimited: false,
            used,
            remaining: Some(0),
            period: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementsResponse {
    pub success: bool,
    pub is_admin: bool,
    pub tier: Option<PlanTier>,
    pub features: Vec<FeatureLimits>,
}
