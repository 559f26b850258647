use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::enums::features::Feature;

/// A numeric entitlement. The plan catalog stores `0` to mean "no cap"; that
/// convention stops here and never reaches callers as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Unlimited,
    Capped(u32),
}

impl Limit {
    pub fn from_catalog(raw: u32) -> Self {
        if raw == 0 {
            Limit::Unlimited
        } else {
            Limit::Capped(raw)
        }
    }

    pub fn allows(&self, used: u32) -> bool {
        match self {
            Limit::Unlimited => true,
            Limit::Capped(max) => used < *max,
        }
    }

    pub fn remaining(&self, used: u32) -> Option<u32> {
        match self {
            Limit::Unlimited => None,
            Limit::Capped(max) => Some(max.saturating_sub(used)),
        }
    }

    pub fn as_option(&self) -> Option<u32> {
        match self {
            Limit::Unlimited => None,
            Limit::Capped(max) => Some(*max),
        }
    }
}

/// Per-feature numeric limits attached to a plan. Stored as JSONB.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct PlanLimits(BTreeMap<Feature, u32>);

impl PlanLimits {
    pub fn new(limits: BTreeMap<Feature, u32>) -> Self {
        Self(limits)
    }

    /// Features without a catalog entry carry no numeric cap.
    pub fn limit_for(&self, feature: Feature) -> Limit {
        self.0
            .get(&feature)
            .copied()
            .map(Limit::from_catalog)
            .unwrap_or(Limit::Unlimited)
    }

    pub fn with(mut self, feature: Feature, raw: u32) -> Self {
        self.0.insert(feature, raw);
        self
    }
}
