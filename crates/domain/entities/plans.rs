use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::{
        enums::{billing_cycles::BillingCycle, plan_tiers::PlanTier},
        plans::PlanLimits,
    },
    infra::db::postgres::schema::plans,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntity {
    pub id: Uuid,
    pub name: String,
    pub tier: PlanTier,
    pub price_monthly_minor: i32,
    pub price_yearly_minor: i32,
    pub currency: String,
    pub limits: PlanLimits,
    pub is_active: bool,
}

impl PlanEntity {
    pub fn price_for(&self, cycle: BillingCycle) -> i32 {
        match cycle {
            BillingCycle::Monthly => self.price_monthly_minor,
            BillingCycle::Yearly => self.price_yearly_minor,
        }
    }

    pub fn is_free_for(&self, cycle: BillingCycle) -> bool {
        self.price_for(cycle) <= 0
    }
}

/// Raw row used for Diesel queries. Tier and limits are parsed into typed values.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable, Insertable)]
#[diesel(table_name = plans)]
pub struct PlanRow {
    pub id: Uuid,
    pub name: String,
    pub tier: String,
    pub price_monthly_minor: i32,
    pub price_yearly_minor: i32,
    pub currency: String,
    pub limits: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PlanRow> for PlanEntity {
    type Error = anyhow::Error;

    fn try_from(value: PlanRow) -> Result<Self, Self::Error> {
        let tier = PlanTier::from_str(&value.tier)
            .ok_or_else(|| anyhow::anyhow!("plan {} has unknown tier {}", value.id, value.tier))?;
        let limits = serde_json::from_value(value.limits).unwrap_or_default();

        Ok(Self {
            id: value.id,
            name: value.name,
            tier,
            price_monthly_minor: value.price_monthly_minor,
            price_yearly_minor: value.price_yearly_minor,
            currency: value.currency,
            limits,
            is_active: value.is_active,
        })
    }
}
