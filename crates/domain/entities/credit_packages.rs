use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::credit_types::CreditType,
    infra::db::postgres::schema::credit_packages,
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = credit_packages)]
pub struct CreditPackageEntity {
    pub id: Uuid,
    pub name: String,
    pub credit_type: String,
    pub credit_amount: i32,
    pub bonus_credits: i32,
    pub price_minor: i32,
    pub currency: String,
    pub validity_days: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl CreditPackageEntity {
    pub fn credit_type(&self) -> Option<CreditType> {
        CreditType::from_str(&self.credit_type)
    }

    /// Credits granted on purchase, bonus included.
    pub fn granted_credits(&self) -> i32 {
        self.credit_amount + self.bonus_credits
    }

    pub fn expiry_from(&self, purchased_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.validity_days
            .filter(|days| *days > 0)
            .and_then(|days| purchased_at.checked_add_signed(chrono::Duration::days(days.into())))
    }
}
