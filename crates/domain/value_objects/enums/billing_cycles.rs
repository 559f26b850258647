use std::fmt::Display;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "monthly" => Some(BillingCycle::Monthly),
            "yearly" => Some(BillingCycle::Yearly),
            _ => None,
        }
    }

    /// End of a billing period that starts at `starts_at`.
    pub fn period_end(&self, starts_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let months = match self {
            BillingCycle::Monthly => Months::new(1),
            BillingCycle::Yearly => Months::new(12),
        };
        starts_at.checked_add_months(months)
    }
}

impl Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn period_end_follows_calendar_months() {
        let start = Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap();

        let monthly = BillingCycle::Monthly.period_end(start).unwrap();
        assert_eq!(monthly, Utc.with_ymd_and_hms(2026, 2, 28, 12, 0, 0).unwrap());

        let yearly = BillingCycle::Yearly.period_end(start).unwrap();
        assert_eq!(yearly, Utc.with_ymd_and_hms(2027, 1, 31, 12, 0, 0).unwrap());
    }
}
