pub mod billing_cycles;
pub mod credit_types;
pub mod features;
pub mod payment_methods;
pub mod payment_statuses;
pub mod plan_tiers;
pub mod subscription_statuses;
pub mod user_roles;
