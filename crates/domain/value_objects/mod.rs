pub mod api_errors;
pub mod credits;
pub mod entitlements;
pub mod enums;
pub mod iam;
pub mod payments;
pub mod plans;
pub mod subscriptions;
