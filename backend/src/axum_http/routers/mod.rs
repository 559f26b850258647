pub mod credits;
pub mod entitlements;
pub mod payments;
pub mod subscriptions;
