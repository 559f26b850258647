pub mod credits;
pub mod feature_gate;
pub mod payments;
pub mod subscriptions;
