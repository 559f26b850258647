pub mod credit_ledger;
pub mod credit_packages;
pub mod payment_intents;
pub mod plans;
pub mod subscriptions;
