pub mod credit_balances;
pub mod credit_packages;
pub mod credit_transactions;
pub mod payment_intents;
pub mod plans;
pub mod subscriptions;
