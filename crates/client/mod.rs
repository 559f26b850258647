pub mod api_client;
pub mod checkout;
pub mod optimistic;
pub mod poller;
pub mod wallet;
