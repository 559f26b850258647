pub mod paymongo_client;
