pub mod chain_poller;
pub mod client;
pub mod types;
