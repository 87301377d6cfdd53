pub mod account;
pub mod config;
pub mod position;
pub mod snapshot;
