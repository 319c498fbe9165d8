pub mod auth;
pub mod availability;
pub mod backend;
pub mod cli;
pub mod client;
pub mod configuration;
pub mod configuration_handler;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod operations;
pub mod queries;
pub mod query;
pub mod response;
pub mod session;
#[cfg(test)]
mod testutils;
pub mod types;
