//! HTTP client for the channel gateway, implementing [`engine::MessageSource`].

pub mod client;
pub mod convert;
pub mod types;

pub use client::GatewayClient;
