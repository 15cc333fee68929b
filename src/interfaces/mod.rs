//! Inbound adapters: the HTTP API and the checkout order import.

pub mod http;
pub mod json;
