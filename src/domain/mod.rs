//! Domain types and storage ports.

pub mod order;
pub mod payment;
pub mod ports;
pub mod settings;
pub mod transitions;
