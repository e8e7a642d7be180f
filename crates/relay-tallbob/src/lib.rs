//! relay-tallbob: Tall Bob SMS/MMS provider for the relay
//!
//! Implements `relay_core::ProviderGateway` over the Tall Bob v2 REST API
//! and parses the provider's webhook bodies.

pub mod client;
pub mod error;
pub mod webhook;

pub use client::TallBobClient;
pub use error::{Result, TallBobError};
pub use webhook::{parse_delivery, parse_incoming};
