//! relay-ghl: HighLevel CRM integration for the relay
//!
//! Implements `relay_core::CrmGateway` over the LeadConnector REST API.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_core::{CrmGateway, GhlConfig};
//! use relay_ghl::GhlClient;
//!
//! let client = GhlClient::new(&GhlConfig {
//!     token: "pit-...".to_string(),
//!     ..Default::default()
//! })?;
//!
//! let locations = client.list_locations().await?;
//! ```

pub mod client;
pub mod error;
pub mod models;

pub use client::GhlClient;
pub use error::{GhlError, Result};
