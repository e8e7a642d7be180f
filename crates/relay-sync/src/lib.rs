//! relay-sync: message synchronization between the provider and the CRM
//!
//! `SyncEngine` owns both directions of the relay. Outbound sends go to the
//! provider first and are mirrored into the CRM as a best-effort step;
//! inbound webhooks are projected into CRM contacts and conversations and
//! always acknowledged.

pub mod engine;
pub mod error;
pub mod resolver;

pub use engine::{InboundOutcome, OutboundState, StepOutcome, SyncEngine, SyncResult, WebhookAck};
pub use error::{Result, SyncError};
pub use resolver::{ContactResolver, ResolvedContact};
