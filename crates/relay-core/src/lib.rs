//! relay-core: shared foundation of the SMS/CRM relay
//!
//! Holds the data model, the phone number normalizer, the provider and
//! CRM gateway traits with their error taxonomies, and configuration.

pub mod config;
pub mod crm;
pub mod error;
pub mod model;
pub mod phone;
pub mod provider;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::{
    ApiConfig, Config, GhlConfig, PhoneConfig, TallBobConfig, WebhookConfig, mask_secret,
};
pub use crm::CrmGateway;
pub use error::{CrmError, CrmResult, Error, ProviderError, ProviderResult, Result};
pub use model::{
    Channel, ContactUpsert, ConversationTarget, CrmContact, CrmConversationRef, CrmMessage,
    CustomField, DeliveryStatus, Direction, InboundEventType, InboundWebhookEvent, LocationRef,
    MessageStatus, MessageType, OutboundSendRequest, ProviderMessageResult, UpsertAction,
};
pub use phone::{NormalizedPhoneNumber, PhoneNormalizer};
pub use provider::{MmsSend, ProviderGateway, SmsSend};
