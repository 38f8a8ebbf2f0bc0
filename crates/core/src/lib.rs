//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley conversational
//! agent core. This crate has **zero framework dependencies**: it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator (store, completion service, transport, model catalog)
//! is defined as a trait here. Implementations live in their respective
//! crates, so tests can swap in in-memory stores and scripted providers.

pub mod catalog;
pub mod chat;
pub mod chat_handle;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use catalog::{ModelCatalog, StaticModelCatalog};
pub use chat::Chat;
pub use chat_handle::{ChatHandle, IncomingMessage};
pub use error::{ActionError, ChatError, Error, ProviderError, Result, StoreError};
pub use event::{DomainEvent, EventBus};
pub use message::{ContentBlock, Message, MessageData, Modality, Role};
pub use provider::{
    CompletionRequest, CompletionResponse, Provider, ToolDefinition, Usage, WireContent,
    WireMessage, WirePart, WireRole, WireToolCall,
};
pub use store::{
    ConversationStore, KeyValueStore, ScopedStorage, Storage, StorageScope, TranslationCache,
};
