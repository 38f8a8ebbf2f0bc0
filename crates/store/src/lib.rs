//! Storage backends for Parley.
//!
//! Both backends implement the full [`parley_core::Storage`] contract:
//! chats, messages, the translation cache, and action key/value storage.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
