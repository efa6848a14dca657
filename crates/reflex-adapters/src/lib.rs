//! `reflex-adapters`: the collaborators the engine talks to.
//!
//! Three adapter roles, each a trait: [`MessageAdapter`] delivers outgoing
//! envelopes, [`NluAdapter`] annotates text, [`StorageAdapter`] persists
//! memory and documents. [`Adapters`] holds whichever are loaded and drives
//! their start/shutdown lifecycle.

pub mod adapter;
pub mod error;
pub mod manager;
pub mod memory;
pub mod sqlite;

pub use adapter::{matches_params, Adapter, MessageAdapter, NluAdapter, StorageAdapter};
pub use error::{AdapterError, Result};
pub use manager::Adapters;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
