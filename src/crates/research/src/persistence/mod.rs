//! External persistence collaborators (spec §6 relational tables, object
//! storage) and the deterministic chat-title derivation used once a session
//! completes (SPEC_FULL.md §C.4).

pub mod object_storage;
pub mod session_store;
pub mod title;

pub use object_storage::{InMemoryObjectStorage, ObjectStorage};
pub use session_store::{
    AgentLogEntry, InMemorySessionStore, SessionRecord, SessionStatus, SessionStore,
};
pub use title::derive_title;
