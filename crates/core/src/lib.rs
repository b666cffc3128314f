//! Authflow core types and session primitives

pub mod error;
pub mod session;
pub mod storage;
pub mod token_store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use session::{NavigationSink, NullNavigation, SessionLifecycle};
pub use storage::{KeyValueStore, MemoryStore, keys};
pub use token_store::TokenStore;
pub use types::{SessionState, Token, User};
