//! Domain layer: binds the real-time core in `ws` to the database through `entity_api`.
//!
//! `ws` defines the two capabilities it needs from the outside world,
//! `SessionValidator` and `MessageStore`; this crate provides the
//! database-backed implementations and the error translation between layers.

// Re-exports from `entity` crate via `entity_api`
pub use entity_api::{group_messages, messages, sessions, users, Id};

pub mod error;
pub mod message;
pub mod session;
pub mod user;
