//! Real-time presence and message fan-out over WebSocket.
//!
//! This crate owns every live client connection of the process and moves chat
//! messages between them. It knows nothing about HTTP routing or the database:
//! sessions are resolved through [`session::SessionValidator`] and messages are
//! persisted through [`store::MessageStore`], both implemented by the `domain`
//! crate.
//!
//! # Architecture
//!
//! - **Authenticate once, at upgrade**: the session token is resolved before the
//!   handshake completes. A missing, unknown or expired session never produces a
//!   `Connection`. Expiry is not re-checked while the connection lives.
//! - **Single-lock registry**: one mutex guards insertion, removal and the
//!   membership snapshot taken by each fan-out. It also keeps a per-user index so
//!   direct messages reach every device of a user without a full scan.
//! - **Bounded outbound queue per connection**: enqueueing never blocks. A full
//!   queue marks the connection as a slow consumer; it is torn down and removed,
//!   and its siblings are unaffected.
//! - **Two pumps per connection**: a read pump (inbound frames, idle deadline)
//!   and a write pump (queue drain, keepalive pings, write timeout). They share
//!   only the outbound queue and a teardown trigger. Either one stopping tears
//!   the connection down.
//! - **Best-effort, at-most-once delivery**: offline recipients simply miss the
//!   live copy; the persisted row is the source of truth.
//!
//! # Message Flow
//!
//! 1. `GET /ws` with a session cookie; `Manager::authenticate` resolves the user
//! 2. The upgraded socket is handed to `Manager::serve`
//! 3. A `Connection` is created, registered, and both pumps are started
//! 4. Inbound `direct_message` / `group_message` frames go to the `Dispatcher`,
//!    which persists them on a separate task and concurrently enqueues the
//!    outbound copy on every eligible connection
//! 5. Each write pump drains its own queue to its own socket
//!
//! # Example: pushing a server-side event
//!
//! ```rust,ignore
//! use ws::message::{ErrorReason, Message, MessageScope, Outbound};
//!
//! app_state.ws_manager.publish(Message {
//!     event: Outbound::Error {
//!         request_id: None,
//!         reason: ErrorReason::PersistenceFailed,
//!     },
//!     scope: MessageScope::User { user_id },
//! });
//! ```
//!
//! # Modules
//!
//! - `connection`: per-connection state, bounded queue and teardown
//! - `dispatch`: maps inbound messages to registry deliveries
//! - `frame`: transport-neutral frames and the axum socket adapter
//! - `manager`: process-wide entry point (auth, serve, publish, shutdown)
//! - `message`: wire protocol types
//! - `pump`: read and write loops
//! - `registry`: live connection set and fan-out
//! - `session`: session gate in front of the upgrade
//! - `store`: persistence seam for chat messages

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod manager;
pub mod message;
pub mod pump;
pub mod registry;
pub mod session;
pub mod store;

pub use connection::{ConnectionSettings, UserId};
pub use error::{Error, Result};
pub use manager::{Manager, Presence};
