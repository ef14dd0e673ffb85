//! WebSocket HTTP handler for the web layer.
//!
//! This module contains only the Axum handler for the `/ws` upgrade endpoint.
//! Connections, the registry and message dispatch live in the `ws` crate and
//! are reached through `AppState::ws_manager`.

pub mod handler;
