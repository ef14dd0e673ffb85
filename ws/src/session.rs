//! Session gate: the one place the real-time layer consults the session store.

use crate::connection::UserId;
use crate::error::{AuthFailure, Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use std::sync::Arc;

/// A session as recorded by the external session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

/// Maps an opaque session token to the session it names.
/// `Ok(None)` means the token is unknown.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Option<Session>>;
}

/// Authenticates upgrade requests exactly once, before any handshake completes.
/// Expiry is not re-checked for the life of the connection.
#[derive(Clone)]
pub struct SessionGate {
    validator: Arc<dyn SessionValidator>,
}

impl SessionGate {
    pub fn new(validator: Arc<dyn SessionValidator>) -> Self {
        Self { validator }
    }

    pub async fn authenticate(&self, token: Option<&str>) -> Result<UserId> {
        self.authenticate_at(token, Utc::now()).await
    }

    pub async fn authenticate_at(&self, token: Option<&str>, now: DateTime<Utc>) -> Result<UserId> {
        let token = match token.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => {
                debug!("Upgrade rejected: no session token");
                return Err(Error::unauthenticated(AuthFailure::MissingToken));
            }
        };

        let session = match self.validator.resolve(token).await? {
            Some(session) => session,
            None => {
                debug!("Upgrade rejected: unknown session token");
                return Err(Error::unauthenticated(AuthFailure::InvalidToken));
            }
        };

        if session.expires_at <= now {
            debug!(
                "Upgrade rejected: session for user {} expired at {}",
                session.user_id, session.expires_at
            );
            return Err(Error::unauthenticated(AuthFailure::ExpiredSession));
        }

        Ok(session.user_id)
    }
}
