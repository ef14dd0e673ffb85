//! Database-backed session validation for the WebSocket upgrade, plus the
//! periodic sweep of expired session rows.

use crate::error::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entity_api::session;
use log::*;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use ws::session::{Session, SessionValidator};

/// Resolves session cookies against the `sessions` table.
pub struct DbSessionValidator {
    db: Arc<DatabaseConnection>,
}

impl DbSessionValidator {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionValidator for DbSessionValidator {
    async fn resolve(&self, token: &str) -> ws::Result<Option<Session>> {
        let found = session::find_by_token(self.db.as_ref(), token)
            .await
            .map_err(ws::Error::session_store)?;

        Ok(found.map(|model| Session {
            user_id: model.user_id,
            expires_at: DateTime::<Utc>::from(model.expires_at),
        }))
    }
}

/// Deletes every session that has expired by now.
pub async fn purge_expired(db: &DatabaseConnection) -> Result<u64, Error> {
    Ok(session::delete_expired(db, Utc::now()).await?)
}

/// Runs [`purge_expired`] every `interval` until the returned task is aborted.
/// Live WebSocket connections are not affected by the rows it removes.
pub fn spawn_expired_session_sweep(
    db: Arc<DatabaseConnection>,
    interval: Duration,
) -> JoinHandle<()> {
    info!("Purging expired sessions every {interval:?}");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = purge_expired(db.as_ref()).await {
                // Retried on the next tick
                warn!("Expired session sweep failed: {e}");
            }
        }
    })
}
