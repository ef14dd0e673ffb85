//! Lookups and housekeeping for login sessions.

use super::error::Error;
use chrono::{DateTime, Duration, Utc};
use entity::sessions::{ActiveModel, Column, Entity, Model};
use entity::Id;
use log::*;
use sea_orm::{entity::prelude::*, ActiveValue::Set, DatabaseConnection};

/// How long a freshly created session stays valid.
pub const SESSION_TTL_HOURS: i64 = 24;

/// Creates a session for `user_id` with a random opaque token, valid for [`SESSION_TTL_HOURS`].
pub async fn create(db: &DatabaseConnection, user_id: Id) -> Result<Model, Error> {
    let now = Utc::now();
    let session_id = uuid::Uuid::new_v4().to_string();

    debug!("Creating session for user_id: {user_id}");

    let active_model = ActiveModel {
        session_id: Set(session_id),
        user_id: Set(user_id),
        expires_at: Set((now + Duration::hours(SESSION_TTL_HOURS)).into()),
        created_at: Set(now.into()),
    };

    Ok(active_model.insert(db).await?)
}

/// Finds a session by its token regardless of expiry, so callers can tell
/// an unknown token from an expired one.
pub async fn find_by_token(db: &DatabaseConnection, token: &str) -> Result<Option<Model>, Error> {
    Ok(Entity::find_by_id(token.to_owned()).one(db).await?)
}

/// Deletes every session that expired at or before `now`; returns how many were removed.
pub async fn delete_expired(db: &DatabaseConnection, now: DateTime<Utc>) -> Result<u64, Error> {
    let result = Entity::delete_many()
        .filter(Column::ExpiresAt.lte(now))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        info!("Purged {} expired session(s)", result.rows_affected);
    }
    Ok(result.rows_affected)
}

#[cfg(test)]
#[cfg(feature = "mock")]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn session(token: &str, user_id: Id) -> Model {
        let now = Utc::now();
        Model {
            session_id: token.to_string(),
            user_id,
            expires_at: (now + Duration::hours(SESSION_TTL_HOURS)).into(),
            created_at: now.into(),
        }
    }

    #[tokio::test]
    async fn create_returns_a_session_for_the_user() -> Result<(), Error> {
        let expected = session("3f1c2a", 7);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![expected.clone()]])
            .into_connection();

        let created = create(&db, 7).await?;

        assert_eq!(created.user_id, 7);
        assert!(created.expires_at > created.created_at);
        Ok(())
    }

    #[tokio::test]
    async fn find_by_token_returns_the_session() -> Result<(), Error> {
        let expected = session("abc", 3);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![expected.clone()]])
            .into_connection();

        assert_eq!(find_by_token(&db, "abc").await?, Some(expected));
        Ok(())
    }

    #[tokio::test]
    async fn find_by_token_returns_none_for_unknown_token() -> Result<(), Error> {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results::<Model, Vec<Model>, _>(vec![vec![]])
            .into_connection();

        assert_eq!(find_by_token(&db, "missing").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn delete_expired_reports_rows_removed() -> Result<(), Error> {
        let now = Utc::now();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results(vec![MockExecResult {
                last_insert_id: 0,
                rows_affected: 3,
            }])
            .into_connection();

        assert_eq!(delete_expired(&db, now).await?, 3);
        Ok(())
    }
}
