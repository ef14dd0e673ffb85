use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared("CREATE SCHEMA IF NOT EXISTS social_network;")
            .await?;

        db.execute_unprepared("SET search_path TO social_network, public;")
            .await?;

        db.execute_unprepared(
            r#"
            CREATE TABLE IF NOT EXISTS social_network.users (
                id SERIAL PRIMARY KEY,
                email VARCHAR(255) NOT NULL UNIQUE,
                nickname VARCHAR(255),
                first_name VARCHAR(255),
                last_name VARCHAR(255),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .await?;

        // session_id is the opaque cookie value, not a surrogate key
        db.execute_unprepared(
            r#"
            CREATE TABLE IF NOT EXISTS social_network.sessions (
                session_id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES social_network.users(id) ON DELETE CASCADE,
                expires_at TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .await?;

        // Supports the periodic expired-session sweep
        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS sessions_expires_at_idx ON social_network.sessions (expires_at)",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared("DROP TABLE IF EXISTS social_network.sessions")
            .await?;
        db.execute_unprepared("DROP TABLE IF EXISTS social_network.users")
            .await?;
        db.execute_unprepared("DROP SCHEMA IF EXISTS social_network CASCADE;")
            .await?;

        Ok(())
    }
}
