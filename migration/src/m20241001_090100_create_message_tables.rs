use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // Direct messages are stored whether or not the receiver is online
        db.execute_unprepared(
            r#"
            CREATE TABLE IF NOT EXISTS social_network.messages (
                id SERIAL PRIMARY KEY,
                sender_id INTEGER NOT NULL REFERENCES social_network.users(id) ON DELETE CASCADE,
                receiver_id INTEGER NOT NULL REFERENCES social_network.users(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .await?;

        db.execute_unprepared(
            r#"
            CREATE INDEX IF NOT EXISTS messages_conversation_idx
                ON social_network.messages (sender_id, receiver_id, created_at)
        "#,
        )
        .await?;

        // chat_id names a room owned elsewhere, so it carries no foreign key
        db.execute_unprepared(
            r#"
            CREATE TABLE IF NOT EXISTS social_network.group_messages (
                id SERIAL PRIMARY KEY,
                sender_id INTEGER NOT NULL REFERENCES social_network.users(id) ON DELETE CASCADE,
                chat_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .await?;

        db.execute_unprepared(
            r#"
            CREATE INDEX IF NOT EXISTS group_messages_chat_idx
                ON social_network.group_messages (chat_id, created_at)
        "#,
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared("DROP TABLE IF EXISTS social_network.group_messages")
            .await?;
        db.execute_unprepared("DROP TABLE IF EXISTS social_network.messages")
            .await?;

        Ok(())
    }
}
