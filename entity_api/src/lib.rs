use log::*;
use sea_orm::DatabaseConnection;

pub use entity::{group_messages, messages, sessions, users, Id};

pub mod error;
pub mod group_message;
pub mod message;
pub mod session;
pub mod user;

/// Inserts a handful of users with one live session each, for local
/// development against the WebSocket endpoint. Logs the session tokens.
pub async fn seed_database(db: &DatabaseConnection) -> Result<Vec<sessions::Model>, error::Error> {
    let people = [
        ("alice@example.com", "alice", "Alice", "Anders"),
        ("bob@example.com", "bob", "Bob", "Baker"),
        ("carol@example.com", "carol", "Carol", "Chen"),
    ];

    let mut seeded = Vec::with_capacity(people.len());

    for (email, nickname, first_name, last_name) in people {
        let user = match user::find_by_email(db, email).await? {
            Some(existing) => existing,
            None => {
                user::create(
                    db,
                    users::Model {
                        id: Default::default(),
                        email: email.to_owned(),
                        nickname: Some(nickname.to_owned()),
                        first_name: Some(first_name.to_owned()),
                        last_name: Some(last_name.to_owned()),
                        created_at: chrono::Utc::now().into(),
                    },
                )
                .await?
            }
        };

        let session = session::create(db, user.id).await?;
        info!(
            "Seeded user {} ({}) with session cookie value {}",
            user.id, user.email, session.session_id
        );
        seeded.push(session);
    }

    Ok(seeded)
}
