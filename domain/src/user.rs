use crate::{error::Error, users, Id};
use entity_api::user;
use sea_orm::DatabaseConnection;

pub async fn find_by_id(db: &DatabaseConnection, id: Id) -> Result<users::Model, Error> {
    Ok(user::find_by_id(db, id).await?)
}
