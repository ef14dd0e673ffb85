use crate::controller::ApiResponse;
use crate::extractors::authenticated_user::AuthenticatedUser;
use crate::response::presence::Presence;
use crate::{AppState, Error};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use domain::{user as UserApi, Id};

use log::*;

/// GET whether a User currently has live WebSocket connections
#[utoipa::path(
    get,
    path = "/presence/{user_id}",
    params(
        ("user_id" = i32, Path, description = "User id to look up")
    ),
    responses(
        (status = 200, description = "Successfully retrieved the User's presence", body = Presence),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User not found"),
    ),
    security(
        ("cookie_auth" = [])
    )
)]
pub async fn read(
    AuthenticatedUser(viewer_id): AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(user_id): Path<Id>,
) -> Result<impl IntoResponse, Error> {
    debug!("GET presence of User {user_id} for User {viewer_id}");

    // Unknown users are a 404 rather than simply offline
    let user = UserApi::find_by_id(app_state.db_conn_ref(), user_id).await?;

    let live = app_state.ws_manager.presence(user.id);
    let presence = Presence {
        user_id: live.user_id,
        online: live.online,
        connections: live.connections,
    };

    Ok(Json(ApiResponse::new(StatusCode::OK.into(), presence)))
}
