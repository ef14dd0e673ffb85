use crate::extractors::authenticated_user::AuthenticatedUser;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use log::*;
use service::AppState;

/// Upgrade an authenticated request to a long-lived WebSocket connection.
/// A user may hold any number of these at once, one per device or tab.
#[utoipa::path(
    get,
    path = "/ws",
    responses(
        (status = 101, description = "Switching protocols to a WebSocket connection"),
        (status = 401, description = "Missing, unknown or expired session"),
        (status = 500, description = "Session store unavailable")
    ),
    security(
        ("cookie_auth" = [])
    )
)]
pub(crate) async fn ws_handler(
    AuthenticatedUser(user_id): AuthenticatedUser,
    State(app_state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> Response {
    debug!("Upgrading WebSocket connection for user {user_id}");

    let manager = app_state.ws_manager.clone();

    upgrade
        .on_failed_upgrade(move |e| warn!("WebSocket upgrade for user {user_id} failed: {e}"))
        .on_upgrade(move |socket| async move { manager.serve(user_id, socket).await })
}
