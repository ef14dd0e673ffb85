use crate::{
    controller::{health_check_controller, presence_controller},
    middleware::auth::require_auth,
    response, websocket, AppState,
};
use axum::{middleware::from_fn_with_state, routing::get, Router};

use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Social Network Real-time API"
        ),
        paths(
            health_check_controller::health_check,
            presence_controller::read,
            websocket::handler::ws_handler,
        ),
        components(
            schemas(
                domain::users::Model,
                response::presence::Presence,
            )
        ),
        modifiers(&SecurityAddon),
        tags(
            (name = "social_network", description = "Presence and real-time messaging")
        )
    )]
struct ApiDoc;

struct SecurityAddon;

// Defines our cookie session based authentication requirement for gaining access to our
// API endpoints for OpenAPI.
impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "cookie_auth",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    service::config::DEFAULT_SESSION_COOKIE_NAME,
                    "Session token issued at login, sent as a cookie",
                ))),
            )
        }
    }
}

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(presence_routes(app_state.clone()))
        .merge(websocket_routes(app_state))
        // **** FIXME: protect the OpenAPI web UI
        .merge(RapiDoc::with_openapi("/api-docs/openapi2.json", ApiDoc::openapi()).path("/rapidoc"))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn presence_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/presence/:user_id", get(presence_controller::read))
        .route_layer(from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state)
}

// Authentication happens inside the handler's extractors so that a rejected
// request never reaches the upgrade.
fn websocket_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket::handler::ws_handler))
        .with_state(app_state)
}
