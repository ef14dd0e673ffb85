use crate::extractors::authenticated_user::AuthenticatedUser;
use axum::{extract::Request, middleware::Next, response::Response};

/// Authentication middleware that returns 401 Unauthorized for requests without
/// a live session cookie. The rejection itself comes from the extractor, so a
/// session store outage surfaces as a 500 rather than a 401.
pub async fn require_auth(
    AuthenticatedUser(_user_id): AuthenticatedUser,
    request: Request,
    next: Next,
) -> Response {
    next.run(request).await
}
