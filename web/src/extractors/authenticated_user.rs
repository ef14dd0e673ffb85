use crate::{AppState, Error};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use domain::Id;
use log::*;

/// The user a request's session cookie resolves to.
///
/// Resolution goes through the real-time layer's session gate, so the same
/// rules apply to plain HTTP routes and to WebSocket upgrades: a missing,
/// unknown or expired session is a 401, and a session store outage is a 500.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AuthenticatedUser(pub Id);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        app_state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers, &app_state.config.session_cookie_name);

        let user_id = app_state
            .ws_manager
            .authenticate(token.as_deref())
            .await
            .inspect_err(|e| debug!("Rejecting {} {}: {e}", parts.method, parts.uri.path()))?;

        trace!("Request authenticated as user {user_id}");
        Ok(AuthenticatedUser(user_id))
    }
}

/// Value of the cookie named `cookie_name`, searching every `Cookie` header.
fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(cookies: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for cookie in cookies {
            headers.append(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        headers
    }

    #[test]
    fn finds_the_named_cookie_among_others() {
        let headers = headers(&["theme=dark; SN-session=abc-123; lang=en"]);
        assert_eq!(
            session_token(&headers, "SN-session"),
            Some("abc-123".to_string())
        );
    }

    #[test]
    fn searches_every_cookie_header() {
        let headers = headers(&["theme=dark", "SN-session=\"quoted\""]);
        assert_eq!(
            session_token(&headers, "SN-session"),
            Some("quoted".to_string())
        );
    }

    #[test]
    fn missing_cookie_is_none() {
        assert_eq!(session_token(&headers(&["theme=dark"]), "SN-session"), None);
        assert_eq!(session_token(&HeaderMap::new(), "SN-session"), None);
    }
}
