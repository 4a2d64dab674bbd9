//! Request extractors: caller identity, session token, and envelope-aware JSON/query parsing.

use crate::auth::Identity;
use crate::error::AppError;
use crate::server::AppState;
use axum::extract::{FromRequest, FromRequestParts, Query};
use axum::http::header;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;

/// Name of the session cookie set at login.
pub const SESSION_COOKIE: &str = "ebook_session";

/// JSON body; malformed input becomes a 400 envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// Query string; malformed input becomes a 400 envelope.
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Raw session token from `Authorization: Bearer` or the session cookie.
pub struct SessionToken(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for SessionToken {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(SessionToken(extract_token(parts)))
    }
}

/// Extractor that requires a logged-in caller; 401 otherwise.
pub struct CurrentUser(pub Identity);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let MaybeUser(identity) = MaybeUser::from_request_parts(parts, state).await?;
        identity.map(CurrentUser).ok_or(AppError::Unauthorized)
    }
}

/// Extractor that requires an admin caller: 401 when anonymous, 403 otherwise.
/// Runs before the body is read, so a bad payload from a non-admin is still a 403.
pub struct AdminUser(pub Identity);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(identity) = CurrentUser::from_request_parts(parts, state).await?;
        identity.require_admin()?;
        Ok(AdminUser(identity))
    }
}

/// Optional caller; `None` for anonymous requests and stale tokens.
pub struct MaybeUser(pub Option<Identity>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = match extract_token(parts) {
            Some(token) => state.auth.resolve(&token)?,
            None => None,
        };
        Ok(MaybeUser(identity))
    }
}

/// Bearer header wins over the cookie.
fn extract_token(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(&parts.headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_extract_token_sources() {
        let p = parts(Request::builder().header(header::AUTHORIZATION, "Bearer abc"));
        assert_eq!(extract_token(&p).as_deref(), Some("abc"));

        let p = parts(Request::builder().header(header::COOKIE, "theme=dark; ebook_session=xyz"));
        assert_eq!(extract_token(&p).as_deref(), Some("xyz"));

        let p = parts(
            Request::builder()
                .header(header::AUTHORIZATION, "Bearer abc")
                .header(header::COOKIE, "ebook_session=xyz"),
        );
        assert_eq!(extract_token(&p).as_deref(), Some("abc"));

        let p = parts(Request::builder().header(header::AUTHORIZATION, "Basic abc"));
        assert_eq!(extract_token(&p), None);
    }
}
