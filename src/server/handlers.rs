//! HTTP request handlers.
//!
//! Each resource is one path; the method (and for auth the `action` query
//! parameter) picks the operation.

use super::extractors::{
    AdminUser, ApiQuery, CurrentUser, JsonBody, MaybeUser, SESSION_COOKIE, SessionToken,
};
use super::response::{ApiResponse, Created};
use crate::activity::{BookmarkForm, BookmarkUpdate, ProgressForm, ReviewForm, ReviewUpdate};
use crate::auth::{ProfileUpdate, Registration};
use crate::catalog::{BookForm, CategoryForm};
use crate::db::{BookFilter, ReviewFilter, User};
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::util::{parse_flag, parse_id};
use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

// ============================================================================
// QUERY PARAMETERS
// ============================================================================

/// `?action=`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ActionQuery {
    action: Option<String>,
}

/// `?id=`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IdQuery {
    id: Option<String>,
}

/// `?book_id=`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BookIdQuery {
    book_id: Option<String>,
}

/// Book listing filters, or `?id=` for one book.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BookQuery {
    id: Option<String>,
    page: Option<String>,
    limit: Option<String>,
    featured: Option<String>,
    category: Option<String>,
    author: Option<String>,
    search: Option<String>,
}

/// Review listing filters.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReviewQuery {
    book_id: Option<String>,
    user_id: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

fn require_id(raw: Option<&str>, message: &str) -> Result<i64> {
    parse_id(raw).ok_or_else(|| AppError::Validation(message.to_string()))
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Rejected JSON body");
        AppError::Validation("Invalid JSON input".to_string())
    })
}

/// Fallback for methods a resource does not support.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

// ============================================================================
// HEALTH
// ============================================================================

#[derive(Debug, Serialize)]
pub struct Health {
    status: &'static str,
    title: String,
    version: &'static str,
    books: i64,
}

/// Liveness plus a trivial database round trip.
pub async fn health(State(state): State<AppState>) -> Result<ApiResponse<Health>> {
    let books = state.db.count_books(&BookFilter::default())?;
    Ok(ApiResponse::ok(Health {
        status: "ok",
        title: state.config.server.title.clone(),
        version: env!("CARGO_PKG_VERSION"),
        books,
    }))
}

// ============================================================================
// AUTH API
// ============================================================================

/// Login request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    username: String,
    password: String,
}

/// Login/register payload.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    user: User,
    token: String,
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// `GET /api/auth?action=profile|check`
pub async fn auth_get(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ActionQuery>,
    MaybeUser(identity): MaybeUser,
) -> Result<Response> {
    match query.action.as_deref() {
        Some("profile") => {
            let identity = identity.ok_or(AppError::Unauthorized)?;
            let profile = state.auth.profile(&identity)?;
            Ok(ApiResponse::ok(profile).into_response())
        }
        Some("check") => Ok(ApiResponse::ok(state.auth.check(identity.as_ref())).into_response()),
        _ => Err(AppError::Validation("Invalid action".to_string())),
    }
}

/// `POST /api/auth?action=login|register|logout`
pub async fn auth_post(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ActionQuery>,
    SessionToken(token): SessionToken,
    jar: CookieJar,
    body: Bytes,
) -> Result<Response> {
    match query.action.as_deref() {
        Some("login") => {
            let req: LoginRequest = parse_json(&body)?;
            let (user, token) = state.auth.login(&req.username, &req.password)?;
            let jar = jar.add(session_cookie(token.clone()));
            let body = ApiResponse::with_message(SessionResponse { user, token }, "Login successful");
            Ok((jar, body).into_response())
        }
        Some("register") => {
            let form: Registration = parse_json(&body)?;
            let (user, token) = state.auth.register(&form)?;
            let jar = jar.add(session_cookie(token.clone()));
            let body =
                ApiResponse::with_message(SessionResponse { user, token }, "Registration successful");
            Ok((jar, body).into_response())
        }
        Some("logout") => {
            state.auth.logout(token.as_deref())?;
            let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
            Ok((jar, ApiResponse::message("Logout successful")).into_response())
        }
        _ => Err(AppError::Validation("Invalid action".to_string())),
    }
}

/// `PUT /api/auth`
pub async fn auth_put(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    JsonBody(update): JsonBody<ProfileUpdate>,
) -> Result<ApiResponse<()>> {
    state.auth.update_profile(&identity, &update)?;
    Ok(ApiResponse::message("Profile updated successfully"))
}

// ============================================================================
// BOOKS API
// ============================================================================

/// `GET /api/books` lists; `GET /api/books?id=N` returns the detail view.
pub async fn books_get(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<BookQuery>,
    MaybeUser(identity): MaybeUser,
) -> Result<Response> {
    if let Some(raw) = query.id.as_deref() {
        let id = require_id(Some(raw), "Invalid book ID")?;
        let detail = state.catalog.book_detail(id, identity.as_ref())?;
        return Ok(ApiResponse::ok(detail).into_response());
    }

    let filter = BookFilter {
        featured: parse_flag(query.featured.as_deref()),
        category_id: query
            .category
            .as_deref()
            .and_then(|c| c.trim().parse::<i64>().ok()),
        author: query.author,
        search: query.search,
    };
    let page = state
        .catalog
        .page_request(query.page.as_deref(), query.limit.as_deref());

    let books = state.catalog.list_books(&filter, page)?;
    Ok(ApiResponse::paged(books).into_response())
}

/// `POST /api/books` (admin)
pub async fn books_post(
    State(state): State<AppState>,
    AdminUser(identity): AdminUser,
    JsonBody(form): JsonBody<BookForm>,
) -> Result<ApiResponse<Created>> {
    let id = state.catalog.create_book(&identity, &form)?;
    Ok(ApiResponse::with_message(Created { id }, "Book created successfully"))
}

/// `PUT /api/books?id=N` (admin)
pub async fn books_put(
    State(state): State<AppState>,
    AdminUser(identity): AdminUser,
    ApiQuery(query): ApiQuery<IdQuery>,
    JsonBody(form): JsonBody<BookForm>,
) -> Result<ApiResponse<()>> {
    let id = require_id(query.id.as_deref(), "Invalid book ID")?;
    state.catalog.update_book(&identity, id, &form)?;
    Ok(ApiResponse::message("Book updated successfully"))
}

/// `DELETE /api/books?id=N` (admin, soft delete)
pub async fn books_delete(
    State(state): State<AppState>,
    AdminUser(identity): AdminUser,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> Result<ApiResponse<()>> {
    let id = require_id(query.id.as_deref(), "Invalid book ID")?;
    state.catalog.delete_book(&identity, id)?;
    Ok(ApiResponse::message("Book deleted successfully"))
}

// ============================================================================
// CATEGORIES API
// ============================================================================

/// `GET /api/categories`
pub async fn categories_get(State(state): State<AppState>) -> Result<Response> {
    let categories = state.catalog.list_categories()?;
    Ok(ApiResponse::ok(categories).into_response())
}

/// `POST /api/categories` (admin)
pub async fn categories_post(
    State(state): State<AppState>,
    AdminUser(identity): AdminUser,
    JsonBody(form): JsonBody<CategoryForm>,
) -> Result<ApiResponse<Created>> {
    let id = state.catalog.create_category(&identity, &form)?;
    Ok(ApiResponse::with_message(Created { id }, "Category created successfully"))
}

/// `PUT /api/categories?id=N` (admin)
pub async fn categories_put(
    State(state): State<AppState>,
    AdminUser(identity): AdminUser,
    ApiQuery(query): ApiQuery<IdQuery>,
    JsonBody(form): JsonBody<CategoryForm>,
) -> Result<ApiResponse<()>> {
    let id = require_id(query.id.as_deref(), "Invalid category ID")?;
    state.catalog.update_category(&identity, id, &form)?;
    Ok(ApiResponse::message("Category updated successfully"))
}

/// `DELETE /api/categories?id=N` (admin)
pub async fn categories_delete(
    State(state): State<AppState>,
    AdminUser(identity): AdminUser,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> Result<ApiResponse<()>> {
    let id = require_id(query.id.as_deref(), "Invalid category ID")?;
    state.catalog.delete_category(&identity, id)?;
    Ok(ApiResponse::message("Category deleted successfully"))
}

// ============================================================================
// BOOKMARKS API
// ============================================================================

/// `GET /api/bookmarks[?book_id=N]`
pub async fn bookmarks_get(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    ApiQuery(query): ApiQuery<BookIdQuery>,
) -> Result<Response> {
    let book_id = parse_id(query.book_id.as_deref());
    let bookmarks = state.activity.list_bookmarks(&identity, book_id)?;
    Ok(ApiResponse::ok(bookmarks).into_response())
}

/// `POST /api/bookmarks`
pub async fn bookmarks_post(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    JsonBody(form): JsonBody<BookmarkForm>,
) -> Result<ApiResponse<Created>> {
    let id = state.activity.create_bookmark(&identity, &form)?;
    Ok(ApiResponse::with_message(Created { id }, "Bookmark created successfully"))
}

/// `PUT /api/bookmarks?id=N`
pub async fn bookmarks_put(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    ApiQuery(query): ApiQuery<IdQuery>,
    JsonBody(update): JsonBody<BookmarkUpdate>,
) -> Result<ApiResponse<()>> {
    let id = require_id(query.id.as_deref(), "Bookmark ID is required")?;
    state.activity.update_bookmark(&identity, id, &update)?;
    Ok(ApiResponse::message("Bookmark updated successfully"))
}

/// `DELETE /api/bookmarks?id=N`
pub async fn bookmarks_delete(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> Result<ApiResponse<()>> {
    let id = require_id(query.id.as_deref(), "Bookmark ID is required")?;
    state.activity.delete_bookmark(&identity, id)?;
    Ok(ApiResponse::message("Bookmark deleted successfully"))
}

// ============================================================================
// READING PROGRESS API
// ============================================================================

/// `GET /api/reading-progress[?book_id=N]`; a single book with no progress yields null.
pub async fn progress_get(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    ApiQuery(query): ApiQuery<BookIdQuery>,
) -> Result<Response> {
    match parse_id(query.book_id.as_deref()) {
        Some(book_id) => {
            let progress = state.activity.get_progress(&identity, book_id)?;
            Ok(ApiResponse::ok(progress).into_response())
        }
        None => {
            let progress = state.activity.list_progress(&identity)?;
            Ok(ApiResponse::ok(progress).into_response())
        }
    }
}

/// `POST /api/reading-progress` (upsert)
pub async fn progress_post(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    JsonBody(form): JsonBody<ProgressForm>,
) -> Result<Response> {
    let saved = state.activity.save_progress(&identity, &form)?;
    Ok(ApiResponse::with_message(saved, "Reading progress updated successfully").into_response())
}

/// `DELETE /api/reading-progress?book_id=N`
pub async fn progress_delete(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    ApiQuery(query): ApiQuery<BookIdQuery>,
) -> Result<ApiResponse<()>> {
    let book_id = require_id(query.book_id.as_deref(), "Book ID is required")?;
    state.activity.delete_progress(&identity, book_id)?;
    Ok(ApiResponse::message("Reading progress deleted successfully"))
}

// ============================================================================
// REVIEWS API
// ============================================================================

/// `GET /api/reviews` with optional `book_id`/`user_id` filters (public).
pub async fn reviews_get(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ReviewQuery>,
) -> Result<Response> {
    let filter = ReviewFilter {
        book_id: parse_id(query.book_id.as_deref()),
        user_id: parse_id(query.user_id.as_deref()),
    };
    let page = state
        .activity
        .review_page_request(query.page.as_deref(), query.limit.as_deref());

    let reviews = state.activity.list_reviews(&filter, page)?;
    Ok(ApiResponse::paged(reviews).into_response())
}

/// `POST /api/reviews`
pub async fn reviews_post(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    JsonBody(form): JsonBody<ReviewForm>,
) -> Result<ApiResponse<Created>> {
    let id = state.activity.create_review(&identity, &form)?;
    Ok(ApiResponse::with_message(Created { id }, "Review created successfully"))
}

/// `PUT /api/reviews?id=N`
pub async fn reviews_put(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    ApiQuery(query): ApiQuery<IdQuery>,
    JsonBody(update): JsonBody<ReviewUpdate>,
) -> Result<ApiResponse<()>> {
    let id = require_id(query.id.as_deref(), "Review ID is required")?;
    state.activity.update_review(&identity, id, &update)?;
    Ok(ApiResponse::message("Review updated successfully"))
}

/// `DELETE /api/reviews?id=N`
pub async fn reviews_delete(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> Result<ApiResponse<()>> {
    let id = require_id(query.id.as_deref(), "Review ID is required")?;
    state.activity.delete_review(&identity, id)?;
    Ok(ApiResponse::message("Review deleted successfully"))
}

// ============================================================================
// READER
// ============================================================================

/// `GET /api/reader?id=N`
pub async fn reader_get(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    ApiQuery(query): ApiQuery<IdQuery>,
) -> Result<Response> {
    let id = require_id(query.id.as_deref(), "Invalid book ID")?;
    let view = state.activity.reader_view(&identity, id)?;
    Ok(ApiResponse::ok(view).into_response())
}
