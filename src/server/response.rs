//! Success envelope shared by every endpoint.

use crate::util::{Page, Pagination};
use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// `{success, data, message, pagination?}`. Errors render the same shape from `AppError`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Successful response with no message.
    pub fn ok(data: T) -> Self {
        Self::with_message(data, "")
    }

    /// Successful response with a message.
    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: message.into(),
            pagination: None,
        }
    }
}

impl<T: Serialize> ApiResponse<Vec<T>> {
    /// Successful response for one page of a listing.
    pub fn paged(page: Page<T>) -> Self {
        Self {
            success: true,
            data: page.items,
            message: String::new(),
            pagination: Some(page.pagination),
        }
    }
}

impl ApiResponse<()> {
    /// Successful response carrying only a message; `data` is null.
    pub fn message(message: impl Into<String>) -> Self {
        Self::with_message((), message)
    }
}

/// Payload of create endpoints.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Created {
    pub id: i64,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
