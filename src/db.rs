mod activity;
mod catalog;
mod filter;
mod schema;
mod users;

pub use schema::Database;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Role given to every self-registered account.
pub const ROLE_USER: &str = "user";
/// Role allowed to manage the catalog.
pub const ROLE_ADMIN: &str = "admin";

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: i64,
    /// Username for login.
    pub username: String,
    /// Email address, also accepted at login.
    pub email: String,
    /// Argon2 password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// User role: "admin" or "user".
    pub role: String,
    /// Account creation timestamp.
    #[serde(with = "rfc3339")]
    pub created_at: i64,
}

/// Fields needed to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

/// Partial profile update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl UserPatch {
    /// True when nothing would change.
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
    }
}

/// Per-user activity counters shown on the profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    /// Distinct books with reading progress.
    pub books_read: i64,
    /// Distinct books with at least one bookmark.
    pub books_bookmarked: i64,
    /// Distinct books reviewed.
    pub books_reviewed: i64,
}

/// Authentication session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session token.
    pub token: String,
    /// User ID.
    pub user_id: i64,
    /// Expiration timestamp.
    pub expires_at: i64,
}

/// Book category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Category ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Number of active books in this category.
    pub book_count: i64,
    /// Creation timestamp.
    #[serde(with = "rfc3339")]
    pub created_at: i64,
}

/// Catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Book ID.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Description.
    pub description: String,
    /// ISBN.
    pub isbn: String,
    /// Category reference; the category may be absent.
    pub category_id: Option<i64>,
    /// Category name, when the category exists.
    pub category_name: Option<String>,
    /// Cover image path or URL.
    pub cover_image: String,
    /// Path or URL of the book file.
    pub file_path: String,
    /// File size in bytes.
    pub file_size: i64,
    /// File type, e.g. "pdf".
    pub file_type: String,
    /// Page count, 0 when unknown.
    pub pages: i64,
    /// Language code.
    pub language: String,
    /// Publication date as given.
    pub published_date: Option<String>,
    /// Featured books sort first.
    pub is_featured: bool,
    /// False once soft-deleted.
    pub is_active: bool,
    /// Creation timestamp.
    #[serde(with = "rfc3339")]
    pub created_at: i64,
}

/// Fields needed to create a book.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub description: String,
    pub isbn: String,
    pub category_id: Option<i64>,
    pub cover_image: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: String,
    pub pages: i64,
    pub language: String,
    pub published_date: Option<String>,
    pub is_featured: bool,
}

/// Partial book update over the allow-listed columns.
///
/// `category_id: Some(None)` clears the category.
#[derive(Debug, Clone, Default)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub isbn: Option<String>,
    pub category_id: Option<Option<i64>>,
    pub cover_image: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub file_type: Option<String>,
    pub pages: Option<i64>,
    pub language: Option<String>,
    pub published_date: Option<Option<String>>,
    pub is_featured: Option<bool>,
    pub is_active: Option<bool>,
}

impl BookPatch {
    /// True when no column would change.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.description.is_none()
            && self.isbn.is_none()
            && self.category_id.is_none()
            && self.cover_image.is_none()
            && self.file_path.is_none()
            && self.file_size.is_none()
            && self.file_type.is_none()
            && self.pages.is_none()
            && self.language.is_none()
            && self.published_date.is_none()
            && self.is_featured.is_none()
            && self.is_active.is_none()
    }
}

/// Average rating and review count for a book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    /// Mean rating rounded to one decimal, 0 when there are no reviews.
    pub average: f64,
    /// Number of reviews.
    pub total: i64,
}

impl Rating {
    /// Build from a raw SQL average and count.
    pub fn from_raw(average: Option<f64>, total: i64) -> Self {
        let average = average.map(|a| (a * 10.0).round() / 10.0).unwrap_or(0.0);
        Self { average, total }
    }
}

/// A book with its rating aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatedBook {
    #[serde(flatten)]
    pub book: Book,
    pub rating: Rating,
}

/// Filters for the catalog listing. All are AND-combined.
#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    pub featured: bool,
    pub category_id: Option<i64>,
    pub author: Option<String>,
    pub search: Option<String>,
}

/// Bookmark in a book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    /// Bookmark ID.
    pub id: i64,
    /// Owner.
    pub user_id: i64,
    /// Book ID.
    pub book_id: i64,
    /// Page number, starting at 1.
    pub page_number: i64,
    /// User note.
    pub note: Option<String>,
    /// Book title, present in the all-books listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Book author, present in the all-books listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Creation timestamp.
    #[serde(with = "rfc3339")]
    pub created_at: i64,
}

/// Reading progress for a (user, book) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingProgress {
    /// Book ID.
    pub book_id: i64,
    /// Current page number.
    pub current_page: i64,
    /// Total pages in book.
    pub total_pages: i64,
    /// Reading percentage (0.0 - 100.0).
    pub progress_percentage: f64,
    /// Book title, present in listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Book author, present in listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Book cover, present in listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    /// Last write, in unix milliseconds. Strictly increases across a user's writes.
    #[serde(with = "rfc3339_millis")]
    pub last_read_at: i64,
}

/// Values written by a progress upsert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressWrite {
    pub current_page: i64,
    pub total_pages: i64,
    pub progress_percentage: f64,
}

/// Book review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    /// Review ID.
    pub id: i64,
    /// Reviewer.
    pub user_id: i64,
    /// Reviewed book.
    pub book_id: i64,
    /// Book title.
    pub book_title: Option<String>,
    /// Book author.
    pub book_author: Option<String>,
    /// Reviewer username.
    pub username: String,
    /// Reviewer first name.
    pub first_name: String,
    /// Reviewer last name.
    pub last_name: String,
    /// Rating from 1 to 5.
    pub rating: i64,
    /// Review body.
    pub review_text: String,
    /// Creation timestamp.
    #[serde(with = "rfc3339")]
    pub created_at: i64,
    /// Last update timestamp.
    #[serde(with = "rfc3339")]
    pub updated_at: i64,
}

/// Filters for the review listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewFilter {
    pub book_id: Option<i64>,
    pub user_id: Option<i64>,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Millisecond timestamp helper.
pub fn now_timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

/// Serde adapter rendering unix seconds as RFC 3339 strings.
pub mod rfc3339 {
    use super::{SecondsFormat, timestamp_to_datetime};
    use chrono::DateTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(ts: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&timestamp_to_datetime(*ts).to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.timestamp())
            .map_err(D::Error::custom)
    }
}

/// Serde adapter rendering unix milliseconds as RFC 3339 strings.
pub mod rfc3339_millis {
    use super::SecondsFormat;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(ms: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        let dt = DateTime::from_timestamp_millis(*ms).unwrap_or_else(Utc::now);
        serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.timestamp_millis())
            .map_err(D::Error::custom)
    }
}
