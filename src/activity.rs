//! Per-user activity: bookmarks, reading progress, reviews, and the reader view.
//!
//! Every mutation is scoped to the caller. Resources owned by someone else are
//! reported as missing.

use crate::auth::Identity;
use crate::config::CatalogConfig;
use crate::db::{
    Book, Bookmark, Database, ProgressWrite, Rating, ReadingProgress, Review, ReviewFilter,
};
use crate::error::{AppError, Result};
use crate::util::{Page, PageRequest, lenient_float, lenient_int, sanitize_input};
use serde::{Deserialize, Serialize};

/// Reviews shown alongside the reader.
const READER_REVIEW_LIMIT: u32 = 10;

/// New bookmark.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BookmarkForm {
    #[serde(deserialize_with = "lenient_int")]
    pub book_id: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub page_number: Option<i64>,
    pub note: Option<String>,
}

/// Partial bookmark update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BookmarkUpdate {
    #[serde(deserialize_with = "lenient_int")]
    pub page_number: Option<i64>,
    pub note: Option<String>,
}

/// Progress write. Zero or absent values fall back to derived ones.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProgressForm {
    #[serde(deserialize_with = "lenient_int")]
    pub book_id: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub current_page: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub total_pages: Option<i64>,
    #[serde(deserialize_with = "lenient_float")]
    pub progress_percentage: Option<f64>,
}

/// Progress as stored by the last write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SavedProgress {
    pub book_id: i64,
    pub current_page: i64,
    pub total_pages: i64,
    pub progress_percentage: f64,
}

/// New review.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReviewForm {
    #[serde(deserialize_with = "lenient_int")]
    pub book_id: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub rating: Option<i64>,
    pub review_text: Option<String>,
}

/// Partial review update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReviewUpdate {
    #[serde(deserialize_with = "lenient_int")]
    pub rating: Option<i64>,
    pub review_text: Option<String>,
}

/// Everything the reader needs for one book.
#[derive(Debug, Clone, Serialize)]
pub struct ReaderView {
    pub book: Book,
    pub rating: Rating,
    pub progress: Option<ReadingProgress>,
    pub bookmarks: Vec<Bookmark>,
    pub reviews: Vec<Review>,
}

/// User activity service.
pub struct ActivityService {
    db: Database,
    settings: CatalogConfig,
}

impl ActivityService {
    pub fn new(db: Database, settings: CatalogConfig) -> Self {
        Self { db, settings }
    }

    /// Clamp raw review-listing parameters.
    pub fn review_page_request(&self, page: Option<&str>, limit: Option<&str>) -> PageRequest {
        PageRequest::from_query(
            page,
            limit,
            self.settings.review_page_size,
            self.settings.max_page_size,
        )
    }

    fn active_book(&self, book_id: i64) -> Result<Book> {
        self.db
            .get_active_book(book_id)?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
    }

    // ========== BOOKMARKS ==========

    /// Bookmarks for one book ordered by page, or for all books newest first.
    pub fn list_bookmarks(&self, identity: &Identity, book_id: Option<i64>) -> Result<Vec<Bookmark>> {
        match book_id {
            Some(book_id) => self.db.get_book_bookmarks(identity.user_id, book_id),
            None => self.db.get_user_bookmarks(identity.user_id),
        }
    }

    /// Create a bookmark and return its ID.
    pub fn create_bookmark(&self, identity: &Identity, form: &BookmarkForm) -> Result<i64> {
        let (book_id, page_number) = match (form.book_id, form.page_number) {
            (Some(book_id), Some(page)) if book_id > 0 && page > 0 => (book_id, page),
            _ => {
                return Err(AppError::Validation(
                    "Book ID and page number are required".to_string(),
                ));
            }
        };

        let book = self.active_book(book_id)?;
        check_page_bound(&book, page_number)?;

        if self.db.bookmark_exists(identity.user_id, book_id, page_number)? {
            return Err(AppError::Validation(
                "Bookmark already exists for this page".to_string(),
            ));
        }

        let note = form.note.as_deref().map(sanitize_input).unwrap_or_default();
        let id = self
            .db
            .create_bookmark(identity.user_id, book_id, page_number, &note)?;

        tracing::info!(user_id = identity.user_id, book_id, page_number, "Bookmark created");
        Ok(id)
    }

    /// Move a bookmark or change its note.
    pub fn update_bookmark(&self, identity: &Identity, id: i64, update: &BookmarkUpdate) -> Result<()> {
        let bookmark = self
            .db
            .get_owned_bookmark(id, identity.user_id)?
            .ok_or_else(|| AppError::NotFound("Bookmark not found".to_string()))?;

        if let Some(page_number) = update.page_number {
            if page_number < 1 {
                return Err(AppError::Validation(
                    "Page number must be at least 1".to_string(),
                ));
            }
            if let Some(book) = self.db.get_active_book(bookmark.book_id)? {
                check_page_bound(&book, page_number)?;
            }
        }

        let note = update.note.as_deref().map(sanitize_input);
        if update.page_number.is_none() && note.is_none() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }

        self.db.update_bookmark(id, update.page_number, note.as_deref())?;
        Ok(())
    }

    /// Remove a bookmark.
    pub fn delete_bookmark(&self, identity: &Identity, id: i64) -> Result<()> {
        if !self.db.delete_bookmark(id, identity.user_id)? {
            return Err(AppError::NotFound("Bookmark not found".to_string()));
        }
        Ok(())
    }

    // ========== READING PROGRESS ==========

    /// Progress for one book, if any.
    pub fn get_progress(&self, identity: &Identity, book_id: i64) -> Result<Option<ReadingProgress>> {
        self.db.get_progress(identity.user_id, book_id)
    }

    /// All progress rows, most recently read first.
    pub fn list_progress(&self, identity: &Identity) -> Result<Vec<ReadingProgress>> {
        self.db.list_progress(identity.user_id)
    }

    /// Insert or overwrite progress for a book.
    pub fn save_progress(&self, identity: &Identity, form: &ProgressForm) -> Result<SavedProgress> {
        let book_id = form
            .book_id
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::Validation("Book ID is required".to_string()))?;

        let book = self.active_book(book_id)?;

        let current_page = form.current_page.unwrap_or(1);
        let total_pages = match form.total_pages.unwrap_or(0) {
            0 => book.pages,
            n => n,
        };
        let progress_percentage = match form.progress_percentage.unwrap_or(0.0) {
            p if p == 0.0 && total_pages > 0 => current_page as f64 / total_pages as f64 * 100.0,
            p => p,
        }
        .clamp(0.0, 100.0);

        self.db.save_progress(
            identity.user_id,
            book_id,
            &ProgressWrite {
                current_page,
                total_pages,
                progress_percentage,
            },
        )?;

        tracing::debug!(user_id = identity.user_id, book_id, current_page, "Progress saved");
        Ok(SavedProgress {
            book_id,
            current_page,
            total_pages,
            progress_percentage,
        })
    }

    /// Forget progress for a book. Succeeds whether or not a row existed.
    pub fn delete_progress(&self, identity: &Identity, book_id: i64) -> Result<()> {
        self.db.delete_progress(identity.user_id, book_id)?;
        Ok(())
    }

    // ========== REVIEWS ==========

    /// One page of reviews, newest first.
    pub fn list_reviews(&self, filter: &ReviewFilter, page: PageRequest) -> Result<Page<Review>> {
        let total = self.db.count_reviews(filter)?;
        let items = self.db.list_reviews(filter, page.limit, page.offset())?;
        Ok(Page {
            items,
            pagination: page.paginate(total),
        })
    }

    /// Review a book once and return the review ID.
    pub fn create_review(&self, identity: &Identity, form: &ReviewForm) -> Result<i64> {
        let book_id = form
            .book_id
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::Validation("Book ID is required".to_string()))?;

        let rating = check_rating(form.rating.unwrap_or(0))?;
        self.active_book(book_id)?;

        if self.db.review_exists(identity.user_id, book_id)? {
            return Err(AppError::Validation(
                "You have already reviewed this book".to_string(),
            ));
        }

        let text = form.review_text.as_deref().map(sanitize_input).unwrap_or_default();
        let id = self.db.create_review(identity.user_id, book_id, rating, &text)?;

        tracing::info!(user_id = identity.user_id, book_id, rating, "Review created");
        Ok(id)
    }

    /// Change rating or text of the caller's review.
    pub fn update_review(&self, identity: &Identity, id: i64, update: &ReviewUpdate) -> Result<()> {
        self.db
            .get_owned_review(id, identity.user_id)?
            .ok_or_else(|| AppError::NotFound("Review not found".to_string()))?;

        let rating = update.rating.map(check_rating).transpose()?;
        let text = update.review_text.as_deref().map(sanitize_input);

        if rating.is_none() && text.is_none() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }

        self.db.update_review(id, rating, text.as_deref())?;
        Ok(())
    }

    /// Remove the caller's review.
    pub fn delete_review(&self, identity: &Identity, id: i64) -> Result<()> {
        if !self.db.delete_review(id, identity.user_id)? {
            return Err(AppError::NotFound("Review not found".to_string()));
        }
        Ok(())
    }

    // ========== READER ==========

    /// Book, rating, caller's progress and bookmarks, and recent reviews.
    pub fn reader_view(&self, identity: &Identity, book_id: i64) -> Result<ReaderView> {
        let book = self.active_book(book_id)?;

        let reviews = self.db.list_reviews(
            &ReviewFilter {
                book_id: Some(book_id),
                user_id: None,
            },
            READER_REVIEW_LIMIT,
            0,
        )?;

        Ok(ReaderView {
            rating: self.db.book_rating(book_id)?,
            progress: self.db.get_progress(identity.user_id, book_id)?,
            bookmarks: self.db.get_book_bookmarks(identity.user_id, book_id)?,
            reviews,
            book,
        })
    }
}

/// Pages beyond a known, nonzero page count are rejected.
fn check_page_bound(book: &Book, page_number: i64) -> Result<()> {
    if book.pages > 0 && page_number > book.pages {
        return Err(AppError::Validation(
            "Page number exceeds book length".to_string(),
        ));
    }
    Ok(())
}

fn check_rating(rating: i64) -> Result<i64> {
    if (1..=5).contains(&rating) {
        Ok(rating)
    } else {
        Err(AppError::Validation(
            "Rating must be between 1 and 5".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_rating() {
        assert_eq!(check_rating(1).unwrap(), 1);
        assert_eq!(check_rating(5).unwrap(), 5);
        assert!(check_rating(0).is_err());
        assert!(check_rating(6).is_err());
    }

    #[test]
    fn test_progress_form_accepts_strings() {
        let form: ProgressForm =
            serde_json::from_str(r#"{"book_id": "3", "current_page": 40, "progress_percentage": "12.5"}"#)
                .unwrap();
        assert_eq!(form.book_id, Some(3));
        assert_eq!(form.current_page, Some(40));
        assert_eq!(form.total_pages, None);
        assert_eq!(form.progress_percentage, Some(12.5));
    }
}
