use super::filter::WhereClause;
use super::schema::{Database, is_unique_violation};
use super::{
    Bookmark, ProgressWrite, ReadingProgress, Review, ReviewFilter, now_timestamp,
    now_timestamp_millis,
};
use crate::error::{AppError, Result};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};

const REVIEW_SELECT: &str = "SELECT r.id, r.user_id, r.book_id, b.title, b.author,
        u.username, u.first_name, u.last_name, r.rating, r.review_text,
        r.created_at, r.updated_at
    FROM reviews r
    JOIN users u ON u.id = r.user_id
    LEFT JOIN books b ON b.id = r.book_id";

fn review_filter_clause(filter: &ReviewFilter) -> WhereClause {
    let mut clause = WhereClause::new();
    if let Some(book_id) = filter.book_id {
        clause.eq("r.book_id", book_id);
    }
    if let Some(user_id) = filter.user_id {
        clause.eq("r.user_id", user_id);
    }
    clause
}

impl Database {
    // ========== BOOKMARK OPERATIONS ==========

    /// Insert a bookmark and return its ID.
    pub fn create_bookmark(&self, user_id: i64, book_id: i64, page_number: i64, note: &str) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO bookmarks (user_id, book_id, page_number, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user_id, book_id, page_number, note, now_timestamp()],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Validation("Bookmark already exists for this page".to_string())
            } else {
                AppError::Internal(format!("Failed to create bookmark: {}", e))
            }
        })?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a bookmark only if it belongs to `user_id`.
    pub fn get_owned_bookmark(&self, id: i64, user_id: i64) -> Result<Option<Bookmark>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, user_id, book_id, page_number, note, created_at
             FROM bookmarks WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
            Self::row_to_bookmark,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get bookmark: {}", e)))
    }

    /// Whether the user already has a bookmark on this page.
    pub fn bookmark_exists(&self, user_id: i64, book_id: i64, page_number: i64) -> Result<bool> {
        let conn = self.conn();
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM bookmarks WHERE user_id = ?1 AND book_id = ?2 AND page_number = ?3",
                params![user_id, book_id, page_number],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to check bookmark: {}", e)))?;
        Ok(found.is_some())
    }

    /// The user's bookmarks in one book, by page.
    pub fn get_book_bookmarks(&self, user_id: i64, book_id: i64) -> Result<Vec<Bookmark>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, book_id, page_number, note, created_at
                 FROM bookmarks WHERE user_id = ?1 AND book_id = ?2
                 ORDER BY page_number",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let bookmarks = stmt
            .query_map(params![user_id, book_id], Self::row_to_bookmark)
            .map_err(|e| AppError::Internal(format!("Failed to get bookmarks: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect bookmarks: {}", e)))?;

        Ok(bookmarks)
    }

    /// All of the user's bookmarks with book title/author, newest first.
    pub fn get_user_bookmarks(&self, user_id: i64) -> Result<Vec<Bookmark>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT bm.id, bm.user_id, bm.book_id, bm.page_number, bm.note, bm.created_at,
                        bk.title, bk.author
                 FROM bookmarks bm
                 JOIN books bk ON bk.id = bm.book_id
                 WHERE bm.user_id = ?1
                 ORDER BY bm.created_at DESC, bm.id DESC",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let bookmarks = stmt
            .query_map(params![user_id], |row| {
                let mut bookmark = Self::row_to_bookmark(row)?;
                bookmark.title = row.get(6)?;
                bookmark.author = row.get(7)?;
                Ok(bookmark)
            })
            .map_err(|e| AppError::Internal(format!("Failed to get bookmarks: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect bookmarks: {}", e)))?;

        Ok(bookmarks)
    }

    /// Update page and/or note of a bookmark.
    pub fn update_bookmark(&self, id: i64, page_number: Option<i64>, note: Option<&str>) -> Result<bool> {
        let mut sets = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(page_number) = page_number {
            sets.push("page_number = ?");
            values.push(page_number.into());
        }
        if let Some(note) = note {
            sets.push("note = ?");
            values.push(note.to_string().into());
        }
        if sets.is_empty() {
            return Ok(false);
        }
        values.push(id.into());

        let conn = self.conn();
        let rows = conn
            .execute(
                &format!("UPDATE bookmarks SET {} WHERE id = ?", sets.join(", ")),
                params_from_iter(values),
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Validation("Bookmark already exists for this page".to_string())
                } else {
                    AppError::Internal(format!("Failed to update bookmark: {}", e))
                }
            })?;
        Ok(rows > 0)
    }

    /// Delete bookmark.
    pub fn delete_bookmark(&self, id: i64, user_id: i64) -> Result<bool> {
        let conn = self.conn();
        let rows = conn
            .execute(
                "DELETE FROM bookmarks WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to delete bookmark: {}", e)))?;
        Ok(rows > 0)
    }

    fn row_to_bookmark(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bookmark> {
        Ok(Bookmark {
            id: row.get(0)?,
            user_id: row.get(1)?,
            book_id: row.get(2)?,
            page_number: row.get(3)?,
            note: row.get(4)?,
            title: None,
            author: None,
            created_at: row.get(5)?,
        })
    }

    // ========== PROGRESS OPERATIONS ==========

    /// Insert or overwrite the (user, book) progress row and refresh `last_read_at`.
    ///
    /// `last_read_at` is the current time in milliseconds, bumped past the
    /// user's newest progress row so listings follow write order even when
    /// writes share a millisecond.
    pub fn save_progress(&self, user_id: i64, book_id: i64, progress: &ProgressWrite) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO reading_progress
             (user_id, book_id, current_page, total_pages, progress_percentage, last_read_at)
             VALUES (?1, ?2, ?3, ?4, ?5, MAX(?6, COALESCE(
                (SELECT MAX(last_read_at) FROM reading_progress WHERE user_id = ?1), 0) + 1))
             ON CONFLICT (user_id, book_id) DO UPDATE SET
                current_page = excluded.current_page,
                total_pages = excluded.total_pages,
                progress_percentage = excluded.progress_percentage,
                last_read_at = excluded.last_read_at",
            params![
                user_id,
                book_id,
                progress.current_page,
                progress.total_pages,
                progress.progress_percentage,
                now_timestamp_millis(),
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to save progress: {}", e)))?;
        Ok(())
    }

    /// Get reading progress for a book.
    pub fn get_progress(&self, user_id: i64, book_id: i64) -> Result<Option<ReadingProgress>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT book_id, current_page, total_pages, progress_percentage, last_read_at
             FROM reading_progress WHERE user_id = ?1 AND book_id = ?2",
            params![user_id, book_id],
            |row| {
                Ok(ReadingProgress {
                    book_id: row.get(0)?,
                    current_page: row.get(1)?,
                    total_pages: row.get(2)?,
                    progress_percentage: row.get(3)?,
                    title: None,
                    author: None,
                    cover_image: None,
                    last_read_at: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get progress: {}", e)))
    }

    /// All progress rows for a user with book details, most recently read first.
    pub fn list_progress(&self, user_id: i64) -> Result<Vec<ReadingProgress>> {
        self.progress_rows(user_id, -1)
    }

    /// The `limit` most recently read books (negative for all).
    pub(super) fn progress_rows(&self, user_id: i64, limit: i64) -> Result<Vec<ReadingProgress>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT rp.book_id, rp.current_page, rp.total_pages, rp.progress_percentage,
                        rp.last_read_at, b.title, b.author, b.cover_image
                 FROM reading_progress rp
                 JOIN books b ON b.id = rp.book_id
                 WHERE rp.user_id = ?1
                 ORDER BY rp.last_read_at DESC
                 LIMIT ?2",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let progress = stmt
            .query_map(params![user_id, limit], |row| {
                Ok(ReadingProgress {
                    book_id: row.get(0)?,
                    current_page: row.get(1)?,
                    total_pages: row.get(2)?,
                    progress_percentage: row.get(3)?,
                    last_read_at: row.get(4)?,
                    title: row.get(5)?,
                    author: row.get(6)?,
                    cover_image: row.get(7)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list progress: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect progress: {}", e)))?;

        Ok(progress)
    }

    #[cfg(test)]
    pub(crate) fn count_progress_rows(&self, user_id: i64, book_id: i64) -> Result<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM reading_progress WHERE user_id = ?1 AND book_id = ?2",
            params![user_id, book_id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to count progress: {}", e)))
    }

    /// Delete progress for the pair. Returns whether a row existed.
    pub fn delete_progress(&self, user_id: i64, book_id: i64) -> Result<bool> {
        let conn = self.conn();
        let rows = conn
            .execute(
                "DELETE FROM reading_progress WHERE user_id = ?1 AND book_id = ?2",
                params![user_id, book_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to delete progress: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== REVIEW OPERATIONS ==========

    /// Count reviews matching the filter.
    pub fn count_reviews(&self, filter: &ReviewFilter) -> Result<i64> {
        let clause = review_filter_clause(filter);
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT COUNT(*) FROM reviews r WHERE {}", clause.sql()),
            params_from_iter(clause.params()),
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to count reviews: {}", e)))
    }

    /// One page of reviews, newest first.
    pub fn list_reviews(&self, filter: &ReviewFilter, limit: u32, offset: u64) -> Result<Vec<Review>> {
        let clause = review_filter_clause(filter);
        let sql = format!(
            "{} WHERE {} ORDER BY r.created_at DESC, r.id DESC LIMIT ? OFFSET ?",
            REVIEW_SELECT,
            clause.sql()
        );
        let params = clause.params_with([Value::Integer(limit as i64), Value::Integer(offset as i64)]);

        let conn = self.conn();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let reviews = stmt
            .query_map(params_from_iter(params), Self::row_to_review)
            .map_err(|e| AppError::Internal(format!("Failed to list reviews: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect reviews: {}", e)))?;

        Ok(reviews)
    }

    /// Insert a review and return its ID.
    pub fn create_review(&self, user_id: i64, book_id: i64, rating: i64, review_text: &str) -> Result<i64> {
        let conn = self.conn();
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO reviews (user_id, book_id, rating, review_text, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![user_id, book_id, rating, review_text, now],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Validation("You have already reviewed this book".to_string())
            } else {
                AppError::Internal(format!("Failed to create review: {}", e))
            }
        })?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a review only if it belongs to `user_id`.
    pub fn get_owned_review(&self, id: i64, user_id: i64) -> Result<Option<Review>> {
        let conn = self.conn();
        conn.query_row(
            &format!("{} WHERE r.id = ?1 AND r.user_id = ?2", REVIEW_SELECT),
            params![id, user_id],
            Self::row_to_review,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get review: {}", e)))
    }

    /// Whether the user already reviewed the book.
    pub fn review_exists(&self, user_id: i64, book_id: i64) -> Result<bool> {
        let conn = self.conn();
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM reviews WHERE user_id = ?1 AND book_id = ?2",
                params![user_id, book_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to check review: {}", e)))?;
        Ok(found.is_some())
    }

    /// Update rating and/or text; always refreshes `updated_at`.
    pub fn update_review(&self, id: i64, rating: Option<i64>, review_text: Option<&str>) -> Result<bool> {
        let mut sets = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(rating) = rating {
            sets.push("rating = ?");
            values.push(rating.into());
        }
        if let Some(review_text) = review_text {
            sets.push("review_text = ?");
            values.push(review_text.to_string().into());
        }
        if sets.is_empty() {
            return Ok(false);
        }
        // Always moves forward, even within the same second
        sets.push("updated_at = MAX(?, updated_at + 1)");
        values.push(now_timestamp().into());
        values.push(id.into());

        let conn = self.conn();
        let rows = conn
            .execute(
                &format!("UPDATE reviews SET {} WHERE id = ?", sets.join(", ")),
                params_from_iter(values),
            )
            .map_err(|e| AppError::Internal(format!("Failed to update review: {}", e)))?;
        Ok(rows > 0)
    }

    /// Delete review.
    pub fn delete_review(&self, id: i64, user_id: i64) -> Result<bool> {
        let conn = self.conn();
        let rows = conn
            .execute(
                "DELETE FROM reviews WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to delete review: {}", e)))?;
        Ok(rows > 0)
    }

    fn row_to_review(row: &rusqlite::Row<'_>) -> rusqlite::Result<Review> {
        Ok(Review {
            id: row.get(0)?,
            user_id: row.get(1)?,
            book_id: row.get(2)?,
            book_title: row.get(3)?,
            book_author: row.get(4)?,
            username: row.get(5)?,
            first_name: row.get(6)?,
            last_name: row.get(7)?,
            rating: row.get(8)?,
            review_text: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}
