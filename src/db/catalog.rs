use super::filter::WhereClause;
use super::schema::Database;
use super::{Book, BookFilter, BookPatch, Category, NewBook, RatedBook, Rating, now_timestamp};
use crate::error::{AppError, Result};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};

const BOOK_COLUMNS: &str = "b.id, b.title, b.author, b.description, b.isbn, b.category_id, c.name,
    b.cover_image, b.file_path, b.file_size, b.file_type, b.pages, b.language,
    b.published_date, b.is_featured, b.is_active, b.created_at";

const RATING_JOIN: &str = "LEFT JOIN (
        SELECT book_id, AVG(rating) AS avg_rating, COUNT(*) AS review_count
        FROM reviews GROUP BY book_id
    ) r ON r.book_id = b.id";

const CATEGORY_SELECT: &str = "SELECT c.id, c.name, c.description, COUNT(b.id), c.created_at
    FROM categories c
    LEFT JOIN books b ON b.category_id = c.id AND b.is_active = 1";

/// Build the WHERE clause for a catalog listing. Only active books are ever listed.
pub fn book_filter_clause(filter: &BookFilter) -> WhereClause {
    let mut clause = WhereClause::new();
    clause.condition("b.is_active = 1");

    if filter.featured {
        clause.condition("b.is_featured = 1");
    }
    if let Some(category_id) = filter.category_id {
        clause.eq("b.category_id", category_id);
    }
    if let Some(author) = filter.author.as_deref().filter(|a| !a.is_empty()) {
        clause.contains("b.author", author);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        clause.contains_any(&["b.title", "b.author", "b.description"], search);
    }

    clause
}

impl Database {
    // ========== BOOK OPERATIONS ==========

    /// Count active books matching the filter.
    pub fn count_books(&self, filter: &BookFilter) -> Result<i64> {
        let clause = book_filter_clause(filter);
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT COUNT(*) FROM books b WHERE {}", clause.sql()),
            params_from_iter(clause.params()),
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to count books: {}", e)))
    }

    /// One page of active books, featured first then newest, with ratings.
    pub fn list_books(&self, filter: &BookFilter, limit: u32, offset: u64) -> Result<Vec<RatedBook>> {
        let clause = book_filter_clause(filter);
        let sql = format!(
            "SELECT {}, r.avg_rating, COALESCE(r.review_count, 0)
             FROM books b
             LEFT JOIN categories c ON c.id = b.category_id
             {}
             WHERE {}
             ORDER BY b.is_featured DESC, b.created_at DESC, b.id DESC
             LIMIT ? OFFSET ?",
            BOOK_COLUMNS,
            RATING_JOIN,
            clause.sql()
        );
        let params = clause.params_with([Value::Integer(limit as i64), Value::Integer(offset as i64)]);

        let conn = self.conn();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map(params_from_iter(params), Self::row_to_rated_book)
            .map_err(|e| AppError::Internal(format!("Failed to list books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

        Ok(books)
    }

    /// Get book by ID, active or not.
    pub fn get_book(&self, id: i64) -> Result<Option<Book>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {} FROM books b
                 LEFT JOIN categories c ON c.id = b.category_id
                 WHERE b.id = ?1",
                BOOK_COLUMNS
            ),
            params![id],
            Self::row_to_book,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get book: {}", e)))
    }

    /// Get book by ID only if it is active.
    pub fn get_active_book(&self, id: i64) -> Result<Option<Book>> {
        Ok(self.get_book(id)?.filter(|b| b.is_active))
    }

    /// Rating aggregate for one book.
    pub fn book_rating(&self, book_id: i64) -> Result<Rating> {
        let conn = self.conn();
        conn.query_row(
            "SELECT AVG(rating), COUNT(*) FROM reviews WHERE book_id = ?1",
            params![book_id],
            |row| Ok(Rating::from_raw(row.get(0)?, row.get(1)?)),
        )
        .map_err(|e| AppError::Internal(format!("Failed to get rating: {}", e)))
    }

    /// Other active books in the same category, featured first then newest.
    pub fn related_books(&self, category_id: i64, exclude_id: i64, limit: u32) -> Result<Vec<RatedBook>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {}, r.avg_rating, COALESCE(r.review_count, 0)
                 FROM books b
                 LEFT JOIN categories c ON c.id = b.category_id
                 {}
                 WHERE b.category_id = ?1 AND b.id != ?2 AND b.is_active = 1
                 ORDER BY b.is_featured DESC, b.created_at DESC, b.id DESC
                 LIMIT ?3",
                BOOK_COLUMNS, RATING_JOIN
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let books = stmt
            .query_map(params![category_id, exclude_id, limit], Self::row_to_rated_book)
            .map_err(|e| AppError::Internal(format!("Failed to get related books: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect books: {}", e)))?;

        Ok(books)
    }

    /// Insert a book and return its ID.
    pub fn create_book(&self, book: &NewBook) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO books
             (title, author, description, isbn, category_id, cover_image, file_path,
              file_size, file_type, pages, language, published_date, is_featured, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1, ?14)",
            params![
                book.title,
                book.author,
                book.description,
                book.isbn,
                book.category_id,
                book.cover_image,
                book.file_path,
                book.file_size,
                book.file_type,
                book.pages,
                book.language,
                book.published_date,
                book.is_featured,
                now_timestamp(),
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create book: {}", e)))?;
        Ok(conn.last_insert_rowid())
    }

    /// Apply a partial update. Returns false if no book has this ID.
    pub fn update_book(&self, id: i64, patch: &BookPatch) -> Result<bool> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        macro_rules! set {
            ($field:ident) => {
                if let Some(v) = &patch.$field {
                    sets.push(concat!(stringify!($field), " = ?"));
                    values.push(v.clone().into());
                }
            };
        }

        set!(title);
        set!(author);
        set!(description);
        set!(isbn);
        set!(category_id);
        set!(cover_image);
        set!(file_path);
        set!(file_size);
        set!(file_type);
        set!(pages);
        set!(language);
        set!(published_date);
        set!(is_featured);
        set!(is_active);

        if sets.is_empty() {
            return Ok(false);
        }
        values.push(id.into());

        let conn = self.conn();
        let rows = conn
            .execute(
                &format!("UPDATE books SET {} WHERE id = ?", sets.join(", ")),
                params_from_iter(values),
            )
            .map_err(|e| AppError::Internal(format!("Failed to update book: {}", e)))?;
        Ok(rows > 0)
    }

    /// Soft-delete. Returns false if no book has this ID.
    pub fn deactivate_book(&self, id: i64) -> Result<bool> {
        let conn = self.conn();
        let rows = conn
            .execute("UPDATE books SET is_active = 0 WHERE id = ?1", params![id])
            .map_err(|e| AppError::Internal(format!("Failed to delete book: {}", e)))?;
        Ok(rows > 0)
    }

    fn row_to_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
        Ok(Book {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            description: row.get(3)?,
            isbn: row.get(4)?,
            category_id: row.get(5)?,
            category_name: row.get(6)?,
            cover_image: row.get(7)?,
            file_path: row.get(8)?,
            file_size: row.get(9)?,
            file_type: row.get(10)?,
            pages: row.get(11)?,
            language: row.get(12)?,
            published_date: row.get(13)?,
            is_featured: row.get(14)?,
            is_active: row.get(15)?,
            created_at: row.get(16)?,
        })
    }

    fn row_to_rated_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<RatedBook> {
        Ok(RatedBook {
            book: Self::row_to_book(row)?,
            rating: Rating::from_raw(row.get(17)?, row.get(18)?),
        })
    }

    // ========== CATEGORY OPERATIONS ==========

    /// All categories with their active book counts, by name.
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!("{} GROUP BY c.id ORDER BY c.name, c.id", CATEGORY_SELECT))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let categories = stmt
            .query_map([], Self::row_to_category)
            .map_err(|e| AppError::Internal(format!("Failed to list categories: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect categories: {}", e)))?;

        Ok(categories)
    }

    /// Get category by ID.
    pub fn get_category(&self, id: i64) -> Result<Option<Category>> {
        let conn = self.conn();
        conn.query_row(
            &format!("{} WHERE c.id = ?1 GROUP BY c.id", CATEGORY_SELECT),
            params![id],
            Self::row_to_category,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get category: {}", e)))
    }

    /// Insert a category and return its ID.
    pub fn create_category(&self, name: &str, description: &str) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO categories (name, description, created_at) VALUES (?1, ?2, ?3)",
            params![name, description, now_timestamp()],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create category: {}", e)))?;
        Ok(conn.last_insert_rowid())
    }

    /// Update name and/or description. Returns false if no category has this ID.
    pub fn update_category(&self, id: i64, name: Option<&str>, description: Option<&str>) -> Result<bool> {
        let mut sets = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(name) = name {
            sets.push("name = ?");
            values.push(name.to_string().into());
        }
        if let Some(description) = description {
            sets.push("description = ?");
            values.push(description.to_string().into());
        }
        if sets.is_empty() {
            return Ok(false);
        }
        values.push(id.into());

        let conn = self.conn();
        let rows = conn
            .execute(
                &format!("UPDATE categories SET {} WHERE id = ?", sets.join(", ")),
                params_from_iter(values),
            )
            .map_err(|e| AppError::Internal(format!("Failed to update category: {}", e)))?;
        Ok(rows > 0)
    }

    /// Number of active books referencing the category.
    pub fn count_active_books_in_category(&self, category_id: i64) -> Result<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM books WHERE category_id = ?1 AND is_active = 1",
            params![category_id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to count books: {}", e)))
    }

    /// Delete a category row. Returns false if it did not exist.
    pub fn delete_category(&self, id: i64) -> Result<bool> {
        let conn = self.conn();
        let rows = conn
            .execute("DELETE FROM categories WHERE id = ?1", params![id])
            .map_err(|e| AppError::Internal(format!("Failed to delete category: {}", e)))?;
        Ok(rows > 0)
    }

    fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            book_count: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}
