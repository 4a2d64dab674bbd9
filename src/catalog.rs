//! Catalog service: books, categories, ratings.

use crate::auth::Identity;
use crate::config::CatalogConfig;
use crate::db::{
    Book, BookFilter, BookPatch, Category, Database, NewBook, RatedBook, Rating,
    ReadingProgress, Review, ReviewFilter,
};
use crate::error::{AppError, Result};
use crate::util::{Page, PageRequest, format_file_size, lenient_bool, lenient_int, sanitize_input};
use serde::{Deserialize, Serialize};

/// Reviews embedded in the book detail view.
const DETAIL_REVIEW_LIMIT: u32 = 5;
/// Related books embedded in the book detail view.
const RELATED_BOOK_LIMIT: u32 = 4;

/// Book fields as submitted by an admin. Absent fields are `None`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BookForm {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub isbn: Option<String>,
    #[serde(deserialize_with = "lenient_int")]
    pub category_id: Option<i64>,
    pub cover_image: Option<String>,
    pub file_path: Option<String>,
    #[serde(deserialize_with = "lenient_int")]
    pub file_size: Option<i64>,
    pub file_type: Option<String>,
    #[serde(deserialize_with = "lenient_int")]
    pub pages: Option<i64>,
    pub language: Option<String>,
    pub published_date: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_featured: Option<bool>,
    #[serde(deserialize_with = "lenient_bool")]
    pub is_active: Option<bool>,
}

/// Category fields as submitted by an admin.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CategoryForm {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Full book page: the book, its rating, reviews, related titles and the caller's progress.
#[derive(Debug, Clone, Serialize)]
pub struct BookDetail {
    #[serde(flatten)]
    pub book: Book,
    pub rating: Rating,
    pub file_size_human: String,
    pub reviews: Vec<Review>,
    pub related_books: Vec<RatedBook>,
    pub user_progress: Option<ReadingProgress>,
}

/// Catalog service.
pub struct CatalogService {
    db: Database,
    settings: CatalogConfig,
}

impl CatalogService {
    pub fn new(db: Database, settings: CatalogConfig) -> Self {
        Self { db, settings }
    }

    /// Clamp raw listing parameters with the configured page sizes.
    pub fn page_request(&self, page: Option<&str>, limit: Option<&str>) -> PageRequest {
        PageRequest::from_query(
            page,
            limit,
            self.settings.default_page_size,
            self.settings.max_page_size,
        )
    }

    // ========== BOOKS ==========

    /// One page of active books matching the filter.
    ///
    /// Text needles are sanitized like stored values, so `'` and `&` match
    /// their escaped forms.
    pub fn list_books(&self, filter: &BookFilter, page: PageRequest) -> Result<Page<RatedBook>> {
        let filter = BookFilter {
            author: filter.author.as_deref().map(sanitize_input),
            search: filter.search.as_deref().map(sanitize_input),
            ..filter.clone()
        };
        let total = self.db.count_books(&filter)?;
        let items = self.db.list_books(&filter, page.limit, page.offset())?;
        Ok(Page {
            items,
            pagination: page.paginate(total),
        })
    }

    /// Active book with everything the detail page shows.
    pub fn book_detail(&self, id: i64, identity: Option<&Identity>) -> Result<BookDetail> {
        let book = self.require_active_book(id)?;

        let reviews = self.db.list_reviews(
            &ReviewFilter {
                book_id: Some(id),
                user_id: None,
            },
            DETAIL_REVIEW_LIMIT,
            0,
        )?;

        let related_books = match book.category_id {
            Some(category_id) => self.db.related_books(category_id, id, RELATED_BOOK_LIMIT)?,
            None => Vec::new(),
        };

        let user_progress = match identity {
            Some(identity) => self.db.get_progress(identity.user_id, id)?,
            None => None,
        };

        Ok(BookDetail {
            rating: self.db.book_rating(id)?,
            file_size_human: format_file_size(book.file_size),
            book,
            reviews,
            related_books,
            user_progress,
        })
    }

    /// Rating aggregate for a book.
    pub fn book_rating(&self, id: i64) -> Result<Rating> {
        self.db.book_rating(id)
    }

    /// Fetch an active book or fail with `NotFound`.
    pub fn require_active_book(&self, id: i64) -> Result<Book> {
        self.db
            .get_active_book(id)?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
    }

    /// Create a book (admin only) and return its ID.
    pub fn create_book(&self, identity: &Identity, form: &BookForm) -> Result<i64> {
        identity.require_admin()?;

        let title = required_field(&form.title, "title")?;
        let author = required_field(&form.author, "author")?;
        let file_path = required_field(&form.file_path, "file_path")?;

        let book = NewBook {
            title,
            author,
            description: optional_text(&form.description),
            isbn: optional_text(&form.isbn),
            category_id: form.category_id.filter(|id| *id != 0),
            cover_image: optional_text(&form.cover_image),
            file_path,
            file_size: form.file_size.unwrap_or(0),
            file_type: optional_text(&form.file_type),
            pages: form.pages.unwrap_or(0),
            language: form
                .language
                .as_deref()
                .map(sanitize_input)
                .unwrap_or_else(|| "en".to_string()),
            published_date: published_date(&form.published_date),
            is_featured: form.is_featured.unwrap_or(false),
        };

        let id = self.db.create_book(&book)?;
        tracing::info!(book_id = id, admin = %identity.username, title = %book.title, "Book created");
        Ok(id)
    }

    /// Update the allow-listed fields present in the form (admin only).
    pub fn update_book(&self, identity: &Identity, id: i64, form: &BookForm) -> Result<()> {
        identity.require_admin()?;

        let required = |value: &Option<String>, name: &str| -> Result<Option<String>> {
            match value {
                Some(_) => required_field(value, name).map(Some),
                None => Ok(None),
            }
        };

        let patch = BookPatch {
            title: required(&form.title, "title")?,
            author: required(&form.author, "author")?,
            description: form.description.as_deref().map(sanitize_input),
            isbn: form.isbn.as_deref().map(sanitize_input),
            category_id: form.category_id.map(|id| Some(id).filter(|id| *id != 0)),
            cover_image: form.cover_image.as_deref().map(sanitize_input),
            file_path: required(&form.file_path, "file_path")?,
            file_size: form.file_size,
            file_type: form.file_type.as_deref().map(sanitize_input),
            pages: form.pages,
            language: form.language.as_deref().map(sanitize_input),
            published_date: form
                .published_date
                .as_ref()
                .map(|_| published_date(&form.published_date)),
            is_featured: form.is_featured,
            is_active: form.is_active,
        };

        if patch.is_empty() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }

        if !self.db.update_book(id, &patch)? {
            return Err(AppError::NotFound("Book not found".to_string()));
        }

        tracing::info!(book_id = id, admin = %identity.username, "Book updated");
        Ok(())
    }

    /// Soft-delete a book (admin only). Deleting an inactive book again succeeds.
    pub fn delete_book(&self, identity: &Identity, id: i64) -> Result<()> {
        identity.require_admin()?;

        if !self.db.deactivate_book(id)? {
            return Err(AppError::NotFound("Book not found".to_string()));
        }

        tracing::info!(book_id = id, admin = %identity.username, "Book deactivated");
        Ok(())
    }

    // ========== CATEGORIES ==========

    /// All categories with active book counts, by name.
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        self.db.list_categories()
    }

    /// Create a category (admin only) and return its ID.
    pub fn create_category(&self, identity: &Identity, form: &CategoryForm) -> Result<i64> {
        identity.require_admin()?;

        let name = category_name(form.name.as_deref())?;
        let description = optional_text(&form.description);

        let id = self.db.create_category(&name, &description)?;
        tracing::info!(category_id = id, admin = %identity.username, name = %name, "Category created");
        Ok(id)
    }

    /// Rename or re-describe a category (admin only).
    pub fn update_category(&self, identity: &Identity, id: i64, form: &CategoryForm) -> Result<()> {
        identity.require_admin()?;

        let name = form.name.as_deref().map(|n| category_name(Some(n))).transpose()?;
        let description = form.description.as_deref().map(sanitize_input);

        if name.is_none() && description.is_none() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }

        if !self
            .db
            .update_category(id, name.as_deref(), description.as_deref())?
        {
            return Err(AppError::NotFound("Category not found".to_string()));
        }

        tracing::info!(category_id = id, admin = %identity.username, "Category updated");
        Ok(())
    }

    /// Delete a category (admin only) unless it still holds active books.
    pub fn delete_category(&self, identity: &Identity, id: i64) -> Result<()> {
        identity.require_admin()?;

        if self.db.count_active_books_in_category(id)? > 0 {
            return Err(AppError::Validation(
                "Cannot delete category with active books".to_string(),
            ));
        }

        if !self.db.delete_category(id)? {
            return Err(AppError::NotFound("Category not found".to_string()));
        }

        tracing::info!(category_id = id, admin = %identity.username, "Category deleted");
        Ok(())
    }
}

fn required_field(value: &Option<String>, name: &str) -> Result<String> {
    value
        .as_deref()
        .map(sanitize_input)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("Missing required field: {}", name)))
}

fn optional_text(value: &Option<String>) -> String {
    value.as_deref().map(sanitize_input).unwrap_or_default()
}

/// Blank dates are stored as NULL.
fn published_date(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(sanitize_input)
        .filter(|d| !d.is_empty())
}

fn category_name(name: Option<&str>) -> Result<String> {
    name.map(sanitize_input)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::Validation("Category name is required".to_string()))
}
