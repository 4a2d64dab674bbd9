//! ebook-library: the data service behind an e-book library.
//!
//! Readers browse and search a catalog, keep bookmarks and reading progress,
//! and review books; administrators manage books and categories. Everything
//! is exposed as JSON over HTTP with a uniform `{success, data, message}`
//! envelope and persisted in SQLite.
//!
//! # Features
//!
//! - Paginated, filtered book listing with rating aggregates
//! - Soft-deleted books and guarded category deletion
//! - Owner-scoped bookmarks, progress upserts and one review per book
//! - Session tokens via bearer header or cookie, Argon2 password hashes
//! - Admin bootstrap from the command line

#![forbid(unsafe_code)]

/// Bookmarks, reading progress, reviews, reader view.
pub mod activity;
/// Authentication, sessions and profiles.
pub mod auth;
/// Books and categories.
pub mod catalog;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// HTTP server.
pub mod server;
/// Input normalization and pagination.
pub mod util;


pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::{AppState, create_router};
