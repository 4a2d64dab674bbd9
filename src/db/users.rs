use super::schema::{Database, is_unique_violation};
use super::{NewUser, ReadingProgress, Session, User, UserPatch, UserStats, now_timestamp};
use crate::error::{AppError, Result};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, first_name, last_name, role, created_at";

impl Database {
    // ========== USER OPERATIONS ==========

    /// Create a new user and return it.
    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        let conn = self.conn();
        let created_at = now_timestamp();
        conn.execute(
            "INSERT INTO users (username, email, password_hash, first_name, last_name, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.username,
                user.email,
                user.password_hash,
                user.first_name,
                user.last_name,
                user.role,
                created_at,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Validation("Username or email already exists".to_string())
            } else {
                AppError::Internal(format!("Failed to create user: {}", e))
            }
        })?;

        Ok(User {
            id: conn.last_insert_rowid(),
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role.clone(),
            created_at,
        })
    }

    /// Get user by ID.
    pub fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get the user whose username or email equals `login`.
    pub fn get_user_by_login(&self, login: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {} FROM users WHERE username = ?1 OR email = ?1
                 ORDER BY username = ?1 DESC LIMIT 1",
                USER_COLUMNS
            ),
            params![login],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Whether a user already holds this username or this email.
    pub fn user_exists(&self, username: &str, email: &str) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE username = ?1 OR email = ?2",
                params![username, email],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Internal(format!("Failed to check user: {}", e)))?;
        Ok(count > 0)
    }

    /// Whether another user (not `user_id`) already uses this email.
    pub fn email_taken_by_other(&self, email: &str, user_id: i64) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE email = ?1 AND id != ?2",
                params![email, user_id],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Internal(format!("Failed to check email: {}", e)))?;
        Ok(count > 0)
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM users ORDER BY username", USER_COLUMNS))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map([], Self::row_to_user)
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(users)
    }

    /// Apply a partial profile update. Returns false if the user does not exist.
    pub fn update_user(&self, user_id: i64, patch: &UserPatch) -> Result<bool> {
        let mut sets = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(first_name) = &patch.first_name {
            sets.push("first_name = ?");
            values.push(first_name.clone().into());
        }
        if let Some(last_name) = &patch.last_name {
            sets.push("last_name = ?");
            values.push(last_name.clone().into());
        }
        if let Some(email) = &patch.email {
            sets.push("email = ?");
            values.push(email.clone().into());
        }
        if let Some(password_hash) = &patch.password_hash {
            sets.push("password_hash = ?");
            values.push(password_hash.clone().into());
        }

        if sets.is_empty() {
            return Ok(false);
        }
        values.push(user_id.into());

        let conn = self.conn();
        let rows = conn
            .execute(
                &format!("UPDATE users SET {} WHERE id = ?", sets.join(", ")),
                params_from_iter(values),
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Validation("Email already exists".to_string())
                } else {
                    AppError::Internal(format!("Failed to update user: {}", e))
                }
            })?;
        Ok(rows > 0)
    }

    /// Update user password by username.
    pub fn update_user_password(&self, username: &str, password_hash: &str) -> Result<bool> {
        let conn = self.conn();
        let rows = conn
            .execute(
                "UPDATE users SET password_hash = ?1 WHERE username = ?2",
                params![password_hash, username],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update password: {}", e)))?;
        Ok(rows > 0)
    }

    /// Count distinct books the user has progress on, bookmarked, and reviewed.
    pub fn user_stats(&self, user_id: i64) -> Result<UserStats> {
        let conn = self.conn();
        conn.query_row(
            "SELECT
                (SELECT COUNT(DISTINCT book_id) FROM reading_progress WHERE user_id = ?1),
                (SELECT COUNT(DISTINCT book_id) FROM bookmarks WHERE user_id = ?1),
                (SELECT COUNT(DISTINCT book_id) FROM reviews WHERE user_id = ?1)",
            params![user_id],
            |row| {
                Ok(UserStats {
                    books_read: row.get(0)?,
                    books_bookmarked: row.get(1)?,
                    books_reviewed: row.get(2)?,
                })
            },
        )
        .map_err(|e| AppError::Internal(format!("Failed to get user stats: {}", e)))
    }

    /// Most recently read books for a user.
    pub fn recent_reading(&self, user_id: i64, limit: u32) -> Result<Vec<ReadingProgress>> {
        self.progress_rows(user_id, limit as i64)
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            first_name: row.get(4)?,
            last_name: row.get(5)?,
            role: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    // ========== SESSION OPERATIONS ==========

    /// Create session.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![session.token, session.user_id, session.expires_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create session: {}", e)))?;
        Ok(())
    }

    /// Get session by token.
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get session: {}", e)))
    }

    /// Delete session.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(|e| AppError::Internal(format!("Failed to delete session: {}", e)))?;
        Ok(())
    }

    /// Cleanup expired sessions.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn();
        let rows = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at < ?1",
                params![now_timestamp()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to cleanup sessions: {}", e)))?;
        Ok(rows)
    }
}
