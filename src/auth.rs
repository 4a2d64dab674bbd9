//! Authentication, sessions and profile management.

use crate::db::{
    Database, NewUser, ROLE_ADMIN, ROLE_USER, ReadingProgress, Session, User, UserPatch,
    UserStats, now_timestamp,
};
use crate::error::{AppError, Result};
use crate::util::sanitize_input;
use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::{OsRng, RngCore},
    },
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Shortest accepted password.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Books listed under "recently read" on the profile.
const RECENT_READING_LIMIT: u32 = 5;

lazy_static! {
    /// Pragmatic address check: one `@`, no whitespace, dotted domain.
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$"
    ).unwrap();
}

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Check an email address format.
pub fn validate_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

/// Generate a secure random token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The caller, resolved once per request from the session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
    pub role: String,
    pub email: String,
}

impl Identity {
    /// Whether the caller may manage the catalog.
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Fail with `Forbidden` unless the caller is an admin.
    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin access required".to_string()))
        }
    }
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            email: user.email.clone(),
        }
    }
}

/// Fail with `Unauthorized` when nobody is logged in.
pub fn require_login(identity: Option<&Identity>) -> Result<&Identity> {
    identity.ok_or(AppError::Unauthorized)
}

/// Registration form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Partial profile update. Password changes need both password fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

/// Profile view: the user, activity counters, and recently read books.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: User,
    pub stats: UserStats,
    pub recent_books: Vec<ReadingProgress>,
}

/// Answer to "am I logged in?".
#[derive(Debug, Clone, Serialize)]
pub struct AuthStatus {
    pub logged_in: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
}

/// Authentication service.
pub struct AuthService {
    db: Database,
    session_duration_days: u32,
    registration_enabled: bool,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(db: Database, session_duration_days: u32, registration_enabled: bool) -> Self {
        Self {
            db,
            session_duration_days,
            registration_enabled,
        }
    }

    /// Login by username or email and create a session.
    pub fn login(&self, login: &str, password: &str) -> Result<(User, String)> {
        let login = sanitize_input(login);
        if login.is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Username and password are required".to_string(),
            ));
        }

        let user = self
            .db
            .get_user_by_login(&login)?
            .ok_or(AppError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::InvalidCredentials);
        }

        let token = self.open_session(user.id)?;
        tracing::info!(user_id = user.id, username = %user.username, "User logged in");
        Ok((user, token))
    }

    /// Register a new account with role `user` and log it in.
    pub fn register(&self, form: &Registration) -> Result<(User, String)> {
        if !self.registration_enabled {
            return Err(AppError::Validation("Registration is disabled".to_string()));
        }

        let username = sanitize_input(&form.username);
        let email = sanitize_input(&form.email);
        let first_name = sanitize_input(&form.first_name);
        let last_name = sanitize_input(&form.last_name);

        if username.is_empty()
            || email.is_empty()
            || form.password.is_empty()
            || first_name.is_empty()
            || last_name.is_empty()
        {
            return Err(AppError::Validation("All fields are required".to_string()));
        }

        let user = self.create_user(
            &username,
            &email,
            &form.password,
            &first_name,
            &last_name,
            ROLE_USER,
        )?;

        let token = self.open_session(user.id)?;
        tracing::info!(user_id = user.id, username = %user.username, "User registered");
        Ok((user, token))
    }

    /// Create a user with the given role (also used by the CLI).
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
        role: &str,
    ) -> Result<User> {
        if username.is_empty() || username.len() > 64 {
            return Err(AppError::Validation(
                "Username must be 1-64 characters".to_string(),
            ));
        }

        if !validate_email(email) {
            return Err(AppError::Validation("Invalid email format".to_string()));
        }

        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LEN
            )));
        }

        if role != ROLE_ADMIN && role != ROLE_USER {
            return Err(AppError::Validation(
                "Role must be 'admin' or 'user'".to_string(),
            ));
        }

        if self.db.user_exists(username, email)? {
            return Err(AppError::Validation(
                "Username or email already exists".to_string(),
            ));
        }

        self.db.create_user(&NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            role: role.to_string(),
        })
    }

    /// Logout (delete session). Unknown tokens are ignored.
    pub fn logout(&self, token: Option<&str>) -> Result<()> {
        if let Some(token) = token {
            self.db.delete_session(token)?;
        }
        Ok(())
    }

    /// Resolve a session token to the caller's identity.
    pub fn resolve(&self, token: &str) -> Result<Option<Identity>> {
        let session = match self.db.get_session(token)? {
            Some(s) => s,
            None => return Ok(None),
        };

        // Check expiration
        if session.expires_at < now_timestamp() {
            self.db.delete_session(token)?;
            return Ok(None);
        }

        Ok(self.db.get_user_by_id(session.user_id)?.as_ref().map(Identity::from))
    }

    /// Current login state; never fails for anonymous callers.
    pub fn check(&self, identity: Option<&Identity>) -> AuthStatus {
        AuthStatus {
            logged_in: identity.is_some(),
            identity: identity.cloned(),
        }
    }

    /// Profile with activity counters.
    pub fn profile(&self, identity: &Identity) -> Result<Profile> {
        let user = self
            .db
            .get_user_by_id(identity.user_id)?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        Ok(Profile {
            stats: self.db.user_stats(user.id)?,
            recent_books: self.db.recent_reading(user.id, RECENT_READING_LIMIT)?,
            user,
        })
    }

    /// Apply a partial profile update.
    pub fn update_profile(&self, identity: &Identity, update: &ProfileUpdate) -> Result<()> {
        let mut patch = UserPatch {
            first_name: update.first_name.as_deref().map(sanitize_input),
            last_name: update.last_name.as_deref().map(sanitize_input),
            ..UserPatch::default()
        };

        if let Some(email) = update.email.as_deref() {
            let email = sanitize_input(email);
            if !validate_email(&email) {
                return Err(AppError::Validation("Invalid email format".to_string()));
            }
            if self.db.email_taken_by_other(&email, identity.user_id)? {
                return Err(AppError::Validation("Email already exists".to_string()));
            }
            patch.email = Some(email);
        }

        if let (Some(current), Some(new)) = (&update.current_password, &update.new_password) {
            let user = self
                .db
                .get_user_by_id(identity.user_id)?
                .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

            if !verify_password(current, &user.password_hash)? {
                return Err(AppError::Validation(
                    "Current password is incorrect".to_string(),
                ));
            }

            if new.chars().count() < MIN_PASSWORD_LEN {
                return Err(AppError::Validation(format!(
                    "New password must be at least {} characters long",
                    MIN_PASSWORD_LEN
                )));
            }

            patch.password_hash = Some(hash_password(new)?);
        }

        if patch.is_empty() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }

        if !self.db.update_user(identity.user_id, &patch)? {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        tracing::info!(user_id = identity.user_id, "Profile updated");
        Ok(())
    }

    /// Change user password (CLI).
    pub fn change_password(&self, username: &str, new_password: &str) -> Result<bool> {
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters long",
                MIN_PASSWORD_LEN
            )));
        }

        let password_hash = hash_password(new_password)?;
        self.db.update_user_password(username, &password_hash)
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.db.list_users()
    }

    fn open_session(&self, user_id: i64) -> Result<String> {
        let token = generate_token();
        let expires_at = now_timestamp() + (self.session_duration_days as i64 * 24 * 60 * 60);

        self.db.create_session(&Session {
            token: token.clone(),
            user_id,
            expires_at,
        })?;

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_and_verify() {
        let password = "test_password_123";
        let hash = hash_password(password).unwrap();

        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_generate_token() {
        let token1 = generate_token();
        let token2 = generate_token();

        assert_eq!(token1.len(), 43); // Base64 of 32 bytes
        assert_ne!(token1, token2);
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@example.com"));
        assert!(validate_email("a.b+tag@mail.example.org"));
        assert!(!validate_email("alice"));
        assert!(!validate_email("alice@"));
        assert!(!validate_email("alice@localhost"));
        assert!(!validate_email("al ice@example.com"));
        assert!(!validate_email("alice@@example.com"));
    }

    #[test]
    fn test_identity_roles() {
        let mut identity = Identity {
            user_id: 1,
            username: "root".to_string(),
            role: ROLE_ADMIN.to_string(),
            email: "root@example.com".to_string(),
        };
        assert!(identity.require_admin().is_ok());

        identity.role = ROLE_USER.to_string();
        assert!(matches!(identity.require_admin(), Err(AppError::Forbidden(_))));
        assert!(matches!(require_login(None), Err(AppError::Unauthorized)));
    }
}
