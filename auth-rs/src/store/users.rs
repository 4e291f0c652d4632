//! User credential store
//!
//! Passwords are hashed with Argon2 before storage. Each user owns at most
//! one basket, created on first login.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::error::{AuthError, Result};

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
    pub last_login: Option<String>,
}

type UserRow = (i64, String, String, String, Option<String>);

impl From<UserRow> for User {
    fn from((id, email, password_hash, created_at, last_login): UserRow) -> Self {
        Self {
            id,
            email,
            password_hash,
            created_at,
            last_login,
        }
    }
}

#[derive(Clone)]
pub struct UserStore {
    db: SqlitePool,
}

impl UserStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Register a new user.
    ///
    /// The `UNIQUE` constraint on `email` decides races between concurrent
    /// registrations; the losers get `Conflict`.
    pub async fn create(&self, email: &str, password: &str) -> Result<User> {
        if self.find_by_email(email).await?.is_some() {
            return Err(already_exists(email));
        }

        let password_hash = hash_password(password)?;
        let created_at = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, created_at) VALUES (?, ?, ?)",
        )
        .bind(email)
        .bind(&password_hash)
        .bind(&created_at)
        .execute(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => already_exists(email),
            e => AuthError::from(e),
        })?;

        info!("User added: {}", email);

        Ok(User {
            id: result.last_insert_rowid(),
            email: email.to_string(),
            password_hash,
            created_at,
            last_login: None,
        })
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, created_at, last_login FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(User::from))
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, created_at, last_login FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(User::from))
    }

    /// Check a password against the stored hash
    pub fn verify_password(&self, user: &User, password: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(&user.password_hash) else {
            debug!("Unreadable password hash for user {}", user.id);
            return false;
        };

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// Run a full Argon2 verification for an email with no account, so the
    /// lookup miss costs as much as a wrong password. Always false.
    pub fn verify_unknown_password(&self, password: &str) -> bool {
        let Some(hash) = dummy_hash() else {
            return false;
        };
        let Ok(parsed_hash) = PasswordHash::new(hash) else {
            return false;
        };

        let _ = Argon2::default().verify_password(password.as_bytes(), &parsed_hash);
        false
    }

    pub async fn touch_last_login(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Id of the user's basket, creating it if needed
    pub async fn basket_for(&self, user_id: i64) -> Result<i64> {
        sqlx::query("INSERT OR IGNORE INTO baskets (user_id) VALUES (?)")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        let (id,): (i64,) = sqlx::query_as("SELECT id FROM baskets WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.db)
            .await?;

        Ok(id)
    }

    /// All users, newest first
    pub async fn list(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, created_at, last_login FROM users ORDER BY id DESC",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Returns false if no such user existed
    pub async fn delete(&self, email: &str) -> Result<bool> {
        info!("Deleting user: {}", email);

        let result = sqlx::query("DELETE FROM users WHERE email = ?")
            .bind(email)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn already_exists(email: &str) -> AuthError {
    AuthError::Conflict(format!("User {} already exists", email))
}

/// Hash of a random password, computed once with the same parameters as
/// real user hashes
fn dummy_hash() -> Option<&'static str> {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

    DUMMY_HASH
        .get_or_init(|| {
            let password = SaltString::generate(&mut OsRng);
            hash_password(password.as_str()).ok()
        })
        .as_deref()
}

/// Hash password with Argon2
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("Failed to hash password: {}", e)))
}
