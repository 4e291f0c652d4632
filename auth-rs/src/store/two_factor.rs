//! Per-user TOTP state and audit trail
//!
//! A missing row means 2FA is disabled. Setup upserts the row, disable
//! deletes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;
use uuid::Uuid;

use crate::error::Result;

/// 2FA configuration for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoFactorConfig {
    pub user_id: i64,
    /// Base32 TOTP secret
    pub secret: String,
    pub is_enabled: bool,
    pub enabled_at: Option<DateTime<Utc>>,
}

/// Types of 2FA events for audit logging
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TwoFactorEvent {
    /// Password accepted, temporary token issued
    SecondFactorRequired,
    VerifySuccess,
    VerifyFailed,
    SetupCompleted,
    Disabled,
}

impl fmt::Display for TwoFactorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TwoFactorEvent::SecondFactorRequired => write!(f, "second_factor_required"),
            TwoFactorEvent::VerifySuccess => write!(f, "verify_success"),
            TwoFactorEvent::VerifyFailed => write!(f, "verify_failed"),
            TwoFactorEvent::SetupCompleted => write!(f, "setup_completed"),
            TwoFactorEvent::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorAuditEntry {
    pub id: String,
    pub user_id: i64,
    pub event_type: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct TwoFactorStore {
    db: SqlitePool,
}

impl TwoFactorStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn get(&self, user_id: i64) -> Result<Option<TwoFactorConfig>> {
        let row = sqlx::query_as::<_, (i64, String, i32, Option<String>)>(
            "SELECT user_id, secret, is_enabled, enabled_at FROM two_factor_config WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(user_id, secret, enabled, enabled_at)| TwoFactorConfig {
            user_id,
            secret,
            is_enabled: enabled != 0,
            enabled_at: enabled_at.and_then(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .ok()
                    .map(|d| d.with_timezone(&Utc))
            }),
        }))
    }

    pub async fn is_enabled(&self, user_id: i64) -> Result<bool> {
        Ok(self
            .get(user_id)
            .await?
            .map(|c| c.is_enabled && !c.secret.is_empty())
            .unwrap_or(false))
    }

    /// Commit a secret and enable 2FA
    pub async fn set_secret(&self, user_id: i64, secret: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO two_factor_config (user_id, secret, is_enabled, enabled_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                secret = excluded.secret,
                is_enabled = 1,
                enabled_at = excluded.enabled_at
            "#,
        )
        .bind(user_id)
        .bind(secret)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Remove the user's 2FA state. Returns false if there was none.
    pub async fn clear(&self, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM two_factor_config WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn record_event(&self, user_id: i64, event: TwoFactorEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO two_factor_audit_log (id, user_id, event_type, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(event.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Audit entries for a user, oldest first
    pub async fn events(&self, user_id: i64) -> Result<Vec<TwoFactorAuditEntry>> {
        let rows = sqlx::query_as::<_, (String, i64, String, String)>(
            "SELECT id, user_id, event_type, created_at FROM two_factor_audit_log WHERE user_id = ? ORDER BY rowid",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, user_id, event_type, created_at)| TwoFactorAuditEntry {
                id,
                user_id,
                event_type,
                created_at,
            })
            .collect())
    }
}
