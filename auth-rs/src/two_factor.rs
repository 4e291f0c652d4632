//! Two-factor login protocol
//!
//! ```text
//! login ──(2FA off)──────────────────────────────► session token
//!   └───(2FA on)──► temporary token ──verify──────► session token
//! ```
//!
//! Setup, disable and status require a session token. Every credential,
//! token or code mismatch surfaces as the same 401.
//!
//! A temporary token is not invalidated once used; it stays valid for
//! verification until it expires.

use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::store::{TwoFactorEvent, TwoFactorStore, User, UserStore};
use crate::token::{SessionUser, Token, TokenCodec};
use crate::totp::{TotpConfig, TotpService};

/// A freshly minted session
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub token: String,
    pub basket_id: i64,
    pub email: String,
}

/// Result of a correct password
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Session(SessionGrant),
    /// 2FA is enabled, the client must call verify with this token
    SecondFactorRequired { tmp_token: String },
}

/// 2FA status of the calling user.
///
/// When 2FA is off, a candidate secret and the signed setup token binding
/// it are included so the client can enrol. The committed secret is never
/// returned.
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorStatus {
    pub setup: bool,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(rename = "setupToken", skip_serializing_if = "Option::is_none")]
    pub setup_token: Option<String>,
    /// `otpauth://` URI for the candidate secret, for QR rendering
    #[serde(rename = "otpauthUrl", skip_serializing_if = "Option::is_none")]
    pub otpauth_url: Option<String>,
}

pub struct TwoFactorService {
    users: UserStore,
    two_factor: TwoFactorStore,
    totp: RwLock<Arc<TotpService>>,
    codec: RwLock<Arc<TokenCodec>>,
}

fn totp_service(config: &AuthConfig) -> TotpService {
    TotpService::with_config(TotpConfig {
        issuer: config.issuer.clone(),
        skew: config.totp_skew,
        ..TotpConfig::default()
    })
}

impl TwoFactorService {
    pub fn new(db: SqlitePool, config: &AuthConfig) -> Result<Self> {
        Ok(Self {
            users: UserStore::new(db.clone()),
            two_factor: TwoFactorStore::new(db),
            totp: RwLock::new(Arc::new(totp_service(config))),
            codec: RwLock::new(Arc::new(TokenCodec::new(config)?)),
        })
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn two_factor_store(&self) -> &TwoFactorStore {
        &self.two_factor
    }

    /// Current TOTP settings. The guard is released before this returns.
    pub async fn totp(&self) -> Arc<TotpService> {
        self.totp.read().await.clone()
    }

    /// Current codec. The guard is released before this returns.
    pub async fn codec(&self) -> Arc<TokenCodec> {
        self.codec.read().await.clone()
    }

    /// Replace the signing key, token lifetimes and TOTP settings.
    ///
    /// Tokens signed with the previous key stop verifying immediately.
    /// Nothing is swapped if the new configuration is rejected.
    pub async fn reload(&self, config: &AuthConfig) -> Result<()> {
        let codec = Arc::new(TokenCodec::new(config)?);
        let totp = Arc::new(totp_service(config));

        *self.codec.write().await = codec;
        *self.totp.write().await = totp;
        info!(
            "Auth configuration reloaded (issuer {}, skew {})",
            config.issuer, config.totp_skew
        );
        Ok(())
    }

    /// Check email and password, then either open a session or ask for
    /// the second factor
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let user = self.check_credentials(email, password).await?;

        if self.two_factor.is_enabled(user.id).await? {
            let tmp_token = self
                .codec()
                .await
                .issue(&Token::SecondFactorPending { user_id: user.id })?;

            self.two_factor
                .record_event(user.id, TwoFactorEvent::SecondFactorRequired)
                .await?;
            info!("Password accepted for {}, second factor required", user.email);

            return Ok(LoginOutcome::SecondFactorRequired { tmp_token });
        }

        let grant = self.issue_session(&user).await?;
        info!("Login successful for {}", user.email);
        Ok(LoginOutcome::Session(grant))
    }

    /// Exchange a temporary token plus a TOTP code for a session
    pub async fn verify(&self, tmp_token: &str, totp_token: &str) -> Result<SessionGrant> {
        let user_id = self.codec().await.verify_second_factor(tmp_token).map_err(|e| {
            warn!("2FA verify rejected temporary token: {}", e);
            AuthError::Unauthorized
        })?;

        let Some(config) = self.two_factor.get(user_id).await? else {
            warn!("2FA verify for user {} without 2FA configured", user_id);
            return Err(AuthError::Unauthorized);
        };

        let code_ok = config.is_enabled && self.totp().await.check_current(&config.secret, totp_token);
        if !code_ok {
            self.two_factor
                .record_event(user_id, TwoFactorEvent::VerifyFailed)
                .await?;
            warn!("2FA verify failed for user {}", user_id);
            return Err(AuthError::Unauthorized);
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        self.two_factor
            .record_event(user_id, TwoFactorEvent::VerifySuccess)
            .await?;
        info!("2FA verified for {}", user.email);

        self.issue_session(&user).await
    }

    /// The "authenticated" predicate: only session tokens pass
    pub async fn authenticate(&self, bearer: &str) -> Result<SessionUser> {
        self.codec().await.verify_session(bearer).map_err(|e| {
            warn!("Bearer token rejected: {}", e);
            AuthError::NotAuthenticated
        })
    }

    pub async fn status(&self, session: &SessionUser) -> Result<TwoFactorStatus> {
        if self.two_factor.is_enabled(session.id).await? {
            return Ok(TwoFactorStatus {
                setup: true,
                email: session.email.clone(),
                secret: None,
                setup_token: None,
                otpauth_url: None,
            });
        }

        let totp = self.totp().await;
        let secret = totp.generate_secret();
        let otpauth_url = totp
            .provisioning_uri(&secret, &session.email)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        let setup_token = self.codec().await.issue(&Token::TotpSetup {
            secret: secret.clone(),
        })?;

        Ok(TwoFactorStatus {
            setup: false,
            email: session.email.clone(),
            secret: Some(secret),
            setup_token: Some(setup_token),
            otpauth_url: Some(otpauth_url),
        })
    }

    /// Enable 2FA with the secret bound in `setup_token`, proven by
    /// `initial_token`
    pub async fn setup(
        &self,
        session: &SessionUser,
        password: &str,
        setup_token: &str,
        initial_token: &str,
    ) -> Result<()> {
        let user = self.require_password(session, password).await?;

        // The secret is write-once until 2FA is disabled again
        if self.two_factor.is_enabled(user.id).await? {
            warn!("2FA setup refused for {}: already enabled", user.email);
            return Err(AuthError::Unauthorized);
        }

        let secret = self.codec().await.verify_setup(setup_token).map_err(|e| {
            warn!("2FA setup rejected setup token for {}: {}", user.email, e);
            AuthError::Unauthorized
        })?;

        if !self.totp().await.check_current(&secret, initial_token) {
            warn!("2FA setup failed for {}: initial code mismatch", user.email);
            return Err(AuthError::Unauthorized);
        }

        self.two_factor.set_secret(user.id, &secret).await?;
        self.two_factor
            .record_event(user.id, TwoFactorEvent::SetupCompleted)
            .await?;
        info!("2FA enabled for {}", user.email);

        Ok(())
    }

    /// Turn 2FA off. Succeeds on accounts where it is already off.
    pub async fn disable(&self, session: &SessionUser, password: &str) -> Result<()> {
        let user = self.require_password(session, password).await?;

        if self.two_factor.clear(user.id).await? {
            self.two_factor
                .record_event(user.id, TwoFactorEvent::Disabled)
                .await?;
            info!("2FA disabled for {}", user.email);
        }

        Ok(())
    }

    async fn check_credentials(&self, email: &str, password: &str) -> Result<User> {
        let Some(user) = self.users.find_by_email(email).await? else {
            // Same argon2 cost as a wrong password on a real account
            self.users.verify_unknown_password(password);
            warn!("Authentication failed: user not found: {}", email);
            return Err(AuthError::InvalidCredentials);
        };

        if !self.users.verify_password(&user, password) {
            warn!("Authentication failed: invalid password for {}", email);
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    async fn require_password(&self, session: &SessionUser, password: &str) -> Result<User> {
        let user = self
            .users
            .find_by_id(session.id)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        if !self.users.verify_password(&user, password) {
            warn!("Password re-check failed for {}", user.email);
            return Err(AuthError::Unauthorized);
        }

        Ok(user)
    }

    async fn issue_session(&self, user: &User) -> Result<SessionGrant> {
        let basket_id = self.users.basket_for(user.id).await?;
        let token = self.codec().await.issue(&Token::Session {
            data: SessionUser {
                id: user.id,
                email: user.email.clone(),
            },
            bid: basket_id,
        })?;

        self.users.touch_last_login(user.id).await?;

        Ok(SessionGrant {
            token,
            basket_id,
            email: user.email.clone(),
        })
    }
}
