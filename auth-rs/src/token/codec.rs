//! JWT encoding and verification for [`Token`]

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::{SessionUser, Token, TokenError, TokenKind};
use crate::config::AuthConfig;
use crate::error::{AuthError, Result};

/// Registered claims plus the untyped payload.
///
/// The payload stays untyped until `kind` has been checked against what
/// the caller expects.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "type")]
    kind: String,
    iat: u64,
    exp: u64,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

/// Issues and verifies tokens with a single HMAC key
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    session_ttl: u64,
    second_factor_ttl: u64,
    setup_ttl: u64,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        if config.jwt_secret.is_empty() {
            return Err(AuthError::Config("Signing key is empty".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Ok(Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            session_ttl: config.session_ttl_secs,
            second_factor_ttl: config.second_factor_ttl_secs,
            setup_ttl: config.setup_ttl_secs,
        })
    }

    fn ttl(&self, kind: TokenKind) -> u64 {
        match kind {
            TokenKind::Session => self.session_ttl,
            TokenKind::SecondFactorPending => self.second_factor_ttl,
            TokenKind::TotpSetup => self.setup_ttl,
        }
    }

    /// Sign a token, stamping `iat` and a kind-specific `exp`
    pub fn issue(&self, token: &Token) -> Result<String> {
        self.issue_at(token, now())
    }

    fn issue_at(&self, token: &Token, issued_at: u64) -> Result<String> {
        let Value::Object(mut fields) = serde_json::to_value(token)? else {
            return Err(AuthError::Internal("Token payload is not an object".to_string()));
        };
        fields.remove("type");

        let claims = Claims {
            kind: token.kind().as_str().to_string(),
            iat: issued_at,
            exp: issued_at + self.ttl(token.kind()),
            fields,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Verify signature and expiry, then require the given kind
    pub fn verify(&self, raw: &str, expected: TokenKind) -> std::result::Result<Token, TokenError> {
        let data = decode::<Claims>(raw, &self.decoding, &self.validation).map_err(|e| {
            debug!("Token rejected: {}", e);
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            }
        })?;

        let Claims { kind, mut fields, .. } = data.claims;

        if kind != expected.as_str() {
            debug!("Token rejected: expected {}, got {}", expected, kind);
            return Err(TokenError::WrongType);
        }

        fields.insert("type".to_string(), Value::String(kind));
        serde_json::from_value(Value::Object(fields)).map_err(|_| TokenError::Malformed)
    }

    /// Accepts only session tokens
    pub fn verify_session(&self, raw: &str) -> std::result::Result<SessionUser, TokenError> {
        match self.verify(raw, TokenKind::Session)? {
            Token::Session { data, .. } => Ok(data),
            _ => Err(TokenError::WrongType),
        }
    }

    /// Returns the user id behind a "password valid" token
    pub fn verify_second_factor(&self, raw: &str) -> std::result::Result<i64, TokenError> {
        match self.verify(raw, TokenKind::SecondFactorPending)? {
            Token::SecondFactorPending { user_id } => Ok(user_id),
            _ => Err(TokenError::WrongType),
        }
    }

    /// Returns the candidate secret behind a setup token
    pub fn verify_setup(&self, raw: &str) -> std::result::Result<String, TokenError> {
        match self.verify(raw, TokenKind::TotpSetup)? {
            Token::TotpSetup { secret } => Ok(secret),
            _ => Err(TokenError::WrongType),
        }
    }
}

fn now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}
