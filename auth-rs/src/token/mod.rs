//! Signed, typed bearer tokens
//!
//! Every token carries a `type` discriminator. A token is only accepted
//! where its kind is expected, so a temporary "password valid" token can
//! never stand in for a session.

pub mod codec;

pub use codec::TokenCodec;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identity carried inside a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub email: String,
}

/// Token payloads, tagged by their `type` field on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Token {
    /// Full API access
    #[serde(rename = "session")]
    Session { data: SessionUser, bid: i64 },

    /// Password was correct, a TOTP code is still owed
    #[serde(rename = "password_valid_needs_second_factor_token")]
    SecondFactorPending {
        #[serde(rename = "userId")]
        user_id: i64,
    },

    /// Candidate TOTP secret handed to a client that is enrolling
    #[serde(rename = "totp_setup_secret")]
    TotpSetup { secret: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Session,
    SecondFactorPending,
    TotpSetup,
}

impl TokenKind {
    /// Wire value of the `type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Session => "session",
            TokenKind::SecondFactorPending => "password_valid_needs_second_factor_token",
            TokenKind::TotpSetup => "totp_setup_secret",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Session { .. } => TokenKind::Session,
            Token::SecondFactorPending { .. } => TokenKind::SecondFactorPending,
            Token::TotpSetup { .. } => TokenKind::TotpSetup,
        }
    }
}

/// Reasons a presented token is refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("unexpected token type")]
    WrongType,

    #[error("malformed token")]
    Malformed,
}
