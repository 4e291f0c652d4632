//! TOTP (Time-based One-Time Password) service
//!
//! Implements RFC 6238 for TOTP generation and validation. Checks are a
//! pure function of the secret, the code and the unix time passed in.

use anyhow::{anyhow, Result};
use chrono::Utc;
use totp_rs::{Algorithm, Secret, TOTP};

/// TOTP service configuration
#[derive(Debug, Clone)]
pub struct TotpConfig {
    /// Issuer name (shown in authenticator apps)
    pub issuer: String,
    /// Number of digits in the TOTP code
    pub digits: usize,
    /// Time step in seconds (default: 30)
    pub step: u64,
    /// Steps of clock drift accepted on either side
    pub skew: u8,
    /// Algorithm to use
    pub algorithm: Algorithm,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "auth-rs".to_string(),
            digits: 6,
            step: 30,
            skew: 1,
            algorithm: Algorithm::SHA1,
        }
    }
}

/// TOTP service for generating and validating codes
#[derive(Debug, Clone)]
pub struct TotpService {
    config: TotpConfig,
}

impl TotpService {
    /// Create a new TOTP service with default configuration
    pub fn new() -> Self {
        Self {
            config: TotpConfig::default(),
        }
    }

    /// Create a new TOTP service with custom configuration
    pub fn with_config(config: TotpConfig) -> Self {
        Self { config }
    }

    /// Generate a new base32 secret
    pub fn generate_secret(&self) -> String {
        Secret::generate_secret().to_encoded().to_string()
    }

    // Secrets shorter than 128 bits are accepted on purpose: existing
    // enrolments use 80-100 bit secrets, so `TOTP::new` would refuse them.
    fn totp(&self, secret_base32: &str, account_name: &str) -> Result<TOTP> {
        let bytes = Secret::Encoded(normalize(secret_base32))
            .to_bytes()
            .map_err(|e| anyhow!("Invalid secret: {:?}", e))?;

        if bytes.is_empty() {
            return Err(anyhow!("Invalid secret: empty"));
        }

        Ok(TOTP::new_unchecked(
            self.config.algorithm,
            self.config.digits,
            self.config.skew,
            self.config.step,
            bytes,
            Some(self.config.issuer.clone()),
            account_name.to_string(),
        ))
    }

    /// Code for the time step containing `time` (unix seconds)
    pub fn generate(&self, secret_base32: &str, time: u64) -> Result<String> {
        Ok(self.totp(secret_base32, "")?.generate(time))
    }

    /// Validate a code at `time`, tolerating `skew` steps of drift.
    ///
    /// An undecodable secret never validates.
    pub fn check(&self, secret_base32: &str, code: &str, time: u64) -> bool {
        match self.totp(secret_base32, "") {
            Ok(totp) => totp.check(code.trim(), time),
            Err(_) => false,
        }
    }

    /// Validate a code against the current time
    pub fn check_current(&self, secret_base32: &str, code: &str) -> bool {
        self.check(secret_base32, code, unix_now())
    }

    /// Generate the current code
    pub fn generate_current(&self, secret_base32: &str) -> Result<String> {
        self.generate(secret_base32, unix_now())
    }

    /// `otpauth://` URI for authenticator apps
    pub fn provisioning_uri(&self, secret_base32: &str, email: &str) -> Result<String> {
        Ok(self.totp(secret_base32, email)?.get_url())
    }
}

impl Default for TotpService {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(secret: &str) -> String {
    secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub(crate) fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}
