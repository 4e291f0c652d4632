use crate::error::{AuthError, Result};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Prefix for environment overrides, e.g. `AUTH__SERVER__LISTEN_ADDR`
const ENV_PREFIX: &str = "AUTH";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Token signing and TOTP settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC key for every issued token. Empty means "generate at startup".
    pub jwt_secret: String,
    /// Issuer shown in authenticator apps
    pub issuer: String,
    pub session_ttl_secs: u64,
    pub second_factor_ttl_secs: u64,
    pub setup_ttl_secs: u64,
    /// Accepted clock drift in TOTP steps on either side
    pub totp_skew: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://auth.db?mode=rwc".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: "auth-rs".to_string(),
            session_ttl_secs: 6 * 3600,
            second_factor_ttl_secs: 5 * 60,
            setup_ttl_secs: 10 * 60,
            totp_skew: 1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then apply
    /// `AUTH__SECTION__KEY` environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| AuthError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let auth = &self.auth;

        if auth.session_ttl_secs == 0 || auth.second_factor_ttl_secs == 0 || auth.setup_ttl_secs == 0
        {
            return Err(AuthError::Config("Token TTLs must be non-zero".to_string()));
        }

        if auth.issuer.trim().is_empty() {
            return Err(AuthError::Config("TOTP issuer must not be empty".to_string()));
        }

        if self.database.url.is_empty() {
            return Err(AuthError::Config("Database URL must not be empty".to_string()));
        }

        Ok(())
    }

    /// Fill in a random signing key if none was configured
    pub fn ensure_signing_key(&mut self) {
        if self.auth.jwt_secret.is_empty() {
            warn!("No auth.jwt_secret configured, generating an ephemeral key");
            self.auth.jwt_secret = random_key(64);
        }
    }

    /// Fall back to the key already in use when none is configured, so a
    /// reload of a keyless configuration keeps existing sessions valid
    pub fn keep_signing_key(&mut self, current: &str) {
        if self.auth.jwt_secret.is_empty() {
            self.auth.jwt_secret = current.to_string();
        }
    }
}

fn random_key(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.listen_addr, "0.0.0.0:3000");
        assert_eq!(config.auth.totp_skew, 1);
        assert!(config.auth.jwt_secret.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[auth]
jwt_secret = "file-secret"
second_factor_ttl_secs = 60
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.auth.jwt_secret, "file-secret");
        assert_eq!(config.auth.second_factor_ttl_secs, 60);
        // Unset keys keep their defaults
        assert_eq!(config.auth.session_ttl_secs, 6 * 3600);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Config::load(Some(Path::new("/nonexistent/auth-rs.toml")));
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = Config::default();
        config.auth.second_factor_ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ensure_signing_key() {
        let mut config = Config::default();
        config.ensure_signing_key();
        assert_eq!(config.auth.jwt_secret.len(), 64);

        let existing = config.auth.jwt_secret.clone();
        config.ensure_signing_key();
        assert_eq!(config.auth.jwt_secret, existing);
    }

    #[test]
    fn test_keep_signing_key() {
        let mut config = Config::default();
        config.keep_signing_key("running-key");
        assert_eq!(config.auth.jwt_secret, "running-key");

        config.auth.jwt_secret = "configured-key".to_string();
        config.keep_signing_key("running-key");
        assert_eq!(config.auth.jwt_secret, "configured-key");
    }
}
