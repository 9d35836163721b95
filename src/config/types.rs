//! The configuration structs used to build the AppConfig, and their impls.
use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use strum_macros::AsRefStr;

use crate::config::{ConfigError, ConfigResult};

// ###################################
// ->   STRUCTS
// ###################################
#[derive(AsRefStr, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Local,
    Production,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AppConfig {
    /// Set from `APP_ENVIRONMENT` after the files are merged, never read from them.
    #[serde(skip)]
    pub environment: Environment,
    pub net_config: NetConfig,
    pub recaptcha_config: RecaptchaConfig,
    pub sheets_config: SheetsConfig,
    pub rate_limit_config: RateLimitConfig,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NetConfig {
    pub host: [u8; 4],
    pub app_port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RecaptchaConfig {
    /// The `siteverify` endpoint.
    pub url: String,
    /// Public key handed to the landing page. Empty disables the client side token request.
    #[serde(default)]
    pub site_key: String,
    pub secret_key: Option<SecretString>,
    #[serde(default)]
    pub skip: bool,
    pub min_score: f64,
    /// The action name the landing page requests tokens for.
    pub action: String,
    /// When set, a token issued for any other action is rejected.
    pub expected_action: Option<String>,
    pub timeout_millis: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SheetsConfig {
    pub api_url: String,
    pub token_url: String,
    pub client_email: Option<String>,
    pub private_key: Option<SecretString>,
    pub spreadsheet_id: Option<String>,
    pub sheet_name: String,
    pub timeout_millis: u64,
}

/// Everything needed to talk to the spreadsheet as the service account.
#[derive(Clone, Debug)]
pub struct SheetsCredentials {
    pub client_email: String,
    pub private_key: SecretString,
    pub spreadsheet_id: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Answer rate limited requests with a success-shaped body. Ignored in production.
    #[serde(default)]
    pub soft: bool,
    pub max_per_min_ip: usize,
    pub max_per_hour_ip: usize,
    pub max_per_min_email: usize,
    pub max_per_hour_email: usize,
}

// ###################################
// ->   IMPLs
// ###################################
impl AppConfig {
    /// Merges `base.toml`, `{environment}.toml` and the environment overrides found in the process env.
    pub fn load(config_dir: &Path, environment: Environment) -> ConfigResult<Self> {
        let environment_filename = format!("{}.toml", environment.as_ref().to_lowercase());

        let figment = Figment::new()
            .merge(Toml::file(config_dir.join("base.toml")))
            .merge(Toml::file(config_dir.join(environment_filename)))
            .merge(Env::prefixed("APP_").split("__"))
            .merge(conventional_env());

        Self::from_figment(figment, environment)
    }

    pub fn from_figment(figment: Figment, environment: Environment) -> ConfigResult<Self> {
        let mut config: AppConfig = figment.extract()?;
        config.environment = environment;

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }

    /// Soft rate limiting is only honoured outside of production.
    pub fn soft_rate_limit(&self) -> bool {
        self.rate_limit_config.soft && !self.is_production()
    }
}

impl RecaptchaConfig {
    /// Verification runs only when a secret is present and skipping wasn't requested.
    pub fn verification_secret(&self) -> Option<&SecretString> {
        if self.skip {
            return None;
        }
        self.secret_key
            .as_ref()
            .filter(|secret| !secret.expose_secret().trim().is_empty())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_millis)
    }
}

impl SheetsConfig {
    /// Returns `None` unless the account email, the private key and the spreadsheet id are all set.
    /// Keys passed through env vars usually carry literal `\n` sequences, those get unescaped here.
    pub fn credentials(&self) -> Option<SheetsCredentials> {
        let non_empty = |s: &str| !s.trim().is_empty();

        let client_email = self.client_email.clone().filter(|s| non_empty(s))?;
        let spreadsheet_id = self.spreadsheet_id.clone().filter(|s| non_empty(s))?;
        let private_key = self
            .private_key
            .as_ref()
            .map(|key| key.expose_secret())
            .filter(|key| non_empty(key))?
            .replace("\\n", "\n");

        Some(SheetsCredentials {
            client_email,
            private_key: SecretString::from(private_key),
            spreadsheet_id,
        })
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_millis)
    }
}

/// Maps the conventional, unprefixed variable names onto their config keys.
fn conventional_env() -> Env {
    Env::raw().filter_map(|key| {
        let mapped = match key.as_str().to_ascii_uppercase().as_str() {
            "RECAPTCHA_SECRET_KEY" => "recaptcha_config.secret_key",
            "RECAPTCHA_SITE_KEY" => "recaptcha_config.site_key",
            "SKIP_RECAPTCHA" => "recaptcha_config.skip",
            "SOFT_RATE_LIMIT" => "rate_limit_config.soft",
            "GOOGLE_SHEETS_CLIENT_EMAIL" => "sheets_config.client_email",
            "GOOGLE_SHEETS_PRIVATE_KEY" => "sheets_config.private_key",
            "GOOGLE_SHEETS_SPREADSHEET_ID" => "sheets_config.spreadsheet_id",
            _ => return None,
        };
        Some(mapped.into())
    })
}

// ###################################
// ->   TRY FROMs
// ###################################

impl TryFrom<String> for Environment {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "local" | "development" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            _ => Err(Self::Error::StringToEnvironmentFail(value)),
        }
    }
}

// ###################################
// ->   TESTS
// ###################################
