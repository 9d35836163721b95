//! Service account authentication for the spreadsheet API.
//! A short lived RS256 signed assertion is exchanged for a bearer token which is
//! cached until shortly before it expires.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{Error, Result};

pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens this close to expiring are refreshed.
const EXPIRY_MARGIN_SECS: i64 = 60;

pub struct ServiceAccountAuth {
    client_email: String,
    encoding_key: EncodingKey,
    token_url: reqwest::Url,
    cached: Mutex<Option<AccessToken>>,
}

#[derive(Clone)]
struct AccessToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: SecretString,
    expires_in: Option<i64>,
}

impl ServiceAccountAuth {
    pub fn new(
        client_email: String,
        private_key: &SecretString,
        token_url: reqwest::Url,
    ) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key.expose_secret().as_bytes())
            .map_err(|er| Error::InvalidPrivateKey(er.to_string()))?;

        Ok(ServiceAccountAuth {
            client_email,
            encoding_key,
            token_url,
            cached: Mutex::new(None),
        })
    }

    /// Returns a valid bearer token, exchanging a fresh assertion when the cached one is stale.
    pub async fn access_token(&self, http_client: &Client) -> Result<SecretString> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(access_token) = cached.as_ref() {
            if access_token.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now {
                return Ok(access_token.token.clone());
            }
        }

        let fresh = self.exchange_assertion(http_client, now).await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);

        Ok(token)
    }

    fn sign_assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let iat = now.timestamp();
        let claims = Claims {
            iss: &self.client_email,
            scope: SPREADSHEETS_SCOPE,
            aud: self.token_url.as_str(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        let assertion = jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.encoding_key,
        )?;
        Ok(assertion)
    }

    #[tracing::instrument(name = "Exchanging service account assertion", skip_all)]
    async fn exchange_assertion(
        &self,
        http_client: &Client,
        now: DateTime<Utc>,
    ) -> Result<AccessToken> {
        let assertion = self.sign_assertion(now)?;
        let form = [
            ("grant_type", JWT_BEARER_GRANT),
            ("assertion", assertion.as_str()),
        ];

        let res: TokenResponse = http_client
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let lifetime = res.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        tracing::debug!("received an access token valid for {lifetime}s");

        Ok(AccessToken {
            token: res.access_token,
            expires_at: now + Duration::seconds(lifetime),
        })
    }
}

impl std::fmt::Debug for ServiceAccountAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountAuth")
            .field("client_email", &self.client_email)
            .field("token_url", &self.token_url.as_str())
            .finish_non_exhaustive()
    }
}
