use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

#[derive(Debug)]
pub struct RecaptchaClient {
    pub http_client: Client,
    pub url: reqwest::Url,
}

/// The body returned by the `siteverify` endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Verification {
    pub success: bool,
    pub score: Option<f64>,
    pub action: Option<String>,
    pub challenge_ts: Option<String>,
    pub hostname: Option<String>,
    #[serde(rename = "error-codes", default)]
    pub error_codes: Vec<String>,
}

impl RecaptchaClient {
    pub fn new<S: AsRef<str>>(url: S, timeout: std::time::Duration) -> Result<Self> {
        let url =
            reqwest::Url::parse(url.as_ref()).map_err(|e| Error::UrlParsing(e.to_string()))?;

        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(RecaptchaClient { http_client, url })
    }

    /// Asks the verification service whether `token` is a valid proof token.
    /// Only transport and decoding failures are errors, a rejected token is an `Ok` with `success: false`.
    #[tracing::instrument(name = "Verifying the proof token", skip_all)]
    pub async fn verify(
        &self,
        secret: &SecretString,
        token: &str,
        remote_ip: &str,
    ) -> Result<Verification> {
        let form = [
            ("secret", secret.expose_secret()),
            ("response", token),
            ("remoteip", remote_ip),
        ];

        let verification: Verification = self
            .http_client
            .post(self.url.clone())
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::info!(
            success = verification.success,
            score = ?verification.score,
            action = ?verification.action,
            challenge_ts = ?verification.challenge_ts,
            hostname = ?verification.hostname,
            error_codes = ?verification.error_codes,
            "verification response"
        );

        Ok(verification)
    }
}

impl Verification {
    /// Checks the verdict against the score threshold and, when given, the expected action.
    /// A verdict without a score passes the threshold.
    pub fn check(
        &self,
        min_score: f64,
        expected_action: Option<&str>,
    ) -> core::result::Result<(), VerificationFailure> {
        if !self.success {
            return Err(VerificationFailure::Rejected {
                error_codes: self.error_codes.clone(),
            });
        }

        // Only a reported score can fall below the threshold.
        if let Some(score) = self.score {
            if score < min_score {
                return Err(VerificationFailure::ScoreTooLow {
                    score,
                    threshold: min_score,
                });
            }
        }

        if let Some(expected) = expected_action {
            let action = self.action.as_deref().unwrap_or_default();
            if action != expected {
                return Err(VerificationFailure::ActionMismatch {
                    expected: expected.to_string(),
                    received: action.to_string(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerificationFailure {
    #[error("token rejected: {error_codes:?}")]
    Rejected { error_codes: Vec<String> },
    #[error("Score {score} is below threshold {threshold}")]
    ScoreTooLow { score: f64, threshold: f64 },
    #[error("Action '{received}' does not match '{expected}'")]
    ActionMismatch { expected: String, received: String },
}

// ###################################
// ->   ERROR & RESULT
// ###################################
pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("url parsing error: {0}")]
    UrlParsing(String),
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
}
