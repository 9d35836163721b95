//! The request payloads of the `web` module and their validated counterparts.

use lazy_regex::regex_is_match;
use serde::Deserialize;
use unicode_segmentation::UnicodeSegmentation;

// ###################################
// ->   STRUCTS
// ###################################
/// Deserializable subscription request.
/// Both fields are optional here so missing fields can be reported as a validation error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub recaptcha_token: Option<String>,
}

/// Validated subscription request
#[derive(Debug, Clone)]
pub struct ValidSubscription {
    pub email: ValidEmail,
    pub proof_token: String,
}

impl TryFrom<SubscribeRequest> for ValidSubscription {
    type Error = DataParsingError;

    fn try_from(req: SubscribeRequest) -> Result<Self, Self::Error> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        let (Some(email), Some(proof_token)) =
            (non_empty(req.email), non_empty(req.recaptcha_token))
        else {
            return Err(DataParsingError::MissingFields);
        };

        Ok(ValidSubscription {
            email: ValidEmail::parse(email)?,
            proof_token,
        })
    }
}

/// Validated subscriber email, stored exactly as submitted.
#[derive(Debug, Clone)]
pub struct ValidEmail(String);

impl AsRef<str> for ValidEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl ValidEmail {
    pub fn parse<S>(value: S) -> Result<Self, DataParsingError>
    where
        S: AsRef<str>,
    {
        let value = value.as_ref();

        if value.graphemes(true).count() > 256 {
            return Err(DataParsingError::EmailTooLong);
        }

        // local@domain.tld
        if regex_is_match!(r"^[^\s@]+@[^\s@]+\.[^\s@]+$", value) {
            Ok(ValidEmail(value.to_owned()))
        } else {
            Err(DataParsingError::EmailInvalid)
        }
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

// ###################################
// ->   ERROR
// ###################################
#[derive(Debug, thiserror::Error)]
pub enum DataParsingError {
    #[error("email or proof token missing")]
    MissingFields,
    #[error("email invalid")]
    EmailInvalid,
    #[error("email too long")]
    EmailTooLong,
}
