use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use std::sync::Arc;
use strum_macros::AsRefStr;

use super::routes::SubscribeError;

pub type WebResult<T> = core::result::Result<T, Error>;

#[derive(Debug, AsRefStr, thiserror::Error)]
pub enum Error {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("subscribe error: {0}")]
    Subscribe(#[from] SubscribeError),

    #[error("unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl Error {
    /// Maps the error to the status and body the client gets to see.
    /// `expose_details` adds the full error chain to server errors and is only set outside production.
    pub fn status_code_and_client_error(&self, expose_details: bool) -> (StatusCode, ClientError) {
        match self {
            Error::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, ClientError::MethodNotAllowed),
            Error::Subscribe(sub_er) => sub_er.status_code_and_client_error(expose_details),
            Error::Unexpected(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ClientError::service_error(self, expose_details),
            ),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::debug!("{:<12} - into_response(Error: {self:?})", "INTO_RESP");

        // Construct a response
        let mut res = StatusCode::INTERNAL_SERVER_ERROR.into_response();

        // Insert the Error into response so that it can be retrieved later.
        res.extensions_mut().insert(Arc::new(self));

        res
    }
}

#[derive(Debug, AsRefStr)]
pub enum ClientError {
    MethodNotAllowed,
    InvalidBody(String),
    MissingFields,
    InvalidEmail,
    VerificationFailed {
        details: Value,
        message: Option<String>,
    },
    TooManyRequests {
        soft: bool,
    },
    Duplicate,
    ConfigurationError,
    ServiceError {
        message: String,
        details: Option<String>,
    },
}

pub const TOO_MANY_REQUESTS_MSG: &str = "Too many requests. Please try again later.";
pub const DUPLICATE_MSG: &str = "This email is already registered";

impl ClientError {
    pub fn service_error(er: &impl std::error::Error, expose_details: bool) -> Self {
        ClientError::ServiceError {
            message: er.to_string(),
            details: expose_details.then(|| crate::utils::error_chain(er)),
        }
    }

    /// The JSON body sent to the client.
    pub fn body(&self) -> Value {
        match self {
            ClientError::MethodNotAllowed => json!({ "error": "Method not allowed" }),
            ClientError::InvalidBody(message) => json!({
                "error": "Invalid request body",
                "message": message,
            }),
            ClientError::MissingFields => {
                json!({ "error": "Email and reCAPTCHA token are required" })
            }
            ClientError::InvalidEmail => json!({ "error": "Invalid email format" }),
            ClientError::VerificationFailed { details, message } => {
                let mut body = json!({
                    "error": "reCAPTCHA verification failed",
                    "details": details,
                });
                if let Some(message) = message {
                    body["message"] = json!(message);
                }
                body
            }
            ClientError::TooManyRequests { soft: true } => json!({
                "success": false,
                "rateLimited": true,
                "error": "too_many_requests",
                "message": TOO_MANY_REQUESTS_MSG,
            }),
            ClientError::TooManyRequests { soft: false } => json!({
                "error": "too_many_requests",
                "message": TOO_MANY_REQUESTS_MSG,
            }),
            ClientError::Duplicate => json!({
                "error": "duplicate",
                "message": DUPLICATE_MSG,
            }),
            ClientError::ConfigurationError => json!({ "error": "Server configuration error" }),
            ClientError::ServiceError { message, details } => {
                let mut body = json!({
                    "error": "Internal server error",
                    "message": message,
                });
                if let Some(details) = details {
                    body["details"] = json!(details);
                }
                body
            }
        }
    }
}
