use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::{
    model::{NewSubscriberRow, RateLimitExceeded, RateLimits, SubscriberRows, WindowCounts, COLUMNS},
    recaptcha_client::{self, VerificationFailure},
    sheets::{self, a1_range},
    utils,
    web::{
        error::ClientError,
        types::{DataParsingError, SubscribeRequest, ValidSubscription},
        WebResult, FORWARDED_FOR_HEADER,
    },
    AppState,
};

// ###################################
// ->   ERROR
// ###################################
#[derive(thiserror::Error)]
pub enum SubscribeError {
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("data parsing error: {0}")]
    DataParsing(#[from] DataParsingError),
    #[error("proof token verification failed: {0}")]
    Verification(#[from] VerificationFailure),
    #[error("rate limited: {source}")]
    RateLimited {
        soft: bool,
        source: RateLimitExceeded,
    },
    #[error("email is already subscribed")]
    Duplicate,
    #[error("spreadsheet credentials are not configured")]
    SheetsNotConfigured,

    #[error("verification service error: {0}")]
    Recaptcha(#[from] recaptcha_client::Error),
    #[error("spreadsheet error: {0}")]
    Sheets(#[from] sheets::Error),
}

impl std::fmt::Debug for SubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        utils::error_chain_fmt(self, f)
    }
}

impl SubscribeError {
    pub fn status_code_and_client_error(&self, expose_details: bool) -> (StatusCode, ClientError) {
        use SubscribeError::*;

        match self {
            InvalidBody(message) => (
                StatusCode::BAD_REQUEST,
                ClientError::InvalidBody(message.clone()),
            ),
            DataParsing(DataParsingError::MissingFields) => {
                (StatusCode::BAD_REQUEST, ClientError::MissingFields)
            }
            DataParsing(_) => (StatusCode::BAD_REQUEST, ClientError::InvalidEmail),
            Verification(failure) => (
                StatusCode::BAD_REQUEST,
                verification_client_error(failure),
            ),
            RateLimited { soft: true, .. } => {
                (StatusCode::OK, ClientError::TooManyRequests { soft: true })
            }
            RateLimited { soft: false, .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                ClientError::TooManyRequests { soft: false },
            ),
            Duplicate => (StatusCode::BAD_REQUEST, ClientError::Duplicate),
            SheetsNotConfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ClientError::ConfigurationError,
            ),
            Recaptcha(_) | Sheets(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ClientError::service_error(self, expose_details),
            ),
        }
    }
}

fn verification_client_error(failure: &VerificationFailure) -> ClientError {
    match failure {
        VerificationFailure::Rejected { error_codes } if error_codes.is_empty() => {
            ClientError::VerificationFailed {
                details: json!("Unknown error"),
                message: Some("reCAPTCHA verification failed".to_string()),
            }
        }
        VerificationFailure::Rejected { error_codes } => ClientError::VerificationFailed {
            details: json!(error_codes),
            message: Some(error_codes.join(", ")),
        },
        other => ClientError::VerificationFailed {
            details: json!(other.to_string()),
            message: None,
        },
    }
}

// ###################################
// ->   API
// ###################################
#[tracing::instrument(
    name = "Adding a new subscriber to the mailing list",
    skip_all,
    fields(subscriber_ip = tracing::field::Empty, subscriber_email = tracing::field::Empty)
)]
pub async fn subscribe(
    State(app_state): State<AppState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<SubscribeRequest>, JsonRejection>,
) -> WebResult<Json<Value>> {
    let Json(payload) = payload.map_err(|er| SubscribeError::InvalidBody(er.body_text()))?;
    let subscription = ValidSubscription::try_from(payload).map_err(SubscribeError::from)?;
    let ip = client_ip(&headers, peer_addr);

    let email: &str = subscription.email.as_ref();

    let span = tracing::Span::current();
    span.record("subscriber_ip", ip.as_str());
    span.record("subscriber_email", email);

    verify_proof_token(&app_state, &subscription.proof_token, &ip).await?;

    let sheets_client = app_state
        .sheets_client
        .as_ref()
        .ok_or(SubscribeError::SheetsNotConfigured)?;
    let range = a1_range(&app_state.config.sheets_config.sheet_name, COLUMNS);

    let values = sheets_client
        .read_rows(&range)
        .await
        .map_err(SubscribeError::from)?;
    let rows = SubscriberRows::from_values(values);

    // Both checks below race with concurrent requests, nothing locks the sheet between the read and the append.
    let now = Utc::now();
    let counts = WindowCounts::compute(&rows, &ip, email, now);
    RateLimits::from(&app_state.config.rate_limit_config)
        .check(&counts)
        .map_err(|source| SubscribeError::RateLimited {
            soft: app_state.config.soft_rate_limit(),
            source,
        })?;

    if rows.contains_email(email) {
        return Err(SubscribeError::Duplicate.into());
    }

    let row = NewSubscriberRow {
        email: subscription.email.into_inner(),
        timestamp: now,
        ip,
    };
    sheets_client
        .append_row(&range, &row.into_cells())
        .await
        .map_err(SubscribeError::from)?;

    info!("New subscriber successfully added to the list.");
    Ok(Json(json!({ "success": true })))
}

/// Skipped when no secret is configured or skipping was requested.
async fn verify_proof_token(
    app_state: &AppState,
    proof_token: &str,
    ip: &str,
) -> Result<(), SubscribeError> {
    let recaptcha_config = &app_state.config.recaptcha_config;
    let Some(secret) = recaptcha_config.verification_secret() else {
        warn!("proof token verification skipped");
        return Ok(());
    };

    let verification = app_state
        .recaptcha_client
        .verify(secret, proof_token, ip)
        .await?;

    verification
        .check(
            recaptcha_config.min_score,
            recaptcha_config.expected_action.as_deref(),
        )
        .inspect_err(|failure| warn!("proof token rejected: {failure}"))?;

    Ok(())
}

/// The first address in `x-forwarded-for`, or the peer address when the header is missing or empty.
pub fn client_ip(headers: &HeaderMap, peer_addr: SocketAddr) -> String {
    headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer_addr.ip().to_string())
}
