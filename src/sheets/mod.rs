//! A small client for the Google Sheets v4 `values` API.
//! Only the two operations the mailing list needs are implemented: reading a range and appending a row.

mod auth;

pub use auth::{ServiceAccountAuth, SPREADSHEETS_SCOPE};

use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::SheetsCredentials;

#[derive(Debug)]
pub struct SheetsClient {
    pub http_client: Client,
    pub api_url: reqwest::Url,
    spreadsheet_id: String,
    auth: ServiceAccountAuth,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Serialize)]
struct AppendBody<'a> {
    values: [&'a [String]; 1],
}

impl SheetsClient {
    pub fn new<S: AsRef<str>>(
        api_url: S,
        token_url: S,
        credentials: SheetsCredentials,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let api_url =
            reqwest::Url::parse(api_url.as_ref()).map_err(|e| Error::UrlParsing(e.to_string()))?;
        let token_url = reqwest::Url::parse(token_url.as_ref())
            .map_err(|e| Error::UrlParsing(e.to_string()))?;

        let auth = ServiceAccountAuth::new(
            credentials.client_email,
            &credentials.private_key,
            token_url,
        )?;
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(SheetsClient {
            http_client,
            api_url,
            spreadsheet_id: credentials.spreadsheet_id,
            auth,
        })
    }

    /// Reads every row of `range`. Non-string cells are rendered to strings, empty ranges yield no rows.
    #[tracing::instrument(name = "Reading spreadsheet rows", skip(self))]
    pub async fn read_rows(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.values_url(range)?;
        let token = self.auth.access_token(&self.http_client).await?;

        let value_range: ValueRange = self
            .http_client
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let rows = value_range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect::<Vec<Vec<String>>>();
        tracing::debug!("read {} rows", rows.len());

        Ok(rows)
    }

    /// Appends a single row after the last row of the table found in `range`.
    #[tracing::instrument(name = "Appending spreadsheet row", skip(self, row))]
    pub async fn append_row(&self, range: &str, row: &[String]) -> Result<()> {
        let url = self.values_url(&format!("{range}:append"))?;
        let token = self.auth.access_token(&self.http_client).await?;

        self.http_client
            .post(url)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(token.expose_secret())
            .json(&AppendBody { values: [row] })
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    fn values_url(&self, range: &str) -> Result<reqwest::Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::UrlParsing(format!("cannot be a base: {}", self.api_url)))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", &self.spreadsheet_id, "values", range]);
        Ok(url)
    }
}

/// Builds an A1 range over `columns` of `sheet_name`, quoting names that need it.
pub fn a1_range(sheet_name: &str, columns: &str) -> String {
    if sheet_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        format!("{sheet_name}!{columns}")
    } else {
        format!("'{}'!{columns}", sheet_name.replace('\'', "''"))
    }
}

fn cell_to_string(cell: Value) -> String {
    match cell {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ###################################
// ->   ERROR & RESULT
// ###################################
pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("url parsing error: {0}")]
    UrlParsing(String),
    #[error("invalid service account private key: {0}")]
    InvalidPrivateKey(String),
    #[error("failed to sign the service account assertion: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
}
