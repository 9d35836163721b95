use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::{
    web::{log, Error, REQUEST_ID_HEADER},
    AppState,
};

/// Turns an `Error` left in the response extensions into the JSON body the client sees
/// and logs every request.
pub async fn response_mapper(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    req_method: Method,
    uri: Uri,
    resp: Response,
) -> Response {
    let req_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|id| id.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let web_error = resp.extensions().get::<Arc<Error>>().map(Arc::as_ref);
    let expose_details = !app_state.config.is_production();
    let client_status_and_error =
        web_error.map(|er| er.status_code_and_client_error(expose_details));

    let status = client_status_and_error
        .as_ref()
        .map(|(status, _)| *status)
        .unwrap_or(resp.status());

    log::log_request(
        &req_id,
        &req_method,
        &uri,
        status,
        web_error,
        client_status_and_error.as_ref().map(|(_, ce)| ce),
    );

    match client_status_and_error {
        Some((status, client_error)) => (status, Json(client_error.body())).into_response(),
        None => resp,
    }
}
