use anyhow::Context;
use axum::{extract::State, response::Html};

use crate::{web::WebResult, AppState};

/// The landing page with the signup form.
pub async fn home(State(app_state): State<AppState>) -> WebResult<Html<String>> {
    let recaptcha_config = &app_state.config.recaptcha_config;

    let mut context = tera::Context::new();
    context.insert("site_key", &recaptcha_config.site_key);
    context.insert("action", &recaptcha_config.action);

    let body = app_state
        .templ_mgr
        .render_html("home.html", &context)
        .context("tera failed to render 'html/home.html' template")?;

    Ok(Html(body))
}
