use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};
use wiremock::{
    matchers::{any, body_string_contains, method, path},
    Mock, ResponseTemplate,
};

use crate::helpers::{row, TestApp, APPEND_PATH, VALUES_PATH};

fn signup(email: &str) -> Value {
    json!({ "email": email, "recaptchaToken": "proof-token" })
}

#[tokio::test]
async fn subscribe_valid_signup_appends_one_row() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.mock_human().await;
    app.mock_rows(vec![row("someone@else.com", "9.9.9.9", 30)]).await;
    app.expect_appends(1).await;

    let res = app
        .http_client
        .post(format!("http://{}/api/subscribe", app.addr))
        .header("x-forwarded-for", "1.2.3.4, 10.0.0.1")
        .json(&signup("Ursula@Example.com"))
        .send()
        .await?;

    assert_eq!(StatusCode::OK, res.status());
    assert_eq!(json!({ "success": true }), res.json::<Value>().await?);

    let appended = app.appended_rows().await?;
    assert_eq!(1, appended.len());
    let [email, timestamp, ip] = appended[0].as_slice() else {
        panic!("expected three cells, got: {:?}", appended[0]);
    };
    assert_eq!("Ursula@Example.com", email.as_str());
    assert_eq!("1.2.3.4", ip.as_str());
    assert!(timestamp.ends_with('Z'), "timestamp not in UTC: {timestamp}");
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());

    Ok(())
}

#[tokio::test]
async fn subscribe_sends_the_token_and_client_ip_for_verification() -> Result<()> {
    let app = TestApp::spawn().await?;
    Mock::given(method("POST"))
        .and(path("/siteverify"))
        .and(body_string_contains("secret=test-secret"))
        .and(body_string_contains("response=proof-token"))
        .and(body_string_contains("remoteip=5.6.7.8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "score": 0.8,
        })))
        .expect(1)
        .mount(&app.recaptcha_server)
        .await;
    app.mock_rows(vec![]).await;
    app.expect_appends(1).await;

    let res = app
        .http_client
        .post(format!("http://{}/api/subscribe", app.addr))
        .header("x-forwarded-for", "5.6.7.8")
        .json(&signup("new@example.com"))
        .send()
        .await?;

    assert_eq!(StatusCode::OK, res.status());

    Ok(())
}

#[tokio::test]
async fn subscribe_duplicate_email_is_rejected_case_insensitively() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.mock_human().await;
    app.mock_rows(vec![row("new@example.com", "9.9.9.9", 7200)]).await;
    app.expect_appends(0).await;

    let res = app.post_subscribe(&signup("New@Example.com")).await?;

    assert_eq!(StatusCode::BAD_REQUEST, res.status());
    assert_eq!(
        json!({ "error": "duplicate", "message": "This email is already registered" }),
        res.json::<Value>().await?
    );

    Ok(())
}

#[tokio::test]
async fn subscribe_too_many_from_one_ip_returns_429() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.mock_human().await;
    app.mock_rows(vec![
        row("a@example.com", "1.2.3.4", 5),
        row("b@example.com", "1.2.3.4", 10),
        row("c@example.com", "1.2.3.4", 20),
    ])
    .await;
    app.expect_appends(0).await;

    let res = app
        .http_client
        .post(format!("http://{}/api/subscribe", app.addr))
        .header("x-forwarded-for", "1.2.3.4")
        .json(&signup("d@example.com"))
        .send()
        .await?;

    assert_eq!(StatusCode::TOO_MANY_REQUESTS, res.status());
    let body: Value = res.json().await?;
    assert_eq!(json!("too_many_requests"), body["error"]);
    assert!(body["message"].is_string());

    Ok(())
}

#[tokio::test]
async fn subscribe_other_ips_are_not_rate_limited() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.mock_human().await;
    app.mock_rows(vec![
        row("a@example.com", "1.2.3.4", 5),
        row("b@example.com", "1.2.3.4", 10),
        row("c@example.com", "1.2.3.4", 20),
    ])
    .await;
    app.expect_appends(1).await;

    let res = app
        .http_client
        .post(format!("http://{}/api/subscribe", app.addr))
        .header("x-forwarded-for", "4.3.2.1")
        .json(&signup("d@example.com"))
        .send()
        .await?;

    assert_eq!(StatusCode::OK, res.status());

    Ok(())
}

#[tokio::test]
async fn subscribe_soft_rate_limit_answers_200() -> Result<()> {
    let app = TestApp::spawn_with(|config| config.rate_limit_config.soft = true).await?;
    app.mock_human().await;
    app.mock_rows(vec![
        row("a@example.com", "1.2.3.4", 5),
        row("b@example.com", "1.2.3.4", 10),
        row("c@example.com", "1.2.3.4", 20),
    ])
    .await;
    app.expect_appends(0).await;

    let res = app
        .http_client
        .post(format!("http://{}/api/subscribe", app.addr))
        .header("x-forwarded-for", "1.2.3.4")
        .json(&signup("d@example.com"))
        .send()
        .await?;

    assert_eq!(StatusCode::OK, res.status());
    let body: Value = res.json().await?;
    assert_eq!(json!(false), body["success"]);
    assert_eq!(json!(true), body["rateLimited"]);
    assert_eq!(json!("too_many_requests"), body["error"]);

    Ok(())
}

#[tokio::test]
async fn subscribe_soft_rate_limit_is_ignored_in_production() -> Result<()> {
    let app = TestApp::spawn_with(|config| {
        config.rate_limit_config.soft = true;
        config.environment = mailinglist::config::Environment::Production;
    })
    .await?;
    app.mock_human().await;
    app.mock_rows(vec![row("d@example.com", "8.8.8.8", 10)]).await;
    app.expect_appends(0).await;

    // Same email within the minute.
    let res = app.post_subscribe(&signup("D@example.com")).await?;

    assert_eq!(StatusCode::TOO_MANY_REQUESTS, res.status());

    Ok(())
}

#[tokio::test]
async fn subscribe_rejected_token_never_touches_the_sheet() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.mock_verification(json!({
        "success": false,
        "error-codes": ["invalid-input-response"],
    }))
    .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .named("spreadsheet api")
        .mount(&app.sheets_server)
        .await;

    let res = app.post_subscribe(&signup("new@example.com")).await?;

    assert_eq!(StatusCode::BAD_REQUEST, res.status());
    assert_eq!(
        json!({
            "error": "reCAPTCHA verification failed",
            "details": ["invalid-input-response"],
            "message": "invalid-input-response",
        }),
        res.json::<Value>().await?
    );

    Ok(())
}

#[tokio::test]
async fn subscribe_low_score_is_rejected() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.mock_verification(json!({ "success": true, "score": 0.1 }))
        .await;
    app.expect_appends(0).await;

    let res = app.post_subscribe(&signup("new@example.com")).await?;

    assert_eq!(StatusCode::BAD_REQUEST, res.status());
    let body: Value = res.json().await?;
    assert_eq!(json!("reCAPTCHA verification failed"), body["error"]);
    assert_eq!(json!("Score 0.1 is below threshold 0.3"), body["details"]);

    Ok(())
}

#[tokio::test]
async fn subscribe_skips_verification_when_disabled() -> Result<()> {
    let app = TestApp::spawn_with(|config| config.recaptcha_config.skip = true).await?;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&app.recaptcha_server)
        .await;
    app.mock_rows(vec![]).await;
    app.expect_appends(1).await;

    let res = app.post_subscribe(&signup("new@example.com")).await?;

    assert_eq!(StatusCode::OK, res.status());

    Ok(())
}

#[tokio::test]
async fn subscribe_returns_400_for_missing_or_invalid_fields() -> Result<()> {
    let app = TestApp::spawn().await?;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&app.recaptcha_server)
        .await;

    let cases = [
        (
            json!({ "recaptchaToken": "proof-token" }),
            json!({ "error": "Email and reCAPTCHA token are required" }),
            "missing email",
        ),
        (
            json!({ "email": "new@example.com" }),
            json!({ "error": "Email and reCAPTCHA token are required" }),
            "missing token",
        ),
        (
            json!({ "email": "", "recaptchaToken": "" }),
            json!({ "error": "Email and reCAPTCHA token are required" }),
            "empty fields",
        ),
        (
            json!({ "email": "not an email", "recaptchaToken": "proof-token" }),
            json!({ "error": "Invalid email format" }),
            "invalid email",
        ),
        (
            json!({ "email": "ursula@domain", "recaptchaToken": "proof-token" }),
            json!({ "error": "Invalid email format" }),
            "missing tld",
        ),
    ];

    for (body, expected, description) in cases {
        let res = app.post_subscribe(&body).await?;
        assert_eq!(
            StatusCode::BAD_REQUEST,
            res.status(),
            "The API did not return a 400 BAD REQUEST for: {description}"
        );
        assert_eq!(expected, res.json::<Value>().await?, "wrong body for: {description}");
    }

    Ok(())
}

#[tokio::test]
async fn subscribe_malformed_json_is_a_400() -> Result<()> {
    let app = TestApp::spawn().await?;

    let res = app
        .http_client
        .post(format!("http://{}/api/subscribe", app.addr))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await?;

    assert_eq!(StatusCode::BAD_REQUEST, res.status());
    let body: Value = res.json().await?;
    assert_eq!(json!("Invalid request body"), body["error"]);
    assert!(body["message"].is_string());

    Ok(())
}

#[tokio::test]
async fn subscribe_other_methods_are_405() -> Result<()> {
    let app = TestApp::spawn().await?;
    let url = format!("http://{}/api/subscribe", app.addr);

    for res in [
        app.http_client.get(&url).send().await?,
        app.http_client.put(&url).send().await?,
        app.http_client.delete(&url).send().await?,
    ] {
        assert_eq!(StatusCode::METHOD_NOT_ALLOWED, res.status());
        assert_eq!(
            json!({ "error": "Method not allowed" }),
            res.json::<Value>().await?
        );
    }

    Ok(())
}

#[tokio::test]
async fn subscribe_missing_credentials_is_a_configuration_error() -> Result<()> {
    let app = TestApp::spawn_with(|config| config.sheets_config.private_key = None).await?;
    app.mock_human().await;

    let res = app.post_subscribe(&signup("new@example.com")).await?;

    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, res.status());
    assert_eq!(
        json!({ "error": "Server configuration error" }),
        res.json::<Value>().await?
    );

    Ok(())
}

#[tokio::test]
async fn subscribe_sheet_failure_is_a_500_with_details_outside_production() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.mock_human().await;
    Mock::given(method("GET"))
        .and(path(VALUES_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&app.sheets_server)
        .await;

    let res = app.post_subscribe(&signup("new@example.com")).await?;

    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, res.status());
    let body: Value = res.json().await?;
    assert_eq!(json!("Internal server error"), body["error"]);
    assert!(body["message"].is_string());
    assert!(body["details"].is_string());

    Ok(())
}

#[tokio::test]
async fn subscribe_sheet_failure_hides_details_in_production() -> Result<()> {
    let app = TestApp::spawn_with(|config| {
        config.environment = mailinglist::config::Environment::Production;
    })
    .await?;
    app.mock_human().await;
    app.mock_rows(vec![]).await;
    Mock::given(method("POST"))
        .and(path(APPEND_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.sheets_server)
        .await;

    let res = app.post_subscribe(&signup("new@example.com")).await?;

    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, res.status());
    let body: Value = res.json().await?;
    assert_eq!(json!("Internal server error"), body["error"]);
    assert!(body.get("details").is_none());

    Ok(())
}

#[tokio::test]
async fn subscribe_verdict_without_score_is_accepted() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.mock_verification(json!({ "success": true, "hostname": "localhost" }))
        .await;
    app.mock_rows(vec![]).await;
    app.expect_appends(1).await;

    let res = app.post_subscribe(&signup("new@example.com")).await?;

    assert_eq!(StatusCode::OK, res.status());
    assert_eq!(json!({ "success": true }), res.json::<Value>().await?);

    Ok(())
}

#[tokio::test]
async fn subscribe_malformed_private_key_only_fails_signups() -> Result<()> {
    let app = TestApp::spawn_with(|config| {
        config.sheets_config.private_key = Some("not a pem key".into());
    })
    .await?;
    app.mock_human().await;

    let res = app
        .http_client
        .get(format!("http://{}/", app.addr))
        .send()
        .await?;
    assert_eq!(StatusCode::OK, res.status());

    let res = app
        .http_client
        .get(format!("http://{}/health-check", app.addr))
        .send()
        .await?;
    assert_eq!(StatusCode::OK, res.status());

    let res = app.post_subscribe(&signup("new@example.com")).await?;
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, res.status());
    assert_eq!(
        json!({ "error": "Server configuration error" }),
        res.json::<Value>().await?
    );

    Ok(())
}

#[tokio::test]
async fn subscribe_same_email_within_a_minute_is_rate_limited_before_duplicate() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.mock_human().await;
    app.mock_rows(vec![row("repeat@example.com", "9.9.9.9", 15)]).await;
    app.expect_appends(0).await;

    let res = app
        .http_client
        .post(format!("http://{}/api/subscribe", app.addr))
        .header("x-forwarded-for", "4.4.4.4")
        .json(&signup("Repeat@Example.com"))
        .send()
        .await?;

    assert_eq!(StatusCode::TOO_MANY_REQUESTS, res.status());
    let body: Value = res.json().await?;
    assert_eq!(json!("too_many_requests"), body["error"]);
    assert_ne!(json!("duplicate"), body["error"]);

    Ok(())
}

#[tokio::test]
async fn subscribe_email_with_surrounding_whitespace_is_invalid() -> Result<()> {
    let app = TestApp::spawn().await?;
    app.expect_appends(0).await;

    let res = app.post_subscribe(&signup(" new@example.com")).await?;

    assert_eq!(StatusCode::BAD_REQUEST, res.status());
    assert_eq!(
        json!({ "error": "Invalid email format" }),
        res.json::<Value>().await?
    );

    Ok(())
}
