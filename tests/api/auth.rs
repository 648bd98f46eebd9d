use crate::helpers::{error_message, send, TestApp, PASSWORD};
use fake::{faker::internet::en::SafeEmail, Fake};
use pressroom::repository::CodeRepository;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use wiremock::{
    matchers::{any, header_exists, method, path},
    Mock, ResponseTemplate,
};

#[tokio::test]
async fn sign_up_returns_the_user_without_the_password_hash() {
    // given
    let app = TestApp::spawn().await;
    let email: String = SafeEmail().fake();

    // when
    let response = app.sign_up(&email).await;

    // then
    assert_eq!(response.status().as_u16(), 201);
    let user: Value = response.json().await.unwrap();
    assert_eq!(user["email"], email.as_str());
    assert_eq!(user["isAdmin"], false);
    assert!(user.get("passwordHash").is_none());
}

#[tokio::test]
async fn sign_up_rejects_a_taken_email() {
    // given
    let app = TestApp::spawn().await;
    let email: String = SafeEmail().fake();
    app.sign_up(&email).await;

    // when
    let response = app.sign_up(&email).await;

    // then
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn sign_up_rejects_invalid_data() {
    // given
    let app = TestApp::spawn().await;
    let cases = [
        (json!({"email": "not-an-email", "password": PASSWORD, "fullName": "Ursula"}), "invalid email"),
        (json!({"email": "ursula@pressroom.test", "password": "short", "fullName": "Ursula"}), "short password"),
        (json!({"email": "ursula@pressroom.test", "password": PASSWORD, "fullName": ""}), "empty name"),
        (json!({"password": PASSWORD, "fullName": "Ursula"}), "missing email"),
    ];

    for (body, description) in cases {
        // when
        let response = send(app.post("/auth/signup").json(&body)).await;

        // then
        assert_eq!(
            response.status().as_u16(),
            400,
            "The API did not fail with 400 Bad Request when the payload had {description}"
        );
    }
}

#[tokio::test]
async fn sign_in_returns_a_token_for_valid_credentials() {
    // given
    let app = TestApp::spawn().await;
    let email: String = SafeEmail().fake();
    app.sign_up(&email).await;

    // when
    let response = app.sign_in(&email, PASSWORD).await;

    // then
    assert_eq!(response.status().as_u16(), 200);
    let session: Value = response.json().await.unwrap();
    assert!(session["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(session["user"]["email"], email.as_str());
}

#[tokio::test]
async fn sign_in_rejects_a_wrong_password() {
    // given
    let app = TestApp::spawn().await;
    let email: String = SafeEmail().fake();
    app.sign_up(&email).await;

    // when
    let response = app.sign_in(&email, "not the password").await;

    // then
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn password_reset_for_an_unknown_email_sends_nothing() {
    // given
    let app = TestApp::spawn().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.email_server)
        .await;

    // when
    let response = send(
        app.post("/auth/password/forgot")
            .json(&json!({"email": "nobody@pressroom.test"})),
    )
    .await;

    // then
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn a_mailed_code_resets_the_password() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;
    Mock::given(path("/email"))
        .and(method("POST"))
        .and(header_exists("X-Postmark-Server-Token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    send(
        app.post("/auth/password/forgot")
            .json(&json!({"email": user.email})),
    )
    .await;
    let code = app
        .repositories
        .codes
        .find(user.id)
        .await
        .unwrap()
        .expect("No reset code was stored")
        .code
        .expose_secret()
        .clone();

    // when
    let response = send(app.post("/auth/password/reset").json(&json!({
        "email": user.email,
        "code": code,
        "newPassword": "a brand new passphrase",
    })))
    .await;

    // then
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        app.sign_in(&user.email, "a brand new passphrase")
            .await
            .status()
            .as_u16(),
        200
    );
    assert_eq!(app.sign_in(&user.email, PASSWORD).await.status().as_u16(), 401);
}

#[tokio::test]
async fn a_wrong_code_is_rejected() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;
    Mock::given(path("/email"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&app.email_server)
        .await;
    send(
        app.post("/auth/password/forgot")
            .json(&json!({"email": user.email})),
    )
    .await;
    let stored = app.repositories.codes.find(user.id).await.unwrap().unwrap();
    let wrong = if stored.code.expose_secret() == "123456" {
        "654321"
    } else {
        "123456"
    };

    // when
    let response = send(app.post("/auth/password/reset").json(&json!({
        "email": user.email,
        "code": wrong,
        "newPassword": "a brand new passphrase",
    })))
    .await;

    // then
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(
        error_message(response).await,
        "Reset code is invalid or expired."
    );
}
