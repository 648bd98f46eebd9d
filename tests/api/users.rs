use crate::helpers::{send, TestApp, PASSWORD};
use serde_json::{json, Value};

#[tokio::test]
async fn requests_without_a_token_are_rejected() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;

    // when
    let response = send(app.get(&format!("/users/{}", user.id))).await;

    // then
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn garbage_tokens_are_rejected() {
    // given
    let app = TestApp::spawn().await;

    // when
    let response = send(app.get("/users/me").bearer_auth("not.a.jwt")).await;

    // then
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn me_returns_the_caller() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;

    // when
    let response = send(app.get("/users/me").bearer_auth(&user.token)).await;

    // then
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], user.id.to_string());
}

#[tokio::test]
async fn listing_users_requires_an_administrator() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;
    let admin = app.admin().await;

    // when
    let as_user = send(app.get("/users").bearer_auth(&user.token)).await;
    let as_admin = send(app.get("/users?limit=1").bearer_auth(&admin.token)).await;

    // then
    assert_eq!(as_user.status().as_u16(), 403);
    assert_eq!(as_admin.status().as_u16(), 200);
    let page: Value = as_admin.json().await.unwrap();
    assert_eq!(page["total"], 2);
    assert_eq!(page["limit"], 1);
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn users_cannot_read_each_other() {
    // given
    let app = TestApp::spawn().await;
    let alice = app.user().await;
    let bob = app.user().await;

    // when
    let response = send(app.get(&format!("/users/{}", bob.id)).bearer_auth(&alice.token)).await;

    // then
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn users_cannot_promote_themselves() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;

    // when
    let response = send(
        app.put(&format!("/users/{}", user.id))
            .bearer_auth(&user.token)
            .json(&json!({"isAdmin": true})),
    )
    .await;

    // then
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn profile_updates_keep_absent_fields() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;

    // when
    let response = send(
        app.put(&format!("/users/{}", user.id))
            .bearer_auth(&user.token)
            .json(&json!({"country": "US"})),
    )
    .await;

    // then
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["country"], "US");
    assert_eq!(body["city"], "Portland");
}

#[tokio::test]
async fn changing_the_password_requires_the_current_one() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;
    let endpoint = format!("/users/{}/password", user.id);

    // when
    let wrong = send(app.put(&endpoint).bearer_auth(&user.token).json(&json!({
        "currentPassword": "definitely wrong",
        "newPassword": "another passphrase",
        "newPasswordCheck": "another passphrase",
    })))
    .await;
    let right = send(app.put(&endpoint).bearer_auth(&user.token).json(&json!({
        "currentPassword": PASSWORD,
        "newPassword": "another passphrase",
        "newPasswordCheck": "another passphrase",
    })))
    .await;

    // then
    assert_eq!(wrong.status().as_u16(), 400);
    assert_eq!(right.status().as_u16(), 200);
    assert_eq!(
        app.sign_in(&user.email, "another passphrase")
            .await
            .status()
            .as_u16(),
        200
    );
}

#[tokio::test]
async fn deleted_users_lose_access() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;

    // when
    let deleted = send(app.delete(&format!("/users/{}", user.id)).bearer_auth(&user.token)).await;
    let after = send(app.get("/users/me").bearer_auth(&user.token)).await;

    // then
    assert_eq!(deleted.status().as_u16(), 204);
    assert_eq!(after.status().as_u16(), 401);
}
