use crate::helpers::{error_message, send, TestApp};
use serde_json::{json, Value};

#[tokio::test]
async fn categories_are_public_to_read_but_admin_to_write() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;
    let admin = app.admin().await;

    // when
    let as_user = send(
        app.post("/categories")
            .bearer_auth(&user.token)
            .json(&json!({"name": "Essays"})),
    )
    .await;
    let as_admin = send(
        app.post("/categories")
            .bearer_auth(&admin.token)
            .json(&json!({"name": "Essays"})),
    )
    .await;
    let listed = send(app.get("/categories")).await;

    // then
    assert_eq!(as_user.status().as_u16(), 403);
    assert_eq!(as_admin.status().as_u16(), 201);
    let page: Value = listed.json().await.unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["data"][0]["name"], "Essays");
}

#[tokio::test]
async fn names_are_unique() {
    // given
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    send(
        app.post("/permissions")
            .bearer_auth(&admin.token)
            .json(&json!({"name": "issues:write"})),
    )
    .await;

    // when
    let response = send(
        app.post("/permissions")
            .bearer_auth(&admin.token)
            .json(&json!({"name": "issues:write"})),
    )
    .await;

    // then
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn roles_reference_existing_permissions() {
    // given
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let permission: Value = send(
        app.post("/permissions")
            .bearer_auth(&admin.token)
            .json(&json!({"name": "videos:write"})),
    )
    .await
    .json()
    .await
    .unwrap();

    // when
    let valid = send(app.post("/roles").bearer_auth(&admin.token).json(&json!({
        "name": "editor",
        "permissions": [permission["id"]],
    })))
    .await;
    let invalid = send(app.post("/roles").bearer_auth(&admin.token).json(&json!({
        "name": "intern",
        "permissions": [uuid::Uuid::new_v4()],
    })))
    .await;

    // then
    assert_eq!(valid.status().as_u16(), 201);
    let role: Value = valid.json().await.unwrap();
    assert_eq!(role["permissions"][0], permission["id"]);
    assert_eq!(invalid.status().as_u16(), 400);
}

#[tokio::test]
async fn roles_are_hidden_from_regular_users() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;

    // when
    let response = send(app.get("/roles").bearer_auth(&user.token)).await;

    // then
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn unknown_ids_are_reported_as_bad_requests() {
    // given
    let app = TestApp::spawn().await;

    // when
    let response = send(app.get(&format!("/categories/{}", uuid::Uuid::new_v4()))).await;

    // then
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(error_message(response).await, "Category not found");
}

#[tokio::test]
async fn unknown_filters_are_rejected() {
    // given
    let app = TestApp::spawn().await;

    // when
    let response = send(app.get("/categories?colour=red")).await;

    // then
    assert_eq!(response.status().as_u16(), 400);
}
