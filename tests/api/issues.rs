use crate::helpers::{error_message, send, TestApp};
use serde_json::{json, Value};

#[tokio::test]
async fn uploading_an_issue_stores_both_files() {
    // given
    let app = TestApp::spawn().await;
    let admin = app.admin().await;

    // when
    let response = app
        .upload_issue(&admin, "Spring 2027", "application/pdf")
        .await;

    // then
    assert_eq!(response.status().as_u16(), 201);
    let issue: Value = response.json().await.unwrap();
    assert_eq!(issue["key"], "spring-2027");
    assert_eq!(issue["order"], 1);
    assert!(app.store.object("pressroom-issues", "spring-2027.pdf").is_some());
    assert!(app.store.object("pressroom-covers", "spring-2027.jpeg").is_some());
}

#[tokio::test]
async fn a_non_pdf_issue_is_rejected() {
    // given
    let app = TestApp::spawn().await;
    let admin = app.admin().await;

    // when
    let response = app.upload_issue(&admin, "Spring 2027", "text/plain").await;

    // then
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(error_message(response).await, "Issue must be a binary file.");
    assert_eq!(app.store.object_count("pressroom-issues"), 0);
}

#[tokio::test]
async fn only_administrators_upload_issues() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;

    // when
    let response = app
        .upload_issue(&user, "Spring 2027", "application/pdf")
        .await;

    // then
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn reading_an_issue_counts_a_view() {
    // given
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let issue: Value = app
        .upload_issue(&admin, "Spring 2027", "application/pdf")
        .await
        .json()
        .await
        .unwrap();
    let endpoint = format!("/issues/{}", issue["id"].as_str().unwrap());

    // when
    send(app.get(&endpoint)).await;
    let response = send(app.get(&endpoint)).await;

    // then
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["views"], 2);
}

#[tokio::test]
async fn renaming_an_issue_moves_its_files() {
    // given
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let issue: Value = app
        .upload_issue(&admin, "Spring 2027", "application/pdf")
        .await
        .json()
        .await
        .unwrap();

    // when
    let response = send(
        app.put(&format!("/issues/{}", issue["id"].as_str().unwrap()))
            .bearer_auth(&admin.token)
            .json(&json!({"title": "Spring Special"})),
    )
    .await;

    // then
    assert_eq!(response.status().as_u16(), 200);
    let renamed: Value = response.json().await.unwrap();
    assert_eq!(renamed["key"], "spring-special");
    assert!(app.store.object("pressroom-issues", "spring-special.pdf").is_some());
    assert!(app.store.object("pressroom-issues", "spring-2027.pdf").is_none());
}

#[tokio::test]
async fn deleting_an_issue_removes_its_files() {
    // given
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let issue: Value = app
        .upload_issue(&admin, "Spring 2027", "application/pdf")
        .await
        .json()
        .await
        .unwrap();

    // when
    let response = send(
        app.delete(&format!("/issues/{}", issue["id"].as_str().unwrap()))
            .bearer_auth(&admin.token),
    )
    .await;

    // then
    assert_eq!(response.status().as_u16(), 204);
    assert_eq!(app.store.object_count("pressroom-issues"), 0);
    assert_eq!(app.store.object_count("pressroom-covers"), 0);
}
