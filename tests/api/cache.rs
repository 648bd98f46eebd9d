use crate::helpers::{cache_status, send, TestApp};
use serde_json::Value;

#[tokio::test]
async fn collection_listings_are_served_from_the_cache() {
    // given
    let app = TestApp::spawn().await;

    // when
    let first = send(app.get("/issues")).await;
    let second = send(app.get("/issues")).await;

    // then
    assert_eq!(cache_status(&first).as_deref(), Some("miss"));
    assert_eq!(cache_status(&second).as_deref(), Some("hit"));
}

#[tokio::test]
async fn uploads_invalidate_the_cached_listing() {
    // given
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    send(app.get("/issues")).await;

    // when
    app.upload_issue(&admin, "Spring 2027", "application/pdf")
        .await;
    let response = send(app.get("/issues")).await;

    // then
    assert_eq!(cache_status(&response).as_deref(), Some("miss"));
    let page: Value = response.json().await.unwrap();
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn rejected_writes_keep_the_cache() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;
    send(app.get("/issues")).await;

    // when
    app.upload_issue(&user, "Spring 2027", "application/pdf")
        .await;
    let response = send(app.get("/issues")).await;

    // then
    assert_eq!(cache_status(&response).as_deref(), Some("hit"));
}

#[tokio::test]
async fn single_items_are_not_cached() {
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
    let response = send(app.get(&format!("/issues/{}", issue["id"].as_str().unwrap()))).await;

    // then
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(cache_status(&response), None);
}
