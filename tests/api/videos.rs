use crate::helpers::{send, TestApp};
use pressroom::storage::{StoreCall, PART_SIZE};
use serde_json::{json, Value};

#[tokio::test]
async fn uploaded_videos_are_published() {
    // given
    let app = TestApp::spawn().await;
    let admin = app.admin().await;

    // when
    let response = app.upload_video(&admin, "Editors Talk").await;

    // then
    assert_eq!(response.status().as_u16(), 201);
    let video: Value = response.json().await.unwrap();
    assert_eq!(video["status"], "PUBLISHED");
    assert_eq!(video["duration"], 1800);
    assert!(app.store.object("pressroom-videos", "editors-talk.mp4").is_some());
}

#[tokio::test]
async fn large_videos_are_stored_in_parts() {
    // given
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let content = vec![42u8; PART_SIZE + PART_SIZE / 2];

    // when
    let response = app
        .upload_video_content(&admin, "Long Interview", content.clone())
        .await;

    // then
    assert_eq!(response.status().as_u16(), 201);
    let stored = app
        .store
        .object("pressroom-videos", "long-interview.mp4")
        .unwrap();
    assert_eq!(stored.len(), content.len());
    let parts = app
        .store
        .calls()
        .into_iter()
        .filter(|c| matches!(c, StoreCall::UploadPart { .. }))
        .count();
    assert_eq!(parts, 2);
    assert_eq!(app.store.pending_uploads(), 0);
}

#[tokio::test]
async fn duplicate_titles_are_rejected() {
    // given
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    app.upload_video(&admin, "Editors Talk").await;

    // when
    let response = app.upload_video(&admin, "Editors Talk").await;

    // then
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn videos_can_be_unpublished() {
    // given
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let video: Value = app
        .upload_video(&admin, "Editors Talk")
        .await
        .json()
        .await
        .unwrap();

    // when
    let response = send(
        app.put(&format!("/videos/{}", video["id"].as_str().unwrap()))
            .bearer_auth(&admin.token)
            .json(&json!({"status": "DRAFT"})),
    )
    .await;

    // then
    assert_eq!(response.status().as_u16(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["status"], "DRAFT");
}

#[tokio::test]
async fn videos_are_filtered_case_insensitively() {
    // given
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    app.upload_video(&admin, "Editors Talk").await;
    app.upload_video(&admin, "Launch Night").await;

    // when
    let response = send(app.get("/videos?title=LAUNCH")).await;

    // then
    assert_eq!(response.status().as_u16(), 200);
    let page: Value = response.json().await.unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["data"][0]["title"], "Launch Night");
}

#[tokio::test]
async fn drafts_are_only_listed_for_administrators() {
    // given
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let user = app.user().await;
    app.upload_video(&admin, "Launch Night").await;
    let draft: Value = app
        .upload_video(&admin, "Editors Talk")
        .await
        .json()
        .await
        .unwrap();
    send(
        app.put(&format!("/videos/{}", draft["id"].as_str().unwrap()))
            .bearer_auth(&admin.token)
            .json(&json!({"status": "DRAFT"})),
    )
    .await;

    // when
    let public: Value = send(app.get("/videos?status=draft"))
        .await
        .json()
        .await
        .unwrap();
    let drafts: Value = send(app.get("/videos/drafts").bearer_auth(&admin.token))
        .await
        .json()
        .await
        .unwrap();
    let forbidden = send(app.get("/videos/drafts").bearer_auth(&user.token)).await;

    // then
    assert_eq!(public["total"], 1);
    assert_eq!(public["data"][0]["title"], "Launch Night");
    assert_eq!(drafts["total"], 1);
    assert_eq!(drafts["data"][0]["title"], "Editors Talk");
    assert_eq!(forbidden.status().as_u16(), 403);
}
