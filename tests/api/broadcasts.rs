use crate::helpers::{cache_status, send, TestApp};
use pressroom::{
    domain::{Broadcast, ListParams, Video, VideoStatus},
    repository::{BroadcastRepository, VideoRepository},
};
use serde_json::{json, Value};
use std::time::Duration;

fn event(kind: &str, action: &str) -> Value {
    json!({
        "eventId": "evt-42",
        "action": action,
        "type": kind,
        "payload": {
            "title": "Launch Night",
            "playerUrl": "https://player.test/evt-42",
        },
    })
}

#[tokio::test]
async fn the_first_event_opens_a_broadcast() {
    // given
    let app = TestApp::spawn().await;

    // when
    let response = send(app.post("/broadcasts/webhook").json(&event("started", "update"))).await;

    // then
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "created");
    let active: Value = send(app.get("/broadcasts/active")).await.json().await.unwrap();
    assert_eq!(active["eventId"], "evt-42");
    assert_eq!(active["isActive"], true);
}

#[tokio::test]
async fn remove_actions_are_ignored() {
    // given
    let app = TestApp::spawn().await;

    // when
    let response = send(app.post("/broadcasts/webhook").json(&event("started", "remove"))).await;

    // then
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "ignored");
    assert!(app.repositories.broadcasts.find_active().await.unwrap().is_none());
}

#[tokio::test]
async fn archiving_imports_the_recording_as_a_draft() {
    // given
    let app = TestApp::spawn().await;
    app.mount_finished_render("evt-42").await;
    send(app.post("/broadcasts/webhook").json(&event("started", "update"))).await;

    // when
    let response = send(app.post("/broadcasts/webhook").json(&event("archived", "update"))).await;

    // then
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "archived");

    let video = wait_for_video(&app).await;
    assert_eq!(video.status, VideoStatus::Draft);
    assert_eq!(video.title, "Launch Night");
    assert!(video.key.starts_with("broadcast-"));
    assert!(video.thumbnail.is_some());
    assert!(app
        .store
        .object("pressroom-videos", &format!("{}.mp4", video.key))
        .is_some());

    assert_eq!(wait_for_cleanup(&app).await, 0);
}

#[tokio::test]
async fn imported_recordings_refresh_the_cached_video_listing() {
    // given
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    app.mount_finished_render("evt-42").await;
    send(app.get("/videos")).await;
    let cached = send(app.get("/videos")).await;
    assert_eq!(cache_status(&cached).as_deref(), Some("hit"));
    send(app.post("/broadcasts/webhook").json(&event("started", "update"))).await;

    // when
    send(app.post("/broadcasts/webhook").json(&event("archived", "update"))).await;
    wait_for_video(&app).await;
    assert_eq!(wait_for_cleanup(&app).await, 0);
    let response = send(app.get("/videos")).await;

    // then
    assert_eq!(cache_status(&response).as_deref(), Some("miss"));
    let drafts: Value = send(app.get("/videos/drafts").bearer_auth(&admin.token))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(drafts["total"], 1);
    assert_eq!(drafts["data"][0]["title"], "Launch Night");
}

#[tokio::test]
async fn listing_broadcasts_requires_an_administrator() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;

    // when
    let response = send(app.get("/broadcasts").bearer_auth(&user.token)).await;

    // then
    assert_eq!(response.status().as_u16(), 403);
}

async fn wait_for_video(app: &TestApp) -> Video {
    for _ in 0..50 {
        let page = app
            .repositories
            .videos
            .list(&ListParams::unbounded(&Video::LISTING))
            .await
            .unwrap();
        if let Some(video) = page.data.into_iter().next() {
            return video;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("The recording was never imported");
}

/// Broadcasts left once the archive task has finished, which happens after
/// the recording is stored and the video listing dropped from the cache.
async fn wait_for_cleanup(app: &TestApp) -> u64 {
    let mut remaining = 1;
    for _ in 0..50 {
        remaining = app
            .repositories
            .broadcasts
            .list(&ListParams::unbounded(&Broadcast::LISTING))
            .await
            .unwrap()
            .total;
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    remaining
}
