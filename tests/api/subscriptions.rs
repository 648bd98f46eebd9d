use crate::helpers::{send, TestApp, TestUser};
use serde_json::{json, Value};
use uuid::Uuid;

async fn subscribe(app: &TestApp, user: &TestUser, ids: usize) -> reqwest::Response {
    let ids: Vec<Uuid> = (0..ids).map(|_| Uuid::new_v4()).collect();
    send(
        app.post("/subscriptions")
            .bearer_auth(&user.token)
            .json(&json!({
                "type": "issue",
                "recurring": "yearly",
                "product": "bundle",
                "ids": ids,
            })),
    )
    .await
}

#[tokio::test]
async fn a_purchase_belongs_to_the_caller() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;

    // when
    let response = subscribe(&app, &user, 2).await;

    // then
    assert_eq!(response.status().as_u16(), 201);
    let subscription: Value = response.json().await.unwrap();
    assert_eq!(subscription["userId"], user.id.to_string());
    assert_eq!(subscription["left"], 4);
    assert_eq!(subscription["access"], "YEARLY");
}

#[tokio::test]
async fn a_seventh_item_is_rejected() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;
    let subscription: Value = subscribe(&app, &user, 6).await.json().await.unwrap();
    let endpoint = format!("/subscriptions/{}", subscription["id"].as_str().unwrap());

    // when
    let response = send(
        app.put(&endpoint)
            .bearer_auth(&user.token)
            .json(&json!({"id": Uuid::new_v4()})),
    )
    .await;

    // then
    assert_eq!(response.status().as_u16(), 400);
    let unchanged: Value = send(app.get(&endpoint).bearer_auth(&user.token))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(unchanged["ids"].as_array().unwrap().len(), 6);
    assert_eq!(unchanged["left"], 0);
}

#[tokio::test]
async fn redeeming_fills_a_slot() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;
    let subscription: Value = subscribe(&app, &user, 5).await.json().await.unwrap();

    // when
    let response = send(
        app.put(&format!(
            "/subscriptions/{}",
            subscription["id"].as_str().unwrap()
        ))
        .bearer_auth(&user.token)
        .json(&json!({"id": Uuid::new_v4()})),
    )
    .await;

    // then
    assert_eq!(response.status().as_u16(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["left"], 0);
}

#[tokio::test]
async fn yearly_subscriptions_report_months_left() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;
    let subscription: Value = subscribe(&app, &user, 1).await.json().await.unwrap();

    // when
    let response = send(
        app.get(&format!(
            "/subscriptions/{}/status",
            subscription["id"].as_str().unwrap()
        ))
        .bearer_auth(&user.token),
    )
    .await;

    // then
    assert_eq!(response.status().as_u16(), 200);
    let status: Value = response.json().await.unwrap();
    let months = status["months"].as_i64().unwrap();
    assert!((11..=12).contains(&months), "Unexpected months: {months}");
}

#[tokio::test]
async fn mine_lists_only_the_callers_subscriptions() {
    // given
    let app = TestApp::spawn().await;
    let alice = app.user().await;
    let bob = app.user().await;
    subscribe(&app, &alice, 1).await;
    subscribe(&app, &bob, 1).await;

    // when
    let response = send(app.get("/subscriptions/mine").bearer_auth(&alice.token)).await;

    // then
    let page: Value = response.json().await.unwrap();
    assert_eq!(page["total"], 1);
    assert_eq!(page["data"][0]["userId"], alice.id.to_string());
}

#[tokio::test]
async fn other_users_subscriptions_are_off_limits() {
    // given
    let app = TestApp::spawn().await;
    let alice = app.user().await;
    let bob = app.user().await;
    let subscription: Value = subscribe(&app, &alice, 1).await.json().await.unwrap();

    // when
    let response = send(
        app.delete(&format!(
            "/subscriptions/{}",
            subscription["id"].as_str().unwrap()
        ))
        .bearer_auth(&bob.token),
    )
    .await;

    // then
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn administrators_list_every_subscription() {
    // given
    let app = TestApp::spawn().await;
    let user = app.user().await;
    let admin = app.admin().await;
    subscribe(&app, &user, 1).await;

    // when
    let as_user = send(app.get("/subscriptions").bearer_auth(&user.token)).await;
    let as_admin = send(app.get("/subscriptions").bearer_auth(&admin.token)).await;

    // then
    assert_eq!(as_user.status().as_u16(), 403);
    let page: Value = as_admin.json().await.unwrap();
    assert_eq!(page["total"], 1);
}
