use once_cell::sync::Lazy;
use pressroom::{
    configuration::get_configuration,
    repository::{Repositories, UserRepository},
    startup::Application,
    storage::MemoryObjectStore,
    telemetry::{get_subscriber, init_subscriber},
};
use reqwest::{
    multipart::{Form, Part},
    Client, RequestBuilder, Response,
};
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

static TRACING: Lazy<()> = Lazy::new(|| {
    let name = "test";
    let default_env_filter = "info";
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(name.into(), default_env_filter.into(), std::io::stdout);
        init_subscriber(subscriber).expect("Failed to init subscriber");
    } else {
        let subscriber = get_subscriber(name.into(), default_env_filter.into(), std::io::sink);
        init_subscriber(subscriber).expect("Failed to init subscriber");
    }
});

static FAILED_TO_EXECUTE_REQUEST: &str = "Failed to execute request";

pub const PASSWORD: &str = "correct horse battery";

pub struct TestApp {
    pub address: SocketAddr,
    pub repositories: Repositories,
    pub store: Arc<MemoryObjectStore>,
    pub email_server: MockServer,
    pub provider_server: MockServer,
    shutdown: CancellationToken,
    client: Client,
}

pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub token: String,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Lazy::force(&TRACING);

        let mut config = get_configuration().expect("Failed to read configuration");
        config.application.port = 0;
        config.application.enforce_auth = true;
        config.application.password_hashing.memory_kib = 8;
        config.application.password_hashing.iterations = 1;
        config.application.password_hashing.parallelism = 1;
        config.broadcast_provider.poll_interval_milliseconds = 10;
        config.broadcast_provider.max_poll_attempts = 5;

        let email_server = MockServer::start().await;
        config.email_client.base_url = email_server.uri();
        let provider_server = MockServer::start().await;
        config.broadcast_provider.base_url = provider_server.uri();

        let repositories = Repositories::in_memory();
        let store = Arc::new(MemoryObjectStore::default());
        let app = Application::build_with(config, repositories.clone(), store.clone())
            .await
            .expect("Failed to build application");
        let address = app.local_addr();
        let shutdown = app.shutdown_token();

        tokio::spawn(app.run_until_stopped());

        Self {
            address,
            repositories,
            store,
            email_server,
            provider_server,
            shutdown,
            client: Client::new(),
        }
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("http://{}{endpoint}", self.address)
    }

    pub fn api(&self, endpoint: &str) -> String {
        self.url(&format!("/api/v1{endpoint}"))
    }

    pub fn get(&self, endpoint: &str) -> RequestBuilder {
        self.client.get(self.api(endpoint))
    }

    pub fn post(&self, endpoint: &str) -> RequestBuilder {
        self.client.post(self.api(endpoint))
    }

    pub fn put(&self, endpoint: &str) -> RequestBuilder {
        self.client.put(self.api(endpoint))
    }

    pub fn delete(&self, endpoint: &str) -> RequestBuilder {
        self.client.delete(self.api(endpoint))
    }

    pub async fn get_health_check(&self) -> Response {
        self.client
            .get(self.url("/health_check"))
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    pub async fn sign_up(&self, email: &str) -> Response {
        self.post("/auth/signup")
            .json(&json!({
                "email": email,
                "password": PASSWORD,
                "fullName": "Ursula Le Guin",
                "city": "Portland",
            }))
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Response {
        self.post("/auth/signin")
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    /// Signs up a fresh user and returns their bearer token.
    pub async fn user(&self) -> TestUser {
        let email = format!("{}@pressroom.test", Uuid::new_v4());
        let response = self.sign_up(&email).await;
        assert_eq!(response.status().as_u16(), 201);
        let created: Value = response.json().await.expect("Invalid sign-up response");
        let id = created["id"]
            .as_str()
            .and_then(|id| id.parse().ok())
            .expect("Missing user id");

        let session: Value = self
            .sign_in(&email, PASSWORD)
            .await
            .json()
            .await
            .expect("Invalid sign-in response");

        TestUser {
            id,
            email,
            token: session["token"]
                .as_str()
                .expect("Missing token")
                .to_owned(),
        }
    }

    pub async fn admin(&self) -> TestUser {
        let admin = self.user().await;
        let mut user = self
            .repositories
            .users
            .find(admin.id)
            .await
            .expect("Failed to load user")
            .expect("User is missing");
        user.is_admin = true;
        self.repositories
            .users
            .update(&user)
            .await
            .expect("Failed to promote user");
        admin
    }

    pub async fn upload_issue(&self, admin: &TestUser, title: &str, content_type: &str) -> Response {
        let form = Form::new()
            .text("title", title.to_owned())
            .text("description", "Quarterly edition")
            .part(
                "issue",
                Part::bytes(b"%PDF-1.7 minimal".to_vec())
                    .file_name("issue.pdf")
                    .mime_str(content_type)
                    .expect("Invalid mime type"),
            )
            .part(
                "cover",
                Part::bytes(b"\xff\xd8\xff\xe0".to_vec())
                    .file_name("cover.jpeg")
                    .mime_str("image/jpeg")
                    .expect("Invalid mime type"),
            );

        self.post("/issues")
            .bearer_auth(&admin.token)
            .multipart(form)
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    pub async fn upload_video(&self, admin: &TestUser, title: &str) -> Response {
        self.upload_video_content(admin, title, b"\x00\x00\x00\x18ftypmp42".to_vec())
            .await
    }

    pub async fn upload_video_content(
        &self,
        admin: &TestUser,
        title: &str,
        content: Vec<u8>,
    ) -> Response {
        let form = Form::new()
            .text("title", title.to_owned())
            .text("duration", "1800")
            .part(
                "video",
                Part::bytes(content)
                    .file_name("talk.mp4")
                    .mime_str("video/mp4")
                    .expect("Invalid mime type"),
            )
            .part(
                "thumbnail",
                Part::bytes(b"\x89PNG".to_vec())
                    .file_name("talk.png")
                    .mime_str("image/png")
                    .expect("Invalid mime type"),
            );

        self.post("/videos")
            .bearer_auth(&admin.token)
            .multipart(form)
            .send()
            .await
            .expect(FAILED_TO_EXECUTE_REQUEST)
    }

    /// Provider side of a finished broadcast render for `event_id`.
    pub async fn mount_finished_render(&self, event_id: &str) {
        let base = self.provider_server.uri();
        Mock::given(method("POST"))
            .and(path(format!("/broadcasts/{event_id}/downloads")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "progress": 100,
                "url": format!("{base}/files/{event_id}.mp4"),
            })))
            .mount(&self.provider_server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/files/{event_id}.mp4")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4-bytes".to_vec()))
            .mount(&self.provider_server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/broadcasts/{event_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": event_id,
                "snapshotUrl": format!("{base}/files/{event_id}.jpeg"),
            })))
            .mount(&self.provider_server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/files/{event_id}.jpeg")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg-bytes".to_vec()))
            .mount(&self.provider_server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("/broadcasts/{event_id}")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&self.provider_server)
            .await;
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub async fn send(request: RequestBuilder) -> Response {
    request.send().await.expect(FAILED_TO_EXECUTE_REQUEST)
}

pub fn cache_status(response: &Response) -> Option<String> {
    response
        .headers()
        .get("x-cache")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

pub async fn error_message(response: Response) -> String {
    let body: Value = response.json().await.expect("Invalid error body");
    body["errors"][0]["msg"]
        .as_str()
        .expect("Missing error message")
        .to_owned()
}
