use crate::{
    app_state::AppState,
    authentication::{Access, RequireAuthLayer, TokenIssuer},
    cache::{CollectionCache, ResponseCacheLayer},
    configuration::{DatabaseSettings, Settings},
    repository::Repositories,
    routes::{
        auth, broadcasts, catalog, health_check, issues, subscriptions, users, videos,
        API_PREFIX, CACHED_COLLECTIONS,
    },
    services::{
        BroadcastService, CatalogService, IssueService, SubscriptionService, UserService,
        VideoService,
    },
    storage::{MediaStore, ObjectStore, S3ObjectStore},
    telemetry::{request_span, RequestUuid},
};
use axum::Router;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub struct Application {
    listener: TcpListener,
    address: SocketAddr,
    router: Router,
    shutdown: CancellationToken,
}

impl Application {
    /// Production wiring: Postgres repositories and S3 object storage.
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let db_pool = get_connection_pool(&config.database);
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        let store = Arc::new(S3ObjectStore::from_settings(&config.storage).await);

        Self::build_with(config, Repositories::postgres(db_pool), store).await
    }

    pub async fn build_with(
        config: Settings,
        repositories: Repositories,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, anyhow::Error> {
        let listener = TcpListener::bind(format!(
            "{}:{}",
            config.application.host, config.application.port
        ))
        .await?;
        let address = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let state = app_state(&config, &repositories, store, shutdown.clone())?;
        let cache = ResponseCacheLayer::new(
            repositories.cache.clone(),
            config.cache.ttl(),
            CACHED_COLLECTIONS
                .iter()
                .map(|collection| format!("{API_PREFIX}/{collection}")),
        );

        Ok(Self {
            listener,
            address,
            router: router(state, cache),
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    /// Cancelling the token stops the server and any background archiving.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        tracing::info!("Listening on {}", self.address);
        let shutdown = self.shutdown;
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }
}

pub fn get_connection_pool(config: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new().connect_lazy_with(config.with_db())
}

fn app_state(
    config: &Settings,
    repositories: &Repositories,
    store: Arc<dyn ObjectStore>,
    shutdown: CancellationToken,
) -> Result<AppState, anyhow::Error> {
    let tokens = TokenIssuer::new(
        &config.application.jwt_secret,
        config.application.token_expiry_hours,
    );
    let media = MediaStore::new(
        store,
        config.storage.buckets.clone(),
        config.storage.cdn.clone(),
    );
    let videos = VideoService::new(repositories.videos.clone(), media.clone());

    Ok(AppState {
        users: UserService::new(
            repositories.users.clone(),
            repositories.roles.clone(),
            repositories.codes.clone(),
            repositories.transactions.clone(),
            config.email_client.client()?,
            tokens.clone(),
            config.application.password_hashing.clone(),
        ),
        categories: CatalogService::new(
            repositories.categories.clone(),
            repositories.permissions.clone(),
        ),
        permissions: CatalogService::new(
            repositories.permissions.clone(),
            repositories.permissions.clone(),
        ),
        roles: CatalogService::new(repositories.roles.clone(), repositories.permissions.clone()),
        issues: IssueService::new(repositories.issues.clone(), media),
        videos: videos.clone(),
        subscriptions: SubscriptionService::new(
            repositories.subscriptions.clone(),
            repositories.users.clone(),
        ),
        broadcasts: BroadcastService::new(
            repositories.broadcasts.clone(),
            videos,
            CollectionCache::new(repositories.cache.clone(), format!("{API_PREFIX}/videos")),
            config.broadcast_provider.client()?,
            config.broadcast_provider.retry_policy(),
            shutdown,
        ),
        auth: RequireAuthLayer::new(
            tokens,
            repositories.users.clone(),
            config.application.enforce_auth,
            Access::User,
        ),
        uploads: config.uploads.clone(),
    })
}

fn router(state: AppState, cache: ResponseCacheLayer) -> Router {
    let api = Router::new()
        .merge(auth::router())
        .merge(users::router(&state))
        .merge(catalog::router(&state))
        .merge(issues::router(&state))
        .merge(videos::router(&state))
        .merge(subscriptions::router(&state))
        .merge(broadcasts::router(&state));

    Router::new()
        .merge(health_check::router())
        .nest(API_PREFIX, api)
        .layer(cache)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(RequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}
