pub mod config;
pub mod error;
pub mod http_backend;
pub mod metrics;
pub mod routes;
pub mod status;
pub mod validation;
pub mod ws;

use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use axum::{
    extract::Request,
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tts_core::{
    AppSettings, BackendFactory, CoordinatorOptions, RequestCoordinator, SettingsStore,
};

use crate::config::ServerConfig;
use crate::metrics::AppMetrics;
use crate::status::StatusBoard;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: RequestCoordinator,
    pub settings: Arc<SettingsStore>,
    pub status: Arc<StatusBoard>,
    pub metrics: AppMetrics,
    pub request_count: Arc<AtomicU64>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        settings: Arc<SettingsStore>,
        factory: Arc<dyn BackendFactory>,
    ) -> Self {
        let status = Arc::new(StatusBoard::default());
        let options = CoordinatorOptions {
            output_format: config.output_format(),
            ..CoordinatorOptions::default()
        };
        let coordinator = RequestCoordinator::new(
            settings.clone(),
            factory,
            Arc::new(config.caller_packages.clone()),
            status.clone(),
            options,
        );
        Self {
            coordinator,
            settings,
            status,
            metrics: AppMetrics::default(),
            request_count: Arc::new(AtomicU64::new(0)),
            config,
        }
    }
}

/// Load voice settings, falling back to an empty profile list and default
/// app settings when the files are missing or invalid.
pub fn load_settings(config: &ServerConfig) -> SettingsStore {
    let settings_path = config
        .app_settings_path
        .exists()
        .then_some(config.app_settings_path.as_path());

    match SettingsStore::load(config.voice_profiles_path.as_path(), settings_path) {
        Ok(store) => store,
        Err(e) => {
            warn!(
                "Could not load {}: {e}, starting without voice profiles.",
                config.voice_profiles_path.display()
            );
            let app = settings_path
                .and_then(|path| read_app_settings(path).ok())
                .unwrap_or_default();
            SettingsStore::new(Vec::new(), app)
        }
    }
}

fn read_app_settings(path: &Path) -> anyhow::Result<AppSettings> {
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        base.allow_origin(Any)
    } else {
        info!("CORS configured for {} origin(s)", origins.len());
        base.allow_origin(AllowOrigin::list(origins))
    }
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert("x-request-id", value.clone());
        let mut response = next.run(request).await;
        response.headers_mut().insert("x-request-id", value);
        return response;
    }
    next.run(request).await
}

/// Build the HTTP surface: routes at the root and under `/api`, wrapped in
/// tracing, rate limiting, timeout and CORS layers.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let config = &state.config;

    // Global limit: all clients share one bucket.
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(u64::from((config.rate_limit_per_minute / 60).max(1)))
            .burst_size(config.rate_limit_per_minute.max(1))
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limit configuration"))?,
    );

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(config))
        .into_inner();

    let api = Router::new()
        .route("/health", get(routes::health_check))
        .route("/healthz", get(routes::health_check))
        .route("/speak", post(routes::speak))
        .route("/stop", post(routes::stop))
        .route("/status", get(routes::status))
        .route("/profiles", get(routes::profiles))
        .route("/ws/speak", get(ws::speak_ws))
        .route("/metrics", get(routes::metrics_endpoint));

    Ok(Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(axum::middleware::from_fn(add_request_id))
        .layer(middleware_stack)
        .with_state(state))
}
