use axum::{
    routing::{delete, get, post},
    Router,
};
use rota_feed::{backend::Backend, config::Config, geo, handlers, service::FeedService};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Initializes logging and configuration, picks the online or offline
/// backend, resolves the viewer position, loads the first feed page and
/// starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rota_feed=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    let backend = Backend::from_config(&config)?;
    if config.is_offline() {
        tracing::warn!("No backend credentials configured, running in offline mode");
    } else {
        tracing::info!("✓ Backend client initialized");
    }

    let viewer = geo::locate_viewer(
        config.geolocation_url.as_deref(),
        config.geolocation_timeout(),
    )
    .await;

    let service = FeedService::new(backend, &config, Some(viewer));

    // A failed first load stays visible as the feed error
    match service.load_first_page().await {
        Ok(feed) => tracing::info!("Initial feed loaded: {} case(s)", feed.loaded),
        Err(e) => tracing::error!("Initial feed load failed: {}", e),
    }

    let app_state = Arc::new(handlers::AppState { service });

    // 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = Router::new()
        .route("/api/v1/status", get(handlers::get_status))
        .route("/api/v1/feed", get(handlers::get_feed))
        .route(
            "/api/v1/feed/filters",
            get(handlers::get_filters).put(handlers::update_filters),
        )
        .route("/api/v1/feed/next", post(handlers::load_next_page))
        .route("/api/v1/feed/reload", post(handlers::reload_feed))
        .route("/api/v1/feed/error", delete(handlers::dismiss_error))
        .route("/api/v1/cases/:id/dismiss", post(handlers::dismiss_case))
        .route("/api/v1/cases/:id/accept", post(handlers::accept_case))
        .route("/api/v1/cases/:id/complete", post(handlers::complete_case))
        .route("/api/v1/cases/:id/call", post(handlers::simulate_call))
        .route("/api/v1/cases/:id/open", post(handlers::open_case))
        .route(
            "/api/v1/detail",
            get(handlers::get_detail).delete(handlers::close_detail),
        )
        .route("/api/v1/detail/messages", post(handlers::send_message))
        .layer(
            ServiceBuilder::new()
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
