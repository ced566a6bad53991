pub(crate) mod core;
pub(crate) mod routes;
pub(crate) mod types;
pub(crate) mod utils;

use axum::{
    Router,
    extract::MatchedPath,
    http::Request,
    middleware,
    routing::{get, post},
};
use config::Config;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info_span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::error::ConfigError as Error;
use crate::core::{config::Args, state::AppState};
use crate::utils::auth::{authorize, require_scope};

pub async fn run() -> Result<(), Error> {
    let config = Config::builder()
        .add_source(config::Environment::with_prefix("ERPGATE"))
        .build()
        .map_err(Error::Config)?;

    let config = config.try_deserialize::<Args>().map_err(Error::Config)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_new(config.log_level.clone()).unwrap_or_default())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = AppState::new(&config)?;

    // The shared default client authenticates eagerly; a dead upstream at
    // boot is a configuration problem, not a per-request one.
    state
        .client
        .authenticate()
        .await
        .map_err(|e| Error::Upstream(e.to_string()))?;

    let app = Router::new()
        .route("/", get(routes::erp::root))
        .route("/health", get(routes::erp::health))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/pin-login", post(routes::auth::pin_login))
        .route(
            "/auth/me",
            get(routes::auth::me).layer(middleware::from_fn_with_state(state.clone(), authorize)),
        )
        .route(
            "/auth/logout",
            post(routes::auth::logout)
                .layer(middleware::from_fn_with_state(state.clone(), authorize)),
        )
        .route(
            "/models/search",
            post(routes::erp::search)
                .layer(middleware::from_fn(require_scope("read")))
                .layer(middleware::from_fn_with_state(state.clone(), authorize)),
        )
        .route(
            "/models/read",
            post(routes::erp::read)
                .layer(middleware::from_fn(require_scope("read")))
                .layer(middleware::from_fn_with_state(state.clone(), authorize)),
        )
        .route(
            "/models/create",
            post(routes::erp::create)
                .layer(middleware::from_fn(require_scope("write")))
                .layer(middleware::from_fn_with_state(state.clone(), authorize)),
        )
        .route(
            "/models/update",
            post(routes::erp::update)
                .layer(middleware::from_fn(require_scope("write")))
                .layer(middleware::from_fn_with_state(state.clone(), authorize)),
        )
        .route(
            "/models/delete",
            post(routes::erp::delete)
                .layer(middleware::from_fn(require_scope("delete")))
                .layer(middleware::from_fn_with_state(state.clone(), authorize)),
        )
        .route(
            "/models/{model}/fields",
            get(routes::erp::fields)
                .layer(middleware::from_fn(require_scope("read")))
                .layer(middleware::from_fn_with_state(state.clone(), authorize)),
        )
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let matched_path = request
                    .extensions()
                    .get::<MatchedPath>()
                    .map(MatchedPath::as_str);

                info_span!(
                    "request",
                    method = ?request.method(),
                    matched_path,
                )
            }),
        )
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .map_err(Error::IO)?;

    tracing::debug!("listening on port {}", config.port);

    axum::serve(listener, app).await.map_err(Error::IO)?;

    Ok(())
}
