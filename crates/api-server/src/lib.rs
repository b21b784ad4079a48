pub mod config;
pub mod html;
pub mod valuation_routes;

use anyhow::Context;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use quote_client::QuoteClient;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use valuation_core::{ExportSerializer, ValuationError};
use valuation_engine::{ValuationDashboard, XlsxExporter};

pub use config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<ValuationDashboard>,
    pub exporter: Arc<dyn ExportSerializer>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(dashboard: ValuationDashboard, config: ServerConfig) -> Self {
        Self {
            dashboard: Arc::new(dashboard),
            exporter: Arc::new(XlsxExporter::default()),
            config: Arc::new(config),
        }
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn ExportSerializer>) -> Self {
        self.exporter = exporter;
        self
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ValuationError> for AppError {
    fn from(err: ValuationError) -> Self {
        let status = match &err {
            ValuationError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ValuationError::NotFound(_) => StatusCode::NOT_FOUND,
            ValuationError::Api(_) | ValuationError::EntityFetchFailed { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {}", self.message);
        }
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(valuation_routes::valuation_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `RUST_LOG` filter, JSON lines when `LOG_FORMAT=json`.
pub fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "api_server=info,valuation_engine=info,quote_client=warn,tower_http=info".into());

    if std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false) {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    let client = QuoteClient::new(config.quote_base_url.clone());
    let dashboard = ValuationDashboard::new(Arc::new(client))
        .with_cache_ttl(chrono::Duration::seconds(config.cache_ttl_secs));

    let bind_addr = config.bind_addr.clone();
    tracing::info!(
        "Serving {} default tickers ({}), cache TTL {}s",
        config.tickers.len(),
        config.tickers.join(","),
        config.cache_ttl_secs
    );

    let app = build_router(AppState::new(dashboard, config));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Valuation dashboard listening on {}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
