//! Valuation API Routes
//!
//! Color-graded valuation table (JSON and HTML), spreadsheet download and
//! cache refresh.

use axum::{
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use valuation_core::ValuationError;
use valuation_engine::DisplayGrid;

use crate::config::parse_tickers;
use crate::{html, ApiResponse, AppError, AppState};

/// Optional comma-separated override of the configured ticker list
#[derive(Debug, Default, Deserialize)]
pub struct TickersQuery {
    pub tickers: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub tickers: Vec<String>,
    pub invalidated: bool,
}

pub fn valuation_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/api/valuation", get(get_valuation))
        .route("/api/valuation/export", get(export_valuation))
        .route("/api/valuation/refresh", post(refresh_valuation))
}

fn resolve_tickers(state: &AppState, query: &TickersQuery) -> Result<Vec<String>, ValuationError> {
    let Some(raw) = &query.tickers else {
        return Ok(state.config.tickers.clone());
    };

    let tickers = parse_tickers(raw).map_err(|e| ValuationError::InvalidRequest(e.to_string()))?;
    if tickers.is_empty() {
        return Err(ValuationError::InvalidRequest("No tickers given".to_string()));
    }
    if tickers.len() > state.config.max_tickers {
        return Err(ValuationError::InvalidRequest(format!(
            "{} tickers requested, limit is {}",
            tickers.len(),
            state.config.max_tickers
        )));
    }
    Ok(tickers)
}

async fn get_valuation(
    State(state): State<AppState>,
    Query(query): Query<TickersQuery>,
) -> Result<Json<ApiResponse<DisplayGrid>>, AppError> {
    let tickers = resolve_tickers(&state, &query)?;
    let view = state.dashboard.render(&tickers).await;
    Ok(Json(ApiResponse::success(view.grid)))
}

async fn export_valuation(
    State(state): State<AppState>,
    Query(query): Query<TickersQuery>,
) -> Result<Response, AppError> {
    let tickers = resolve_tickers(&state, &query)?;
    let artifact = state.dashboard.export(&tickers, state.exporter.as_ref()).await?;

    tracing::info!("Exported {} bytes for {} tickers", artifact.bytes.len(), tickers.len());

    Ok((
        [
            (header::CONTENT_TYPE, artifact.mime_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", artifact.file_name),
            ),
        ],
        artifact.bytes,
    )
        .into_response())
}

async fn refresh_valuation(
    State(state): State<AppState>,
    Query(query): Query<TickersQuery>,
) -> Result<Json<ApiResponse<RefreshResponse>>, AppError> {
    let tickers = resolve_tickers(&state, &query)?;
    let invalidated = state.dashboard.refresh(&tickers);
    Ok(Json(ApiResponse::success(RefreshResponse { tickers, invalidated })))
}

async fn index(
    State(state): State<AppState>,
    Query(query): Query<TickersQuery>,
) -> Result<Html<String>, AppError> {
    let tickers = resolve_tickers(&state, &query)?;
    let view = state.dashboard.render(&tickers).await;

    let export_href = match &query.tickers {
        Some(_) => {
            let encoded: Vec<String> = tickers.iter().map(|t| urlencoding::encode(t).into_owned()).collect();
            format!("/api/valuation/export?tickers={}", encoded.join(","))
        }
        None => "/api/valuation/export".to_string(),
    };
    Ok(Html(html::render_page(&view.grid, &export_href)))
}
