use crate::cache::FigureCache;
use crate::config::AppConfig;
use crate::data::Dataset;
use crate::error::{DataIntegrityError, RenderError};
use crate::metrics::{Metric, MetricKind};
use crate::render::{build_figure, Selection, View};
use crate::spatial::BoundaryIndex;
use crate::types::{Constituency, ElectionRecord};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const INDEX_HTML: &str = include_str!("../assets/index.html");

pub struct AppState {
    pub dataset: Dataset,
    pub config: AppConfig,
    pub cache: FigureCache,
    pub index: BoundaryIndex,
}

impl AppState {
    /// Loads and validates the dataset, then pre-renders figures if enabled.
    pub fn from_config(config: AppConfig) -> Result<Self, DataIntegrityError> {
        let dataset = Dataset::load(&config.input)?;

        let cache = if config.server.prerender {
            let cache = FigureCache::prerender(&dataset, &config.figures);
            if cache.is_empty() {
                warn!("No figures could be pre-rendered, every request will be built on demand");
            }
            cache
        } else {
            FigureCache::default()
        };

        info!("Building spatial index...");
        let index = BoundaryIndex::build(&dataset);

        Ok(Self {
            dataset,
            config,
            cache,
            index,
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let assets = ServeDir::new(&state.config.server.assets_dir);

    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(health_handler))
        .route("/api/options", get(options_handler))
        .route("/api/figure", get(figure_handler))
        .route("/api/constituencies/:id/:year", get(record_handler))
        .route("/api/locate", get(locate_handler))
        .route("/api/boundaries", get(boundaries_handler))
        .nest_service("/assets", assets)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Loads everything before binding, so a bad dataset never opens the port.
pub async fn start_server(config: AppConfig) -> Result<()> {
    let state = AppState::from_config(config).context("Dataset failed validation")?;
    serve(state).await
}

pub async fn serve(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Starting server on http://{}", addr);

    axum::serve(listener, build_router(Arc::new(state)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    wait_for_shutdown(tokio::signal::ctrl_c()).await
}

async fn wait_for_shutdown(signal: impl std::future::Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        // Without a handler the server runs until killed
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// A rejected selection, reported to the page as `{"error": "..."}`.
pub struct ApiError(RenderError);

impl From<RenderError> for ApiError {
    fn from(e: RenderError) -> Self {
        ApiError(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::BAD_REQUEST
        };
        debug!(error = %self.0, "Rejected selection");
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health_handler() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct MetricOption {
    id: Metric,
    title: &'static str,
    legend_label: &'static str,
    kind: MetricKind,
    views: Vec<View>,
}

#[derive(Serialize)]
struct OptionsResponse {
    metrics: Vec<MetricOption>,
    years: Vec<u16>,
    default_year: Option<u16>,
    constituencies: Vec<Constituency>,
}

async fn options_handler(State(state): State<Arc<AppState>>) -> Json<OptionsResponse> {
    let metrics = Metric::ALL
        .iter()
        .map(|&metric| MetricOption {
            id: metric,
            title: metric.title(),
            legend_label: metric.legend_label(),
            kind: metric.kind(),
            views: View::ALL
                .iter()
                .copied()
                .filter(|v| v.supports(metric.kind()))
                .collect(),
        })
        .collect();

    Json(OptionsResponse {
        metrics,
        years: state.dataset.years().iter().copied().collect(),
        default_year: state.dataset.latest_year(),
        constituencies: state.dataset.constituencies().cloned().collect(),
    })
}

#[derive(Debug, Deserialize)]
pub struct FigureParams {
    metric: Option<String>,
    view: Option<String>,
    year: Option<String>,
    /// Comma separated constituency ids.
    constituencies: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_year(raw: &str) -> Result<u16, RenderError> {
    raw.trim().parse().map_err(|_| RenderError::InvalidYearValue {
        value: raw.to_string(),
    })
}

fn parse_coordinate(name: &str, value: &Option<String>) -> Result<f64, RenderError> {
    let raw = non_empty(value).ok_or_else(|| RenderError::MissingParameter {
        name: name.to_string(),
    })?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RenderError::InvalidCoordinate {
            name: name.to_string(),
            value: raw.to_string(),
        })
}

impl FigureParams {
    fn into_selection(self) -> Result<Selection, RenderError> {
        let metric: Metric = non_empty(&self.metric)
            .ok_or_else(|| RenderError::MissingParameter {
                name: "metric".to_string(),
            })?
            .parse()?;
        let view: View = non_empty(&self.view).unwrap_or("map").parse()?;
        let year = non_empty(&self.year).map(parse_year).transpose()?;
        let constituencies = non_empty(&self.constituencies)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Selection::new(view, metric, year, constituencies))
    }
}

fn json_bytes(bytes: Bytes) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], bytes).into_response()
}

async fn figure_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FigureParams>,
) -> Result<Response, ApiError> {
    let selection = params.into_selection()?;

    if let Some(bytes) = state.cache.get(&selection) {
        debug!(view = %selection.view, metric = %selection.metric, "Serving pre-rendered figure");
        return Ok(json_bytes(bytes));
    }

    let figure = build_figure(&state.dataset, &state.config.figures, &selection)?;
    Ok(Json(figure).into_response())
}

async fn boundaries_handler(State(state): State<Arc<AppState>>) -> Json<Arc<serde_json::Value>> {
    Json(state.dataset.geojson().clone())
}

#[derive(Serialize)]
struct RecordResponse {
    constituency: Constituency,
    record: ElectionRecord,
}

async fn record_handler(
    State(state): State<Arc<AppState>>,
    Path((id, year)): Path<(String, String)>,
) -> Result<Json<RecordResponse>, ApiError> {
    let year = parse_year(&year)?;
    let record = state.dataset.records_for(&id, year)?.clone();
    let constituency = state
        .dataset
        .constituency(&id)
        .cloned()
        .ok_or(RenderError::UnknownConstituency { id })?;
    Ok(Json(RecordResponse {
        constituency,
        record,
    }))
}

// Kept as text so bad values get the same JSON error body as figures.
#[derive(Deserialize)]
pub struct LocateParams {
    lat: Option<String>,
    lon: Option<String>,
    year: Option<String>,
}

#[derive(Serialize)]
pub struct LocateResponse {
    constituency: Constituency,
    year: u16,
    record: Option<ElectionRecord>,
}

async fn locate_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LocateParams>,
) -> Result<Json<Option<LocateResponse>>, ApiError> {
    let dataset = &state.dataset;
    let lat = parse_coordinate("lat", &params.lat)?;
    let lon = parse_coordinate("lon", &params.lon)?;
    let year = match non_empty(&params.year).map(parse_year).transpose()? {
        Some(year) if !dataset.has_year(year) => return Err(RenderError::UnknownYear { year }.into()),
        Some(year) => year,
        None => match dataset.latest_year() {
            Some(year) => year,
            None => return Ok(Json(None)),
        },
    };

    let found = state
        .index
        .locate(dataset, lat, lon)
        .and_then(|boundary| dataset.constituency(&boundary.id))
        .map(|constituency| LocateResponse {
            constituency: constituency.clone(),
            year,
            record: dataset.records_for(&constituency.id, year).ok().cloned(),
        });

    Ok(Json(found))
}
