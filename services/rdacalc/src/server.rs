//! HTTP API for effective service ceiling lookups.
//!
//! Endpoints:
//! - `GET /api/ceiling?da=&lat=&lon=&unit=&geopotential=` resolve against
//!   the most recent model run
//! - `GET /health`
//! - `GET /metrics` Prometheus exposition

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use density_altitude::{AltitudeUnit, DaQuery, DaReport, HeightKind, IsobaricFields};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::cache;
use crate::config::{IssueTime, ModelProduct};
use crate::download::DownloadManager;
use crate::model::load_fields;

/// Morey Airport, Middleton WI.
pub const DEFAULT_LAT: f64 = 43.113381;
pub const DEFAULT_LON: f64 = -89.528386;
/// Approximate service ceiling of a fully loaded C172E, in feet.
pub const DEFAULT_DA_FT: f64 = 14000.0;

// ============================================================================
// Shared State
// ============================================================================

/// Fields of one decoded model file.
pub struct LoadedModel {
    pub path: PathBuf,
    pub issue: Option<IssueTime>,
    pub fields: IsobaricFields,
}

pub struct AppState {
    product: ModelProduct,
    fh: u32,
    data_dir: PathBuf,
    downloader: DownloadManager,
    /// Read by every request, written only by the refresher.
    model: RwLock<Option<Arc<LoadedModel>>>,
    prometheus: PrometheusHandle,
}

impl AppState {
    pub fn new(
        product: ModelProduct,
        fh: u32,
        data_dir: PathBuf,
        downloader: DownloadManager,
        prometheus: PrometheusHandle,
    ) -> Self {
        Self {
            product,
            fh,
            data_dir,
            downloader,
            model: RwLock::new(None),
            prometheus,
        }
    }

    pub async fn current(&self) -> Option<Arc<LoadedModel>> {
        self.model.read().await.clone()
    }

    pub async fn install(&self, model: LoadedModel) {
        if let Some(issue) = model.issue {
            gauge!("rdacalc_model_issue_timestamp_seconds").set(issue.datetime().timestamp() as f64);
        }
        *self.model.write().await = Some(Arc::new(model));
    }

    /// Rotate the data directory to the run current at `now` and reload if
    /// the file changed. Returns whether a new model was installed.
    pub async fn refresh(&self, now: DateTime<Utc>) -> Result<bool> {
        let issue = IssueTime::latest(now);
        let expected = self
            .data_dir
            .join(self.product.local_file_name(issue, self.fh)?);

        if let Some(current) = self.current().await {
            if current.path == expected {
                debug!(issue = %issue, "Model already current");
                return Ok(false);
            }
        }

        let path = cache::rotate(&self.downloader, &self.data_dir, &self.product, issue, self.fh).await?;
        let fields = load_fields(&path).await?;
        info!(
            product = %self.product.id,
            issue = %issue,
            path = %path.display(),
            "Installed model run"
        );
        self.install(LoadedModel {
            path,
            issue: Some(issue),
            fields,
        })
        .await;
        Ok(true)
    }
}

/// Refresh the model on a fixed period until the process exits.
pub async fn refresh_loop(state: Arc<AppState>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        if let Err(e) = state.refresh(Utc::now()).await {
            counter!("rdacalc_refresh_failures_total").increment(1);
            warn!(error = %format!("{:#}", e), "Model refresh failed, keeping previous run");
        }
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CeilingQuery {
    pub da: Option<f64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub unit: Option<String>,
    #[serde(default)]
    pub geopotential: bool,
}

impl CeilingQuery {
    fn to_query(&self) -> Result<DaQuery, String> {
        let unit: AltitudeUnit = match &self.unit {
            Some(u) => u.parse().map_err(|e| format!("{}", e))?,
            None => AltitudeUnit::Ft,
        };
        let da = self.da.unwrap_or_else(|| unit.km_to_unit(AltitudeUnit::Ft.unit_to_km(DEFAULT_DA_FT)));
        let lat = self.lat.unwrap_or(DEFAULT_LAT);
        let lon = self.lon.unwrap_or(DEFAULT_LON);

        if !da.is_finite() {
            return Err("da must be a finite number".to_string());
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(format!("lat {} outside -90..90", lat));
        }
        if !lon.is_finite() {
            return Err("lon must be a finite number".to_string());
        }

        let query = DaQuery::new(da, lat, lon, unit);
        Ok(if self.geopotential {
            query.with_height_kind(HeightKind::Geopotential)
        } else {
            query
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CeilingResponse {
    pub model: String,
    pub issue_time: Option<IssueTime>,
    #[serde(flatten)]
    pub report: DaReport,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ceiling", get(ceiling_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/ceiling
pub async fn ceiling_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<CeilingQuery>,
) -> Response {
    let started = Instant::now();
    let response = ceiling(&state, &params).await;

    histogram!("rdacalc_lookup_duration_seconds").record(started.elapsed().as_secs_f64());
    counter!("rdacalc_requests_total", "status" => response.status().as_u16().to_string()).increment(1);
    response
}

async fn ceiling(state: &AppState, params: &CeilingQuery) -> Response {
    let query = match params.to_query() {
        Ok(query) => query,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let Some(model) = state.current().await else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "model data not loaded yet");
    };

    let lookup_model = model.clone();
    let result = tokio::task::spawn_blocking(move || query.evaluate(&lookup_model.fields)).await;

    match result {
        Ok(Ok(report)) => Json(CeilingResponse {
            model: state.product.id.clone(),
            issue_time: model.issue,
            report,
        })
        .into_response(),
        Ok(Err(e)) if e.is_out_of_range() => error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        Ok(Err(e)) => {
            warn!(error = %e, "Lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("lookup task failed: {}", e)),
    }
}

/// GET /health
async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let model = state.current().await;
    Json(serde_json::json!({
        "status": "ok",
        "service": "rdacalc",
        "model": state.product.id,
        "model_loaded": model.is_some(),
        "model_file": model.as_ref().map(|m| m.path.display().to_string()),
    }))
}

/// GET /metrics
async fn metrics_handler(Extension(state): Extension<Arc<AppState>>) -> String {
    state.prometheus.render()
}

pub async fn run_server(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting ceiling API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
        })
        .await?;

    Ok(())
}
