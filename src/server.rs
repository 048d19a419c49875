//! ==============================================================================
//! server.rs - hub rest api
//! ==============================================================================
//!
//! purpose:
//!     accepts measurements pushed by trackers and serves them back to the
//!     dashboard, raw or bucketed.
//!
//! routes:
//!     GET  /health              liveness, used by trackers as connectivity probe
//!     POST /api/steps           store one reading        -> 201 { id, message }
//!     GET  /api/steps           raw readings             -> { count, data }
//!     GET  /api/steps/summary   hourly buckets           -> { count, data }
//!     GET  /api/steps/chart     dashboard series         -> ChartSeries
//!
//! relationships:
//!     - uses: storage.rs (StepStore)
//!     - uses: aggregate.rs, chart.rs (bucketing)
//!     - called by: remote.rs (HttpSink, HealthProbe) on trackers
//!
//! ==============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;

use crate::aggregate::aggregate;
use crate::chart::{chart_series, ChartRange};
use crate::domain::{Measurement, DEFAULT_SUBJECT};
use crate::error::{ApiError, Issue};
use crate::storage::{StepQuery, StepStore};

/// largest page a single query may request
pub const MAX_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct HubState {
    pub store: Arc<StepStore>,
}

pub fn router(store: Arc<StepStore>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/steps", get(list_handler).post(create_handler))
        .route("/api/steps/summary", get(summary_handler))
        .route("/api/steps/chart", get(chart_handler))
        .layer(CorsLayer::permissive())
        .with_state(HubState { store })
}

/// serve the hub until the listener fails
pub async fn run_server(listener: tokio::net::TcpListener, store: Arc<StepStore>) -> anyhow::Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    tracing::info!("[HUB] ✓ listening on http://{}", addr);
    axum::serve(listener, router(store)).await?;
    Ok(())
}

// ==============================================================================
// handlers
// ==============================================================================

async fn health_handler() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now(),
    }))
}

async fn create_handler(
    State(hub): State<HubState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::Validation(vec![Issue::new("", e.body_text())]))?;
    let reading = parse_reading(&body)?;

    let record = hub.store.insert(&reading).await?;
    tracing::debug!(
        "[HUB] stored #{} {} steps for {} at {}",
        record.id,
        record.steps,
        record.user_id,
        record.taken_at
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": record.id,
            "message": "Step reading stored",
        })),
    ))
}

#[derive(Serialize)]
struct Listing<T> {
    count: usize,
    data: Vec<T>,
}

impl<T> From<Vec<T>> for Listing<T> {
    fn from(data: Vec<T>) -> Self {
        Self {
            count: data.len(),
            data,
        }
    }
}

/// raw query string; validated by hand so errors carry field paths
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuery {
    user_id: Option<String>,
    from: Option<String>,
    to: Option<String>,
    limit: Option<String>,
    range: Option<String>,
}

async fn list_handler(
    State(hub): State<HubState>,
    Query(raw): Query<RawQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let query = parse_query(&raw)?;
    let rows = hub.store.query(&query).await?;
    Ok(Json(Listing::from(rows)))
}

/// one hour of steps, labelled with its utc calendar position
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryBucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_steps: u64,
    pub hour: u32,
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

async fn summary_handler(
    State(hub): State<HubState>,
    Query(raw): Query<RawQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut query = parse_query(&raw)?;
    query.limit = None;

    let rows = hub.store.query(&query).await?;
    let measurements: Vec<Measurement> = rows.iter().map(|r| r.to_measurement()).collect();

    let summary: Vec<SummaryBucket> = aggregate(&measurements, Duration::hours(1), None)?
        .into_iter()
        .map(|b| SummaryBucket {
            hour: b.start.hour(),
            day: b.start.day(),
            month: b.start.month(),
            year: b.start.year(),
            start: b.start,
            end: b.end,
            total_steps: b.total,
        })
        .collect();

    Ok(Json(Listing::from(summary)))
}

async fn chart_handler(
    State(hub): State<HubState>,
    Query(raw): Query<RawQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let range = parse_range(raw.range.as_deref())?;
    let now = Utc::now();

    let query = StepQuery {
        user_id: parse_user_id(raw.user_id.as_deref()),
        from: Some(now - range.duration()),
        to: Some(now),
        limit: None,
    };
    let rows = hub.store.query(&query).await?;
    let measurements: Vec<Measurement> = rows.iter().map(|r| r.to_measurement()).collect();

    Ok(Json(chart_series(&measurements, range, now)?))
}

// ==============================================================================
// validation
// ==============================================================================

/// validate a pushed reading; `userId` falls back to the default subject
pub fn parse_reading(body: &Value) -> Result<Measurement, ApiError> {
    let mut issues = Vec::new();

    let Some(obj) = body.as_object() else {
        return Err(ApiError::Validation(vec![Issue::new("", "Expected object")]));
    };

    let subject_id = match obj.get("userId") {
        None | Some(Value::Null) => Some(DEFAULT_SUBJECT.to_string()),
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::String(_)) => {
            issues.push(Issue::new("userId", "userId is required"));
            None
        }
        Some(_) => {
            issues.push(Issue::new("userId", "Expected string"));
            None
        }
    };

    let count = match obj.get("steps") {
        None => {
            issues.push(Issue::new("steps", "Required"));
            None
        }
        Some(v) => match parse_step_count(v) {
            Ok(n) => Some(n),
            Err(msg) => {
                issues.push(Issue::new("steps", msg));
                None
            }
        },
    };

    let observed_at = match obj.get("takenAt") {
        None => {
            issues.push(Issue::new("takenAt", "Required"));
            None
        }
        Some(v) => match parse_instant(v) {
            Some(t) => Some(t),
            None => {
                issues.push(Issue::new("takenAt", "Invalid datetime"));
                None
            }
        },
    };

    match (subject_id, count, observed_at) {
        (Some(subject_id), Some(count), Some(observed_at)) if issues.is_empty() => {
            Ok(Measurement::new(subject_id, count, observed_at))
        }
        _ => Err(ApiError::Validation(issues)),
    }
}

fn parse_step_count(v: &Value) -> Result<u64, &'static str> {
    if let Some(n) = v.as_u64() {
        return Ok(n);
    }
    if let Some(n) = v.as_i64() {
        if n < 0 {
            return Err("Number must be greater than or equal to 0");
        }
    }
    match v.as_f64() {
        Some(f) if f < 0.0 => Err("Number must be greater than or equal to 0"),
        Some(f) if f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
        Some(_) => Err("Expected integer, received float"),
        None => Err("Expected number"),
    }
}

// strings are iso-8601, numbers are epoch milliseconds
fn parse_instant(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => parse_datetime(s),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn parse_user_id(raw: Option<&str>) -> String {
    match raw {
        Some(s) => s.trim().to_string(),
        None => DEFAULT_SUBJECT.to_string(),
    }
}

pub fn parse_query(raw: &RawQuery) -> Result<StepQuery, ApiError> {
    let mut issues = Vec::new();

    let mut bound = |name: &str, value: &Option<String>| match value {
        None => None,
        Some(s) => {
            let parsed = parse_datetime(s);
            if parsed.is_none() {
                issues.push(Issue::new(name, "Invalid datetime"));
            }
            parsed
        }
    };
    let from = bound("from", &raw.from);
    let to = bound("to", &raw.to);

    let limit = match raw.limit.as_deref().map(str::trim) {
        None => None,
        Some(s) => match s.parse::<f64>() {
            Ok(n) if !n.is_finite() => {
                issues.push(Issue::new("limit", "Expected number"));
                None
            }
            Ok(n) if n.fract() != 0.0 => {
                issues.push(Issue::new("limit", "Expected integer"));
                None
            }
            Ok(n) if n <= 0.0 => {
                issues.push(Issue::new("limit", "Number must be greater than 0"));
                None
            }
            Ok(n) if n > MAX_LIMIT as f64 => {
                issues.push(Issue::new("limit", "Number must be less than or equal to 1000"));
                None
            }
            Ok(n) => Some(n as usize),
            Err(_) => {
                issues.push(Issue::new("limit", "Expected number"));
                None
            }
        },
    };

    if !issues.is_empty() {
        return Err(ApiError::Validation(issues));
    }

    Ok(StepQuery {
        user_id: parse_user_id(raw.user_id.as_deref()),
        from,
        to,
        limit,
    })
}

fn parse_range(raw: Option<&str>) -> Result<ChartRange, ApiError> {
    match raw.map(str::trim) {
        None => Ok(ChartRange::default()),
        Some("1h") => Ok(ChartRange::LastHour),
        Some("6h") => Ok(ChartRange::LastSixHours),
        Some("1d") => Ok(ChartRange::LastDay),
        Some("7d") => Ok(ChartRange::LastWeek),
        Some(_) => Err(ApiError::Validation(vec![Issue::new(
            "range",
            "Expected one of 1h, 6h, 1d, 7d",
        )])),
    }
}
