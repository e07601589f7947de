//! Health endpoints. Each checks one dependency; there is no aggregate.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::AppState;
use super::error::ResultExt;
use crate::deadline::Deadline;
use crate::error::AuthError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/api", get(api))
        .route("/cache", get(cache))
        .route("/database", get(database))
}

#[derive(Debug, Serialize)]
pub struct Uptime {
    pub seconds: f64,
    pub minutes: f64,
    pub hours: f64,
    pub days: f64,
    pub weeks: f64,
}

impl Uptime {
    fn from_secs(seconds: f64) -> Self {
        let minutes = seconds / 60.0;
        let hours = minutes / 60.0;
        let days = hours / 24.0;
        Self {
            seconds,
            minutes,
            hours,
            days,
            weeks: days / 7.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiHealth {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime: Uptime,
}

#[derive(Debug, Serialize)]
pub struct DependencyHealth {
    pub status: &'static str,
}

async fn ping() -> Json<&'static str> {
    Json("pong")
}

async fn api(State(state): State<AppState>) -> Json<ApiHealth> {
    Json(ApiHealth {
        status: "OK",
        version: env!("CARGO_PKG_VERSION"),
        uptime: Uptime::from_secs(state.started_at.elapsed().as_secs_f64()),
    })
}

async fn cache(
    State(state): State<AppState>,
    deadline: Deadline,
) -> Result<Json<DependencyHealth>, AuthError> {
    match deadline.run(state.cache.ping()).await {
        Ok(Ok(())) => Ok(Json(DependencyHealth { status: "OK" })),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "cache health check failed");
            Err(AuthError::CacheUnavailable(e.to_string()))
        }
        Err(e) => {
            tracing::error!(error = %e, "cache health check timed out");
            Err(AuthError::CacheUnavailable(e.to_string()))
        }
    }
}

async fn database(
    State(state): State<AppState>,
    deadline: Deadline,
) -> Result<Json<DependencyHealth>, AuthError> {
    deadline
        .run(state.db.users().ping())
        .await
        .store_err("database health check failed")?;
    Ok(Json(DependencyHealth { status: "OK" }))
}
