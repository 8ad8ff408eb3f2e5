// 计时挑战接口
// 所有接口都需要登录，且只能访问自己的挑战记录

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{parse_body, CurrentUser, SharedState, Success};
use crate::error::AppError;
use crate::models::SpeedrunAttempt;
use crate::services::TimingUpdate;
use crate::utils::parse_id;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedrunQuery {
    pub list_id: Option<String>,
}

impl SpeedrunQuery {
    /// 无法解析的 listId 视为未过滤
    fn list_filter(&self) -> Option<i64> {
        self.list_id.as_deref().and_then(|raw| raw.trim().parse().ok())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSpeedrunRequest {
    pub list_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTimingRequest {
    pub problem_id: Option<i64>,
    pub time_seconds: Option<i64>,
    pub completed: Option<bool>,
}

impl From<RecordTimingRequest> for TimingUpdate {
    fn from(request: RecordTimingRequest) -> Self {
        Self {
            problem_id: request.problem_id,
            time_seconds: request.time_seconds,
            completed: request.completed,
        }
    }
}

pub async fn list_speedruns(
    State(state): State<SharedState>,
    requester: CurrentUser,
    Query(query): Query<SpeedrunQuery>,
) -> Result<Json<Vec<SpeedrunAttempt>>, AppError> {
    Ok(Json(
        state
            .db
            .list_attempts(requester.id(), query.list_filter())?,
    ))
}

pub async fn start_speedrun(
    State(state): State<SharedState>,
    requester: CurrentUser,
    body: Bytes,
) -> Result<(StatusCode, Json<SpeedrunAttempt>), AppError> {
    let request = parse_body::<StartSpeedrunRequest>(&body)?;
    let list_id = request
        .list_id
        .ok_or_else(|| AppError::validation("List ID is required"))?;

    let attempt = state.db.start_attempt(requester.id(), list_id)?;
    Ok((StatusCode::CREATED, Json(attempt)))
}

pub async fn get_speedrun(
    State(state): State<SharedState>,
    requester: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<SpeedrunAttempt>, AppError> {
    let attempt_id = parse_id(&id, "attempt")?;
    Ok(Json(state.db.get_attempt(attempt_id, requester.id())?))
}

pub async fn record_timing(
    State(state): State<SharedState>,
    requester: CurrentUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<SpeedrunAttempt>, AppError> {
    let attempt_id = parse_id(&id, "attempt")?;
    let request = parse_body::<RecordTimingRequest>(&body)?;
    Ok(Json(state.db.record_timing(attempt_id, requester.id(), request)?))
}

pub async fn delete_speedrun(
    State(state): State<SharedState>,
    requester: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Success>, AppError> {
    let attempt_id = parse_id(&id, "attempt")?;
    state.db.delete_attempt(attempt_id, requester.id())?;
    Ok(Json(Success::ok()))
}

/// 每个题单的最佳成绩，键为题单 id
pub async fn best_times(
    State(state): State<SharedState>,
    requester: CurrentUser,
) -> Result<Json<BTreeMap<i64, i64>>, AppError> {
    Ok(Json(state.db.best_times(requester.id())?))
}
