// 题单接口

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{parse_body, CurrentUser, MaybeUser, SharedState, Success};
use crate::error::AppError;
use crate::models::{ListWithProblems, ProblemList};
use crate::services::{ListChanges, NewList};
use crate::utils::{nullable, parse_id};

// ==================== 请求 DTO ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
}

impl CreateListRequest {
    fn validate(self) -> Result<NewList, AppError> {
        let name = self
            .name
            .ok_or_else(|| AppError::validation("Name is required"))?;
        NewList::new(
            &name,
            self.description.as_deref(),
            self.is_public.unwrap_or(false),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateListRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub is_public: Option<bool>,
}

impl UpdateListRequest {
    fn validate(self) -> Result<ListChanges, AppError> {
        ListChanges::new(
            self.name.as_deref(),
            self.description.as_ref().map(|d| d.as_deref()),
            self.is_public,
        )
    }
}

// ==================== 处理函数 ====================

pub async fn list_lists(
    State(state): State<SharedState>,
    requester: MaybeUser,
) -> Result<Json<Vec<ProblemList>>, AppError> {
    Ok(Json(state.db.list_visible_lists(requester.id())?))
}

pub async fn create_list(
    State(state): State<SharedState>,
    requester: CurrentUser,
    body: Bytes,
) -> Result<(StatusCode, Json<ProblemList>), AppError> {
    let new_list = parse_body::<CreateListRequest>(&body)?.validate()?;
    let list = state.db.create_list(requester.id(), new_list)?;
    Ok((StatusCode::CREATED, Json(list)))
}

pub async fn get_list(
    State(state): State<SharedState>,
    requester: MaybeUser,
    Path(id): Path<String>,
) -> Result<Json<ListWithProblems>, AppError> {
    let list_id = parse_id(&id, "list")?;
    Ok(Json(state.db.get_list_with_problems(list_id, requester.id())?))
}

pub async fn update_list(
    State(state): State<SharedState>,
    requester: CurrentUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ProblemList>, AppError> {
    let list_id = parse_id(&id, "list")?;
    let changes = parse_body::<UpdateListRequest>(&body)?.validate()?;
    Ok(Json(state.db.update_list(list_id, requester.id(), changes)?))
}

pub async fn delete_list(
    State(state): State<SharedState>,
    requester: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Success>, AppError> {
    let list_id = parse_id(&id, "list")?;
    state.db.delete_list(list_id, requester.id())?;
    Ok(Json(Success::ok()))
}
