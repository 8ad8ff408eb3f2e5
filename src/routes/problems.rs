// 题目接口
// 写操作会使该题单上所有进行中的挑战失效

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{parse_body, CurrentUser, SharedState, Success};
use crate::error::AppError;
use crate::models::{Difficulty, Problem};
use crate::services::{NewProblem, ProblemChanges};
use crate::utils::{nullable, parse_id};

fn parse_difficulty(raw: &str) -> Result<Difficulty, AppError> {
    raw.parse()
        .map_err(|_| AppError::validation("Difficulty must be easy, medium or hard"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProblemRequest {
    pub list_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub difficulty: Option<String>,
    pub tags: Option<Vec<String>>,
    pub external_url: Option<String>,
}

impl CreateProblemRequest {
    fn validate(self) -> Result<NewProblem, AppError> {
        let (Some(list_id), Some(title), Some(difficulty)) =
            (self.list_id, self.title, self.difficulty)
        else {
            return Err(AppError::validation("Missing required fields"));
        };

        NewProblem::new(
            list_id,
            &title,
            self.description.as_deref(),
            parse_difficulty(&difficulty)?,
            self.tags.unwrap_or_default(),
            self.external_url.as_deref(),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProblemRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub difficulty: Option<String>,
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub external_url: Option<Option<String>>,
    #[serde(alias = "order")]
    pub rank: Option<i64>,
}

impl UpdateProblemRequest {
    fn validate(self) -> Result<ProblemChanges, AppError> {
        ProblemChanges {
            title: self.title,
            description: self.description,
            difficulty: self.difficulty.as_deref().map(parse_difficulty).transpose()?,
            tags: self.tags,
            external_url: self.external_url,
            rank: self.rank,
        }
        .validate()
    }
}

pub async fn create_problem(
    State(state): State<SharedState>,
    requester: CurrentUser,
    body: Bytes,
) -> Result<(StatusCode, Json<Problem>), AppError> {
    let new_problem = parse_body::<CreateProblemRequest>(&body)?.validate()?;
    let problem = state.db.create_problem(requester.id(), new_problem)?;
    Ok((StatusCode::CREATED, Json(problem)))
}

pub async fn update_problem(
    State(state): State<SharedState>,
    requester: CurrentUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Problem>, AppError> {
    let problem_id = parse_id(&id, "problem")?;
    let changes = parse_body::<UpdateProblemRequest>(&body)?.validate()?;
    Ok(Json(state.db.update_problem(problem_id, requester.id(), changes)?))
}

pub async fn delete_problem(
    State(state): State<SharedState>,
    requester: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Success>, AppError> {
    let problem_id = parse_id(&id, "problem")?;
    state.db.delete_problem(problem_id, requester.id())?;
    Ok(Json(Success::ok()))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use serde_json::{json, Value};

    use super::super::test_support::TestApp;
    use super::*;

    struct Fixture {
        app: TestApp,
        owner: String,
        runner: String,
        list_id: i64,
        problem_ids: Vec<i64>,
    }

    async fn fixture() -> Fixture {
        let app = TestApp::new();
        let (_, owner) = app.login_as("owner");
        let (_, runner) = app.login_as("runner");

        let (_, list) = app
            .send(
                Method::POST,
                "/api/lists",
                Some(&owner),
                Some(json!({ "name": "Arrays", "isPublic": true })),
            )
            .await;
        let list_id = list["id"].as_i64().unwrap();

        let mut problem_ids = Vec::new();
        for title in ["P1", "P2", "P3"] {
            let (_, problem) = app
                .send(
                    Method::POST,
                    "/api/problems",
                    Some(&owner),
                    Some(json!({
                        "listId": list_id,
                        "title": title,
                        "difficulty": "medium",
                        "tags": ["array"],
                    })),
                )
                .await;
            problem_ids.push(problem["id"].as_i64().unwrap());
        }

        Fixture {
            app,
            owner,
            runner,
            list_id,
            problem_ids,
        }
    }

    async fn start(f: &Fixture) -> i64 {
        let (status, body) = f
            .app
            .send(
                Method::POST,
                "/api/speedruns",
                Some(&f.runner),
                Some(json!({ "listId": f.list_id })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_i64().unwrap()
    }

    async fn record(f: &Fixture, attempt_id: i64, problem_id: i64, seconds: i64) -> Value {
        let (status, body) = f
            .app
            .send(
                Method::PATCH,
                &format!("/api/speedruns/{attempt_id}"),
                Some(&f.runner),
                Some(json!({ "problemId": problem_id, "timeSeconds": seconds, "completed": true })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    #[tokio::test]
    async fn test_create_problem_appends_rank() {
        let f = fixture().await;
        let (_, list) = f
            .app
            .send(Method::GET, &format!("/api/lists/{}", f.list_id), None, None)
            .await;

        let ranks: Vec<i64> = list["problems"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["rank"].as_i64().unwrap())
            .collect();
        assert_eq!(ranks, vec![0, 1, 2]);
        assert_eq!(list["problems"][0]["difficulty"], "medium");
        assert_eq!(list["problems"][0]["tags"], json!(["array"]));
    }

    #[tokio::test]
    async fn test_create_problem_errors() {
        let f = fixture().await;

        let (status, body) = f
            .app
            .send(
                Method::POST,
                "/api/problems",
                Some(&f.owner),
                Some(json!({ "listId": f.list_id, "title": "No difficulty" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields");

        let (status, _) = f
            .app
            .send(
                Method::POST,
                "/api/problems",
                Some(&f.owner),
                Some(json!({ "listId": f.list_id, "title": "X", "difficulty": "extreme" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = f
            .app
            .send(
                Method::POST,
                "/api/problems",
                Some(&f.runner),
                Some(json!({ "listId": f.list_id, "title": "X", "difficulty": "easy" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = f
            .app
            .send(
                Method::POST,
                "/api/problems",
                Some(&f.owner),
                Some(json!({ "listId": 9999, "title": "X", "difficulty": "easy" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_problem_accepts_order_alias() {
        let f = fixture().await;
        let uri = format!("/api/problems/{}", f.problem_ids[0]);

        let (status, body) = f
            .app
            .send(
                Method::PATCH,
                &uri,
                Some(&f.owner),
                Some(json!({ "order": 7, "title": "Renamed", "externalUrl": null })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rank"], 7);
        assert_eq!(body["title"], "Renamed");

        let (status, _) = f
            .app
            .send(Method::PATCH, &uri, Some(&f.runner), Some(json!({ "rank": 1 })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = f
            .app
            .send(Method::PATCH, "/api/problems/x", Some(&f.owner), Some(json!({})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid problem ID");
    }

    #[tokio::test]
    async fn test_delete_problem_invalidates_in_progress_only() {
        let f = fixture().await;

        let finished = start(&f).await;
        for (i, problem_id) in f.problem_ids.iter().enumerate() {
            record(&f, finished, *problem_id, 10 + i as i64).await;
        }

        let running = start(&f).await;
        record(&f, running, f.problem_ids[0], 5).await;
        record(&f, running, f.problem_ids[1], 6).await;

        let (status, _) = f
            .app
            .send(
                Method::DELETE,
                &format!("/api/problems/{}", f.problem_ids[2]),
                Some(&f.owner),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = f
            .app
            .send(Method::GET, &format!("/api/speedruns/{running}"), Some(&f.runner), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = f
            .app
            .send(Method::GET, &format!("/api/speedruns/{finished}"), Some(&f.runner), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isCompleted"], true);
        assert_eq!(body["totalTimeSeconds"], 33);
        assert_eq!(body["problemsTotal"], 3);
    }

    #[tokio::test]
    async fn test_adding_problem_invalidates_in_progress() {
        let f = fixture().await;
        let running = start(&f).await;

        let (status, _) = f
            .app
            .send(
                Method::POST,
                "/api/problems",
                Some(&f.owner),
                Some(json!({ "listId": f.list_id, "title": "P4", "difficulty": "hard" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = f
            .app
            .send(Method::GET, &format!("/api/speedruns/{running}"), Some(&f.runner), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
