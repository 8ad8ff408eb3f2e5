// HTTP 路由模块
// 提供 JSON API，负责身份提取、请求体校验与错误到状态码的映射

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::AppError;
use crate::models::{Session, User, UserId};
use crate::services::SESSION_COOKIE_NAME;
use crate::state::AppState;

pub mod auth;
pub mod lists;
pub mod problems;
pub mod speedruns;

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/lists", get(lists::list_lists).post(lists::create_list))
        .route(
            "/api/lists/{id}",
            get(lists::get_list)
                .patch(lists::update_list)
                .delete(lists::delete_list),
        )
        .route("/api/problems", post(problems::create_problem))
        .route(
            "/api/problems/{id}",
            patch(problems::update_problem).delete(problems::delete_problem),
        )
        .route(
            "/api/speedruns",
            get(speedruns::list_speedruns).post(speedruns::start_speedrun),
        )
        .route("/api/speedruns/best", get(speedruns::best_times))
        .route(
            "/api/speedruns/{id}",
            get(speedruns::get_speedrun)
                .patch(speedruns::record_timing)
                .delete(speedruns::delete_speedrun),
        )
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .layer(middleware::from_fn_with_state(state.clone(), session_layer))
        .with_state(state)
}

/// 已登录的会话
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub session: Session,
}

/// 可选身份：没有或无效的 cookie 都视为匿名
pub struct MaybeUser(pub Option<AuthSession>);

impl MaybeUser {
    pub fn id(&self) -> Option<&UserId> {
        self.0.as_ref().map(|auth| &auth.user.id)
    }
}

/// 必须登录，否则 401
pub struct CurrentUser(pub AuthSession);

impl CurrentUser {
    pub fn id(&self) -> Option<&UserId> {
        Some(&self.0.user.id)
    }
}

impl FromRequestParts<SharedState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<AuthSession>().cloned()))
    }
}

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let MaybeUser(auth) = MaybeUser::from_request_parts(parts, state).await?;
        auth.map(CurrentUser).ok_or(AppError::Unauthenticated)
    }
}

/// 会话中间件：校验 cookie 并把会话放进请求扩展；
/// 响应时续发有效会话的 cookie（带最新过期时间），清除无效的 cookie。
/// 处理函数自己设置了 cookie（登录、登出）时不覆盖。
async fn session_layer(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = session_token(request.headers());
    let auth = match &token {
        Some(token) => state
            .db
            .validate_session_token(token, state.session_lifetime())?
            .map(|(user, session)| AuthSession { user, session }),
        None => None,
    };

    let secure = state.config.secure_cookies;
    let cookie = match (&token, &auth) {
        (Some(token), Some(auth)) => Some(session_cookie(token, auth.session.expires_at, secure)),
        (Some(_), None) => Some(cleared_session_cookie(secure)),
        (None, _) => None,
    };

    if let Some(auth) = auth {
        request.extensions_mut().insert(auth);
    }

    let mut response = next.run(request).await;

    if let Some(cookie) = cookie {
        if !response.headers().contains_key(header::SET_COOKIE) {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|e| AppError::Internal(format!("session cookie header: {e}")))?;
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }

    Ok(response)
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.to_string())
}

pub(crate) fn session_cookie(token: &str, expires_at: DateTime<Utc>, secure: bool) -> String {
    format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Expires={}{}",
        expires_at.format("%a, %d %b %Y %H:%M:%S GMT"),
        if secure { "; Secure" } else { "" }
    )
}

pub(crate) fn cleared_session_cookie(secure: bool) -> String {
    format!(
        "{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
        if secure { "; Secure" } else { "" }
    )
}

/// 解析 JSON 请求体，格式错误统一为 400
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    if body.is_empty() {
        return Err(AppError::validation("Request body is required"));
    }

    serde_json::from_slice(body)
        .map_err(|e| AppError::validation(format!("Invalid request body: {e}")))
}

#[derive(Debug, Serialize)]
pub struct Success {
    pub success: bool,
}

impl Success {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::services::DatabaseService;

    pub struct TestApp {
        pub router: Router,
        pub state: SharedState,
    }

    impl TestApp {
        pub fn new() -> Self {
            let db = DatabaseService::open_in_memory().unwrap();
            let state = AppState::with_database(db, Config::default());
            Self {
                router: router(state.clone()),
                state,
            }
        }

        /// 直接建用户和会话，返回 Cookie 请求头的值
        pub fn login_as(&self, username: &str) -> (UserId, String) {
            let user = self.state.db.create_user(username, "unused-hash").unwrap();
            let session = self
                .state
                .db
                .create_session(&user.id, self.state.session_lifetime())
                .unwrap();
            (user.id, format!("{SESSION_COOKIE_NAME}={}", session.token))
        }

        pub async fn send(
            &self,
            method: Method,
            uri: &str,
            cookie: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let (status, _, json) = self.send_raw(method, uri, cookie, body).await;
            (status, json)
        }

        pub async fn send_raw(
            &self,
            method: Method,
            uri: &str,
            cookie: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, axum::http::HeaderMap, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(cookie) = cookie {
                request = request.header(header::COOKIE, cookie);
            }
            let request = match body {
                Some(body) => request
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => request.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, headers, json)
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, Method, StatusCode};
    use serde_json::json;

    use super::test_support::TestApp;
    use super::*;
    use crate::services::auth::session_id_for;

    #[test]
    fn test_session_token_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; auth-session=abc123; other=1"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));

        let empty = HeaderMap::new();
        assert_eq!(session_token(&empty), None);
    }

    #[test]
    fn test_session_cookie_format() {
        let expires = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let cookie = session_cookie("tok", expires, true);
        assert_eq!(
            cookie,
            "auth-session=tok; Path=/; HttpOnly; SameSite=Lax; Expires=Fri, 02 Jan 2026 03:04:05 GMT; Secure"
        );
        assert!(cleared_session_cookie(false).contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_invalid_cookie_is_anonymous() {
        let app = TestApp::new();
        let (status, body) = app
            .send(Method::GET, "/api/lists", Some("auth-session=bogus"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (status, body) = app
            .send(Method::GET, "/api/speedruns", Some("auth-session=bogus"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Unauthorized" }));
    }

    #[tokio::test]
    async fn test_rejected_cookie_is_cleared() {
        let app = TestApp::new();
        let (_, headers, _) = app
            .send_raw(Method::GET, "/api/lists", Some("auth-session=bogus"), None)
            .await;
        let set_cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.starts_with("auth-session=;"));
        assert!(set_cookie.contains("Max-Age=0"));

        let (_, headers, _) = app.send_raw(Method::GET, "/api/lists", None, None).await;
        assert!(headers.get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_renewed_session_cookie_is_resent() {
        let app = TestApp::new();
        let (_, cookie) = app.login_as("alice");
        let token = cookie.trim_start_matches("auth-session=").to_string();
        let session_id = session_id_for(&token);

        let soon = Utc::now() + chrono::Duration::days(1);
        app.state
            .db
            .transaction(|conn| {
                conn.execute(
                    "UPDATE sessions SET expires_at = ?1 WHERE id = ?2",
                    rusqlite::params![soon, session_id],
                )?;
                Ok(())
            })
            .unwrap();

        let (status, headers, _) = app
            .send_raw(Method::GET, "/api/auth/me", Some(&cookie), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let renewed: DateTime<Utc> = app
            .state
            .db
            .read(|conn| {
                Ok(conn.query_row(
                    "SELECT expires_at FROM sessions WHERE id = ?1",
                    [&session_id],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert!(renewed > soon + chrono::Duration::days(20));

        let set_cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert_eq!(set_cookie, session_cookie(&token, renewed, false));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let app = TestApp::new();
        let (_, cookie) = app.login_as("alice");

        let (status, body) = app
            .send(
                Method::POST,
                "/api/lists",
                Some(&cookie),
                Some(json!({ "name": 42 })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));

        let (status, _) = app.send(Method::POST, "/api/lists", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
