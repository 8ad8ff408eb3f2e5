// 账号接口：注册、登录、登出、当前用户

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use super::{cleared_session_cookie, parse_body, session_cookie, CurrentUser, SharedState, Success};
use crate::error::AppError;
use crate::models::User;
use crate::services::{Credentials, IssuedSession, Registration};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
}

impl RegisterRequest {
    fn into_registration(self) -> Result<Registration, AppError> {
        match (self.username, self.password, self.confirm_password) {
            (Some(username), Some(password), Some(confirm_password)) => Ok(Registration {
                credentials: Credentials { username, password },
                confirm_password,
            }),
            _ => Err(AppError::validation("All fields are required")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    fn into_credentials(self) -> Result<Credentials, AppError> {
        match (self.username, self.password) {
            (Some(username), Some(password)) => Ok(Credentials { username, password }),
            _ => Err(AppError::validation("Username and password are required")),
        }
    }
}

/// 哈希计算耗时，放到阻塞线程池执行
async fn blocking<T, F>(task: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {e}")))?
}

fn with_session_cookie(
    state: &SharedState,
    status: StatusCode,
    user: User,
    session: &IssuedSession,
) -> impl IntoResponse {
    let cookie = session_cookie(
        &session.token,
        session.expires_at,
        state.config.secure_cookies,
    );
    (status, [(header::SET_COOKIE, cookie)], Json(user))
}

pub async fn register(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let registration = parse_body::<RegisterRequest>(&body)?.into_registration()?;
    let lifetime = state.session_lifetime();

    let db = state.db.clone();
    let (user, session) = blocking(move || db.register(&registration, lifetime)).await?;

    Ok(with_session_cookie(&state, StatusCode::CREATED, user, &session))
}

pub async fn login(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let credentials = parse_body::<LoginRequest>(&body)?.into_credentials()?;
    let lifetime = state.session_lifetime();

    let db = state.db.clone();
    let (user, session) = blocking(move || db.login(&credentials, lifetime)).await?;

    log::info!("user {} logged in", user.username);
    Ok(with_session_cookie(&state, StatusCode::OK, user, &session))
}

pub async fn logout(
    State(state): State<SharedState>,
    CurrentUser(auth): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    state.db.invalidate_session(&auth.session.id)?;

    let cookie = cleared_session_cookie(state.config.secure_cookies);
    Ok(([(header::SET_COOKIE, cookie)], Json(Success::ok())))
}

pub async fn me(CurrentUser(auth): CurrentUser) -> Json<User> {
    Json(auth.user)
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, Method};
    use serde_json::json;

    use super::super::test_support::TestApp;
    use super::*;

    fn cookie_pair(headers: &HeaderMap) -> String {
        let set_cookie = headers
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_register_login_logout_flow() {
        let app = TestApp::new();

        let (status, headers, body) = app
            .send_raw(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "username": "speedy",
                    "password": "hunter22",
                    "confirmPassword": "hunter22",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["username"], "speedy");
        let set_cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Lax"));
        let cookie = cookie_pair(&headers);

        let (status, me) = app.send(Method::GET, "/api/auth/me", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["id"], body["id"]);

        let (status, headers, body) = app
            .send_raw(Method::POST, "/api/auth/logout", Some(&cookie), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));
        assert!(headers
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));

        let (status, _) = app.send(Method::GET, "/api/auth/me", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, headers, _) = app
            .send_raw(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "username": "speedy", "password": "hunter22" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let cookie = cookie_pair(&headers);
        let (status, _) = app.send(Method::GET, "/api/auth/me", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_auth_validation_errors() {
        let app = TestApp::new();
        app.login_as("taken");

        let (status, body) = app
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "username": "taken", "password": "secret1", "confirmPassword": "secret1" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Username already taken");

        let (status, body) = app
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "username": "newbie", "password": "secret1", "confirmPassword": "secret2" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Passwords do not match");

        let (status, body) = app
            .send(Method::POST, "/api/auth/register", None, Some(json!({ "username": "x" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "All fields are required");

        let (status, body) = app
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "username": "ghost", "password": "whatever" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid username or password");

        let (status, _) = app.send(Method::POST, "/api/auth/logout", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
