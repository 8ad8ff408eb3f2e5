//! 账号与会话服务
//!
//! 密码使用 argon2id 哈希；会话 token 为 20 字节随机数的 URL-safe base64，
//! 数据库只保存 token 的 SHA-256 十六进制摘要作为会话 id。

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::database::DatabaseService;
use crate::error::AppError;
use crate::models::{Session, User, UserId};

pub const SESSION_COOKIE_NAME: &str = "auth-session";

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 31;
const PASSWORD_MIN: usize = 6;
const PASSWORD_MAX: usize = 255;

const INVALID_LOGIN: &str = "Invalid username or password";

/// 新签发的会话，token 只在此处以明文出现
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn validate(&self) -> Result<(), AppError> {
        let username_len = self.username.chars().count();
        if !(USERNAME_MIN..=USERNAME_MAX).contains(&username_len) {
            return Err(AppError::validation(format!(
                "Username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
            )));
        }

        let password_len = self.password.chars().count();
        if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&password_len) {
            return Err(AppError::validation(format!(
                "Password must be between {PASSWORD_MIN} and {PASSWORD_MAX} characters"
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub credentials: Credentials,
    pub confirm_password: String,
}

impl Registration {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.credentials.password != self.confirm_password {
            return Err(AppError::validation("Passwords do not match"));
        }
        self.credentials.validate()
    }
}

fn hasher() -> Result<Argon2<'static>, AppError> {
    let params = Params::new(19456, 2, 1, Some(32))
        .map_err(|e| AppError::Internal(format!("argon2 params: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Internal(format!("salt encode: {e}")))?;

    let hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("password hash: {e}")))?;

    Ok(hash.to_string())
}

pub fn verify_password(stored_hash: &str, password: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AppError::Internal(format!("stored password hash: {e}")))?;

    Ok(hasher()?
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub fn generate_session_token() -> String {
    let bytes: [u8; 20] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn session_id_for(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

impl DatabaseService {
    // ==================== 用户 ====================

    /// 直接写入用户记录，调用方负责哈希密码
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<User, AppError> {
        self.transaction(|conn| insert_user(conn, username, password_hash))
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.read(|conn| Ok(find_user_with_hash(conn, username)?.map(|(user, _)| user)))
    }

    /// 注册并签发会话
    pub fn register(
        &self,
        registration: &Registration,
        lifetime: Duration,
    ) -> Result<(User, IssuedSession), AppError> {
        registration.validate()?;
        let username = registration.credentials.username.as_str();

        if self.find_user_by_username(username)?.is_some() {
            return Err(AppError::validation("Username already taken"));
        }

        // 哈希较慢，不在持锁期间计算
        let password_hash = hash_password(&registration.credentials.password)?;

        let (user, session) = self.transaction(|conn| {
            let user = insert_user(conn, username, &password_hash)?;
            let session = insert_session(conn, &user.id, lifetime)?;
            Ok((user, session))
        })?;

        log::info!("registered user {} ({})", user.username, user.id);
        Ok((user, session))
    }

    /// 校验用户名密码并签发会话
    pub fn login(
        &self,
        credentials: &Credentials,
        lifetime: Duration,
    ) -> Result<(User, IssuedSession), AppError> {
        credentials.validate()?;

        let found = self.read(|conn| find_user_with_hash(conn, &credentials.username))?;
        let Some((user, password_hash)) = found else {
            log::warn!("login failed: unknown user {}", credentials.username);
            return Err(AppError::validation(INVALID_LOGIN));
        };

        if !verify_password(&password_hash, &credentials.password)? {
            log::warn!("login failed: bad password for {}", credentials.username);
            return Err(AppError::validation(INVALID_LOGIN));
        }

        let session = self.create_session(&user.id, lifetime)?;
        Ok((user, session))
    }

    // ==================== 会话 ====================

    pub fn create_session(
        &self,
        user_id: &UserId,
        lifetime: Duration,
    ) -> Result<IssuedSession, AppError> {
        self.transaction(|conn| insert_session(conn, user_id, lifetime))
    }

    /// 校验 token：过期则删除；剩余有效期不足一半时顺延
    pub fn validate_session_token(
        &self,
        token: &str,
        lifetime: Duration,
    ) -> Result<Option<(User, Session)>, AppError> {
        let session_id = session_id_for(token);
        let now = Utc::now();

        self.transaction(|conn| {
            let found = conn
                .query_row(
                    "SELECT s.id, s.user_id, s.expires_at, u.username, u.created_at
                     FROM sessions s JOIN users u ON u.id = s.user_id
                     WHERE s.id = ?1",
                    [&session_id],
                    |row| {
                        let user_id = UserId(row.get(1)?);
                        Ok((
                            Session {
                                id: row.get(0)?,
                                user_id: user_id.clone(),
                                expires_at: row.get(2)?,
                            },
                            User {
                                id: user_id,
                                username: row.get(3)?,
                                created_at: row.get(4)?,
                            },
                        ))
                    },
                )
                .optional()?;

            let Some((mut session, user)) = found else {
                return Ok(None);
            };

            if now >= session.expires_at {
                conn.execute("DELETE FROM sessions WHERE id = ?1", [&session.id])?;
                return Ok(None);
            }

            if now >= session.expires_at - lifetime / 2 {
                session.expires_at = now + lifetime;
                conn.execute(
                    "UPDATE sessions SET expires_at = ?1 WHERE id = ?2",
                    rusqlite::params![session.expires_at, session.id],
                )?;
            }

            Ok(Some((user, session)))
        })
    }

    pub fn invalidate_session(&self, session_id: &str) -> Result<(), AppError> {
        self.transaction(|conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", [session_id])?;
            Ok(())
        })
    }
}

fn insert_user(conn: &Connection, username: &str, password_hash: &str) -> Result<User, AppError> {
    let user = User {
        id: UserId(Uuid::new_v4().to_string()),
        username: username.to_string(),
        created_at: Utc::now(),
    };

    conn.execute(
        "INSERT INTO users (id, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![user.id.as_str(), user.username, password_hash, user.created_at],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref err, _) if err.code == ErrorCode::ConstraintViolation => {
            AppError::Conflict("Username already taken".to_string())
        }
        other => AppError::Database(other),
    })?;

    Ok(user)
}

fn find_user_with_hash(
    conn: &Connection,
    username: &str,
) -> Result<Option<(User, String)>, AppError> {
    Ok(conn
        .query_row(
            "SELECT id, username, created_at, password_hash FROM users WHERE username = ?1",
            [username],
            |row| {
                Ok((
                    User {
                        id: UserId(row.get(0)?),
                        username: row.get(1)?,
                        created_at: row.get(2)?,
                    },
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?)
}

fn insert_session(
    conn: &Connection,
    user_id: &UserId,
    lifetime: Duration,
) -> Result<IssuedSession, AppError> {
    let token = generate_session_token();
    let expires_at = Utc::now() + lifetime;

    conn.execute(
        "INSERT INTO sessions (id, user_id, expires_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![session_id_for(&token), user_id.as_str(), expires_at],
    )?;

    Ok(IssuedSession { token, expires_at })
}
