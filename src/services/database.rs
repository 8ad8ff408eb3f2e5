// 数据库服务模块
// 提供 SQLite 连接、表结构初始化、事务封装以及行映射

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::models::{Difficulty, Problem, ProblemList, SpeedrunAttempt, UserId};

pub(crate) const LIST_COLUMNS: &str =
    "id, name, description, created_by, is_public, created_at, updated_at";

pub(crate) const PROBLEM_COLUMNS: &str =
    "id, list_id, title, description, difficulty, rank, tags, external_url, created_at";

pub(crate) const ATTEMPT_COLUMNS: &str = "id, user_id, list_id, started_at, completed_at, \
     total_time_seconds, problems_completed, problems_total, is_completed, problem_timings";

/// 数据库服务
#[derive(Clone)]
pub struct DatabaseService {
    pool: Arc<Mutex<Connection>>,
}

impl DatabaseService {
    /// 打开（必要时创建）数据库文件并初始化表结构
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        // 确保数据目录存在
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        let service = Self {
            pool: Arc::new(Mutex::new(conn)),
        };
        service.initialize()?;
        Ok(service)
    }

    /// 内存数据库，测试使用
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let service = Self {
            pool: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        service.initialize()?;
        Ok(service)
    }

    /// 初始化数据库表结构
    pub fn initialize(&self) -> Result<(), AppError> {
        let conn = self.lock()?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS problem_lists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                created_by TEXT NOT NULL REFERENCES users(id),
                is_public INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS problems (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                list_id INTEGER NOT NULL REFERENCES problem_lists(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                description TEXT,
                difficulty TEXT NOT NULL CHECK(difficulty IN ('easy', 'medium', 'hard')),
                rank INTEGER NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                external_url TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS speedrun_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES users(id),
                list_id INTEGER NOT NULL REFERENCES problem_lists(id) ON DELETE CASCADE,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                total_time_seconds INTEGER,
                problems_completed INTEGER NOT NULL DEFAULT 0,
                problems_total INTEGER NOT NULL,
                is_completed INTEGER NOT NULL DEFAULT 0,
                problem_timings TEXT NOT NULL DEFAULT '[]'
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_lists_created_by ON problem_lists(created_by);
            CREATE INDEX IF NOT EXISTS idx_problems_list_id ON problems(list_id);
            CREATE INDEX IF NOT EXISTS idx_attempts_user_id ON speedrun_attempts(user_id);
            CREATE INDEX IF NOT EXISTS idx_attempts_list_completed
                ON speedrun_attempts(list_id, is_completed);
            ",
        )?;

        Ok(())
    }

    /// 在 IMMEDIATE 事务中执行：BEGIN 时即获取写锁，
    /// 读-检查-写 与级联删除在同一事务内完成，出错时整体回滚
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// 只读查询
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T, AppError>) -> Result<T, AppError> {
        let conn = self.lock()?;
        f(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.pool
            .lock()
            .map_err(|_| AppError::Internal("database connection lock poisoned".to_string()))
    }
}

// ==================== 查询辅助 ====================

pub(crate) fn find_list(conn: &Connection, id: i64) -> Result<Option<ProblemList>, AppError> {
    let sql = format!("SELECT {LIST_COLUMNS} FROM problem_lists WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], row_to_list).optional()?)
}

pub(crate) fn find_problem(conn: &Connection, id: i64) -> Result<Option<Problem>, AppError> {
    let sql = format!("SELECT {PROBLEM_COLUMNS} FROM problems WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], row_to_problem).optional()?)
}

pub(crate) fn find_attempt(conn: &Connection, id: i64) -> Result<Option<SpeedrunAttempt>, AppError> {
    let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM speedrun_attempts WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], row_to_attempt).optional()?)
}

/// 题单下的所有题目，按 rank 排序
pub(crate) fn problems_for_list(conn: &Connection, list_id: i64) -> Result<Vec<Problem>, AppError> {
    let sql = format!(
        "SELECT {PROBLEM_COLUMNS} FROM problems WHERE list_id = ?1 ORDER BY rank, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([list_id], row_to_problem)?;

    let mut problems = Vec::new();
    for row in rows {
        problems.push(row?);
    }

    Ok(problems)
}

pub(crate) fn count_problems(conn: &Connection, list_id: i64) -> Result<i64, AppError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM problems WHERE list_id = ?1",
        [list_id],
        |row| row.get(0),
    )?)
}

// ==================== 行映射 ====================

pub(crate) fn row_to_list(row: &Row) -> Result<ProblemList, rusqlite::Error> {
    Ok(ProblemList {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_by: UserId(row.get(3)?),
        is_public: row.get(4)?,
        created_at: row.get::<_, DateTime<Utc>>(5)?,
        updated_at: row.get::<_, DateTime<Utc>>(6)?,
    })
}

pub(crate) fn row_to_problem(row: &Row) -> Result<Problem, rusqlite::Error> {
    let difficulty: String = row.get(4)?;

    Ok(Problem {
        id: row.get(0)?,
        list_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        difficulty: difficulty.parse::<Difficulty>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into())
        })?,
        rank: row.get(5)?,
        tags: json_column(row, 6)?,
        external_url: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub(crate) fn row_to_attempt(row: &Row) -> Result<SpeedrunAttempt, rusqlite::Error> {
    Ok(SpeedrunAttempt {
        id: row.get(0)?,
        user_id: UserId(row.get(1)?),
        list_id: row.get(2)?,
        started_at: row.get(3)?,
        completed_at: row.get(4)?,
        total_time_seconds: row.get(5)?,
        problems_completed: row.get(6)?,
        problems_total: row.get(7)?,
        is_completed: row.get(8)?,
        problem_timings: json_column(row, 9)?,
    })
}

/// JSON 序列化的列（tags、problem_timings）
fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> Result<T, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|e| AppError::Internal(format!("JSON encode failed: {e}")))
}
