//! 计时挑战状态机
//!
//! 状态只有两个：进行中 → 已完成（终态）。
//! - `problems_total` 在开始时快照，之后不再重算
//! - `problems_completed` 总是等于已完成计时记录的条数
//! - 已完成数等于总数时转为完成，记录完成时间和总用时（所有计时记录之和，含未完成的）
//! - 完成后拒绝任何计时更新

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use super::access::{authorize_attempt, authorize_list, require_identity, Access};
use super::database::{
    count_problems, find_attempt, row_to_attempt, to_json, DatabaseService, ATTEMPT_COLUMNS,
};
use super::lists::load_list;
use crate::error::AppError;
use crate::models::{AttemptStatus, ProblemTiming, SpeedrunAttempt, UserId};

impl SpeedrunAttempt {
    pub fn status(&self) -> AttemptStatus {
        if self.is_completed {
            AttemptStatus::Completed
        } else {
            AttemptStatus::InProgress
        }
    }

    /// 写入一条计时记录（同一题目后写覆盖前写），并推进状态
    pub fn record_timing(
        &mut self,
        timing: ProblemTiming,
        now: DateTime<Utc>,
    ) -> Result<AttemptStatus, AppError> {
        if self.is_completed {
            return Err(AppError::AlreadyCompleted);
        }

        match self
            .problem_timings
            .iter_mut()
            .find(|t| t.problem_id == timing.problem_id)
        {
            Some(existing) => *existing = timing,
            None => self.problem_timings.push(timing),
        }

        self.problems_completed = self.problem_timings.iter().filter(|t| t.completed).count() as i64;

        if self.problems_completed == self.problems_total {
            self.is_completed = true;
            self.completed_at = Some(now);
            self.total_time_seconds = Some(self.problem_timings.iter().map(|t| t.time_seconds).sum());
        }

        Ok(self.status())
    }
}

/// 未经校验的计时更新，字段缺失等错误排在归属与完成状态检查之后
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingUpdate {
    pub problem_id: Option<i64>,
    pub time_seconds: Option<i64>,
    pub completed: Option<bool>,
}

impl TimingUpdate {
    fn into_timing(self) -> Result<ProblemTiming, AppError> {
        let (Some(problem_id), Some(time_seconds), Some(completed)) =
            (self.problem_id, self.time_seconds, self.completed)
        else {
            return Err(AppError::validation("Missing required fields"));
        };

        if time_seconds < 0 {
            return Err(AppError::validation("timeSeconds must not be negative"));
        }

        Ok(ProblemTiming {
            problem_id,
            time_seconds,
            completed,
        })
    }
}

impl From<ProblemTiming> for TimingUpdate {
    fn from(timing: ProblemTiming) -> Self {
        Self {
            problem_id: Some(timing.problem_id),
            time_seconds: Some(timing.time_seconds),
            completed: Some(timing.completed),
        }
    }
}

fn load_attempt(conn: &Connection, attempt_id: i64) -> Result<SpeedrunAttempt, AppError> {
    find_attempt(conn, attempt_id)?.ok_or(AppError::NotFound("Attempt"))
}

fn load_owned_attempt(
    conn: &Connection,
    attempt_id: i64,
    user: &UserId,
) -> Result<SpeedrunAttempt, AppError> {
    let attempt = load_attempt(conn, attempt_id)?;
    authorize_attempt(&attempt, user)?;
    Ok(attempt)
}

fn problem_in_list(conn: &Connection, problem_id: i64, list_id: i64) -> Result<bool, AppError> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM problems WHERE id = ?1 AND list_id = ?2)",
        [problem_id, list_id],
        |row| row.get(0),
    )?)
}

impl DatabaseService {
    /// 当前用户的挑战记录（新的在前），可按题单过滤
    pub fn list_attempts(
        &self,
        requester: Option<&UserId>,
        list_id: Option<i64>,
    ) -> Result<Vec<SpeedrunAttempt>, AppError> {
        let user = require_identity(requester)?;

        self.read(|conn| {
            let mut sql = format!("SELECT {ATTEMPT_COLUMNS} FROM speedrun_attempts WHERE user_id = ?1");
            if list_id.is_some() {
                sql.push_str(" AND list_id = ?2");
            }
            sql.push_str(" ORDER BY started_at DESC, id DESC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = match list_id {
                Some(list_id) => {
                    stmt.query_map(rusqlite::params![user.as_str(), list_id], row_to_attempt)?
                }
                None => stmt.query_map(rusqlite::params![user.as_str()], row_to_attempt)?,
            };

            let mut attempts = Vec::new();
            for row in rows {
                attempts.push(row?);
            }

            Ok(attempts)
        })
    }

    /// 开始挑战：题单存在、可读、且至少有一道题
    pub fn start_attempt(
        &self,
        requester: Option<&UserId>,
        list_id: i64,
    ) -> Result<SpeedrunAttempt, AppError> {
        let user = require_identity(requester)?;

        let attempt = self.transaction(|conn| {
            let list = load_list(conn, list_id)?;
            authorize_list(&list, Some(user), Access::Read)?;

            let problems_total = count_problems(conn, list.id)?;
            if problems_total == 0 {
                return Err(AppError::validation("List has no problems"));
            }

            conn.execute(
                "INSERT INTO speedrun_attempts
                 (user_id, list_id, started_at, problems_completed, problems_total, is_completed, problem_timings)
                 VALUES (?1, ?2, ?3, 0, ?4, 0, '[]')",
                rusqlite::params![user.as_str(), list.id, Utc::now(), problems_total],
            )?;

            load_attempt(conn, conn.last_insert_rowid())
        })?;

        log::info!(
            "user {} started attempt {} on list {} ({} problems)",
            user,
            attempt.id,
            attempt.list_id,
            attempt.problems_total
        );
        Ok(attempt)
    }

    pub fn get_attempt(
        &self,
        attempt_id: i64,
        requester: Option<&UserId>,
    ) -> Result<SpeedrunAttempt, AppError> {
        let user = require_identity(requester)?;
        self.read(|conn| load_owned_attempt(conn, attempt_id, user))
    }

    /// 记录单题计时；读取、校验、写回在同一事务内
    ///
    /// 检查顺序：登录、存在、归属、已完成，最后才是请求内容本身
    pub fn record_timing(
        &self,
        attempt_id: i64,
        requester: Option<&UserId>,
        update: impl Into<TimingUpdate>,
    ) -> Result<SpeedrunAttempt, AppError> {
        let user = require_identity(requester)?;
        let update = update.into();

        let attempt = self.transaction(|conn| {
            let mut attempt = load_owned_attempt(conn, attempt_id, user)?;
            if attempt.is_completed {
                return Err(AppError::AlreadyCompleted);
            }

            let timing = update.into_timing()?;
            if !problem_in_list(conn, timing.problem_id, attempt.list_id)? {
                return Err(AppError::validation("Problem does not belong to this list"));
            }

            attempt.record_timing(timing, Utc::now())?;

            conn.execute(
                "UPDATE speedrun_attempts
                 SET problem_timings = ?1, problems_completed = ?2, is_completed = ?3,
                     completed_at = ?4, total_time_seconds = ?5
                 WHERE id = ?6",
                rusqlite::params![
                    to_json(&attempt.problem_timings)?,
                    attempt.problems_completed,
                    attempt.is_completed,
                    attempt.completed_at,
                    attempt.total_time_seconds,
                    attempt.id,
                ],
            )?;

            Ok(attempt)
        })?;

        if attempt.status() == AttemptStatus::Completed {
            log::info!(
                "attempt {} completed by {} in {}s",
                attempt.id,
                user,
                attempt.total_time_seconds.unwrap_or_default()
            );
        }

        Ok(attempt)
    }

    /// 删除挑战记录，不论是否完成
    pub fn delete_attempt(
        &self,
        attempt_id: i64,
        requester: Option<&UserId>,
    ) -> Result<(), AppError> {
        let user = require_identity(requester)?;

        self.transaction(|conn| {
            let attempt = load_owned_attempt(conn, attempt_id, user)?;
            conn.execute("DELETE FROM speedrun_attempts WHERE id = ?1", [attempt.id])?;
            Ok(())
        })
    }

    /// 每个题单的最佳成绩（已完成挑战的最短总用时）
    pub fn best_times(&self, requester: Option<&UserId>) -> Result<BTreeMap<i64, i64>, AppError> {
        let user = require_identity(requester)?;

        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT list_id, MIN(total_time_seconds) FROM speedrun_attempts
                 WHERE user_id = ?1 AND is_completed = 1 AND total_time_seconds IS NOT NULL
                 GROUP BY list_id",
            )?;
            let rows = stmt.query_map([user.as_str()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?;

            let mut best = BTreeMap::new();
            for row in rows {
                let (list_id, seconds) = row?;
                best.insert(list_id, seconds);
            }

            Ok(best)
        })
    }
}
