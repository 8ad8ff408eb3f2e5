// 题目服务
// 题目的增删改；任何修改都会使该题单上未完成的挑战失效

use chrono::Utc;
use rusqlite::Connection;

use super::access::{authorize_list, require_identity, Access};
use super::database::{find_problem, to_json, DatabaseService};
use super::lists::load_list;
use crate::error::AppError;
use crate::models::{Difficulty, Problem, ProblemList, UserId};

/// 新建题目的输入（已校验）
#[derive(Debug, Clone, PartialEq)]
pub struct NewProblem {
    pub list_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
    pub external_url: Option<String>,
}

impl NewProblem {
    pub fn new(
        list_id: i64,
        title: &str,
        description: Option<&str>,
        difficulty: Difficulty,
        tags: Vec<String>,
        external_url: Option<&str>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            list_id,
            title: normalize_title(title)?,
            description: description.and_then(non_blank),
            difficulty,
            tags,
            external_url: external_url.and_then(non_blank),
        })
    }
}

/// 题目更新，None 表示不修改；rank 原样接受，不重排其他题目
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProblemChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub difficulty: Option<Difficulty>,
    pub tags: Option<Vec<String>>,
    pub external_url: Option<Option<String>>,
    pub rank: Option<i64>,
}

impl ProblemChanges {
    pub fn validate(mut self) -> Result<Self, AppError> {
        self.title = self.title.as_deref().map(normalize_title).transpose()?;
        self.description = self.description.map(|d| d.as_deref().and_then(non_blank));
        self.external_url = self.external_url.map(|u| u.as_deref().and_then(non_blank));
        Ok(self)
    }

    fn apply(self, problem: &mut Problem) {
        if let Some(title) = self.title {
            problem.title = title;
        }
        if let Some(description) = self.description {
            problem.description = description;
        }
        if let Some(difficulty) = self.difficulty {
            problem.difficulty = difficulty;
        }
        if let Some(tags) = self.tags {
            problem.tags = tags;
        }
        if let Some(external_url) = self.external_url {
            problem.external_url = external_url;
        }
        if let Some(rank) = self.rank {
            problem.rank = rank;
        }
    }
}

fn normalize_title(title: &str) -> Result<String, AppError> {
    non_blank(title).ok_or_else(|| AppError::validation("Title is required"))
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// 删除题单上所有未完成的挑战，已完成的历史记录保留
pub(crate) fn invalidate_in_progress_attempts(
    conn: &Connection,
    list_id: i64,
) -> Result<usize, AppError> {
    let removed = conn.execute(
        "DELETE FROM speedrun_attempts WHERE list_id = ?1 AND is_completed = 0",
        [list_id],
    )?;

    if removed > 0 {
        log::info!("invalidated {} in-progress attempt(s) on list {}", removed, list_id);
    }

    Ok(removed)
}

/// 追加位置：当前最大 rank + 1，空题单为 0
pub(crate) fn next_rank(conn: &Connection, list_id: i64) -> Result<i64, AppError> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(rank), -1) + 1 FROM problems WHERE list_id = ?1",
        [list_id],
        |row| row.get(0),
    )?)
}

/// 题目必须存在，且请求者是所属题单的创建者
fn load_owned_problem(
    conn: &Connection,
    problem_id: i64,
    user: &UserId,
) -> Result<(Problem, ProblemList), AppError> {
    let problem = find_problem(conn, problem_id)?.ok_or(AppError::NotFound("Problem"))?;
    let list = load_list(conn, problem.list_id)?;
    authorize_list(&list, Some(user), Access::Write)?;
    Ok((problem, list))
}

impl DatabaseService {
    pub fn create_problem(
        &self,
        requester: Option<&UserId>,
        new_problem: NewProblem,
    ) -> Result<Problem, AppError> {
        let user = require_identity(requester)?;

        let problem = self.transaction(|conn| {
            let list = load_list(conn, new_problem.list_id)?;
            authorize_list(&list, Some(user), Access::Write)?;

            invalidate_in_progress_attempts(conn, list.id)?;

            let rank = next_rank(conn, list.id)?;
            let created_at = Utc::now();
            conn.execute(
                "INSERT INTO problems
                 (list_id, title, description, difficulty, rank, tags, external_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    list.id,
                    new_problem.title,
                    new_problem.description,
                    new_problem.difficulty.as_str(),
                    rank,
                    to_json(&new_problem.tags)?,
                    new_problem.external_url,
                    created_at,
                ],
            )?;

            find_problem(conn, conn.last_insert_rowid())?.ok_or(AppError::NotFound("Problem"))
        })?;

        log::info!(
            "user {} added problem {} to list {} at rank {}",
            user,
            problem.id,
            problem.list_id,
            problem.rank
        );
        Ok(problem)
    }

    pub fn update_problem(
        &self,
        problem_id: i64,
        requester: Option<&UserId>,
        changes: ProblemChanges,
    ) -> Result<Problem, AppError> {
        let user = require_identity(requester)?;

        self.transaction(|conn| {
            let (mut problem, list) = load_owned_problem(conn, problem_id, user)?;

            invalidate_in_progress_attempts(conn, list.id)?;

            changes.apply(&mut problem);
            conn.execute(
                "UPDATE problems
                 SET title = ?1, description = ?2, difficulty = ?3, rank = ?4, tags = ?5, external_url = ?6
                 WHERE id = ?7",
                rusqlite::params![
                    problem.title,
                    problem.description,
                    problem.difficulty.as_str(),
                    problem.rank,
                    to_json(&problem.tags)?,
                    problem.external_url,
                    problem.id,
                ],
            )?;

            Ok(problem)
        })
    }

    pub fn delete_problem(
        &self,
        problem_id: i64,
        requester: Option<&UserId>,
    ) -> Result<(), AppError> {
        let user = require_identity(requester)?;

        self.transaction(|conn| {
            let (problem, list) = load_owned_problem(conn, problem_id, user)?;

            invalidate_in_progress_attempts(conn, list.id)?;
            conn.execute("DELETE FROM problems WHERE id = ?1", [problem.id])?;
            Ok(())
        })?;

        log::info!("user {} deleted problem {}", user, problem_id);
        Ok(())
    }
}
