// 题单服务
// 题单的增删改查，所有操作显式接收请求者身份

use chrono::Utc;
use rusqlite::Connection;

use super::access::{authorize_list, require_identity, Access};
use super::database::{find_list, problems_for_list, row_to_list, DatabaseService, LIST_COLUMNS};
use super::problems::invalidate_in_progress_attempts;
use crate::error::AppError;
use crate::models::{ListWithProblems, ProblemList, UserId};

const NAME_MAX: usize = 100;

/// 新建题单的输入（已校验）
#[derive(Debug, Clone, PartialEq)]
pub struct NewList {
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
}

impl NewList {
    pub fn new(name: &str, description: Option<&str>, is_public: bool) -> Result<Self, AppError> {
        Ok(Self {
            name: normalize_name(name)?,
            description: description.and_then(normalize_description),
            is_public,
        })
    }
}

/// 题单更新，字段为 None 表示不修改；description 的内层 None 表示清空
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub is_public: Option<bool>,
}

impl ListChanges {
    pub fn new(
        name: Option<&str>,
        description: Option<Option<&str>>,
        is_public: Option<bool>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            name: name.map(normalize_name).transpose()?,
            description: description.map(|d| d.and_then(normalize_description)),
            is_public,
        })
    }
}

fn normalize_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Name is required"));
    }
    if name.chars().count() > NAME_MAX {
        return Err(AppError::validation(format!(
            "List name must be {NAME_MAX} characters or less"
        )));
    }
    Ok(name.to_string())
}

fn normalize_description(description: &str) -> Option<String> {
    let description = description.trim();
    (!description.is_empty()).then(|| description.to_string())
}

/// 题单必须存在，否则 NotFound
pub(crate) fn load_list(conn: &Connection, list_id: i64) -> Result<ProblemList, AppError> {
    find_list(conn, list_id)?.ok_or(AppError::NotFound("List"))
}

impl DatabaseService {
    /// 公开题单（新建在前），登录用户再追加自己的私有题单
    pub fn list_visible_lists(
        &self,
        requester: Option<&UserId>,
    ) -> Result<Vec<ProblemList>, AppError> {
        self.read(|conn| {
            let mut lists = query_lists(
                conn,
                &format!(
                    "SELECT {LIST_COLUMNS} FROM problem_lists WHERE is_public = 1
                     ORDER BY created_at DESC, id DESC"
                ),
                &[],
            )?;

            if let Some(user) = requester {
                lists.extend(query_lists(
                    conn,
                    &format!(
                        "SELECT {LIST_COLUMNS} FROM problem_lists
                         WHERE created_by = ?1 AND is_public = 0
                         ORDER BY created_at DESC, id DESC"
                    ),
                    &[&user.as_str()],
                )?);
            }

            Ok(lists)
        })
    }

    pub fn create_list(
        &self,
        requester: Option<&UserId>,
        new_list: NewList,
    ) -> Result<ProblemList, AppError> {
        let owner = require_identity(requester)?;
        let now = Utc::now();

        let list = self.transaction(|conn| {
            conn.execute(
                "INSERT INTO problem_lists (name, description, created_by, is_public, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![
                    new_list.name,
                    new_list.description,
                    owner.as_str(),
                    new_list.is_public,
                    now,
                ],
            )?;
            load_list(conn, conn.last_insert_rowid())
        })?;

        log::info!("user {} created list {} ({})", owner, list.id, list.name);
        Ok(list)
    }

    /// 读取题单及其题目；先确认存在再判断可见性
    pub fn get_list_with_problems(
        &self,
        list_id: i64,
        requester: Option<&UserId>,
    ) -> Result<ListWithProblems, AppError> {
        self.read(|conn| {
            let list = load_list(conn, list_id)?;
            authorize_list(&list, requester, Access::Read)?;
            let problems = problems_for_list(conn, list_id)?;
            Ok(ListWithProblems { list, problems })
        })
    }

    pub fn update_list(
        &self,
        list_id: i64,
        requester: Option<&UserId>,
        changes: ListChanges,
    ) -> Result<ProblemList, AppError> {
        let user = require_identity(requester)?;

        self.transaction(|conn| {
            let mut list = load_list(conn, list_id)?;
            authorize_list(&list, Some(user), Access::Write)?;

            if let Some(name) = changes.name {
                list.name = name;
            }
            if let Some(description) = changes.description {
                list.description = description;
            }
            if let Some(is_public) = changes.is_public {
                list.is_public = is_public;
            }
            list.updated_at = Utc::now();

            conn.execute(
                "UPDATE problem_lists SET name = ?1, description = ?2, is_public = ?3, updated_at = ?4
                 WHERE id = ?5",
                rusqlite::params![list.name, list.description, list.is_public, list.updated_at, list.id],
            )?;

            Ok(list)
        })
    }

    /// 删除题单：题目与挑战记录随外键级联删除
    pub fn delete_list(&self, list_id: i64, requester: Option<&UserId>) -> Result<(), AppError> {
        let user = require_identity(requester)?;

        self.transaction(|conn| {
            let list = load_list(conn, list_id)?;
            authorize_list(&list, Some(user), Access::Write)?;

            invalidate_in_progress_attempts(conn, list_id)?;
            conn.execute("DELETE FROM problem_lists WHERE id = ?1", [list_id])?;
            Ok(())
        })?;

        log::info!("user {} deleted list {}", user, list_id);
        Ok(())
    }
}

fn query_lists(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<ProblemList>, AppError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, row_to_list)?;

    let mut lists = Vec::new();
    for row in rows {
        lists.push(row?);
    }

    Ok(lists)
}
