use serde::{Deserialize, Deserializer};

use crate::error::AppError;

/// 解析路径中的数字 id，`what` 用于错误信息，如 "list"
pub fn parse_id(raw: &str, what: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::validation(format!("Invalid {what} ID")))
}

/// 区分“字段缺失”和“显式 null”：缺失为 None，null 为 Some(None)
///
/// 配合 `#[serde(default, deserialize_with = "nullable")]` 使用
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
