//! 题单归属与可见性检查
//!
//! 读：公开题单任何人可读，私有题单仅创建者可读。
//! 写：仅创建者，且必须已登录。
//! 调用方先确认资源存在（否则 404），再做权限判断（403）。

use crate::error::AppError;
use crate::models::{ProblemList, SpeedrunAttempt, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

pub fn can_read(list: &ProblemList, requester: Option<&UserId>) -> bool {
    list.is_public || requester == Some(&list.created_by)
}

pub fn can_write(list: &ProblemList, requester: Option<&UserId>) -> bool {
    matches!(requester, Some(user) if *user == list.created_by)
}

pub fn authorize_list(
    list: &ProblemList,
    requester: Option<&UserId>,
    access: Access,
) -> Result<(), AppError> {
    let allowed = match access {
        Access::Read => can_read(list, requester),
        Access::Write => can_write(list, requester),
    };

    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// 挑战记录只允许其所有者访问
pub fn authorize_attempt(attempt: &SpeedrunAttempt, requester: &UserId) -> Result<(), AppError> {
    if attempt.user_id == *requester {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub fn require_identity(requester: Option<&UserId>) -> Result<&UserId, AppError> {
    requester.ok_or(AppError::Unauthenticated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn list(owner: &str, is_public: bool) -> ProblemList {
        ProblemList {
            id: 1,
            name: "Fundamentals".to_string(),
            description: None,
            created_by: UserId(owner.to_string()),
            is_public,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_public_list_readable_by_anyone() {
        let l = list("u1", true);
        let other = UserId("u2".to_string());

        assert!(can_read(&l, None));
        assert!(can_read(&l, Some(&other)));
        assert!(authorize_list(&l, None, Access::Read).is_ok());
    }

    #[test]
    fn test_private_list_readable_by_owner_only() {
        let l = list("u1", false);
        let owner = UserId("u1".to_string());
        let other = UserId("u2".to_string());

        assert!(can_read(&l, Some(&owner)));
        assert!(!can_read(&l, Some(&other)));
        assert!(!can_read(&l, None));
        assert!(matches!(
            authorize_list(&l, None, Access::Read),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn test_write_requires_owner_regardless_of_visibility() {
        let owner = UserId("u1".to_string());
        let other = UserId("u2".to_string());

        for is_public in [true, false] {
            let l = list("u1", is_public);
            assert!(can_write(&l, Some(&owner)));
            assert!(!can_write(&l, Some(&other)));
            assert!(!can_write(&l, None));
            assert!(matches!(
                authorize_list(&l, Some(&other), Access::Write),
                Err(AppError::Forbidden)
            ));
        }
    }

    #[test]
    fn test_require_identity() {
        let user = UserId("u1".to_string());
        assert_eq!(require_identity(Some(&user)).unwrap(), &user);
        assert!(matches!(require_identity(None), Err(AppError::Unauthenticated)));
    }
}
