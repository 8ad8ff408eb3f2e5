// 服务模块
// 提供核心业务逻辑服务

pub mod access;
pub mod auth;
pub mod database;
pub mod lists;
pub mod problems;
pub mod speedruns;

pub use access::{authorize_attempt, authorize_list, can_read, can_write, Access};

pub use auth::{
    hash_password,
    verify_password,
    Credentials,
    IssuedSession,
    Registration,
    SESSION_COOKIE_NAME,
};

pub use database::DatabaseService;

pub use lists::{ListChanges, NewList};

pub use problems::{NewProblem, ProblemChanges};

pub use speedruns::TimingUpdate;
