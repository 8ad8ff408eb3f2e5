use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{anyhow, Result};
use log::LevelFilter;

/// 默认数据库路径
const DEFAULT_DB_PATH: &str = "data/speedrun.db";

/// 会话有效期允许范围（天）
const SESSION_DAYS_RANGE: std::ops::RangeInclusive<i64> = 1..=3650;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: PathBuf,
    pub log_level: LevelFilter,
    /// 会话有效期（天）
    pub session_days: i64,
    pub secure_cookies: bool,
}

impl Config {
    /// 读取环境变量；此时日志尚未初始化，结果由 `log_summary` 在之后输出
    pub fn load() -> Result<Self> {
        Self {
            port: try_load("SPEEDRUN_PORT", "3000")?,
            database_path: try_load("SPEEDRUN_DATABASE_PATH", DEFAULT_DB_PATH)?,
            log_level: try_load("SPEEDRUN_LOG_LEVEL", "info")?,
            session_days: try_load("SPEEDRUN_SESSION_DAYS", "30")?,
            secure_cookies: try_load("SPEEDRUN_SECURE_COOKIES", "false")?,
        }
        .validate()
    }

    fn validate(self) -> Result<Self> {
        if !SESSION_DAYS_RANGE.contains(&self.session_days) {
            return Err(anyhow!(
                "Environment misconfigured: SPEEDRUN_SESSION_DAYS={} (must be {}..={})",
                self.session_days,
                SESSION_DAYS_RANGE.start(),
                SESSION_DAYS_RANGE.end()
            ));
        }
        Ok(self)
    }

    pub fn summary(&self) -> String {
        format!(
            "port={} database={} log_level={} session_days={} secure_cookies={}",
            self.port,
            self.database_path.display(),
            self.log_level,
            self.session_days,
            self.secure_cookies
        )
    }

    pub fn log_summary(&self) {
        log::info!("config: {}", self.summary());
    }

    pub fn session_lifetime(&self) -> chrono::Duration {
        chrono::Duration::days(self.session_days)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            log_level: LevelFilter::Info,
            session_days: 30,
            secure_cookies: false,
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());

    raw.parse()
        .map_err(|e| anyhow!("Environment misconfigured: {key}={raw} ({e})"))
}
