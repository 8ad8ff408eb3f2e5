//! 刷题计时赛服务
//!
//! 用户维护题单（公开或私有），对任意可见题单发起限时挑战，逐题记录用时。
//! 题单内容一旦变化，该题单上所有进行中的挑战随即作废，已完成的成绩保留。

use anyhow::Context;
use log::LevelFilter;
use tokio::net::TcpListener;

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod seed;
pub mod services;
pub mod state;
pub mod utils;

use config::Config;
use state::AppState;

/// 初始化 fern 日志，输出到标准输出
pub fn init_logging(level: LevelFilter) -> anyhow::Result<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()?;

    Ok(())
}

pub async fn start_server(config: Config) -> anyhow::Result<()> {
    log::info!("opening database {}", config.database_path.display());
    let address = format!("0.0.0.0:{}", config.port);
    let state = AppState::new(config)?;

    let app = routes::router(state);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    log::info!("server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    log::info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("received Ctrl+C, shutting down"),
            Err(e) => {
                log::error!("failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                log::info!("received terminate signal, shutting down");
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
