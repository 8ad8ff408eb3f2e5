// 写入演示数据：cargo run --bin seed

use problem_speedrun::config::Config;
use problem_speedrun::init_logging;
use problem_speedrun::seed::{seed_fundamentals, SeedOutcome, SYSTEM_PASSWORD, SYSTEM_USERNAME};
use problem_speedrun::services::DatabaseService;

fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_logging(config.log_level)?;
    config.log_summary();

    let db = DatabaseService::open(&config.database_path)?;
    match seed_fundamentals(&db)? {
        SeedOutcome::AlreadySeeded => log::info!("nothing to do"),
        SeedOutcome::Created { list_id, problems } => {
            log::info!("seeded list {list_id} with {problems} problems");
            log::info!("system user: {SYSTEM_USERNAME} / {SYSTEM_PASSWORD}");
        }
    }

    Ok(())
}
