use problem_speedrun::{config::Config, init_logging, start_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_logging(config.log_level)?;
    config.log_summary();

    start_server(config).await
}
