use commodity_monitor::prelude::*;
use commodity_monitor::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = MonitorConfig::from_env()?;
    init_logging(config.log_level);

    tracing::info!("Commodity monitor - {}", config.instrument.security);

    // No vendor session is linked into this binary, so it always runs on synthetic data
    let mut monitor = MonitorController::offline(config)?;
    monitor.register_renderer(Arc::new(LogRenderer));

    monitor.start().await?;
    tracing::info!("Press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    monitor.shutdown().await;
    Ok(())
}
