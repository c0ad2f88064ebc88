use anyhow::Context;
use medstock::{config::Config, ExpiryDate, LoadCycle, Repository, SqliteDriver};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    match run(&config).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    }
}

/// Initialize the store, run one load cycle and print it. Returns whether
/// the migration committed.
async fn run(config: &Config) -> anyhow::Result<bool> {
    let driver = Arc::new(
        SqliteDriver::new(config.database_dir.clone())
            .with_busy_timeout_ms(config.busy_timeout_ms),
    );
    let mut repo = Repository::from_config(driver, config);

    repo.initialize()
        .await
        .context("Failed to initialize database")?;

    let today = config.today.unwrap_or_else(ExpiryDate::today);
    let cycle = repo.load_cycle_at(today).await;
    let close = repo.close().await;

    let cycle = cycle.context("Failed to load items")?;
    if let Err(e) = close {
        tracing::warn!(error = %e, "Failed to dispose connection");
    }

    let committed = cycle.migration.is_ok();
    println!("{}", serde_json::to_string_pretty(&summary(&cycle))?);
    Ok(committed)
}

fn summary(cycle: &LoadCycle) -> serde_json::Value {
    let migration = match &cycle.migration {
        Ok(stats) => json!({
            "status": "committed",
            "archived": stats.archived,
            "already_archived": stats.already_archived,
            "purged": stats.purged,
        }),
        Err(e) => json!({
            "status": "rolled_back",
            "error": e.user_message(),
        }),
    };
    json!({
        "today": cycle.today,
        "current": cycle.current,
        "expired": cycle.expired,
        "migration": migration,
    })
}
