use std::sync::Arc;

use clap::Parser;
use lodestar::catalog::load_catalog;
use lodestar::clock::SystemClock;
use lodestar::consent::ConsentEngine;
use lodestar::storage::{self, DbConsentStore};
use lodestar::{jobs, settings, web};
use migration::MigratorTrait;
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "lodestar",
    version,
    about = "Open Finance consent lifecycle and permission authorization service"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    let catalog = load_catalog(settings.consent.catalog_path.as_deref())?;

    // init storage (database)
    let db = storage::init(&settings.database).await?;
    if settings.database.run_migrations {
        migration::Migrator::up(&db, None).await.into_diagnostic()?;
    }

    let engine = ConsentEngine::new(
        Arc::new(DbConsentStore::new(db.clone())),
        Arc::new(SystemClock),
        Arc::new(catalog),
        settings.engine_options(),
    );

    // keep the scheduler alive for the lifetime of the server
    let _scheduler = if settings.jobs.enabled {
        Some(jobs::init_scheduler(engine.clone(), Some(db), &settings.jobs.sweep_schedule).await?)
    } else {
        tracing::info!("Background jobs disabled");
        None
    };

    // start web server
    web::serve(settings, engine).await?;
    Ok(())
}
