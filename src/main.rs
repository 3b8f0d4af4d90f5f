use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

mod error;
mod models;
mod repositories;
pub mod services;
pub mod settings;
pub mod utils;

use repositories::{ledger::LedgerRepository, memory::MemoryLedgerRepository, LedgerStore};
use settings::{Settings, StorageBackend};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "vitacoin.toml")]
    config: String,
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log4rs)?;
    let settings = Settings::load(&args.config).context("Could not load config file.")?;
    log::info!("Starting vitacoin ledger service.");

    let store = connect_store(&settings).await?;

    services::start_services(store, Arc::new(utils::SystemClock), settings, &args.listen).await
}

async fn connect_store(settings: &Settings) -> Result<Arc<dyn LedgerStore>> {
    match settings.storage.backend {
        StorageBackend::Memory => {
            log::warn!("Using in-memory storage; balances are lost on restart.");
            Ok(Arc::new(MemoryLedgerRepository::new()))
        }
        StorageBackend::Postgres => {
            let postgres = settings
                .postgres
                .as_ref()
                .context("Missing [postgres] settings.")?;

            let conn = PgPoolOptions::new()
                .max_connections(postgres.max_connections)
                .acquire_timeout(settings.storage.timeout())
                .connect(&postgres.url)
                .await
                .context("Could not connect to database.")?;

            let repository = LedgerRepository::new(conn);
            repository
                .migrate()
                .await
                .context("Could not run database migrations.")?;
            log::info!("Connected to PostgreSQL, schema up to date.");

            Ok(Arc::new(repository))
        }
    }
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
