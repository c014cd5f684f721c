mod api;
mod app;
mod config;
mod data;
mod db;
mod error;
mod ui;

use config::Config;
use env_logger::Builder;
use log::{info, warn, LevelFilter};
use std::error::Error;
use std::fs::{self, OpenOptions};
use std::io::Write;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = Config::from_env();

    if let Some(parent) = config.log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;

    // The terminal belongs to the UI, so records go to a file.
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("stockscreener", LevelFilter::Debug)
        .parse_default_env()
        .format(|buf, record| {
            let ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();

    for entry in &config.rejected {
        warn!("Ignoring {}: not a valid value", entry);
    }

    info!("Starting stock screener (db: {})", config.db_path.display());

    app::run(config).await?;

    info!("Shutdown complete");
    Ok(())
}
