//! Wires the services together and owns startup and shutdown.

use crate::api::yahoo::YahooClient;
use crate::config::Config;
use crate::data::DataManager;
use crate::db::{SqliteStore, WatchlistStore};
use crate::ui::core::alerts::{spawn_target_watcher, AlertEngine};
use crate::ui::core::queue::{drain_results, ResultQueue, UiHandle};
use crate::ui::dashboard::{Dashboard, DialogKind, Services};
use log::{error, info, warn};
use std::error::Error;
use std::sync::Arc;
use tokio::sync::watch;

pub async fn run(config: Config) -> Result<(), Box<dyn Error + Send + Sync>> {
    let client = YahooClient::new(&config)?;
    let data = DataManager::new(Arc::new(client), config.cache_ttl, config.cache_capacity);

    let (store, db_error) = match SqliteStore::open(&config.db_path) {
        Ok(store) => (store, None),
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            (SqliteStore::disconnected(), Some(e.to_string()))
        }
    };
    info!("Watchlist store connected: {}", store.is_connected());
    let store: Arc<dyn WatchlistStore> = Arc::new(store);

    let (ui, ui_rx) = UiHandle::<Dashboard>::channel();
    let (queue, queue_rx) = ResultQueue::channel();
    let alerts = AlertEngine::default();

    let worker = tokio::spawn(drain_results(queue_rx, ui.clone(), Dashboard::apply_search_result));

    let (stop_tx, stop_rx) = watch::channel(false);
    let watcher = {
        let ui = ui.clone();
        spawn_target_watcher(
            alerts.clone(),
            data.clone(),
            config.check_interval,
            stop_rx,
            move |notification| {
                ui.run_on_ui(move |dashboard| dashboard.notify_target_reached(&notification));
            },
        )
    };

    let mut dashboard = Dashboard::new(Services {
        data,
        store: store.clone(),
        alerts,
        queue: queue.clone(),
        ui,
    });
    if let Some(message) = db_error {
        dashboard.show_dialog(
            DialogKind::Error,
            "Database Error",
            format!("Failed to connect to database: {}", message),
        );
    }
    dashboard.load_watchlist();

    info!("Dashboard starting");
    let outcome = dashboard.run(ui_rx).await;

    // Stop the timer first so no check fires against a closed store.
    let _ = stop_tx.send(true);
    queue.shutdown();
    store.close();

    match worker.await {
        Ok(delivered) => info!("Result worker stopped after {} result(s)", delivered),
        Err(e) => warn!("Result worker ended abnormally: {}", e),
    }
    if let Err(e) = watcher.await {
        warn!("Target watcher ended abnormally: {}", e);
    }

    outcome
}
