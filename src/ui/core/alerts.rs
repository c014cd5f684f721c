use crate::data::DataManager;
use log::{debug, error, info};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// The single active price threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetAlert {
    pub symbol: String,
    pub target: f64,
}

impl TargetAlert {
    pub fn is_reached(&self, price: f64) -> bool {
        price <= self.target
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub symbol: String,
    pub target: f64,
    pub price: f64,
}

impl Notification {
    pub fn message(&self) -> String {
        format!(
            "{} has reached your target price of {}. Current price: {:.2}",
            self.symbol, self.target, self.price
        )
    }
}

/// Holds the current target; shared between the UI and the periodic check.
#[derive(Debug, Clone, Default)]
pub struct AlertEngine {
    target: Arc<Mutex<Option<TargetAlert>>>,
}

impl AlertEngine {
    /// Replaces any previous target.
    pub fn set_target(&self, symbol: &str, target: f64) -> TargetAlert {
        let alert = TargetAlert {
            symbol: symbol.to_string(),
            target,
        };
        *self.lock() = Some(alert.clone());
        info!("Target price of {} set for {}", target, symbol);
        alert
    }

    pub fn target(&self) -> Option<TargetAlert> {
        self.lock().clone()
    }

    pub fn check_price(&self, symbol: &str, price: f64) -> Option<Notification> {
        let alert = self.target()?;
        if alert.symbol != symbol || !alert.is_reached(price) {
            return None;
        }
        Some(Notification {
            symbol: alert.symbol,
            target: alert.target,
            price,
        })
    }

    /// One check cycle: at most one notification.
    pub async fn check(&self, data: &DataManager) -> Option<Notification> {
        let alert = self.target()?;
        let price = data.get_latest_price(&alert.symbol).await?;
        debug!("Target check {}: price {} target {}", alert.symbol, price, alert.target);
        self.check_price(&alert.symbol, price)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<TargetAlert>> {
        self.target.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs a target check every `interval` until `stop` flips to `true` or its
/// sender goes away. A check still in flight when stop arrives is aborted and
/// never notifies. A failing check is logged and the timer keeps going.
pub fn spawn_target_watcher<F>(
    engine: AlertEngine,
    data: DataManager,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
    notify: F,
) -> JoinHandle<()>
where
    F: Fn(Notification) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stopped(&mut stop) => break,
            }

            let engine = engine.clone();
            let data = data.clone();
            let mut check = tokio::spawn(async move { engine.check(&data).await });

            tokio::select! {
                outcome = &mut check => match outcome {
                    Ok(Some(notification)) => notify(notification),
                    Ok(None) => {}
                    Err(e) => error!("Error in target price check: {}", e),
                },
                _ = stopped(&mut stop) => {
                    check.abort();
                    debug!("Target check aborted by shutdown");
                    break;
                }
            }
        }
        debug!("Target price watcher stopped");
    })
}

/// Resolves once `stop` holds `true` or its sender is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::mock::MockMarket;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn data(mock: Arc<MockMarket>) -> DataManager {
        DataManager::new(mock, Duration::from_secs(60), 4)
    }

    #[test]
    fn price_at_or_below_target_notifies() {
        let engine = AlertEngine::default();
        engine.set_target("AAPL", 180.0);

        assert!(engine.check_price("AAPL", 180.0).is_some());
        assert!(engine.check_price("AAPL", 179.99).is_some());
        assert!(engine.check_price("AAPL", 180.01).is_none());
        assert!(engine.check_price("MSFT", 100.0).is_none());
    }

    #[test]
    fn new_target_overwrites_old() {
        let engine = AlertEngine::default();
        engine.set_target("AAPL", 180.0);
        engine.set_target("MSFT", 400.0);

        assert_eq!(
            engine.target(),
            Some(TargetAlert { symbol: "MSFT".into(), target: 400.0 })
        );
        assert!(engine.check_price("AAPL", 1.0).is_none());
    }

    #[tokio::test]
    async fn check_without_target_does_nothing() {
        let mock = Arc::new(MockMarket::with_price(1.0));
        assert!(AlertEngine::default().check(&data(mock)).await.is_none());
    }

    #[tokio::test]
    async fn check_reports_current_price() {
        let mock = Arc::new(MockMarket::with_price(175.25));
        let engine = AlertEngine::default();
        engine.set_target("AAPL", 180.0);

        let notification = engine.check(&data(mock.clone())).await.unwrap();
        assert_eq!(notification.price, 175.25);
        assert_eq!(
            notification.message(),
            "AAPL has reached your target price of 180. Current price: 175.25"
        );

        mock.set_price(None);
        assert!(engine.check(&data(mock)).await.is_none());
    }

    struct Watcher {
        notified: Arc<AtomicUsize>,
        stop_tx: watch::Sender<bool>,
        handle: JoinHandle<()>,
    }

    const INTERVAL: Duration = Duration::from_secs(60);

    fn start_watcher(mock: Arc<MockMarket>) -> Watcher {
        let engine = AlertEngine::default();
        engine.set_target("AAPL", 180.0);

        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_target_watcher(engine, data(mock), INTERVAL, stop_rx, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        Watcher { notified, stop_tx, handle }
    }

    async fn run_watcher(price: Option<f64>, cycles: u32) -> usize {
        let mock = Arc::new(MockMarket::default());
        mock.set_price(price);
        let watcher = start_watcher(mock);

        time::sleep(INTERVAL * cycles + Duration::from_secs(1)).await;
        watcher.stop_tx.send(true).unwrap();
        watcher.handle.await.unwrap();
        watcher.notified.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_notifies_once_per_cycle_below_target() {
        assert_eq!(run_watcher(Some(170.0), 3).await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_stays_quiet_above_target() {
        assert_eq!(run_watcher(Some(190.0), 3).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_survives_provider_outage() {
        assert_eq!(run_watcher(None, 2).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_stops_when_sender_dropped() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mock = Arc::new(MockMarket::default());
        let handle = spawn_target_watcher(
            AlertEngine::default(),
            data(mock),
            Duration::from_secs(60),
            stop_rx,
            |_| {},
        );
        drop(stop_tx);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_check_aborts_it() {
        let mock = Arc::new(MockMarket::with_price(170.0));
        *mock.price_delay.lock().unwrap() = Duration::from_secs(10);
        let watcher = start_watcher(mock);

        // First check starts at 60s and would finish at 70s.
        time::sleep(INTERVAL + Duration::from_millis(500)).await;
        let stopped_at = Instant::now();
        watcher.stop_tx.send(true).unwrap();
        watcher.handle.await.unwrap();

        assert!(stopped_at.elapsed() < Duration::from_secs(1));
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(watcher.notified.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_check_keeps_timer_alive() {
        let mock = Arc::new(MockMarket::with_price(170.0));
        mock.panic_on_price.store(true, Ordering::SeqCst);
        let watcher = start_watcher(mock);

        time::sleep(INTERVAL * 3 + Duration::from_secs(1)).await;
        watcher.stop_tx.send(true).unwrap();
        watcher.handle.await.unwrap();

        // The first tick panicked; the next two still notified.
        assert_eq!(watcher.notified.load(Ordering::SeqCst), 2);
    }
}
