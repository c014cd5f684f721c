//! Moving fetched data onto the UI loop.
//!
//! Background fetches push typed results onto a [`ResultQueue`]. One worker
//! drains the queue and hands each result to the UI loop through a
//! [`UiHandle`], so UI state only ever has the UI loop as its writer.

use crate::api::{PriceSeries, StockInfo};
use log::debug;
use tokio::sync::mpsc;

/// A closure the UI loop applies to its state.
pub type UiTask<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Schedules work on the UI loop from any thread.
pub struct UiHandle<S> {
    tx: mpsc::UnboundedSender<UiTask<S>>,
}

impl<S> Clone for UiHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S: 'static> UiHandle<S> {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiTask<S>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns `false` once the UI loop has gone away.
    pub fn run_on_ui<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.tx.send(Box::new(task)).is_ok()
    }
}

/// Outcome of one successful search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub series: PriceSeries,
    /// Metadata failures don't sink the chart; the details tab shows the error.
    pub info: Result<StockInfo, String>,
}

#[derive(Debug)]
pub enum QueueItem {
    Loaded(Box<SearchResult>),
    Shutdown,
}

#[derive(Clone)]
pub struct ResultQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl ResultQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<QueueItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns `false` when the worker has already stopped.
    pub fn push(&self, result: SearchResult) -> bool {
        self.tx.send(QueueItem::Loaded(Box::new(result))).is_ok()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(QueueItem::Shutdown);
    }
}

/// Drains `rx` until the shutdown sentinel (or every sender) is gone,
/// marshalling each result onto the UI loop with `apply`. Returns how many
/// results were handed over.
pub async fn drain_results<S: 'static>(
    mut rx: mpsc::UnboundedReceiver<QueueItem>,
    ui: UiHandle<S>,
    apply: fn(&mut S, SearchResult),
) -> usize {
    let mut delivered = 0;
    while let Some(item) = rx.recv().await {
        match item {
            QueueItem::Shutdown => break,
            QueueItem::Loaded(result) => {
                let symbol = result.series.symbol.clone();
                if ui.run_on_ui(move |state| apply(state, *result)) {
                    delivered += 1;
                } else {
                    debug!("UI closed, discarding result for {}", symbol);
                }
            }
        }
    }
    debug!("Result queue drained");
    delivered
}
