//! Watchlist persistence.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;

/// One persisted watchlist row.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchlistEntry {
    pub symbol: String,
    pub price: f64,
    pub pe_ratio: Option<f64>,
    pub market_cap: Option<i64>,
    pub full_name: Option<String>,
    pub industry: Option<String>,
}

/// CRUD over the watchlist table, keyed by symbol.
pub trait WatchlistStore: Send + Sync {
    /// Fails with `DuplicateSymbol` when the symbol is already stored.
    fn add(&self, entry: &WatchlistEntry) -> Result<()>;

    /// Removing an unknown symbol is not an error.
    fn remove(&self, symbol: &str) -> Result<()>;

    fn list(&self) -> Result<Vec<WatchlistEntry>>;

    fn close(&self);
}
