//! SQLite-backed watchlist.
//!
//! A store that failed to connect stays usable: every operation on it is a
//! no-op and `list` returns nothing.

use super::{WatchlistEntry, WatchlistStore};
use crate::error::{Result, ScreenerError};
use log::{debug, info};
use rusqlite::{params, Connection, ErrorCode};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS watchlist (
        symbol TEXT PRIMARY KEY,
        price REAL,
        pe_ratio REAL,
        market_cap INTEGER,
        full_name TEXT,
        industry TEXT
    )";

pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and make sure the table exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        info!("Opened watchlist database at {}", path.display());
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Store with no connection behind it.
    pub fn disconnected() -> Self {
        Self {
            conn: Mutex::new(None),
        }
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl WatchlistStore for SqliteStore {
    fn add(&self, entry: &WatchlistEntry) -> Result<()> {
        let guard = self.lock();
        let Some(conn) = guard.as_ref() else {
            return Ok(());
        };

        let inserted = conn.execute(
            "INSERT INTO watchlist (symbol, price, pe_ratio, market_cap, full_name, industry)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.symbol,
                entry.price,
                entry.pe_ratio,
                entry.market_cap,
                entry.full_name,
                entry.industry,
            ],
        );

        match inserted {
            Ok(_) => {
                debug!("Added {} to watchlist", entry.symbol);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(ScreenerError::DuplicateSymbol(entry.symbol.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, symbol: &str) -> Result<()> {
        let guard = self.lock();
        if let Some(conn) = guard.as_ref() {
            let removed = conn.execute("DELETE FROM watchlist WHERE symbol = ?1", params![symbol])?;
            debug!("Removed {} row(s) for {}", removed, symbol);
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<WatchlistEntry>> {
        let guard = self.lock();
        let Some(conn) = guard.as_ref() else {
            return Ok(Vec::new());
        };

        let mut stmt = conn.prepare(
            "SELECT symbol, price, pe_ratio, market_cap, full_name, industry
             FROM watchlist ORDER BY rowid",
        )?;

        let entries = stmt
            .query_map([], |row| {
                Ok(WatchlistEntry {
                    symbol: row.get(0)?,
                    price: row.get::<_, Option<f64>>(1)?.unwrap_or_default(),
                    pe_ratio: row.get(2)?,
                    market_cap: row.get(3)?,
                    full_name: row.get(4)?,
                    industry: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn close(&self) {
        if self.lock().take().is_some() {
            info!("Closed watchlist database");
        }
    }
}
