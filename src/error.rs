use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScreenerError {
    #[error("{0}")]
    Data(String),

    #[error("Symbol {0} is already in the watchlist")]
    DuplicateSymbol(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScreenerError>;
