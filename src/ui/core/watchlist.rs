//! In-memory model behind the "My Stocks" table.

use crate::db::WatchlistEntry;
use num_format::{Locale, ToFormattedString};
use std::cmp::Ordering;
use std::collections::HashSet;

pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Symbol,
    Price,
    PeRatio,
    MarketCap,
    FullName,
    Industry,
}

impl Column {
    pub const ALL: [Column; 6] = [
        Column::Symbol,
        Column::Price,
        Column::PeRatio,
        Column::MarketCap,
        Column::FullName,
        Column::Industry,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Column::Symbol => "Symbol",
            Column::Price => "Price",
            Column::PeRatio => "P/E Ratio",
            Column::MarketCap => "Market Cap",
            Column::FullName => "Full Name",
            Column::Industry => "Industry",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Price | Column::PeRatio | Column::MarketCap)
    }

    fn index(&self) -> usize {
        *self as usize
    }

    /// Numeric sort key; missing values sort as +inf.
    fn number(&self, entry: &WatchlistEntry) -> f64 {
        let value = match self {
            Column::Price => Some(entry.price),
            Column::PeRatio => entry.pe_ratio,
            Column::MarketCap => entry.market_cap.map(|m| m as f64),
            _ => None,
        };
        value.unwrap_or(f64::INFINITY)
    }

    pub fn cell(&self, entry: &WatchlistEntry) -> String {
        match self {
            Column::Symbol => entry.symbol.clone(),
            Column::Price => format!("{:.2}", entry.price),
            Column::PeRatio => entry
                .pe_ratio
                .map(|pe| format!("{:.2}", pe))
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            Column::MarketCap => entry
                .market_cap
                .map(|cap| cap.to_formatted_string(&Locale::en))
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            Column::FullName => text_or_na(entry.full_name.as_deref()),
            Column::Industry => text_or_na(entry.industry.as_deref()),
        }
    }

    fn compare(&self, a: &WatchlistEntry, b: &WatchlistEntry) -> Ordering {
        if self.is_numeric() {
            self.number(a).total_cmp(&self.number(b))
        } else {
            self.cell(a).cmp(&self.cell(b))
        }
    }
}

fn text_or_na(value: Option<&str>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or(NOT_AVAILABLE)
        .to_string()
}

#[derive(Debug, Default)]
pub struct WatchlistTable {
    rows: Vec<WatchlistEntry>,
    /// Per column: whether the next sort on it is descending.
    descending: [bool; 6],
    marked: HashSet<String>,
    cursor: usize,
}

impl WatchlistTable {
    #[cfg(test)]
    pub fn from_rows(rows: Vec<WatchlistEntry>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> &[WatchlistEntry] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, entry: WatchlistEntry) {
        self.rows.push(entry);
    }

    pub fn extend(&mut self, entries: Vec<WatchlistEntry>) {
        self.rows.extend(entries);
    }

    /// Stable sort on `column`; each column flips its own direction after
    /// every sort, starting ascending.
    pub fn sort_by(&mut self, column: Column) {
        let descending = self.descending[column.index()];
        let selected = self.selected_symbol().map(str::to_string);

        if descending {
            self.rows.sort_by(|a, b| column.compare(b, a));
        } else {
            self.rows.sort_by(|a, b| column.compare(a, b));
        }
        self.descending[column.index()] = !descending;

        if let Some(symbol) = selected {
            if let Some(pos) = self.rows.iter().position(|r| r.symbol == symbol) {
                self.cursor = pos;
            }
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_down(&mut self) {
        if self.cursor + 1 < self.rows.len() {
            self.cursor += 1;
        }
    }

    pub fn selected_symbol(&self) -> Option<&str> {
        self.rows.get(self.cursor).map(|r| r.symbol.as_str())
    }

    pub fn toggle_mark(&mut self) {
        if let Some(symbol) = self.selected_symbol().map(str::to_string) {
            if !self.marked.remove(&symbol) {
                self.marked.insert(symbol);
            }
        }
    }

    pub fn is_marked(&self, symbol: &str) -> bool {
        self.marked.contains(symbol)
    }

    /// Marked symbols in table order.
    pub fn marked_symbols(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| self.marked.contains(&r.symbol))
            .map(|r| r.symbol.clone())
            .collect()
    }

    pub fn remove(&mut self, symbol: &str) {
        self.rows.retain(|r| r.symbol != symbol);
        self.marked.remove(symbol);
        if self.cursor >= self.rows.len() {
            self.cursor = self.rows.len().saturating_sub(1);
        }
    }
}
