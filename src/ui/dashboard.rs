use crate::api::{Period, PriceSeries, StockInfo};
use crate::data::DataManager;
use crate::db::{WatchlistEntry, WatchlistStore};
use crate::error::ScreenerError;
use crate::ui::core::alerts::{AlertEngine, Notification};
use crate::ui::core::queue::{ResultQueue, SearchResult, UiHandle, UiTask};
use crate::ui::core::watchlist::{Column, WatchlistTable, NOT_AVAILABLE};
use chrono::{DateTime, Local, Utc};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{debug, error, info, warn};
use num_format::{Locale, ToFormattedString};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span, Text},
    widgets::{
        Axis, Block, Borders, Cell, Chart, Clear, Dataset, GraphType, Paragraph, Row, Table, Tabs,
        Wrap,
    },
    Frame, Terminal,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::error::Error;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

type DynError = Box<dyn Error + Send + Sync>;

const SPINNER: [&str; 8] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧"];

const DETAIL_FIELDS: [(&str, &str); 10] = [
    ("Symbol", "symbol"),
    ("Short Name", "shortName"),
    ("Industry", "industry"),
    ("Sector", "sector"),
    ("Market Cap", "marketCap"),
    ("P/E Ratio", "trailingPE"),
    ("Dividend Yield", "dividendYield"),
    ("52 Week High", "fiftyTwoWeekHigh"),
    ("52 Week Low", "fiftyTwoWeekLow"),
    ("Description", "longBusinessSummary"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardView {
    Chart,
    Details,
    Watchlist,
}

impl DashboardView {
    const ALL: [DashboardView; 3] = [
        DashboardView::Chart,
        DashboardView::Details,
        DashboardView::Watchlist,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            DashboardView::Chart => "Chart",
            DashboardView::Details => "Details",
            DashboardView::Watchlist => "My Stocks",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }

    fn next(&self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    fn prev(&self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Symbol,
    TargetPrice,
    WatchlistSymbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dialog {
    pub kind: DialogKind,
    pub title: String,
    pub message: String,
}

/// Collaborators the dashboard talks to.
pub struct Services {
    pub data: DataManager,
    pub store: Arc<dyn WatchlistStore>,
    pub alerts: AlertEngine,
    pub queue: ResultQueue,
    pub ui: UiHandle<Dashboard>,
}

/// All UI state. Only the UI loop mutates it; background work reaches it
/// through [`UiHandle`].
pub struct Dashboard {
    services: Services,
    pub current_view: DashboardView,
    pub input_mode: InputMode,
    pub symbol_input: String,
    pub target_input: String,
    pub watchlist_input: String,
    pub period: Period,
    pub series: Option<PriceSeries>,
    pub details: Vec<(&'static str, String)>,
    pub current_price: Option<f64>,
    pub status: String,
    pub busy: bool,
    pub watchlist: WatchlistTable,
    /// Progress line for watchlist edits, separate from the search status.
    pub watchlist_status: String,
    pub dialogs: VecDeque<Dialog>,
    pub running: bool,
    tick: usize,
}

impl Dashboard {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            current_view: DashboardView::Chart,
            input_mode: InputMode::Normal,
            symbol_input: String::new(),
            target_input: String::new(),
            watchlist_input: String::new(),
            period: Period::OneDay,
            series: None,
            details: Vec::new(),
            current_price: None,
            status: "Ready".to_string(),
            busy: false,
            watchlist: WatchlistTable::default(),
            watchlist_status: String::new(),
            dialogs: VecDeque::new(),
            running: true,
            tick: 0,
        }
    }

    pub async fn run(
        &mut self,
        mut tasks: mpsc::UnboundedReceiver<UiTask<Dashboard>>,
    ) -> Result<(), DynError> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        // Terminal polling blocks; keep it off the async scheduler.
        let outcome = tokio::task::block_in_place(|| self.event_loop(&mut terminal, &mut tasks));

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        outcome
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        tasks: &mut mpsc::UnboundedReceiver<UiTask<Dashboard>>,
    ) -> Result<(), DynError> {
        while self.running {
            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key_input(key);
                    }
                }
            }

            while let Ok(task) = tasks.try_recv() {
                task(self);
            }

            self.tick = self.tick.wrapping_add(1);
            terminal.draw(|f| self.render(f))?;
        }
        Ok(())
    }

    pub fn show_dialog(&mut self, kind: DialogKind, title: &str, message: impl Into<String>) {
        let message = message.into();
        debug!("Dialog [{:?}] {}: {}", kind, title, message);
        self.dialogs.push_back(Dialog {
            kind,
            title: title.to_string(),
            message,
        });
    }

    pub fn load_watchlist(&mut self) {
        match self.services.store.list() {
            Ok(rows) => {
                info!("Loaded {} watchlist rows", rows.len());
                self.watchlist.extend(rows);
            }
            Err(e) => {
                error!("Failed to load watchlist: {}", e);
                self.show_dialog(DialogKind::Error, "Database Error", e.to_string());
            }
        }
    }

    pub fn on_search(&mut self) {
        let symbol = self.symbol_input.trim().to_uppercase();
        if symbol.is_empty() {
            self.show_dialog(DialogKind::Warning, "Input Error", "Please enter a stock symbol.");
            return;
        }
        self.symbol_input = symbol.clone();
        self.status = "Fetching data...".to_string();
        self.busy = true;
        self.fetch_and_enqueue(symbol, self.period);
    }

    pub fn select_period(&mut self, period: Period) {
        self.period = period;
        self.on_search();
    }

    fn fetch_and_enqueue(&self, symbol: String, period: Period) {
        let data = self.services.data.clone();
        let queue = self.services.queue.clone();
        let ui = self.services.ui.clone();

        tokio::spawn(async move {
            match data.fetch_price_series(&symbol, period).await {
                Ok(series) => {
                    let info = data
                        .get_quote_metadata(&symbol)
                        .await
                        .map_err(|e| e.to_string());
                    if !queue.push(SearchResult { series, info }) {
                        debug!("Result queue closed, dropping {} ({})", symbol, period);
                    }
                }
                Err(e) => {
                    warn!("Search for {} ({}) failed: {}", symbol, period, e);
                    let message = e.to_string();
                    ui.run_on_ui(move |dashboard| dashboard.fetch_failed(&message));
                }
            }
        });
    }

    pub fn fetch_failed(&mut self, message: &str) {
        self.status = format!("Error: {}", message);
        self.busy = false;
    }

    /// Marshalled from the queue worker once a search completes.
    pub fn apply_search_result(&mut self, result: SearchResult) {
        let SearchResult { series, info } = result;

        self.details = match info {
            Ok(info) => details_rows(&info),
            Err(e) => vec![("Symbol", series.symbol.clone()), ("Error", e)],
        };
        if let Some(price) = series.last_close() {
            self.update_current_price(&series.symbol, price);
        }
        self.series = Some(series);
        self.status = "Ready".to_string();
        self.busy = false;
    }

    fn update_current_price(&mut self, symbol: &str, price: f64) {
        self.current_price = Some(price);
        if let Some(notification) = self.services.alerts.check_price(symbol, price) {
            self.notify_target_reached(&notification);
        }
    }

    pub fn notify_target_reached(&mut self, notification: &Notification) {
        info!("Target reached: {}", notification.message());
        self.show_dialog(DialogKind::Info, "Target Price Reached", notification.message());
    }

    pub fn set_target_price(&mut self) {
        let target = match self.target_input.trim().parse::<f64>() {
            Ok(target) if target.is_finite() => target,
            _ => {
                self.show_dialog(
                    DialogKind::Error,
                    "Invalid Input",
                    "Please enter a valid number for target price.",
                );
                return;
            }
        };

        let symbol = self.symbol_input.trim().to_uppercase();
        if symbol.is_empty() {
            self.show_dialog(DialogKind::Warning, "Input Error", "Please enter a stock symbol.");
            return;
        }

        let alert = self.services.alerts.set_target(&symbol, target);
        self.show_dialog(
            DialogKind::Info,
            "Target Price Set",
            format!("Target price of {} set for {}", alert.target, alert.symbol),
        );
    }

    pub fn add_to_watchlist(&mut self) {
        let symbol = self.watchlist_input.trim().to_uppercase();
        if symbol.is_empty() {
            self.show_dialog(DialogKind::Warning, "Input Error", "Please enter a stock symbol.");
            return;
        }
        self.watchlist_input.clear();
        self.watchlist_status = format!("Adding {} to watchlist...", symbol);

        let data = self.services.data.clone();
        let store = self.services.store.clone();
        let ui = self.services.ui.clone();

        tokio::spawn(async move {
            let outcome = match build_entry(&data, &symbol).await {
                Ok(entry) => store.add(&entry).map(|_| entry),
                Err(e) => Err(e),
            };
            let outcome = outcome.map_err(|e| {
                warn!("Adding {} to watchlist failed: {}", symbol, e);
                e.to_string()
            });
            ui.run_on_ui(move |dashboard| dashboard.watchlist_added(outcome));
        });
    }

    pub fn watchlist_added(&mut self, outcome: Result<WatchlistEntry, String>) {
        match outcome {
            Ok(entry) => {
                self.watchlist_status = format!("Added {} to watchlist", entry.symbol);
                self.watchlist.push(entry);
            }
            Err(message) => {
                self.watchlist_status.clear();
                self.show_dialog(DialogKind::Error, "Error", message);
            }
        }
    }

    pub fn remove_from_watchlist(&mut self) {
        let symbols = self.watchlist.marked_symbols();
        if symbols.is_empty() {
            self.show_dialog(
                DialogKind::Warning,
                "Selection Error",
                "Please select a stock from your watchlist to remove.",
            );
            return;
        }

        for symbol in symbols {
            match self.services.store.remove(&symbol) {
                Ok(()) => self.watchlist.remove(&symbol),
                Err(e) => {
                    error!("Failed to remove {}: {}", symbol, e);
                    self.show_dialog(
                        DialogKind::Error,
                        "Error",
                        format!("Could not remove {}: {}", symbol, e),
                    );
                }
            }
        }
    }

    /// Loads the highlighted watchlist symbol into the chart view.
    pub fn open_selected(&mut self) {
        let Some(symbol) = self.watchlist.selected_symbol().map(str::to_string) else {
            return;
        };
        self.symbol_input = symbol;
        self.on_search();
        self.current_view = DashboardView::Chart;
    }

    pub fn sort_watchlist(&mut self, column: Column) {
        self.watchlist.sort_by(column);
    }

    pub fn handle_key_input(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.running = false;
            return;
        }

        if !self.dialogs.is_empty() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                self.dialogs.pop_front();
            }
            return;
        }

        if self.input_mode != InputMode::Normal {
            self.handle_text_input(key);
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.running = false,
            KeyCode::Tab => self.current_view = self.current_view.next(),
            KeyCode::BackTab => self.current_view = self.current_view.prev(),
            _ => match self.current_view {
                DashboardView::Chart => self.handle_chart_key(key),
                DashboardView::Details => {}
                DashboardView::Watchlist => self.handle_watchlist_key(key),
            },
        }
    }

    fn handle_chart_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('/') | KeyCode::Char('s') => self.input_mode = InputMode::Symbol,
            KeyCode::Char('t') => self.input_mode = InputMode::TargetPrice,
            KeyCode::Enter => self.on_search(),
            KeyCode::Left => self.select_period(self.period.prev()),
            KeyCode::Right => self.select_period(self.period.next()),
            KeyCode::Char(c @ '1'..='8') => {
                let index = c as usize - '1' as usize;
                self.select_period(Period::ALL[index]);
            }
            _ => {}
        }
    }

    fn handle_watchlist_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('a') => self.input_mode = InputMode::WatchlistSymbol,
            KeyCode::Char(' ') => self.watchlist.toggle_mark(),
            KeyCode::Char('d') | KeyCode::Delete => self.remove_from_watchlist(),
            KeyCode::Enter => self.open_selected(),
            KeyCode::Up => self.watchlist.move_up(),
            KeyCode::Down => self.watchlist.move_down(),
            KeyCode::Char(c @ '1'..='6') => {
                let index = c as usize - '1' as usize;
                self.sort_watchlist(Column::ALL[index]);
            }
            _ => {}
        }
    }

    fn handle_text_input(&mut self, key: KeyEvent) {
        let mode = self.input_mode;
        let buffer = match mode {
            InputMode::Symbol => &mut self.symbol_input,
            InputMode::TargetPrice => &mut self.target_input,
            InputMode::WatchlistSymbol => &mut self.watchlist_input,
            InputMode::Normal => return,
        };

        match key.code {
            KeyCode::Char(c) => buffer.push(c),
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Esc => self.input_mode = InputMode::Normal,
            KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
                match mode {
                    InputMode::Symbol => self.on_search(),
                    InputMode::TargetPrice => self.set_target_price(),
                    InputMode::WatchlistSymbol => self.add_to_watchlist(),
                    InputMode::Normal => {}
                }
            }
            _ => {}
        }
    }

    fn render(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(3),
            ])
            .split(f.size());

        self.render_header(f, chunks[0]);
        self.render_tabs(f, chunks[1]);
        self.render_main_content(f, chunks[2]);
        self.render_footer(f, chunks[3]);

        if let Some(dialog) = self.dialogs.front() {
            self.render_dialog(f, dialog);
        }
    }

    fn render_header(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        let target = match self.services.alerts.target() {
            Some(alert) => format!("{} ≤ {:.2}", alert.symbol, alert.target),
            None => "none".to_string(),
        };

        let header = Paragraph::new(Text::from(vec![
            Line::from(vec![Span::styled(
                "STOCK SCREENER ",
                Style::default()
                    .fg(Color::LightCyan)
                    .add_modifier(Modifier::BOLD),
            )]),
            Line::from(Span::styled(
                format!(
                    "Last update: {} | Target: {} | Watchlist: {}",
                    Local::now().format("%H:%M:%S"),
                    target,
                    self.watchlist.len()
                ),
                Style::default().fg(Color::Gray),
            )),
        ]))
        .block(Block::default().borders(Borders::BOTTOM));

        f.render_widget(header, area);
    }

    fn render_tabs(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        let titles = DashboardView::ALL
            .iter()
            .map(|view| Line::from(view.title()))
            .collect::<Vec<_>>();

        let tabs = Tabs::new(titles)
            .block(Block::default().borders(Borders::ALL))
            .select(self.current_view.index())
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            );

        f.render_widget(tabs, area);
    }

    fn render_main_content(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        match self.current_view {
            DashboardView::Chart => self.render_chart_view(f, area),
            DashboardView::Details => self.render_details_view(f, area),
            DashboardView::Watchlist => self.render_watchlist_view(f, area),
        }
    }

    fn render_chart_view(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(1),
                Constraint::Min(6),
                Constraint::Length(3),
                Constraint::Length(1),
            ])
            .split(area);

        let inputs = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[0]);

        self.render_input(f, inputs[0], "Stock Symbol", &self.symbol_input, InputMode::Symbol);
        self.render_input(f, inputs[1], "Target Price", &self.target_input, InputMode::TargetPrice);

        let price_label = match self.current_price {
            Some(price) => format!("Current Price: {:.2}", price),
            None => "Current Price: N/A".to_string(),
        };
        f.render_widget(
            Paragraph::new(Span::styled(
                price_label,
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )),
            chunks[1],
        );

        self.render_price_chart(f, chunks[2]);

        let periods = Period::ALL
            .iter()
            .enumerate()
            .map(|(i, p)| Line::from(format!("{} {}", i + 1, p.label())))
            .collect::<Vec<_>>();
        let period_tabs = Tabs::new(periods)
            .block(Block::default().borders(Borders::ALL).title("Period"))
            .select(self.period.index())
            .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
        f.render_widget(period_tabs, chunks[3]);

        self.render_status(f, chunks[4]);
    }

    fn render_input(
        &self,
        f: &mut Frame<CrosstermBackend<io::Stdout>>,
        area: Rect,
        title: &str,
        value: &str,
        mode: InputMode,
    ) {
        let editing = self.input_mode == mode;
        let (text, border) = if editing {
            (format!("{}█", value), Style::default().fg(Color::Yellow))
        } else {
            (value.to_string(), Style::default())
        };

        let input = Paragraph::new(text).block(
            Block::default()
                .borders(Borders::ALL)
                .title(title.to_string())
                .border_style(border),
        );
        f.render_widget(input, area);
    }

    fn render_status(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        let mut spans = Vec::new();
        if self.busy {
            spans.push(Span::styled(
                format!("{} ", SPINNER[self.tick % SPINNER.len()]),
                Style::default().fg(Color::Cyan),
            ));
        }
        let color = if self.status.starts_with("Error") {
            Color::Red
        } else {
            Color::Gray
        };
        spans.push(Span::styled(self.status.clone(), Style::default().fg(color)));

        f.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn render_price_chart(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        let Some(series) = self.series.as_ref() else {
            let message = Paragraph::new("Enter a symbol and press Enter to load a chart")
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL).title("Chart"));
            f.render_widget(message, area);
            return;
        };

        let Some((min_price, max_price)) = series.min_max() else {
            let message = Paragraph::new("Insufficient data for chart")
                .block(Block::default().borders(Borders::ALL));
            f.render_widget(message, area);
            return;
        };

        let data: Vec<(f64, f64)> = series
            .points
            .iter()
            .map(|p| (p.time.timestamp() as f64, p.close))
            .collect();

        let pad = ((max_price - min_price) * 0.05).max(max_price.abs() * 0.01).max(0.01);
        let (y_min, y_max) = (min_price - pad, max_price + pad);
        let x_min = data.first().map(|d| d.0).unwrap_or_default();
        let x_max = data.last().map(|d| d.0).unwrap_or_default().max(x_min + 1.0);

        let first = series.points.first().map(|p| p.time);
        let last = series.points.last().map(|p| p.time);
        let middle = series.points.get(series.points.len() / 2).map(|p| p.time);
        let x_labels = [first, middle, last]
            .into_iter()
            .flatten()
            .map(|ts| Span::raw(axis_label(ts, series.period)))
            .collect::<Vec<_>>();

        let datasets = vec![Dataset::default()
            .name(format!("{} ({})", series.symbol, series.period))
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::LightBlue))
            .data(&data)];

        let chart = Chart::new(datasets)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("{} Stock Price ({})", series.symbol, series.period)),
            )
            .x_axis(
                Axis::default()
                    .style(Style::default().fg(Color::Gray))
                    .bounds([x_min, x_max])
                    .labels(x_labels),
            )
            .y_axis(
                Axis::default()
                    .style(Style::default().fg(Color::Gray))
                    .bounds([y_min, y_max])
                    .labels(vec![
                        Span::raw(format!("{:.2}", y_min)),
                        Span::raw(format!("{:.2}", (y_min + y_max) / 2.0)),
                        Span::raw(format!("{:.2}", y_max)),
                    ]),
            );

        f.render_widget(chart, area);
    }

    fn render_details_view(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        if self.details.is_empty() {
            let message = Paragraph::new("Search for a symbol to see its details")
                .block(Block::default().borders(Borders::ALL).title("Details"));
            f.render_widget(message, area);
            return;
        }

        let (description, attributes): (Vec<_>, Vec<_>) = self
            .details
            .iter()
            .partition(|(attribute, _)| *attribute == "Description");

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(attributes.len() as u16 + 3),
                Constraint::Min(3),
            ])
            .split(area);

        let rows = attributes.iter().map(|(attribute, value)| {
            Row::new(vec![
                Cell::from(*attribute),
                Cell::from(value.clone()),
            ])
        });

        let widths = [Constraint::Length(16), Constraint::Min(20)];
        let table = Table::new(rows)
            .header(
                Row::new(vec!["Attribute", "Value"])
                    .style(Style::default().add_modifier(Modifier::BOLD)),
            )
            .block(Block::default().borders(Borders::ALL).title("Details"))
            .widths(&widths);
        f.render_widget(table, chunks[0]);

        let text = description
            .first()
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        let summary = Paragraph::new(text)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Description"));
        f.render_widget(summary, chunks[1]);
    }

    fn render_watchlist_view(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(1),
            ])
            .split(area);

        self.render_input(
            f,
            chunks[0],
            "Add Symbol",
            &self.watchlist_input,
            InputMode::WatchlistSymbol,
        );
        f.render_widget(
            Paragraph::new(Span::styled(
                self.watchlist_status.clone(),
                Style::default().fg(Color::Gray),
            )),
            chunks[2],
        );

        let block = Block::default().borders(Borders::ALL).title("My Stocks");
        let inner_area = block.inner(chunks[1]);
        f.render_widget(block, chunks[1]);

        if inner_area.height < 3 || inner_area.width < 30 {
            return;
        }
        if self.watchlist.is_empty() {
            let message = Paragraph::new("Your watchlist is empty. Press 'a' to add a symbol.")
                .style(Style::default().fg(Color::Gray));
            f.render_widget(message, inner_area);
            return;
        }

        let cursor = self.watchlist.cursor();
        let rows = self.watchlist.rows().iter().enumerate().map(|(i, entry)| {
            let marked = self.watchlist.is_marked(&entry.symbol);
            let cells = Column::ALL.iter().map(|column| {
                let text = column.cell(entry);
                if *column == Column::Symbol && marked {
                    Cell::from(format!("* {}", text))
                } else {
                    Cell::from(text)
                }
            });

            let style = if i == cursor {
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else if marked {
                Style::default().fg(Color::LightMagenta)
            } else {
                Style::default()
            };
            Row::new(cells.collect::<Vec<_>>()).style(style)
        });

        let header = Column::ALL
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} {}", i + 1, column.title()))
            .collect::<Vec<_>>();

        let widths = [
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(20),
            Constraint::Min(20),
            Constraint::Min(16),
        ];
        let table = Table::new(rows)
            .header(Row::new(header).style(Style::default().add_modifier(Modifier::BOLD)))
            .widths(&widths);

        f.render_widget(table, inner_area);
    }

    fn render_footer(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, area: Rect) {
        let key = |k: &'static str| Span::styled(k, Style::default().add_modifier(Modifier::BOLD));

        let controls = if self.input_mode != InputMode::Normal {
            vec![
                Span::raw("Editing: "),
                key("Enter"),
                Span::raw(" Submit  "),
                key("Esc"),
                Span::raw(" Cancel"),
            ]
        } else {
            match self.current_view {
                DashboardView::Chart => vec![
                    Span::raw("Controls: "),
                    key("/"),
                    Span::raw(" Symbol  "),
                    key("Enter"),
                    Span::raw(" Search  "),
                    key("1-8 ←/→"),
                    Span::raw(" Period  "),
                    key("t"),
                    Span::raw(" Target  "),
                    key("Tab"),
                    Span::raw(" Next tab  "),
                    key("q"),
                    Span::raw(" Quit"),
                ],
                DashboardView::Details => vec![
                    Span::raw("Controls: "),
                    key("Tab"),
                    Span::raw(" Next tab  "),
                    key("q"),
                    Span::raw(" Quit"),
                ],
                DashboardView::Watchlist => vec![
                    Span::raw("Controls: "),
                    key("↑/↓"),
                    Span::raw(" Navigate  "),
                    key("a"),
                    Span::raw(" Add  "),
                    key("Space"),
                    Span::raw(" Mark  "),
                    key("d"),
                    Span::raw(" Remove  "),
                    key("Enter"),
                    Span::raw(" Chart  "),
                    key("1-6"),
                    Span::raw(" Sort  "),
                    key("q"),
                    Span::raw(" Quit"),
                ],
            }
        };

        let footer = Paragraph::new(Line::from(controls))
            .style(Style::default().fg(Color::Gray))
            .block(Block::default().borders(Borders::TOP));

        f.render_widget(footer, area);
    }

    fn render_dialog(&self, f: &mut Frame<CrosstermBackend<io::Stdout>>, dialog: &Dialog) {
        let area = centered_rect(50, 30, f.size());
        f.render_widget(Clear, area);

        let color = match dialog.kind {
            DialogKind::Info => Color::Cyan,
            DialogKind::Warning => Color::Yellow,
            DialogKind::Error => Color::Red,
        };

        let lines = vec![
            Line::from(""),
            Line::from(format!("  {}", dialog.message)),
            Line::from(""),
            Line::from(Span::styled(
                "  Press Enter to close",
                Style::default().fg(Color::DarkGray),
            )),
        ];

        let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", dialog.title))
                .border_style(Style::default().fg(color)),
        );
        f.render_widget(paragraph, area);
    }
}

async fn build_entry(data: &DataManager, symbol: &str) -> Result<WatchlistEntry, ScreenerError> {
    let info = data.get_quote_metadata(symbol).await?;
    let price = data.get_latest_price(symbol).await.ok_or_else(|| {
        ScreenerError::Data("Unable to fetch data for this symbol.".to_string())
    })?;

    Ok(WatchlistEntry {
        symbol: symbol.to_string(),
        price,
        pe_ratio: info.f64("trailingPE"),
        market_cap: info.i64("marketCap"),
        full_name: info
            .str("longName")
            .or_else(|| info.str("shortName"))
            .map(str::to_string),
        industry: info.str("industry").map(str::to_string),
    })
}

pub fn details_rows(info: &StockInfo) -> Vec<(&'static str, String)> {
    DETAIL_FIELDS
        .iter()
        .map(|(label, key)| {
            let value = info
                .get(key)
                .map(format_value)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string());
            (*label, value)
        })
        .collect()
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_formatted_string(&Locale::en)
            } else {
                let num = n.as_f64().unwrap_or_default();
                if num.abs() >= 1.0 {
                    format!("{:.2}", num)
                } else {
                    format!("{:.4}", num)
                }
            }
        }
        other => other.to_string(),
    }
}

fn axis_label(ts: DateTime<Utc>, period: Period) -> String {
    let local = ts.with_timezone(&Local);
    match period {
        Period::OneDay => local.format("%H:%M").to_string(),
        _ => local.format("%Y-%m-%d").to_string(),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Bar, BarTime, PricePoint};
    use crate::data::mock::MockMarket;
    use crate::db::SqliteStore;
    use crate::ui::core::queue::QueueItem;
    use serde_json::json;

    struct Harness {
        dashboard: Dashboard,
        mock: Arc<MockMarket>,
        store: Arc<SqliteStore>,
        tasks: mpsc::UnboundedReceiver<UiTask<Dashboard>>,
        queue_rx: mpsc::UnboundedReceiver<QueueItem>,
    }

    impl Harness {
        fn new() -> Self {
            let mock = Arc::new(MockMarket::default());
            let store = Arc::new(SqliteStore::open_in_memory().unwrap());
            let (ui, tasks) = UiHandle::channel();
            let (queue, queue_rx) = ResultQueue::channel();
            let dashboard = Dashboard::new(Services {
                data: DataManager::new(mock.clone(), Duration::from_secs(60), 8),
                store: store.clone(),
                alerts: AlertEngine::default(),
                queue,
                ui,
            });
            Self { dashboard, mock, store, tasks, queue_rx }
        }

        /// Applies the next task the background work schedules on the UI.
        async fn apply_next_task(&mut self) {
            let task = self.tasks.recv().await.unwrap();
            task(&mut self.dashboard);
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn apple_info() -> StockInfo {
        let mut info = StockInfo::default();
        info.insert("symbol", json!("AAPL"));
        info.insert("longName", json!("Apple Inc."));
        info.insert("industry", json!("Consumer Electronics"));
        info.insert("trailingPE", json!(29.5));
        info.insert("marketCap", json!(2_950_000_000_000_i64));
        info
    }

    fn result(symbol: &str, close: f64) -> SearchResult {
        SearchResult {
            series: PriceSeries {
                symbol: symbol.to_string(),
                period: Period::OneMonth,
                points: vec![PricePoint { time: Utc::now(), close }],
            },
            info: Ok(apple_info()),
        }
    }

    #[test]
    fn details_fill_missing_fields() {
        let rows = details_rows(&apple_info());
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0], ("Symbol", "AAPL".to_string()));
        assert_eq!(rows[3], ("Sector", "N/A".to_string()));
        assert_eq!(rows[4], ("Market Cap", "2,950,000,000,000".to_string()));
        assert_eq!(rows[5], ("P/E Ratio", "29.50".to_string()));
    }

    #[tokio::test]
    async fn search_requires_symbol() {
        let mut h = Harness::new();
        h.dashboard.on_search();

        assert!(!h.dashboard.busy);
        assert_eq!(h.dashboard.dialogs[0].message, "Please enter a stock symbol.");
    }

    #[tokio::test]
    async fn search_result_travels_through_queue() {
        let mut h = Harness::new();
        *h.mock.bars.lock().unwrap() = Some(vec![Bar {
            time: BarTime::Datetime(Utc::now()),
            close: Some(189.5),
        }]);
        *h.mock.info.lock().unwrap() = Some(apple_info());

        h.dashboard.symbol_input = "aapl".to_string();
        h.dashboard.on_search();
        assert!(h.dashboard.busy);
        assert_eq!(h.dashboard.status, "Fetching data...");
        assert_eq!(h.dashboard.symbol_input, "AAPL");

        let item = h.queue_rx.recv().await.unwrap();
        let QueueItem::Loaded(result) = item else {
            panic!("expected a loaded result");
        };
        h.dashboard.apply_search_result(*result);

        assert!(!h.dashboard.busy);
        assert_eq!(h.dashboard.status, "Ready");
        assert_eq!(h.dashboard.current_price, Some(189.5));
        assert_eq!(h.dashboard.details[1].1, "N/A");
    }

    #[tokio::test]
    async fn failed_search_reports_error() {
        let mut h = Harness::new();
        h.dashboard.symbol_input = "ZZZZ".to_string();
        h.dashboard.on_search();

        h.apply_next_task().await;
        assert!(!h.dashboard.busy);
        assert!(h.dashboard.status.starts_with("Error: Failed to fetch data"));
    }

    #[tokio::test]
    async fn search_result_below_target_notifies() {
        let mut h = Harness::new();
        h.dashboard.symbol_input = "AAPL".to_string();
        h.dashboard.target_input = "190".to_string();
        h.dashboard.set_target_price();
        h.dashboard.dialogs.clear();

        h.dashboard.apply_search_result(result("AAPL", 185.0));
        assert_eq!(h.dashboard.dialogs.len(), 1);
        assert_eq!(h.dashboard.dialogs[0].title, "Target Price Reached");

        h.dashboard.apply_search_result(result("MSFT", 100.0));
        h.dashboard.apply_search_result(result("AAPL", 195.0));
        assert_eq!(h.dashboard.dialogs.len(), 1);
    }

    #[tokio::test]
    async fn invalid_target_is_rejected() {
        let mut h = Harness::new();
        h.dashboard.symbol_input = "AAPL".to_string();
        h.dashboard.target_input = "abc".to_string();
        h.dashboard.set_target_price();

        assert_eq!(h.dashboard.dialogs[0].kind, DialogKind::Error);
        assert_eq!(h.dashboard.dialogs[0].title, "Invalid Input");
        assert!(h.dashboard.services.alerts.target().is_none());
    }

    #[tokio::test]
    async fn valid_target_is_confirmed() {
        let mut h = Harness::new();
        h.dashboard.symbol_input = "aapl".to_string();
        h.dashboard.target_input = "180.5".to_string();
        h.dashboard.set_target_price();

        assert_eq!(h.dashboard.dialogs[0].message, "Target price of 180.5 set for AAPL");
        assert_eq!(h.dashboard.services.alerts.target().unwrap().symbol, "AAPL");
    }

    #[tokio::test]
    async fn adding_persists_and_shows_row() {
        let mut h = Harness::new();
        *h.mock.info.lock().unwrap() = Some(apple_info());
        h.mock.set_price(Some(189.5));

        h.dashboard.watchlist_input = "aapl".to_string();
        h.dashboard.add_to_watchlist();
        h.apply_next_task().await;

        assert_eq!(h.dashboard.watchlist.len(), 1);
        assert_eq!(h.dashboard.watchlist_status, "Added AAPL to watchlist");
        let stored = h.store.list().unwrap();
        assert_eq!(stored[0].symbol, "AAPL");
        assert_eq!(stored[0].full_name.as_deref(), Some("Apple Inc."));
        assert_eq!(stored[0].market_cap, Some(2_950_000_000_000));
    }

    #[tokio::test]
    async fn adding_during_search_keeps_search_status() {
        let mut h = Harness::new();
        *h.mock.info.lock().unwrap() = Some(apple_info());
        h.mock.set_price(Some(189.5));

        h.dashboard.symbol_input = "MSFT".to_string();
        h.dashboard.on_search();
        h.dashboard.watchlist_input = "AAPL".to_string();
        h.dashboard.add_to_watchlist();

        assert!(h.dashboard.busy);
        assert_eq!(h.dashboard.status, "Fetching data...");
        assert_eq!(h.dashboard.watchlist_status, "Adding AAPL to watchlist...");

        // The search fails (no bars scripted) and the add succeeds, in either order.
        h.apply_next_task().await;
        h.apply_next_task().await;

        assert_eq!(h.dashboard.watchlist.len(), 1);
        assert_eq!(h.dashboard.watchlist_status, "Added AAPL to watchlist");
        assert!(h.dashboard.status.starts_with("Error: Failed to fetch data"));
    }

    #[tokio::test]
    async fn adding_duplicate_shows_error() {
        let mut h = Harness::new();
        *h.mock.info.lock().unwrap() = Some(apple_info());
        h.mock.set_price(Some(189.5));

        for _ in 0..2 {
            h.dashboard.watchlist_input = "AAPL".to_string();
            h.dashboard.add_to_watchlist();
            h.apply_next_task().await;
        }

        assert_eq!(h.dashboard.watchlist.len(), 1);
        assert_eq!(h.dashboard.dialogs.len(), 1);
        assert_eq!(h.dashboard.dialogs[0].kind, DialogKind::Error);
        assert!(h.dashboard.dialogs[0].message.contains("already in the watchlist"));
    }

    #[tokio::test]
    async fn adding_without_price_fails() {
        let mut h = Harness::new();
        *h.mock.info.lock().unwrap() = Some(apple_info());

        h.dashboard.watchlist_input = "AAPL".to_string();
        h.dashboard.add_to_watchlist();
        h.apply_next_task().await;

        assert!(h.dashboard.watchlist.is_empty());
        assert_eq!(h.dashboard.dialogs[0].message, "Unable to fetch data for this symbol.");
    }

    #[tokio::test]
    async fn removing_marked_rows() {
        let mut h = Harness::new();
        for symbol in ["AAPL", "MSFT"] {
            h.store
                .add(&WatchlistEntry {
                    symbol: symbol.to_string(),
                    price: 1.0,
                    pe_ratio: None,
                    market_cap: None,
                    full_name: None,
                    industry: None,
                })
                .unwrap();
        }
        h.dashboard.load_watchlist();

        h.dashboard.remove_from_watchlist();
        assert_eq!(h.dashboard.dialogs[0].title, "Selection Error");

        h.dashboard.dialogs.clear();
        h.dashboard.current_view = DashboardView::Watchlist;
        h.dashboard.handle_key_input(key(KeyCode::Char(' ')));
        h.dashboard.handle_key_input(key(KeyCode::Char('d')));

        assert_eq!(h.dashboard.watchlist.len(), 1);
        assert_eq!(h.store.list().unwrap()[0].symbol, "MSFT");
    }

    #[tokio::test]
    async fn opening_row_searches_it() {
        let mut h = Harness::new();
        h.dashboard.watchlist.push(WatchlistEntry {
            symbol: "NVDA".to_string(),
            price: 880.0,
            pe_ratio: None,
            market_cap: None,
            full_name: None,
            industry: None,
        });
        h.dashboard.current_view = DashboardView::Watchlist;

        h.dashboard.handle_key_input(key(KeyCode::Enter));

        assert_eq!(h.dashboard.current_view, DashboardView::Chart);
        assert_eq!(h.dashboard.symbol_input, "NVDA");
        assert!(h.dashboard.busy);
    }

    #[tokio::test]
    async fn keys_edit_and_submit_target() {
        let mut h = Harness::new();
        h.dashboard.symbol_input = "AAPL".to_string();

        h.dashboard.handle_key_input(key(KeyCode::Char('t')));
        assert_eq!(h.dashboard.input_mode, InputMode::TargetPrice);
        for c in "175".chars() {
            h.dashboard.handle_key_input(key(KeyCode::Char(c)));
        }
        h.dashboard.handle_key_input(key(KeyCode::Enter));

        assert_eq!(h.dashboard.input_mode, InputMode::Normal);
        assert_eq!(h.dashboard.services.alerts.target().unwrap().target, 175.0);

        // Dialog swallows keys until dismissed.
        h.dashboard.handle_key_input(key(KeyCode::Char('q')));
        assert!(h.dashboard.running);
        h.dashboard.handle_key_input(key(KeyCode::Esc));
        h.dashboard.handle_key_input(key(KeyCode::Char('q')));
        assert!(!h.dashboard.running);
    }

    #[tokio::test]
    async fn period_keys_trigger_search() {
        let mut h = Harness::new();
        h.dashboard.symbol_input = "AAPL".to_string();

        h.dashboard.handle_key_input(key(KeyCode::Char('3')));
        assert_eq!(h.dashboard.period, Period::OneMonth);
        assert!(h.dashboard.busy);

        h.dashboard.handle_key_input(key(KeyCode::Left));
        assert_eq!(h.dashboard.period, Period::FiveDays);
    }
}
