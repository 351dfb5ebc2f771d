use anyhow::Result;
use arboard::Clipboard;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, Row, Table, TableState},
};
use std::io::stdout;
use tracing::warn;

use crate::backend::{Action, Dispatcher, Outcome, POLL_INTERVAL};
use crate::models::Listing;
use crate::store::LedgerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Company,
    Role,
    Source,
    Location,
}

impl Column {
    const ALL: [Column; 4] = [Column::Company, Column::Role, Column::Source, Column::Location];

    fn title(&self) -> &'static str {
        match self {
            Column::Company => "Company",
            Column::Role => "Role",
            Column::Source => "Source",
            Column::Location => "Location",
        }
    }

    fn value<'a>(&self, listing: &'a Listing) -> &'a str {
        match self {
            Column::Company => &listing.company_name,
            Column::Role => &listing.job_title,
            Column::Source => &listing.source,
            Column::Location => &listing.location,
        }
    }

    fn next(&self) -> Column {
        let idx = Column::ALL.iter().position(|c| c == self).unwrap_or(0);
        Column::ALL[(idx + 1) % Column::ALL.len()]
    }
}

/// Side effect requested by a key press, carried out by the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Nothing,
    Quit,
    Refresh { bypass_cache: bool },
    Record(Action, Listing),
    OpenUrl(String),
    CopyUrl(String),
}

struct AppState {
    listings: Vec<Listing>,
    selected: usize,
    applied_count: usize,
    sort: Option<(Column, bool)>,
    message: String,
    last_refresh: Option<String>,
}

impl AppState {
    fn new() -> Self {
        Self {
            listings: Vec::new(),
            selected: 0,
            applied_count: 0,
            sort: None,
            message: "Loading....".to_string(),
            last_refresh: None,
        }
    }

    fn current(&self) -> Option<&Listing> {
        self.listings.get(self.selected)
    }

    fn next(&mut self) {
        if !self.listings.is_empty() && self.selected < self.listings.len() - 1 {
            self.selected += 1;
        }
    }

    fn prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    fn apply_sort(&mut self) {
        if let Some((column, descending)) = self.sort {
            self.listings
                .sort_by(|a, b| column.value(a).cmp(column.value(b)));
            if descending {
                self.listings.reverse();
            }
        }
    }

    fn cycle_sort(&mut self) {
        self.sort = Some(match self.sort {
            None => (Column::Company, false),
            Some((column, _)) => (column.next(), false),
        });
        self.apply_sort();
    }

    fn reverse_sort(&mut self) {
        if let Some((column, descending)) = self.sort {
            self.sort = Some((column, !descending));
            self.apply_sort();
        }
    }

    /// Navigation and sorting apply immediately. Refresh and record are
    /// dropped while the backend is busy.
    fn handle_key(&mut self, code: KeyCode, busy: bool) -> Command {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => Command::Quit,
            KeyCode::Down | KeyCode::Char('j') => {
                self.next();
                Command::Nothing
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.prev();
                Command::Nothing
            }
            KeyCode::Char('s') => {
                self.cycle_sort();
                Command::Nothing
            }
            KeyCode::Char('S') => {
                self.reverse_sort();
                Command::Nothing
            }
            KeyCode::Enter | KeyCode::Char('o') => self
                .current()
                .map(|l| Command::OpenUrl(l.url.clone()))
                .unwrap_or(Command::Nothing),
            KeyCode::Char('y') => self
                .current()
                .map(|l| Command::CopyUrl(l.url.clone()))
                .unwrap_or(Command::Nothing),
            KeyCode::Char('r') | KeyCode::Char('R') if !busy => {
                let bypass_cache = code == KeyCode::Char('R');
                self.message = if bypass_cache {
                    "Loading (bypassing cache)....".to_string()
                } else {
                    "Loading....".to_string()
                };
                Command::Refresh { bypass_cache }
            }
            KeyCode::Char('a') | KeyCode::Char('d') if !busy => {
                let action = if code == KeyCode::Char('a') {
                    Action::Applied
                } else {
                    Action::Discarded
                };
                let Some(listing) = self.current().cloned() else {
                    return Command::Nothing;
                };
                self.message = format!("Saving {}...", listing.company_name);
                self.listings.remove(self.selected);
                if self.selected >= self.listings.len() {
                    self.selected = self.listings.len().saturating_sub(1);
                }
                Command::Record(action, listing)
            }
            _ => Command::Nothing,
        }
    }

    fn sync<S: LedgerStore + 'static>(&mut self, dispatcher: &Dispatcher<S>) {
        dispatcher.with_backend(|backend| {
            self.listings = backend.working_set().to_vec();
            self.applied_count = backend.applied_count();
            self.last_refresh = backend
                .last_refresh()
                .map(|t| t.format("%H:%M:%S").to_string());
        });
        self.apply_sort();
        if self.selected >= self.listings.len() {
            self.selected = self.listings.len().saturating_sub(1);
        }
    }
}

pub fn run_browse<S: LedgerStore + 'static>(dispatcher: &mut Dispatcher<S>) -> Result<()> {
    let mut state = AppState::new();
    dispatcher.start_refresh(false);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, dispatcher);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop<S: LedgerStore + 'static>(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    dispatcher: &mut Dispatcher<S>,
) -> Result<()> {
    let mut table_state = TableState::default();
    let mut clipboard: Option<Clipboard> = None;

    loop {
        if let Some(outcome) = dispatcher.poll() {
            state.message = match outcome {
                Ok(Outcome::Refreshed { to_review }) => format!("Refreshed, {} to review", to_review),
                Ok(Outcome::Recorded { action, row }) => {
                    format!("{} {} - {} (row {})", action.label(), row.company_name, row.job_title, row.row_id)
                }
                Err(e) => format!("Error: {}", e),
            };
            state.sync(dispatcher);
        }

        table_state.select(if state.listings.is_empty() { None } else { Some(state.selected) });
        let busy = dispatcher.is_busy();
        terminal.draw(|frame| draw(frame, state, &mut table_state, busy))?;

        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match state.handle_key(key.code, busy) {
            Command::Nothing => {}
            Command::Quit => {
                if busy {
                    state.message = "Waiting for the running operation...".to_string();
                    terminal.draw(|frame| draw(frame, state, &mut table_state, true))?;
                    dispatcher.wait(|| {});
                }
                break;
            }
            Command::Refresh { bypass_cache } => {
                dispatcher.start_refresh(bypass_cache);
            }
            Command::Record(action, listing) => {
                dispatcher.start_record(action, listing);
            }
            Command::OpenUrl(url) => {
                state.message = match open::that(&url) {
                    Ok(()) => format!("Opened {}", url),
                    Err(e) => {
                        warn!(url = %url, error = %e, "failed to open browser");
                        format!("Could not open browser: {}", e)
                    }
                };
            }
            Command::CopyUrl(url) => {
                // The clipboard lives as long as the view so the copied text
                // stays available on X11.
                if clipboard.is_none() {
                    clipboard = Clipboard::new().ok();
                }
                state.message = match clipboard.as_mut().map(|c| c.set_text(url.clone())) {
                    Some(Ok(())) => format!("Copied {}", url),
                    Some(Err(e)) => format!("Could not copy URL: {}", e),
                    None => "Clipboard unavailable".to_string(),
                };
            }
        }
    }
    Ok(())
}

fn draw(frame: &mut Frame, state: &AppState, table_state: &mut TableState, busy: bool) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(5),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    // Counters
    let counters = Paragraph::new(vec![
        Line::from(format!("Jobs Applied To: {}", state.applied_count)),
        Line::from(format!("Jobs To Review: {}", state.listings.len())),
    ])
    .alignment(Alignment::Center);
    frame.render_widget(counters, chunks[0]);

    // Listing table
    let header = Row::new(Column::ALL.iter().map(|c| {
        match state.sort {
            Some((sorted, desc)) if sorted == *c => {
                format!("{} {}", c.title(), if desc { "v" } else { "^" })
            }
            _ => c.title().to_string(),
        }
    }))
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = state
        .listings
        .iter()
        .map(|listing| Row::new(Column::ALL.iter().map(|c| c.value(listing).to_string())))
        .collect();

    let title = match (&state.last_refresh, busy) {
        (_, true) => " Listings (working...) ".to_string(),
        (Some(at), false) => format!(" Listings (refreshed {}) ", at),
        (None, false) => " Listings ".to_string(),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(25),
            Constraint::Percentage(35),
            Constraint::Percentage(15),
            Constraint::Percentage(25),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title))
    .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("> ");

    frame.render_stateful_widget(table, chunks[1], table_state);

    // Selected URL, then status
    let url = state
        .current()
        .map(|l| format!(" {}", l.url))
        .unwrap_or_default();
    frame.render_widget(
        Paragraph::new(url).style(Style::default().fg(Color::Cyan)),
        chunks[2],
    );

    let help = Paragraph::new(format!(
        " {}  |  j/k:navigate  a:applied  d:discard  o:open  y:copy  r/R:refresh  s/S:sort  q:quit",
        state.message
    ))
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, chunks[3]);
}
