//! Dashboard state, key handling and drawing

use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
};
use shared::metrics::{self, ClientFilter, HealthTier, MetricsCache, PullStatusFilter};
use shared::Client;

/// What the event loop should do after a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Refresh,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
}

/// Result of one background roster fetch
#[derive(Debug)]
pub struct FetchOutcome {
    pub generation: u64,
    pub result: Result<Vec<Client>, String>,
}

pub struct App {
    /// Last roster that loaded successfully
    clients: Vec<Client>,
    filter: ClientFilter,
    mode: InputMode,
    /// Generation of the newest fetch that was started
    requested: u64,
    /// Bumped every time `clients` is replaced; keys the metrics cache
    data_version: u64,
    loading: bool,
    status: String,
    status_is_error: bool,
    cache: MetricsCache,
    table: TableState,
    server: String,
    /// Unread entries in the notification log
    unread: usize,
}

impl App {
    pub fn new(server: &str) -> Self {
        Self {
            clients: Vec::new(),
            filter: ClientFilter::default(),
            mode: InputMode::Normal,
            requested: 0,
            data_version: 0,
            loading: false,
            status: "Loading clients...".to_string(),
            status_is_error: false,
            cache: MetricsCache::default(),
            table: TableState::default(),
            server: server.to_string(),
            unread: 0,
        }
    }

    /// Starts a new fetch and returns the generation it must report back with.
    pub fn begin_fetch(&mut self) -> u64 {
        self.requested += 1;
        self.loading = true;
        self.requested
    }

    /// Applies a finished fetch. Results from superseded fetches are dropped
    /// and reported as `false`.
    pub fn apply_fetch(&mut self, outcome: FetchOutcome) -> bool {
        if outcome.generation != self.requested {
            tracing::debug!(
                "Dropping stale fetch {} (latest is {})",
                outcome.generation,
                self.requested
            );
            return false;
        }

        self.loading = false;
        match outcome.result {
            Ok(clients) => {
                self.status = format!("Loaded {} clients", clients.len());
                self.status_is_error = false;
                self.clients = clients;
                self.data_version += 1;
                self.clamp_selection();
            }
            Err(e) => {
                self.status = format!("Refresh failed: {}", e);
                self.status_is_error = true;
            }
        }
        true
    }

    #[cfg(test)]
    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    #[cfg(test)]
    pub fn filter(&self) -> &ClientFilter {
        &self.filter
    }

    #[cfg(test)]
    pub fn mode(&self) -> InputMode {
        self.mode
    }

    #[cfg(test)]
    pub fn status(&self) -> &str {
        &self.status
    }

    #[cfg(test)]
    pub fn unread(&self) -> usize {
        self.unread
    }

    pub fn set_unread(&mut self, unread: usize) {
        self.unread = unread;
    }

    pub fn visible(&self, now: DateTime<Utc>) -> Vec<Client> {
        self.filter.apply(&self.clients, now)
    }

    fn clamp_selection(&mut self) {
        let len = self.visible(Utc::now()).len();
        match self.table.selected() {
            _ if len == 0 => self.table.select(None),
            Some(i) if i >= len => self.table.select(Some(len - 1)),
            None => self.table.select(Some(0)),
            _ => {}
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.visible(Utc::now()).len();
        if len == 0 {
            return;
        }
        let current = self.table.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, len as isize - 1);
        self.table.select(Some(next as usize));
    }

    /// Handle keyboard input
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Option<Action> {
        if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
            return Some(Action::Quit);
        }

        if self.mode == InputMode::Search {
            match code {
                KeyCode::Enter => self.mode = InputMode::Normal,
                KeyCode::Esc => {
                    self.filter.search.clear();
                    self.mode = InputMode::Normal;
                }
                KeyCode::Backspace => {
                    self.filter.search.pop();
                }
                KeyCode::Char(c) => self.filter.search.push(c),
                _ => {}
            }
            self.clamp_selection();
            return None;
        }

        match code {
            KeyCode::Char('q') => return Some(Action::Quit),
            KeyCode::Char('r') => return Some(Action::Refresh),
            KeyCode::Char('/') => self.mode = InputMode::Search,
            KeyCode::Char('f') => self.filter.pull_status = self.filter.pull_status.next(),
            KeyCode::Char('1') => self.filter.pull_status = PullStatusFilter::All,
            KeyCode::Char('2') => self.filter.pull_status = PullStatusFilter::Recent,
            KeyCode::Char('3') => self.filter.pull_status = PullStatusFilter::Outdated,
            KeyCode::Char('4') => self.filter.pull_status = PullStatusFilter::Never,
            KeyCode::Char('h') => self.filter.health = self.filter.health.next(),
            KeyCode::Char('c') | KeyCode::Esc => self.filter = ClientFilter::default(),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::PageUp => self.move_selection(-10),
            KeyCode::PageDown => self.move_selection(10),
            _ => return None,
        }
        self.clamp_selection();
        None
    }

    /// Draw the UI
    pub fn draw(&mut self, frame: &mut Frame) {
        let now = Utc::now();
        let area = frame.area();

        let main_layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
            .split(main_layout[1]);

        self.draw_stats(frame, main_layout[0], now);
        self.draw_table(frame, panes[0], now);
        self.draw_analytics(frame, panes[1], now);
        self.draw_status_bar(frame, main_layout[2]);
    }

    fn draw_stats(&mut self, frame: &mut Frame, area: Rect, now: DateTime<Utc>) {
        let summary = self
            .cache
            .get_or_compute(self.data_version, &self.clients, now)
            .summary
            .clone();

        let cards = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Ratio(1, 4); 4])
            .split(area);

        let stats = [
            ("Total Clients", summary.total, Color::Cyan),
            ("Recent Pulls", summary.recent, Color::Green),
            ("Versions", summary.distinct_versions, Color::Magenta),
            ("Healthy", summary.healthy, Color::Yellow),
        ];
        for ((title, value, colour), card) in stats.into_iter().zip(cards.iter()) {
            let paragraph = Paragraph::new(value.to_string())
                .style(Style::default().fg(colour).add_modifier(Modifier::BOLD))
                .alignment(Alignment::Center)
                .block(Block::default().title(format!(" {} ", title)).borders(Borders::ALL));
            frame.render_widget(paragraph, *card);
        }
    }

    fn draw_table(&mut self, frame: &mut Frame, area: Rect, now: DateTime<Utc>) {
        let visible = self.visible(now);

        let title = if self.filter.is_active() {
            format!(
                " Clients ({} of {}) search:\"{}\" pull:{} health:{} ",
                visible.len(),
                self.clients.len(),
                self.filter.search,
                self.filter.pull_status,
                self.filter.health
            )
        } else {
            format!(" Clients ({}) ", self.clients.len())
        };
        let border_style = if self.mode == InputMode::Search {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::Gray)
        };

        let header = Row::new(["Name", "Domain", "Client ID", "Last Pull", "By", "Version", "Health"])
            .style(Style::default().add_modifier(Modifier::BOLD));

        let rows = visible.iter().map(|client| {
            let tier = metrics::health_tier(client, now);
            Row::new(vec![
                Cell::from(client.client_name.clone()),
                Cell::from(client.domain_url.clone()),
                Cell::from(client.client_id.clone()),
                Cell::from(crate::view::date(client.latest_pull_date)),
                Cell::from(client.latest_pull_by.clone().unwrap_or_default()),
                Cell::from(client.gsos_version.clone().unwrap_or_default()),
                Cell::from(tier.to_string()).style(Style::default().fg(tier_colour(tier))),
            ])
        });

        let table = Table::new(
            rows,
            [
                Constraint::Percentage(20),
                Constraint::Percentage(24),
                Constraint::Percentage(12),
                Constraint::Length(10),
                Constraint::Percentage(12),
                Constraint::Length(8),
                Constraint::Min(20),
            ],
        )
        .header(header)
        .block(Block::default().title(title).borders(Borders::ALL).border_style(border_style))
        .row_highlight_style(Style::default().bg(Color::DarkGray));

        frame.render_stateful_widget(table, area, &mut self.table);
    }

    fn draw_analytics(&mut self, frame: &mut Frame, area: Rect, now: DateTime<Utc>) {
        let analytics = self.cache.get_or_compute(self.data_version, &self.clients, now);

        let mut lines = vec![
            Line::from(vec![
                Span::raw("Fleet health: "),
                Span::styled(
                    format!("{}%", analytics.fleet_health),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
            ]),
            Line::from(""),
            Line::from(Span::styled("Versions", Style::default().add_modifier(Modifier::BOLD))),
        ];
        let max = analytics.versions.first().map(|(_, n)| *n).unwrap_or(0);
        for (version, count) in &analytics.versions {
            let width = if max == 0 { 0 } else { (count * 12).div_ceil(max) };
            lines.push(Line::from(format!("{:<10} {:>3} {}", version, count, "▇".repeat(width))));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Top contributors",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        if analytics.top_contributors.is_empty() {
            lines.push(Line::from(Span::styled("No pulls yet", Style::default().fg(Color::DarkGray))));
        }
        for (i, (name, count)) in analytics.top_contributors.iter().enumerate() {
            lines.push(Line::from(format!("{}. {} ({})", i + 1, name, count)));
        }

        let paragraph = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().title(" Analytics ").borders(Borders::ALL));
        frame.render_widget(paragraph, area);
    }

    /// Draw the status bar
    fn draw_status_bar(&self, frame: &mut Frame, area: Rect) {
        let hint = match self.mode {
            InputMode::Search => "Type to search | Enter: Done | Esc: Clear".to_string(),
            InputMode::Normal => "/: Search | f/1-4: Pull filter | h: Health filter | c: Clear | r: Refresh | q: Quit"
                .to_string(),
        };
        let loading = if self.loading { " [loading]" } else { "" };
        let unread = if self.unread > 0 {
            format!(" | {} unread", self.unread)
        } else {
            String::new()
        };
        let status = format!(" {}{}{} | {} | {} ", self.status, loading, unread, self.server, hint);

        let style = if self.status_is_error {
            Style::default().bg(Color::Red).fg(Color::White)
        } else {
            Style::default().bg(Color::DarkGray).fg(Color::White)
        };
        frame.render_widget(Paragraph::new(status).style(style), area);
    }
}

fn tier_colour(tier: HealthTier) -> Color {
    match tier {
        HealthTier::Excellent => Color::Green,
        HealthTier::Good => Color::Yellow,
        HealthTier::NeedsAttention => Color::Red,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use shared::metrics::HealthFilter;
    use ratatui::backend::TestBackend;

    fn client(id: i64, name: &str, days_ago: Option<i64>) -> Client {
        Client {
            id,
            client_name: name.to_string(),
            domain_url: format!("{}.example", name.to_lowercase()),
            client_id: format!("C-{}", id),
            original_password: None,
            latest_pull_date: days_ago.map(|d| Utc::now() - Duration::days(d)),
            latest_pull_by: days_ago.map(|_| "dana".to_string()),
            gsos_version: Some("4.2".to_string()),
            created_at: None,
            updated_at: None,
        }
    }

    fn loaded(clients: Vec<Client>) -> App {
        let mut app = App::new("http://localhost:10000/api");
        let generation = app.begin_fetch();
        assert!(app.apply_fetch(FetchOutcome {
            generation,
            result: Ok(clients),
        }));
        app
    }

    fn press(app: &mut App, code: KeyCode) -> Option<Action> {
        app.handle_key(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_stale_fetch_is_dropped() {
        let mut app = App::new("x");
        let first = app.begin_fetch();
        let second = app.begin_fetch();

        assert!(app.apply_fetch(FetchOutcome {
            generation: second,
            result: Ok(vec![client(1, "Fresh", Some(1))]),
        }));
        assert!(!app.apply_fetch(FetchOutcome {
            generation: first,
            result: Ok(vec![]),
        }));
        assert_eq!(app.clients().len(), 1);
        assert_eq!(app.clients()[0].client_name, "Fresh");
    }

    #[test]
    fn test_failed_fetch_keeps_last_roster() {
        let mut app = loaded(vec![client(1, "Acme", Some(2)), client(2, "Globex", None)]);
        let generation = app.begin_fetch();
        assert!(app.apply_fetch(FetchOutcome {
            generation,
            result: Err("connection refused".to_string()),
        }));
        assert_eq!(app.clients().len(), 2);
        assert!(app.status().contains("connection refused"));
    }

    #[test]
    fn test_search_mode_edits_filter() {
        let mut app = loaded(vec![client(1, "Acme", Some(2)), client(2, "Globex", None)]);
        press(&mut app, KeyCode::Char('/'));
        assert_eq!(app.mode(), InputMode::Search);
        for c in "glo".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        // 'q' while searching is text, not quit
        assert_eq!(press(&mut app, KeyCode::Char('q')), None);
        press(&mut app, KeyCode::Backspace);
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.mode(), InputMode::Normal);
        assert_eq!(app.filter().search, "glo");
        let visible = app.visible(Utc::now());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].client_name, "Globex");
    }

    #[test]
    fn test_filter_keys() {
        let mut app = loaded(vec![
            client(1, "Recent", Some(1)),
            client(2, "Stale", Some(45)),
            client(3, "Never", None),
        ]);

        press(&mut app, KeyCode::Char('f'));
        assert_eq!(app.filter().pull_status, PullStatusFilter::Recent);
        assert_eq!(app.visible(Utc::now()).len(), 1);

        press(&mut app, KeyCode::Char('4'));
        assert_eq!(app.filter().pull_status, PullStatusFilter::Never);
        assert_eq!(app.visible(Utc::now())[0].client_name, "Never");

        press(&mut app, KeyCode::Char('1'));
        press(&mut app, KeyCode::Char('h'));
        assert_eq!(app.filter().health, HealthFilter::Healthy);
        assert_eq!(app.visible(Utc::now()).len(), 1);

        press(&mut app, KeyCode::Char('c'));
        assert!(!app.filter().is_active());
        assert_eq!(app.visible(Utc::now()).len(), 3);
    }

    #[test]
    fn test_quit_and_refresh_keys() {
        let mut app = App::new("x");
        assert_eq!(press(&mut app, KeyCode::Char('r')), Some(Action::Refresh));
        assert_eq!(press(&mut app, KeyCode::Char('q')), Some(Action::Quit));
        assert_eq!(
            app.handle_key(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Some(Action::Quit)
        );
    }

    #[test]
    fn test_draw_renders_stats_and_rows() {
        let mut app = loaded(vec![client(1, "Acme", Some(2)), client(2, "Globex", None)]);
        let mut terminal = Terminal::new(TestBackend::new(140, 30)).unwrap();
        terminal.draw(|f| app.draw(f)).unwrap();

        let buffer = terminal.backend().buffer();
        let text: String = buffer.content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("Total Clients"));
        assert!(text.contains("Acme"));
        assert!(text.contains("Globex"));
        assert!(text.contains("Fleet health: 50%"));
    }

    #[test]
    fn test_status_bar_shows_unread_count() {
        let mut app = loaded(vec![client(1, "Acme", Some(2))]);
        app.set_unread(3);
        let mut terminal = Terminal::new(TestBackend::new(160, 30)).unwrap();
        terminal.draw(|f| app.draw(f)).unwrap();

        let text: String = terminal.backend().buffer().content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("3 unread"));

        app.set_unread(0);
        terminal.draw(|f| app.draw(f)).unwrap();
        let text: String = terminal.backend().buffer().content().iter().map(|c| c.symbol()).collect();
        assert!(!text.contains("unread"));
    }
}
