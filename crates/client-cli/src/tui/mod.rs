//! Interactive roster dashboard
//!
//! Provides a terminal view with:
//! - Stats row: total, recent pulls, versions, healthy clients
//! - Filterable client table with health colouring
//! - Analytics side panel: fleet health, version histogram, top contributors
//! - Unread notification count, with failed refreshes logged as warnings

mod app;

use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

use app::{Action, App, FetchOutcome};

use crate::api::ApiClient;
use crate::notifications::{NotificationCenter, NotificationKind, SubscriptionId};

/// Notification log attached to a dashboard session. The subscription pushes
/// the unread count to the status bar after every change.
struct Alerts {
    center: NotificationCenter,
    subscription: SubscriptionId,
    unread: Receiver<usize>,
}

impl Alerts {
    fn attach(mut center: NotificationCenter) -> Self {
        let (tx, unread) = mpsc::channel();
        let _ = tx.send(center.unread_count());
        let subscription = center.subscribe(move |entries| {
            let _ = tx.send(entries.iter().filter(|n| !n.read).count());
        });
        Self {
            center,
            subscription,
            unread,
        }
    }

    fn record_failure(&mut self, error: &str) {
        let message = format!("Dashboard refresh failed: {}", error);
        if let Err(e) = self.center.add(NotificationKind::Warning, &message) {
            tracing::debug!("Failed to record notification: {}", e);
        }
    }

    fn sync(&self, app: &mut App) {
        while let Ok(count) = self.unread.try_recv() {
            app.set_unread(count);
        }
    }

    fn detach(mut self) {
        self.center.unsubscribe(self.subscription);
    }
}

fn spawn_fetch(api: &ApiClient, generation: u64, tx: &Sender<FetchOutcome>) {
    let api = api.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = api.list_clients().await.map_err(|e| e.to_string());
        let _ = tx.send(FetchOutcome { generation, result });
    });
}

/// Run the dashboard until the user quits. When a notification log is
/// given, refresh failures are recorded in it.
pub async fn run(api: ApiClient, notifications: Option<NotificationCenter>) -> Result<()> {
    let mut alerts = notifications.map(Alerts::attach);
    let (tx, rx): (Sender<FetchOutcome>, Receiver<FetchOutcome>) = mpsc::channel();
    let mut app = App::new(api.base_url());
    spawn_fetch(&api, app.begin_fetch(), &tx);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, &mut app, &mut alerts, &api, &tx, &rx);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Some(alerts) = alerts {
        alerts.detach();
    }

    result
}

fn event_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    alerts: &mut Option<Alerts>,
    api: &ApiClient,
    tx: &Sender<FetchOutcome>,
    rx: &Receiver<FetchOutcome>,
) -> Result<()> {
    loop {
        // Process any finished fetches
        while let Ok(outcome) = rx.try_recv() {
            let failure = outcome.result.as_ref().err().cloned();
            if app.apply_fetch(outcome) {
                if let (Some(error), Some(alerts)) = (failure, alerts.as_mut()) {
                    alerts.record_failure(&error);
                }
            }
        }
        if let Some(alerts) = alerts.as_ref() {
            alerts.sync(app);
        }

        terminal.draw(|f| app.draw(f))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match app.handle_key(key.code, key.modifiers) {
                    Some(Action::Quit) => return Ok(()),
                    Some(Action::Refresh) => spawn_fetch(api, app.begin_fetch(), tx),
                    None => {}
                }
            }
        }
    }
}
