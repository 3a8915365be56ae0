//! Local activity log shown by `gsos notifications` and the dashboard.
//!
//! Entries are kept newest first, capped at [`MAX_NOTIFICATIONS`], and
//! written to `notifications.json` in the config directory after every
//! change.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const MAX_NOTIFICATIONS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ClientCreated,
    ClientDeleted,
    ClientEdited,
    PullRecorded,
    System,
    Warning,
    Info,
}

impl NotificationKind {
    /// Builds the message. Client events take the client name, the rest use
    /// the text as given.
    pub fn message(self, subject: &str) -> String {
        match self {
            NotificationKind::ClientCreated => format!("Client \"{}\" has been successfully added", subject),
            NotificationKind::ClientDeleted => format!("Client \"{}\" has been deleted", subject),
            NotificationKind::ClientEdited => format!("Client \"{}\" has been updated", subject),
            NotificationKind::PullRecorded => format!("New pull recorded for client \"{}\"", subject),
            NotificationKind::System | NotificationKind::Warning | NotificationKind::Info => subject.to_string(),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotificationKind::ClientCreated => "created",
            NotificationKind::ClientDeleted => "deleted",
            NotificationKind::ClientEdited => "edited",
            NotificationKind::PullRecorded => "pull",
            NotificationKind::System => "system",
            NotificationKind::Warning => "warning",
            NotificationKind::Info => "info",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn Fn(&[Notification]) + Send>;

pub struct NotificationCenter {
    path: Option<PathBuf>,
    entries: Vec<Notification>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl NotificationCenter {
    /// Unpersisted log.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Vec::new(),
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Loads the log at `path`. A missing or unreadable file starts empty.
    pub fn open(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Vec<Notification>>(&content) {
                Ok(mut entries) => {
                    entries.truncate(MAX_NOTIFICATIONS);
                    entries
                }
                Err(e) => {
                    tracing::warn!("Failed to load notifications from {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Self {
            path: Some(path.to_path_buf()),
            entries,
            ..Self::in_memory()
        }
    }

    pub fn open_default() -> Result<Self> {
        let path = crate::config::Config::config_dir()?.join("notifications.json");
        Ok(Self::open(&path))
    }

    pub fn add(&mut self, kind: NotificationKind, subject: &str) -> Result<&Notification> {
        self.entries.insert(
            0,
            Notification {
                id: Uuid::new_v4(),
                kind,
                message: kind.message(subject),
                timestamp: Utc::now(),
                read: false,
            },
        );
        self.entries.truncate(MAX_NOTIFICATIONS);
        self.changed()?;
        Ok(&self.entries[0])
    }

    pub fn list(&self) -> &[Notification] {
        &self.entries
    }

    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|n| !n.read).count()
    }

    /// Marks the entry whose id (or id prefix) matches. Returns whether one
    /// was found.
    pub fn mark_read(&mut self, id: &str) -> Result<bool> {
        let id = id.trim().to_lowercase().replace('-', "");
        if id.is_empty() {
            return Ok(false);
        }
        let found = self
            .entries
            .iter_mut()
            .find(|n| n.id.simple().to_string().starts_with(&id));
        match found {
            Some(entry) => {
                entry.read = true;
                self.changed()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn mark_all_read(&mut self) -> Result<()> {
        for entry in &mut self.entries {
            entry.read = true;
        }
        self.changed()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.changed()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: Fn(&[Notification]) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    fn changed(&self) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&self.entries)?)?;
        }
        for (_, listener) in &self.listeners {
            listener(&self.entries);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_message_formats() {
        assert_eq!(
            NotificationKind::ClientCreated.message("Acme"),
            "Client \"Acme\" has been successfully added"
        );
        assert_eq!(NotificationKind::ClientDeleted.message("Acme"), "Client \"Acme\" has been deleted");
        assert_eq!(NotificationKind::ClientEdited.message("Acme"), "Client \"Acme\" has been updated");
        assert_eq!(
            NotificationKind::PullRecorded.message("Acme"),
            "New pull recorded for client \"Acme\""
        );
        assert_eq!(NotificationKind::Warning.message("Disk low"), "Disk low");
    }

    #[test]
    fn test_newest_first_and_capped() {
        let mut center = NotificationCenter::in_memory();
        for i in 0..(MAX_NOTIFICATIONS + 5) {
            center.add(NotificationKind::Info, &format!("event {}", i)).unwrap();
        }
        assert_eq!(center.list().len(), MAX_NOTIFICATIONS);
        assert_eq!(center.list()[0].message, format!("event {}", MAX_NOTIFICATIONS + 4));
        assert_eq!(center.list()[MAX_NOTIFICATIONS - 1].message, "event 5");
    }

    #[test]
    fn test_read_tracking() {
        let mut center = NotificationCenter::in_memory();
        center.add(NotificationKind::ClientCreated, "Acme").unwrap();
        let id = center.add(NotificationKind::PullRecorded, "Acme").unwrap().short_id();
        assert_eq!(center.unread_count(), 2);

        assert!(center.mark_read(&id).unwrap());
        assert_eq!(center.unread_count(), 1);
        assert!(center.list()[0].read);

        assert!(!center.mark_read("zzzz").unwrap());
        assert!(!center.mark_read("").unwrap());

        center.mark_all_read().unwrap();
        assert_eq!(center.unread_count(), 0);

        center.clear().unwrap();
        assert!(center.list().is_empty());
    }

    #[test]
    fn test_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("notifications.json");

        let mut center = NotificationCenter::open(&path);
        center.add(NotificationKind::ClientDeleted, "Old Co").unwrap();
        center.add(NotificationKind::System, "Exported 3 clients").unwrap();

        let reopened = NotificationCenter::open(&path);
        assert_eq!(reopened.list().len(), 2);
        assert_eq!(reopened.list()[0].message, "Exported 3 clients");
        assert_eq!(reopened.list()[1].kind, NotificationKind::ClientDeleted);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notifications.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(NotificationCenter::open(&path).list().is_empty());
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let mut center = NotificationCenter::in_memory();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = center.subscribe(move |entries| sink.lock().unwrap().push(entries.len()));

        center.add(NotificationKind::Info, "one").unwrap();
        center.add(NotificationKind::Info, "two").unwrap();
        center.mark_all_read().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 2]);

        assert!(center.unsubscribe(sub));
        assert!(!center.unsubscribe(sub));
        center.clear().unwrap();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }
}
