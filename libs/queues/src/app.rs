//! Applications held by auto-created leaf queues.

use std::collections::BTreeMap;

use capq_id::{ApplicationId, QueuePath};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scheduling state of an application inside its leaf queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationState {
    /// Submitted, waiting for the queue to be allowed to run it.
    Pending,
    /// Schedulable.
    Active,
}

/// An application submitted to an auto-created leaf queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub user: String,
    pub queue: QueuePath,
    pub submitted_at: DateTime<Utc>,
    pub state: ApplicationState,
}

impl Application {
    pub fn new(user: impl Into<String>, queue: QueuePath) -> Self {
        Self {
            id: ApplicationId::new(),
            user: user.into(),
            queue,
            submitted_at: Utc::now(),
            state: ApplicationState::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == ApplicationState::Pending
    }
}

/// Applications of one leaf keyed by id, so iteration follows submission order.
#[derive(Debug, Clone, Default)]
pub(crate) struct ApplicationBook {
    apps: BTreeMap<ApplicationId, Application>,
}

impl ApplicationBook {
    pub(crate) fn insert(&mut self, app: Application) {
        self.apps.insert(app.id, app);
    }

    pub(crate) fn get_mut(&mut self, id: &ApplicationId) -> Option<&mut Application> {
        self.apps.get_mut(id)
    }

    pub(crate) fn remove(&mut self, id: &ApplicationId) -> Option<Application> {
        self.apps.remove(id)
    }

    pub(crate) fn with_state(&self, state: ApplicationState) -> Vec<Application> {
        self.apps
            .values()
            .filter(|app| app.state == state)
            .cloned()
            .collect()
    }

    pub(crate) fn all(&self) -> Vec<Application> {
        self.apps.values().cloned().collect()
    }

    /// Earliest pending application, if any.
    pub(crate) fn first_pending(&self) -> Option<&Application> {
        self.apps.values().find(|app| app.is_pending())
    }

    pub(crate) fn len(&self) -> usize {
        self.apps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> QueuePath {
        QueuePath::parse("root.users.alice").unwrap()
    }

    #[test]
    fn test_new_application_is_pending() {
        let app = Application::new("alice", queue());
        assert!(app.is_pending());
        assert_eq!(app.user, "alice");
    }

    #[test]
    fn test_book_filters_by_state() {
        let mut book = ApplicationBook::default();
        let first = Application::new("alice", queue());
        let mut second = Application::new("alice", queue());
        second.state = ApplicationState::Active;
        book.insert(first.clone());
        book.insert(second.clone());

        assert_eq!(book.len(), 2);
        assert_eq!(book.with_state(ApplicationState::Pending), vec![first.clone()]);
        assert_eq!(book.with_state(ApplicationState::Active), vec![second]);
        assert_eq!(book.first_pending().map(|a| a.id), Some(first.id));

        book.remove(&first.id);
        assert!(book.first_pending().is_none());
    }
}
