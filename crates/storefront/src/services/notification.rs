//! Notification feed trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{authorize, read, write};
use crate::error::ServiceError;

/// A message for the shopper, such as an order status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Trait for the notification feed.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Lists notifications, newest first.
    async fn list(&self, token: &str) -> Result<Vec<Notification>, ServiceError>;

    async fn mark_read(&self, token: &str, id: u64) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    notifications: Vec<Notification>,
    next_id: u64,
    fail_on_list: bool,
    reject_auth: u32,
    list_calls: u32,
}

/// In-memory notification feed for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes an unread notification.
    pub fn push(&self, message: impl Into<String>) -> u64 {
        let mut state = write(&self.state);
        state.next_id += 1;
        let id = state.next_id;
        state.notifications.insert(
            0,
            Notification {
                id,
                message: message.into(),
                read: false,
                created_at: Utc::now(),
            },
        );
        id
    }

    pub fn set_fail_on_list(&self, fail: bool) {
        write(&self.state).fail_on_list = fail;
    }

    /// Makes the next `count` calls answer `Unauthorized`.
    pub fn reject_next_auth(&self, count: u32) {
        write(&self.state).reject_auth = count;
    }

    /// Returns how many times the feed was polled.
    pub fn list_calls(&self) -> u32 {
        read(&self.state).list_calls
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn list(&self, token: &str) -> Result<Vec<Notification>, ServiceError> {
        let mut state = write(&self.state);
        state.list_calls += 1;
        authorize(token, &mut state.reject_auth)?;
        if state.fail_on_list {
            return Err(ServiceError::Network("connection reset".to_string()));
        }
        Ok(state.notifications.clone())
    }

    async fn mark_read(&self, token: &str, id: u64) -> Result<(), ServiceError> {
        let mut state = write(&self.state);
        authorize(token, &mut state.reject_auth)?;
        let notification = state
            .notifications
            .iter_mut()
            .find(|notification| notification.id == id)
            .ok_or_else(|| ServiceError::NotFound(format!("Notification {id} not found")))?;
        notification.read = true;
        Ok(())
    }
}
