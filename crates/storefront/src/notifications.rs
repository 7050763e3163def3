//! Notification center: the shopper's latest notifications.

use tokio::sync::RwLock;

use crate::error::Result;
use crate::guard::AuthGuard;
use crate::services::{Notification, NotificationService};

/// Keeps the most recently fetched notification list.
pub struct NotificationCenter<N: NotificationService> {
    service: N,
    guard: AuthGuard,
    items: RwLock<Vec<Notification>>,
}

impl<N: NotificationService> NotificationCenter<N> {
    pub fn new(service: N, guard: AuthGuard) -> Self {
        Self {
            service,
            guard,
            items: RwLock::new(Vec::new()),
        }
    }

    /// Fetches the list and returns the unread count.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<usize> {
        let service = &self.service;
        let fetched = self
            .guard
            .call("notification.list", |token| async move {
                service.list(&token).await
            })
            .await?;
        let unread = fetched.iter().filter(|n| !n.read).count();
        *self.items.write().await = fetched;
        tracing::debug!(unread, "notifications refreshed");
        Ok(unread)
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.items.read().await.clone()
    }

    pub async fn unread_count(&self) -> usize {
        self.items.read().await.iter().filter(|n| !n.read).count()
    }

    pub async fn mark_read(&self, id: u64) -> Result<()> {
        let service = &self.service;
        self.guard
            .call("notification.mark_read", |token| async move {
                service.mark_read(&token, id).await
            })
            .await?;
        if let Some(item) = self.items.write().await.iter_mut().find(|n| n.id == id) {
            item.read = true;
        }
        Ok(())
    }

    /// Forgets everything, on logout.
    pub async fn clear(&self) {
        self.items.write().await.clear();
    }
}
