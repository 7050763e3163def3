//! Outbound call wrapper with a single refresh-and-retry on authorization
//! failure.

use std::future::Future;
use std::sync::Arc;

use crate::error::{Result, ServiceError, StorefrontError};
use crate::session::SessionStore;

/// Attaches a fresh access token to outbound calls.
///
/// A call refused with [`ServiceError::Unauthorized`] triggers one session
/// refresh and one retry. A second refusal is returned to the caller.
/// Other failures are never retried.
#[derive(Clone)]
pub struct AuthGuard {
    session: Arc<SessionStore>,
}

impl AuthGuard {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Runs `call` with the current access token.
    pub async fn call<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = std::result::Result<T, ServiceError>>,
    {
        let token = self.session.ensure_fresh().await?;
        match call(token).await {
            Err(ServiceError::Unauthorized) => {
                metrics::counter!("auth_retries_total").increment(1);
                tracing::info!(operation, "authorization refused, refreshing and retrying once");
                let token = self
                    .session
                    .refresh()
                    .await
                    .ok_or(StorefrontError::SessionExpired)?;
                call(token).await.map_err(|e| {
                    tracing::warn!(operation, error = %e, "call failed after token refresh");
                    StorefrontError::from(e)
                })
            }
            result => result.map_err(StorefrontError::from),
        }
    }
}
