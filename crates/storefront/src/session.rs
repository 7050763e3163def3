//! Session store: credentials, the shopper's profile and token refresh.

use std::sync::Arc;

use chrono::Utc;
use domain::auth::{self, Credential, UserProfile};
use local_store::{LocalStore, LocalStoreExt, StorageError, keys};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, watch};

use crate::error::{Result, StorefrontError};
use crate::services::AuthService;

/// Observable session state.
///
/// `generation` increases on every login and on every logout that ended a
/// session, so work started under one session can detect that it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStatus {
    pub generation: u64,
    pub authenticated: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    credential: Option<Credential>,
    profile: Option<UserProfile>,
    generation: u64,
}

impl SessionState {
    fn status(&self) -> SessionStatus {
        SessionStatus {
            generation: self.generation,
            authenticated: self.credential.is_some(),
        }
    }
}

/// Owns the credentials of the signed-in shopper.
///
/// Credentials are mirrored to the local store under the fixed
/// `access_token`, `refresh_token` and `user` keys. Refreshes are
/// serialized, and a refresh response that arrives after the session it
/// belonged to ended is dropped.
pub struct SessionStore {
    auth: Arc<dyn AuthService>,
    local: Arc<dyn LocalStore>,
    state: RwLock<SessionState>,
    refresh_lock: Mutex<()>,
    status: watch::Sender<SessionStatus>,
}

impl SessionStore {
    /// Creates a signed-out session store.
    pub fn new(auth: Arc<dyn AuthService>, local: Arc<dyn LocalStore>) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());
        Self {
            auth,
            local,
            state: RwLock::new(SessionState::default()),
            refresh_lock: Mutex::new(()),
            status,
        }
    }

    /// True if `token` is absent, malformed, or past its `exp` claim.
    pub fn is_expired(token: Option<&str>) -> bool {
        auth::is_expired(token)
    }

    /// Subscribes to session status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.credential.is_some()
    }

    /// Current access token, without any expiry check.
    pub async fn access_token(&self) -> Option<String> {
        self.state
            .read()
            .await
            .credential
            .as_ref()
            .map(|credential| credential.access_token().to_string())
    }

    pub async fn credential(&self) -> Option<Credential> {
        self.state.read().await.credential.clone()
    }

    pub async fn profile(&self) -> Option<UserProfile> {
        self.state.read().await.profile.clone()
    }

    fn publish(&self, state: &SessionState) -> SessionStatus {
        let status = state.status();
        self.status.send_replace(status);
        status
    }

    /// Starts a session from freshly issued tokens.
    ///
    /// A provided profile is marked fully loaded. The credentials are
    /// persisted before they become visible to outbound calls.
    #[tracing::instrument(skip_all)]
    pub async fn login(
        &self,
        access_token: String,
        refresh_token: String,
        profile: Option<UserProfile>,
    ) -> Result<SessionStatus> {
        let credential = Credential::new(access_token, refresh_token);
        let profile = profile.map(|mut profile| {
            profile.full_profile_loaded = true;
            profile
        });

        let mut entries = vec![
            (
                keys::ACCESS_TOKEN.to_string(),
                Value::String(credential.access_token().to_string()),
            ),
            (
                keys::REFRESH_TOKEN.to_string(),
                Value::String(credential.refresh_token().to_string()),
            ),
        ];
        if let Some(profile) = &profile {
            let value = serde_json::to_value(profile).map_err(StorageError::from)?;
            entries.push((keys::USER.to_string(), value));
        }

        let mut state = self.state.write().await;
        self.local.set_many(entries).await?;
        state.credential = Some(credential);
        state.profile = profile;
        state.generation += 1;
        let status = self.publish(&state);

        tracing::info!(
            generation = status.generation,
            user = ?state.profile.as_ref().map(|p| p.username.as_str()),
            "session started"
        );
        Ok(status)
    }

    /// Authenticates with the auth service and starts a session.
    #[tracing::instrument(skip(self, password))]
    pub async fn sign_in(&self, identifier: &str, password: &str) -> Result<UserProfile> {
        let response = self.auth.login(identifier, password).await?;
        self.login(
            response.access_token,
            response.refresh_token,
            Some(response.profile),
        )
        .await?;
        self.profile().await.ok_or(StorefrontError::NotAuthenticated)
    }

    /// Reloads a session persisted by an earlier run.
    ///
    /// Returns whether a usable session is active afterwards. An expired
    /// access token is refreshed; if the refresh token is expired too the
    /// stored session is discarded.
    #[tracing::instrument(skip(self))]
    pub async fn restore(&self) -> Result<bool> {
        let access: Option<String> = self.local.get_json(keys::ACCESS_TOKEN).await?;
        let refresh: Option<String> = self.local.get_json(keys::REFRESH_TOKEN).await?;
        let (Some(access), Some(refresh)) = (access, refresh) else {
            return Ok(false);
        };
        let profile: Option<UserProfile> = self.local.get_json(keys::USER).await?;

        let now = Utc::now();
        let credential = Credential::new(access, refresh);
        let access_expired = credential.access_expired_at(now);
        if access_expired && credential.refresh_expired_at(now) {
            tracing::info!("stored session has expired");
            self.logout().await;
            return Ok(false);
        }

        {
            let mut state = self.state.write().await;
            state.credential = Some(credential);
            state.profile = profile;
            state.generation += 1;
            let status = self.publish(&state);
            tracing::info!(generation = status.generation, "session restored");
        }

        if access_expired {
            return Ok(self.refresh().await.is_some());
        }
        Ok(true)
    }

    /// Exchanges the refresh token for a new access token.
    ///
    /// Any failure ends the session and yields `None`. Concurrent callers
    /// are serialized; a caller that waited on another refresh reuses its
    /// result.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Option<String> {
        let seen = self.access_token().await;
        let _serialized = self.refresh_lock.lock().await;

        let (generation, credential) = {
            let state = self.state.read().await;
            (state.generation, state.credential.clone())
        };
        let credential = credential?;

        if seen.as_deref() != Some(credential.access_token())
            && !credential.access_expired_at(Utc::now())
        {
            tracing::debug!("token already refreshed by a concurrent caller");
            return Some(credential.access_token().to_string());
        }

        match self.auth.refresh(credential.refresh_token()).await {
            Ok(access) if auth::token_expiry(&access).is_some() => {
                let mut state = self.state.write().await;
                if state.generation != generation || state.credential.is_none() {
                    tracing::debug!(generation, "discarding refresh for an ended session");
                    metrics::counter!("session_refreshes_total", "outcome" => "discarded")
                        .increment(1);
                    return None;
                }
                if let Err(e) = self
                    .local
                    .set(keys::ACCESS_TOKEN, Value::String(access.clone()))
                    .await
                {
                    tracing::warn!(error = %e, "failed to persist refreshed access token, ending session");
                    drop(state);
                    self.end_failed_refresh(generation).await;
                    return None;
                }
                state.credential = Some(credential.with_access_token(access.clone()));
                metrics::counter!("session_refreshes_total", "outcome" => "success").increment(1);
                tracing::info!(generation, "access token refreshed");
                Some(access)
            }
            Ok(_) => {
                tracing::warn!("refresh returned an unreadable token, ending session");
                self.end_failed_refresh(generation).await;
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed, ending session");
                self.end_failed_refresh(generation).await;
                None
            }
        }
    }

    async fn end_failed_refresh(&self, generation: u64) {
        metrics::counter!("session_refreshes_total", "outcome" => "failure").increment(1);
        let current = self.state.read().await.generation;
        if current == generation {
            self.logout().await;
        }
    }

    /// Returns an access token that is safe to attach to an outbound call,
    /// refreshing it first if it has expired.
    pub async fn ensure_fresh(&self) -> Result<String> {
        let token = self
            .access_token()
            .await
            .ok_or(StorefrontError::NotAuthenticated)?;
        if !Self::is_expired(Some(&token)) {
            return Ok(token);
        }
        tracing::debug!("access token expired, refreshing before use");
        self.refresh().await.ok_or(StorefrontError::SessionExpired)
    }

    /// Loads the full profile once per session. A failure ends the session.
    #[tracing::instrument(skip(self))]
    pub async fn load_profile(&self) -> Result<UserProfile> {
        if let Some(profile) = self.profile().await.filter(|p| p.full_profile_loaded) {
            return Ok(profile);
        }

        let generation = self.status().generation;
        let token = self.ensure_fresh().await?;
        let fresh = match self.auth.me(&token).await {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load profile, ending session");
                self.logout().await;
                return Err(e.into());
            }
        };

        let mut state = self.state.write().await;
        if state.generation != generation {
            return Err(StorefrontError::NotAuthenticated);
        }
        let profile = match state.profile.clone() {
            Some(mut profile) => {
                profile.merge_from(fresh);
                profile
            }
            None => UserProfile {
                full_profile_loaded: true,
                ..fresh
            },
        };
        self.local.set_json(keys::USER, &profile).await?;
        state.profile = Some(profile.clone());
        Ok(profile)
    }

    /// Ends the session and wipes the local store. Idempotent.
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self) {
        let mut state = self.state.write().await;
        let had_session = state.credential.is_some() || state.profile.is_some();
        state.credential = None;
        state.profile = None;
        if let Err(e) = self.local.clear().await {
            tracing::warn!(error = %e, "failed to clear local state on logout");
        }
        if had_session {
            state.generation += 1;
            tracing::info!(generation = state.generation, "session ended");
        }
        self.publish(&state);
    }
}
