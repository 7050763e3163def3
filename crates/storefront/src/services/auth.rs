//! Authentication service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use domain::UserProfile;
use domain::auth::mint_unsigned_token;

use super::{authorize, read, write};
use crate::error::ServiceError;

/// Tokens and profile returned by a successful login.
#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub profile: UserProfile,
}

/// Trait for the authentication backend.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Exchanges a username or email and password for tokens.
    async fn login(&self, identifier: &str, password: &str)
    -> Result<LoginResponse, ServiceError>;

    /// Exchanges a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<String, ServiceError>;

    /// Returns the full profile of the token's owner.
    async fn me(&self, access_token: &str) -> Result<UserProfile, ServiceError>;
}

#[derive(Debug)]
struct Account {
    password: String,
    profile: UserProfile,
}

#[derive(Debug)]
struct InMemoryAuthState {
    accounts: HashMap<String, Account>,
    refresh_tokens: HashMap<String, String>,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
    refresh_delay: Duration,
    fail_on_refresh: bool,
    fail_on_me: bool,
    reject_auth: u32,
    login_calls: u32,
    refresh_calls: u32,
    me_calls: u32,
}

impl Default for InMemoryAuthState {
    fn default() -> Self {
        Self {
            accounts: HashMap::new(),
            refresh_tokens: HashMap::new(),
            access_ttl: chrono::Duration::minutes(15),
            refresh_ttl: chrono::Duration::days(7),
            refresh_delay: Duration::ZERO,
            fail_on_refresh: false,
            fail_on_me: false,
            reject_auth: 0,
            login_calls: 0,
            refresh_calls: 0,
            me_calls: 0,
        }
    }
}

/// In-memory auth backend for testing.
///
/// Issues unsigned JWT-shaped tokens whose `exp` claim honours the
/// configured lifetimes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuthService {
    state: Arc<RwLock<InMemoryAuthState>>,
}

impl InMemoryAuthService {
    /// Creates a new in-memory auth service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account. The profile is what `login` and `me` return.
    pub fn add_account(&self, identifier: &str, password: &str, profile: UserProfile) {
        write(&self.state).accounts.insert(
            identifier.to_string(),
            Account {
                password: password.to_string(),
                profile,
            },
        );
    }

    /// Sets the lifetime of issued access tokens. Zero or negative issues
    /// tokens that are already expired.
    pub fn set_access_ttl(&self, ttl: chrono::Duration) {
        write(&self.state).access_ttl = ttl;
    }

    /// Sets the lifetime of issued refresh tokens.
    pub fn set_refresh_ttl(&self, ttl: chrono::Duration) {
        write(&self.state).refresh_ttl = ttl;
    }

    /// Delays every refresh response.
    pub fn set_refresh_delay(&self, delay: Duration) {
        write(&self.state).refresh_delay = delay;
    }

    /// Configures refresh calls to fail.
    pub fn set_fail_on_refresh(&self, fail: bool) {
        write(&self.state).fail_on_refresh = fail;
    }

    /// Configures `me` calls to fail.
    pub fn set_fail_on_me(&self, fail: bool) {
        write(&self.state).fail_on_me = fail;
    }

    /// Makes the next `count` token-checked calls answer `Unauthorized`.
    pub fn reject_next_auth(&self, count: u32) {
        write(&self.state).reject_auth = count;
    }

    pub fn login_calls(&self) -> u32 {
        read(&self.state).login_calls
    }

    pub fn refresh_calls(&self) -> u32 {
        read(&self.state).refresh_calls
    }

    pub fn me_calls(&self) -> u32 {
        read(&self.state).me_calls
    }

    fn issue(subject: &str, ttl: chrono::Duration) -> String {
        mint_unsigned_token(subject, Utc::now() + ttl)
    }
}

#[async_trait]
impl AuthService for InMemoryAuthService {
    async fn login(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<LoginResponse, ServiceError> {
        let mut state = write(&self.state);
        state.login_calls += 1;

        let account = state
            .accounts
            .get(identifier)
            .filter(|account| account.password == password)
            .ok_or_else(|| ServiceError::Rejected("Invalid credentials".to_string()))?;
        let profile = account.profile.clone();
        let subject = profile.id.to_string();

        let access_token = Self::issue(&subject, state.access_ttl);
        let refresh_token = Self::issue(&subject, state.refresh_ttl);
        state
            .refresh_tokens
            .insert(refresh_token.clone(), identifier.to_string());

        Ok(LoginResponse {
            access_token,
            refresh_token,
            profile,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<String, ServiceError> {
        let delay = {
            let mut state = write(&self.state);
            state.refresh_calls += 1;
            state.refresh_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = read(&self.state);
        if state.fail_on_refresh {
            return Err(ServiceError::Server("Token refresh failed".to_string()));
        }
        if domain::auth::is_expired(Some(refresh_token)) {
            return Err(ServiceError::Unauthorized);
        }
        let identifier = state
            .refresh_tokens
            .get(refresh_token)
            .ok_or(ServiceError::Unauthorized)?;
        let account = state
            .accounts
            .get(identifier)
            .ok_or(ServiceError::Unauthorized)?;

        Ok(Self::issue(
            &account.profile.id.to_string(),
            state.access_ttl,
        ))
    }

    async fn me(&self, access_token: &str) -> Result<UserProfile, ServiceError> {
        let mut state = write(&self.state);
        state.me_calls += 1;
        authorize(access_token, &mut state.reject_auth)?;
        if state.fail_on_me {
            return Err(ServiceError::Network("connection reset".to_string()));
        }

        let subject =
            domain::auth::token_subject(access_token).ok_or(ServiceError::Unauthorized)?;
        state
            .accounts
            .values()
            .find(|account| account.profile.id.to_string() == subject)
            .map(|account| account.profile.clone())
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }
}
