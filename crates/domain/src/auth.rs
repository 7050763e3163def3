//! Credentials, user profiles and bearer-token inspection.
//!
//! Access tokens are JWTs issued by the auth collaborator. The client never
//! verifies signatures; it only reads the `exp` claim to decide whether a
//! token may still be attached to an outbound call.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

/// Access and refresh credentials of an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    access_token: String,
    refresh_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Creates a credential, reading the access token's expiry claim.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        let access_token = access_token.into();
        let expires_at = token_expiry(&access_token);
        Self {
            access_token,
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Returns a copy with the access token replaced, keeping the refresh token.
    pub fn with_access_token(&self, access_token: impl Into<String>) -> Self {
        Self::new(access_token, self.refresh_token.clone())
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// Expiry embedded in the access token, if it could be read.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns true if the access token must not be attached without a refresh.
    pub fn access_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|exp| now >= exp)
    }

    /// Returns true if the refresh token itself is no longer usable.
    pub fn refresh_expired_at(&self, now: DateTime<Utc>) -> bool {
        is_expired_at(Some(&self.refresh_token), now)
    }
}

/// Profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Set once the full `/me` profile has been merged in.
    #[serde(default)]
    pub full_profile_loaded: bool,
}

impl UserProfile {
    /// Creates a minimal profile.
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: None,
            role: None,
            full_profile_loaded: false,
        }
    }

    /// Overlays fresher server data onto this profile and marks it loaded.
    ///
    /// Fields the server left empty keep their previous value.
    pub fn merge_from(&mut self, fresh: UserProfile) {
        self.id = fresh.id;
        self.username = fresh.username;
        if fresh.email.is_some() {
            self.email = fresh.email;
        }
        if fresh.role.is_some() {
            self.role = fresh.role;
        }
        self.full_profile_loaded = true;
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<f64>,
    sub: Option<serde_json::Value>,
}

fn decode_claims(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Reads the `exp` claim of a JWT-shaped token.
///
/// Returns `None` for anything that is not three dot-separated segments with
/// a base64url JSON payload carrying a numeric `exp`.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let exp = decode_claims(token)?.exp?;
    if !exp.is_finite() {
        return None;
    }
    Utc.timestamp_opt(exp.floor() as i64, 0).single()
}

/// Reads the `sub` claim of a JWT-shaped token, as a string.
pub fn token_subject(token: &str) -> Option<String> {
    match decode_claims(token)?.sub? {
        serde_json::Value::String(subject) => Some(subject),
        serde_json::Value::Number(subject) => Some(subject.to_string()),
        _ => None,
    }
}

/// Returns true if `token` is absent, malformed, carries no expiry, or its
/// expiry is at or before `now`.
pub fn is_expired_at(token: Option<&str>, now: DateTime<Utc>) -> bool {
    match token.and_then(token_expiry) {
        Some(exp) => now >= exp,
        None => true,
    }
}

/// [`is_expired_at`] against the wall clock.
pub fn is_expired(token: Option<&str>) -> bool {
    is_expired_at(token, Utc::now())
}

/// Builds an unsigned JWT-shaped token with `sub` and `exp` claims.
///
/// Used by in-memory auth collaborators and tests; real tokens come from the
/// auth service.
pub fn mint_unsigned_token(subject: &str, expires_at: DateTime<Utc>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "sub": subject,
        "exp": expires_at.timestamp(),
        "jti": uuid::Uuid::new_v4().to_string(),
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.")
}
