//! Strava-backed session state.
//!
//! The shell runs the OAuth authorization (PKCE, via the web redirect
//! broker) and hands back a code; the core exchanges and refreshes
//! tokens against the PathQuest API and keeps them in secure storage
//! through the storage capability.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::capabilities::storage::StorageKey;
use crate::error::{AppError, ErrorKind};
use crate::model::AthleteProfile;
use crate::TOKEN_REFRESH_MARGIN_SECS;

/// Token payload from `POST /api/v1/auth/token` and `/auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch seconds at which the access token expires.
    pub expires_at: u64,
    #[serde(default)]
    pub athlete: Option<AthleteProfile>,
}

pub struct TokenSet {
    pub access: SecretString,
    pub refresh: SecretString,
    pub expires_at: u64,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access", &"[REDACTED]")
            .field("refresh", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl TokenSet {
    /// True within [`TOKEN_REFRESH_MARGIN_SECS`] of expiry.
    #[must_use]
    pub fn needs_refresh(&self, now_secs: u64) -> bool {
        now_secs.saturating_add(TOKEN_REFRESH_MARGIN_SECS) >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    SignedOut,
    /// Waiting on the shell's OAuth flow or the code exchange.
    Authorizing,
    SignedIn,
    /// Signed in, refresh request in flight.
    Refreshing,
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub athlete: Option<AthleteProfile>,
    tokens: Option<TokenSet>,
}

impl SessionState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.phase, SessionPhase::SignedIn | SessionPhase::Refreshing)
            && self.tokens.is_some()
    }

    /// Access token for an Authorization header, if signed in.
    #[must_use]
    pub fn bearer(&self) -> Option<String> {
        self.tokens
            .as_ref()
            .map(|t| format!("Bearer {}", t.access.expose_secret()))
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.tokens
            .as_ref()
            .map(|t| t.refresh.expose_secret().clone())
    }

    #[must_use]
    pub fn needs_refresh(&self, now_secs: u64) -> bool {
        self.tokens
            .as_ref()
            .is_some_and(|t| t.needs_refresh(now_secs))
    }

    pub fn apply_token_response(&mut self, response: TokenResponse) {
        self.tokens = Some(TokenSet {
            access: SecretString::new(response.access_token),
            refresh: SecretString::new(response.refresh_token),
            expires_at: response.expires_at,
        });
        if let Some(athlete) = response.athlete {
            self.athlete = Some(athlete);
        }
        self.phase = SessionPhase::SignedIn;
    }

    pub fn reset(&mut self) {
        self.phase = SessionPhase::SignedOut;
        self.athlete = None;
        self.tokens = None;
    }

    /// Key/value pairs to write after a token change.
    pub fn storage_entries(&self) -> Result<Vec<(StorageKey, Vec<u8>)>, AppError> {
        let Some(tokens) = &self.tokens else {
            return Err(AppError::new(
                ErrorKind::InvalidState,
                "no session to persist",
            ));
        };
        let mut entries = vec![
            (
                StorageKey::AccessToken,
                tokens.access.expose_secret().clone().into_bytes(),
            ),
            (
                StorageKey::RefreshToken,
                tokens.refresh.expose_secret().clone().into_bytes(),
            ),
            (
                StorageKey::TokenExpiry,
                tokens.expires_at.to_string().into_bytes(),
            ),
        ];
        if let Some(athlete) = &self.athlete {
            entries.push((StorageKey::AthleteProfile, serde_json::to_vec(athlete)?));
        }
        Ok(entries)
    }

    /// Keys read back at startup, in the order [`restore`](Self::restore)
    /// expects them.
    #[must_use]
    pub fn storage_keys() -> Vec<StorageKey> {
        vec![
            StorageKey::AccessToken,
            StorageKey::RefreshToken,
            StorageKey::TokenExpiry,
            StorageKey::AthleteProfile,
        ]
    }

    /// Rebuild the session from stored values. Returns false if the
    /// stored state is absent or unreadable, leaving the session signed
    /// out.
    pub fn restore(&mut self, mut values: Vec<Option<Vec<u8>>>) -> bool {
        if values.len() != Self::storage_keys().len() {
            return false;
        }
        let athlete_raw = values.pop().flatten();
        let expiry_raw = values.pop().flatten();
        let refresh_raw = values.pop().flatten();
        let access_raw = values.pop().flatten();

        let (Some(access), Some(refresh), Some(expiry)) = (access_raw, refresh_raw, expiry_raw)
        else {
            return false;
        };

        let Ok(access) = String::from_utf8(access) else {
            return false;
        };
        let Ok(refresh) = String::from_utf8(refresh) else {
            return false;
        };
        let Some(expires_at) = String::from_utf8(expiry)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        else {
            return false;
        };

        self.tokens = Some(TokenSet {
            access: SecretString::new(access),
            refresh: SecretString::new(refresh),
            expires_at,
        });
        self.athlete = athlete_raw.and_then(|raw| serde_json::from_slice(&raw).ok());
        self.phase = SessionPhase::SignedIn;
        true
    }
}
