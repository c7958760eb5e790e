//! Secure key-value storage capability.
//!
//! Backed by the platform's secure store (Keychain on iOS, encrypted
//! SharedPreferences on Android). Values are opaque bytes; the core owns
//! the encoding. Keys are a closed enum so a typo can't silently create
//! a new bucket.

use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKey {
    AccessToken,
    RefreshToken,
    TokenExpiry,
    AthleteProfile,
    Outbox,
}

impl StorageKey {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "session.access_token",
            Self::RefreshToken => "session.refresh_token",
            Self::TokenExpiry => "session.token_expiry",
            Self::AthleteProfile => "session.athlete",
            Self::Outbox => "outbox.entries",
        }
    }

    /// Keys holding user-scoped data, wiped on sign-out.
    #[must_use]
    pub fn user_scoped() -> Vec<Self> {
        vec![
            Self::AccessToken,
            Self::RefreshToken,
            Self::TokenExpiry,
            Self::AthleteProfile,
            Self::Outbox,
        ]
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageOperation {
    Get { key: StorageKey },
    GetMulti { keys: Vec<StorageKey> },
    Set { key: StorageKey, value: Vec<u8> },
    SetMulti { entries: Vec<(StorageKey, Vec<u8>)> },
    Delete { key: StorageKey },
    DeleteMulti { keys: Vec<StorageKey> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageOutput {
    Value(Option<Vec<u8>>),
    /// Values in the same order as the requested keys.
    Multi(Vec<Option<Vec<u8>>>),
    Written,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum StorageError {
    #[error("secure store unavailable")]
    Unavailable,
    #[error("access denied by the platform store")]
    AccessDenied,
    #[error("i/o failure: {message}")]
    Io { message: String },
}

pub type StorageResult = Result<StorageOutput, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::new(ErrorKind::Storage, err.to_string())
    }
}

impl Operation for StorageOperation {
    type Output = StorageResult;
}

pub struct Storage<Ev> {
    context: CapabilityContext<StorageOperation, Ev>,
}

impl<Ev> Storage<Ev>
where
    Ev: 'static,
{
    #[must_use]
    pub fn new(context: CapabilityContext<StorageOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn get<F>(&self, key: StorageKey, make_event: F)
    where
        F: FnOnce(StorageResult) -> Ev + Send + 'static,
    {
        self.run(StorageOperation::Get { key }, make_event);
    }

    pub fn get_multi<F>(&self, keys: Vec<StorageKey>, make_event: F)
    where
        F: FnOnce(StorageResult) -> Ev + Send + 'static,
    {
        self.run(StorageOperation::GetMulti { keys }, make_event);
    }

    pub fn set<F>(&self, key: StorageKey, value: Vec<u8>, make_event: F)
    where
        F: FnOnce(StorageResult) -> Ev + Send + 'static,
    {
        self.run(StorageOperation::Set { key, value }, make_event);
    }

    pub fn set_multi<F>(&self, entries: Vec<(StorageKey, Vec<u8>)>, make_event: F)
    where
        F: FnOnce(StorageResult) -> Ev + Send + 'static,
    {
        self.run(StorageOperation::SetMulti { entries }, make_event);
    }

    pub fn delete_multi<F>(&self, keys: Vec<StorageKey>, make_event: F)
    where
        F: FnOnce(StorageResult) -> Ev + Send + 'static,
    {
        self.run(StorageOperation::DeleteMulti { keys }, make_event);
    }

    fn run<F>(&self, operation: StorageOperation, make_event: F)
    where
        F: FnOnce(StorageResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let response = context.request_from_shell(operation).await;
            context.update_app(make_event(response));
        });
    }
}

impl<Ev> Capability<Ev> for Storage<Ev> {
    type Operation = StorageOperation;
    type MappedSelf<MappedEv> = Storage<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static,
    {
        Storage::new(self.context.map_event(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable_and_distinct() {
        let keys = StorageKey::user_scoped();
        let mut strings: Vec<_> = keys.iter().map(|k| k.as_str()).collect();
        strings.sort_unstable();
        strings.dedup();
        assert_eq!(strings.len(), keys.len());
        assert_eq!(StorageKey::Outbox.as_str(), "outbox.entries");
    }

    #[test]
    fn operations_serialize_for_the_shell() {
        let op = StorageOperation::Set {
            key: StorageKey::AccessToken,
            value: b"token".to_vec(),
        };
        let json = serde_json::to_string(&op).unwrap();
        let back: StorageOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
    }
}
