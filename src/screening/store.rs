use std::collections::HashMap;
use std::sync::Mutex;

use super::session::{Session, SessionToken};

/// Session plus the version its caller loaded, for optimistic commits.
#[derive(Debug, Clone)]
pub struct VersionedSession {
    pub session: Session,
    pub version: u64,
}

/// Storage abstraction with atomic read-session/write-session semantics.
///
/// A commit carries the version the caller loaded; the store rejects it with
/// `StaleCommit` when another writer got there first. This gives each session
/// its own unit of mutual exclusion without a global lock.
pub trait SessionStore: Send + Sync {
    fn insert(&self, session: Session) -> Result<VersionedSession, StoreError>;
    fn load(&self, token: &SessionToken) -> Result<VersionedSession, StoreError>;
    fn commit(&self, session: Session, expected_version: u64)
        -> Result<VersionedSession, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session not found")]
    NotFound,
    #[error("session already exists")]
    Conflict,
    #[error("session modified concurrently")]
    StaleCommit,
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// In-memory store keyed by session token.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionToken, (Session, u64)>>,
}

impl InMemorySessionStore {
    fn guard(&self) -> Result<std::sync::MutexGuard<'_, HashMap<SessionToken, (Session, u64)>>, StoreError> {
        self.sessions
            .lock()
            .map_err(|_| StoreError::Unavailable("session store mutex poisoned".to_string()))
    }
}

impl SessionStore for InMemorySessionStore {
    fn insert(&self, session: Session) -> Result<VersionedSession, StoreError> {
        let mut guard = self.guard()?;
        if guard.contains_key(&session.token) {
            return Err(StoreError::Conflict);
        }
        guard.insert(session.token.clone(), (session.clone(), 1));
        Ok(VersionedSession {
            session,
            version: 1,
        })
    }

    fn load(&self, token: &SessionToken) -> Result<VersionedSession, StoreError> {
        let guard = self.guard()?;
        guard
            .get(token)
            .map(|(session, version)| VersionedSession {
                session: session.clone(),
                version: *version,
            })
            .ok_or(StoreError::NotFound)
    }

    fn commit(
        &self,
        session: Session,
        expected_version: u64,
    ) -> Result<VersionedSession, StoreError> {
        let mut guard = self.guard()?;
        let entry = guard.get_mut(&session.token).ok_or(StoreError::NotFound)?;
        if entry.1 != expected_version {
            return Err(StoreError::StaleCommit);
        }
        entry.0 = session.clone();
        entry.1 += 1;
        Ok(VersionedSession {
            session,
            version: entry.1,
        })
    }
}
