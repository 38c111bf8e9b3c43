// 🔐 Session - explicit authentication context for the presentation shells
// The calendar core never sees this; shells check it before calling in.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("password digest must be 64 hex characters, got {0}")]
    BadLength(usize),

    #[error("password digest is not valid hex")]
    BadHex,
}

/// SHA-256 digest of the shared password
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    digest: [u8; 32],
}

impl Credentials {
    pub fn from_password(password: &str) -> Self {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(password.as_bytes()));
        Credentials { digest }
    }

    /// Parse a hex digest as stored in the config file
    pub fn from_hex(hex: &str) -> Result<Self, CredentialError> {
        let hex = hex.trim();
        if hex.len() != 64 {
            return Err(CredentialError::BadLength(hex.len()));
        }

        let mut digest = [0u8; 32];
        for (i, byte) in digest.iter_mut().enumerate() {
            let pair = hex.get(i * 2..i * 2 + 2).ok_or(CredentialError::BadHex)?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| CredentialError::BadHex)?;
        }

        Ok(Credentials { digest })
    }

    pub fn to_hex(&self) -> String {
        self.digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn verify(&self, password: &str) -> bool {
        Credentials::from_password(password).digest == self.digest
    }
}

/// One user's session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: Uuid,
    authenticated: bool,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn logout(&mut self) {
        self.authenticated = false;
    }
}

/// Password check shared by the shells
#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    credentials: Option<Credentials>,
}

impl AuthGate {
    /// `None` leaves the gate open
    pub fn new(credentials: Option<Credentials>) -> Self {
        AuthGate { credentials }
    }

    pub fn is_open(&self) -> bool {
        self.credentials.is_none()
    }

    /// Fresh session; already authenticated when no password is configured
    pub fn open_session(&self) -> Session {
        Session {
            id: Uuid::new_v4(),
            authenticated: self.is_open(),
        }
    }

    /// Check a password and mark the session authenticated on success
    pub fn login(&self, session: &mut Session, password: &str) -> bool {
        let ok = match &self.credentials {
            Some(credentials) => credentials.verify(password),
            None => true,
        };
        if ok {
            session.authenticated = true;
        }
        ok
    }
}

// ============================================================================
// SESSION STORE
// ============================================================================

/// Sessions forget their login after this long
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Logged-in sessions held by a long-running shell, keyed by id.
/// Entries older than the TTL are pruned on every insert.
#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<Uuid, (Session, Instant)>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: HashMap::new(),
            ttl,
        }
    }

    pub fn insert(&mut self, session: Session) {
        self.insert_at(session, Instant::now());
    }

    fn insert_at(&mut self, session: Session, now: Instant) {
        self.prune_at(now);
        self.sessions.insert(session.id(), (session, now));
    }

    pub fn is_authenticated(&self, id: &Uuid) -> bool {
        self.is_authenticated_at(id, Instant::now())
    }

    fn is_authenticated_at(&self, id: &Uuid, now: Instant) -> bool {
        self.sessions
            .get(id)
            .map(|(session, since)| {
                session.is_authenticated() && now.duration_since(*since) < self.ttl
            })
            .unwrap_or(false)
    }

    /// Log out and forget a session; `None` if it was unknown
    pub fn remove(&mut self, id: &Uuid) -> Option<Session> {
        self.sessions.remove(id).map(|(mut session, _)| {
            session.logout();
            session
        })
    }

    fn prune_at(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.sessions.retain(|_, (_, since)| now.duration_since(*since) < ttl);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}
