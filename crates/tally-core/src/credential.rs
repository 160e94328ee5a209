//! Credential cache
//!
//! Holds the bearer credential used for remote writes. A credential
//! obtained from the interactive prompt is cached in memory for a fixed
//! time-to-live; an operator-supplied credential from configuration always
//! wins and never expires. Nothing here is ever written to disk.
//!
//! ## States
//!
//! - `Empty`: nothing cached
//! - `Valid(credential, expires_at)`: cached and usable
//! - `Expired`: treated as `Empty` and cleared on the next `get()`
//!
//! At most one prompt is outstanding at a time. A caller that arrives while
//! a prompt is open gets `None` straight away rather than queueing behind it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

/// An opaque bearer secret
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for building the Authorization header
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Interactive collaborator that asks the user for a credential
///
/// Resolves to `None` when the user cancels.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    async fn prompt(&self) -> Option<String>;
}

/// Prompt that never yields a credential (non-interactive use)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

#[async_trait]
impl CredentialPrompt for NoPrompt {
    async fn prompt(&self) -> Option<String> {
        None
    }
}

/// Where the current credential comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// Configured by the operator
    Static,
    /// Cached from a prompt
    Session,
    /// No usable credential
    None,
}

#[derive(Debug)]
struct CachedCredential {
    credential: Credential,
    expires_at: Instant,
}

/// Process-wide credential cache
#[derive(Debug)]
pub struct CredentialCache {
    static_credential: Option<Credential>,
    ttl: Duration,
    session: Mutex<Option<CachedCredential>>,
    prompting: AtomicBool,
}

impl CredentialCache {
    /// Create a cache whose prompted credentials live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            static_credential: None,
            ttl,
            session: Mutex::new(None),
            prompting: AtomicBool::new(false),
        }
    }

    /// Use an operator-supplied credential that takes precedence over the cache
    pub fn with_static(mut self, secret: Option<String>) -> Self {
        self.static_credential = secret
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(Credential);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a usable credential without prompting
    pub fn get(&self) -> Option<Credential> {
        if let Some(ref credential) = self.static_credential {
            return Some(credential.clone());
        }

        let mut session = self.session();
        match session.as_ref() {
            Some(cached) if Instant::now() < cached.expires_at => Some(cached.credential.clone()),
            Some(_) => {
                debug!("Session credential expired, clearing cache");
                *session = None;
                None
            }
            None => None,
        }
    }

    /// Return a usable credential, prompting once if none is cached
    pub async fn acquire(&self, prompt: &dyn CredentialPrompt) -> Option<Credential> {
        if let Some(credential) = self.get() {
            return Some(credential);
        }

        if self
            .prompting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Credential prompt already open, not prompting again");
            return None;
        }
        let _guard = PromptGuard(&self.prompting);

        debug!("No valid credential, prompting");
        let secret = prompt.prompt().await?;
        let secret = secret.trim();
        if secret.is_empty() {
            return None;
        }

        let credential = Credential(secret.to_string());
        *self.session() = Some(CachedCredential {
            credential: credential.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        debug!("Cached session credential for {:?}", self.ttl);
        Some(credential)
    }

    /// Drop the cached credential after the remote store rejected it
    pub fn invalidate(&self) {
        debug!("Invalidating session credential");
        *self.session() = None;
    }

    /// Forget the cached credential at the user's request
    pub fn clear(&self) {
        *self.session() = None;
    }

    /// Remaining lifetime of the session credential
    ///
    /// `None` for a static credential or when nothing valid is cached.
    pub fn remaining(&self) -> Option<Duration> {
        if self.static_credential.is_some() {
            return None;
        }
        self.session()
            .as_ref()
            .map(|cached| cached.expires_at.saturating_duration_since(Instant::now()))
            .filter(|left| !left.is_zero())
    }

    pub fn source(&self) -> CredentialSource {
        if self.static_credential.is_some() {
            CredentialSource::Static
        } else if self.remaining().is_some() {
            CredentialSource::Session
        } else {
            CredentialSource::None
        }
    }

    pub fn is_prompting(&self) -> bool {
        self.prompting.load(Ordering::Acquire)
    }

    fn session(&self) -> MutexGuard<'_, Option<CachedCredential>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Releases the prompt slot even if the prompting future is dropped
struct PromptGuard<'a>(&'a AtomicBool);

impl Drop for PromptGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
