use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Env vars consulted for the API key, in priority order.
pub const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

/// Where users get a key that can run paid-tier video models.
pub const BILLING_DOCS_URL: &str = "https://ai.google.dev/gemini-api/docs/billing";

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Snapshot of the host's authorization context.
#[derive(Clone, Debug, Default)]
pub struct Credential {
    api_key: Option<ApiKey>,
}

impl Credential {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_key(key: ApiKey) -> Self {
        Self { api_key: Some(key) }
    }

    pub fn has_selected_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn api_key(&self) -> Option<&ApiKey> {
        self.api_key.as_ref()
    }
}

/// Host-owned authorization context. The poller reads it and, on specific
/// failures, asks the host to run its key-selection flow again.
#[async_trait]
pub trait CredentialGate: Send + Sync {
    async fn has_selected_key(&self) -> bool;

    /// Ask the host to (re)select a key. Callers do not wait on a result.
    async fn open_selection_flow(&self);

    /// The credential to attach to provider calls right now.
    async fn credential(&self) -> Credential;
}

/// Gate backed by process environment variables (and `.env`).
///
/// Re-selection parses `.env` into a private map; the process environment
/// is never written once the runtime is up.
pub struct EnvCredentialGate {
    current: StdMutex<Option<ApiKey>>,
    dotenv_path: Option<PathBuf>,
}

impl EnvCredentialGate {
    pub fn new(initial: Option<ApiKey>) -> Self {
        Self {
            current: StdMutex::new(initial),
            dotenv_path: None,
        }
    }

    /// Read this file on re-selection instead of searching for `.env`.
    pub fn with_dotenv_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dotenv_path = Some(path.into());
        self
    }

    pub fn from_env() -> Self {
        Self::new(read_key_from_env())
    }

    fn snapshot(&self) -> Option<ApiKey> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `.env` wins over the process environment, matching an override load.
    fn reload_key(&self) -> Option<ApiKey> {
        let parsed = match &self.dotenv_path {
            Some(path) => dotenvy::from_path_iter(path).map(key_from_pairs),
            None => dotenvy::dotenv_iter().map(key_from_pairs),
        };
        match parsed {
            Ok(Some(key)) => Some(key),
            Ok(None) => read_key_from_env(),
            Err(e) => {
                tracing::debug!("no .env read during key selection: {e}");
                read_key_from_env()
            }
        }
    }
}

fn first_key(lookup: impl Fn(&str) -> Option<String>) -> Option<ApiKey> {
    API_KEY_VARS
        .iter()
        .filter_map(|var| lookup(var))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
        .map(ApiKey::new)
}

fn key_from_pairs<I>(pairs: I) -> Option<ApiKey>
where
    I: IntoIterator<Item = Result<(String, String), dotenvy::Error>>,
{
    let vars: HashMap<String, String> = pairs.into_iter().filter_map(Result::ok).collect();
    first_key(|var| vars.get(var).cloned())
}

/// First non-blank key among [`API_KEY_VARS`].
pub fn read_key_from_env() -> Option<ApiKey> {
    first_key(|var| env::var(var).ok())
}

#[async_trait]
impl CredentialGate for EnvCredentialGate {
    async fn has_selected_key(&self) -> bool {
        self.snapshot().is_some()
    }

    async fn open_selection_flow(&self) {
        // A user fixing their key edits .env; pick the new value up.
        let key = self.reload_key();
        if key.is_none() {
            tracing::warn!(
                "no API key selected: set GEMINI_API_KEY to a paid-tier key (see {BILLING_DOCS_URL})"
            );
        } else {
            tracing::info!("API key re-read from .env and environment");
        }
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = key;
    }

    async fn credential(&self) -> Credential {
        Credential {
            api_key: self.snapshot(),
        }
    }
}

/// Serializes selection prompts: callers that queue up behind an in-flight
/// prompt return once it finishes instead of opening another one.
pub struct CoalescingGate<G> {
    inner: G,
    prompt_lock: Mutex<()>,
    completed_prompts: AtomicU64,
}

impl<G: CredentialGate> CoalescingGate<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            prompt_lock: Mutex::new(()),
            completed_prompts: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    /// Number of selection prompts actually forwarded to the inner gate.
    pub fn completed_prompts(&self) -> u64 {
        self.completed_prompts.load(Ordering::Acquire)
    }
}

#[async_trait]
impl<G: CredentialGate> CredentialGate for CoalescingGate<G> {
    async fn has_selected_key(&self) -> bool {
        self.inner.has_selected_key().await
    }

    async fn open_selection_flow(&self) {
        let seen = self.completed_prompts.load(Ordering::Acquire);
        let _guard = self.prompt_lock.lock().await;
        if self.completed_prompts.load(Ordering::Acquire) != seen {
            tracing::debug!("selection prompt finished while waiting, not reopening");
            return;
        }
        self.inner.open_selection_flow().await;
        self.completed_prompts.fetch_add(1, Ordering::AcqRel);
    }

    async fn credential(&self) -> Credential {
        self.inner.credential().await
    }
}
