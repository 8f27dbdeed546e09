//! Login session handling and token persistence.

use crate::rest::SiagaClient;
use common::{AuthUser, Error, Result, StoredSession};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// Where a login survives between runs.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredSession>>;
    fn save(&self, session: &StoredSession) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryTokenStore {
    session: Mutex<Option<StoredSession>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<StoredSession>> {
        let guard = self
            .session
            .lock()
            .map_err(|_| Error::Other("token store lock poisoned".into()))?;
        Ok(guard.clone())
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| Error::Other("token store lock poisoned".into()))?;
        *guard = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| Error::Other("token store lock poisoned".into()))?;
        *guard = None;
        Ok(())
    }
}

/// JSON file holding `{token, user}`.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<StoredSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!("Ignoring unreadable token file {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(session)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Current login state on top of a [`TokenStore`].
pub struct AuthSession<S: TokenStore> {
    client: SiagaClient,
    store: S,
    current: Option<StoredSession>,
}

impl<S: TokenStore> AuthSession<S> {
    pub fn new(client: SiagaClient, store: S) -> Self {
        Self {
            client,
            store,
            current: None,
        }
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.current.as_ref().map(|s| &s.user)
    }

    pub fn token(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.token.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.is_some()
    }

    /// Exchange a Google ID token for a backend session and persist it.
    pub async fn login_with_google(&mut self, credential: &str) -> Result<AuthUser> {
        let resp = self.client.google_login(credential).await?;
        let session = StoredSession {
            token: resp.token,
            user: resp.user,
        };
        self.store.save(&session)?;
        info!("Logged in as {}", session.user.email);
        let user = session.user.clone();
        self.current = Some(session);
        Ok(user)
    }

    /// Load the stored session and check it with the backend.
    ///
    /// An explicit rejection clears the store. Transport failures keep the
    /// stored session untouched and return the error.
    pub async fn restore(&mut self) -> Result<Option<AuthUser>> {
        let Some(stored) = self.store.load()? else {
            return Ok(None);
        };

        match self.client.verify_token(&stored.token).await {
            Ok(resp) if resp.valid => {
                let user = resp.user.unwrap_or_else(|| stored.user.clone());
                let session = StoredSession {
                    token: stored.token,
                    user: user.clone(),
                };
                self.store.save(&session)?;
                self.current = Some(session);
                Ok(Some(user))
            }
            Ok(_) | Err(Error::HttpStatus { .. }) | Err(Error::Application(_)) => {
                info!("Stored session is no longer valid; clearing");
                self.store.clear()?;
                self.current = None;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Tell the backend (best effort) and always forget the local session.
    pub async fn logout(&mut self) -> Result<()> {
        let token = self
            .current
            .take()
            .map(|s| s.token)
            .or(self.store.load()?.map(|s| s.token));

        if let Some(token) = token {
            if let Err(e) = self.client.logout(&token).await {
                warn!("Logout call failed, clearing local session anyway: {}", e);
            }
        }
        self.store.clear()
    }
}
