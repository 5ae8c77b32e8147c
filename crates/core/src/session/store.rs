use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::{
    api::{LoginRequest, ShopApi},
    error::{ConsoleError, Result, ValidationError},
};

use super::models::{PersistedSession, Session};

/// Shared handle to the signed-in session, backed by a JSON file so a
/// restart resumes where the operator left off.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    session: Option<Session>,
}

impl SessionStore {
    /// Open the store at `path`, restoring any persisted session.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let session = match read_persisted(&path) {
            Ok(Some(persisted)) => {
                let session = Session::from(persisted);
                info!(shop_id = %session.shop_id, "Restored persisted session");
                Some(session).filter(Session::has_shop)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Ignoring unreadable session file");
                None
            }
        };
        Self {
            inner: Arc::new(RwLock::new(Inner { path, session })),
        }
    }

    /// File backing this store.
    pub fn path(&self) -> PathBuf {
        self.inner.read().path.clone()
    }

    /// The signed-in session, if any.
    pub fn current(&self) -> Option<Session> {
        self.inner.read().session.clone()
    }

    /// Shop id of the current session, or [`ConsoleError::MissingShop`].
    pub fn require_shop(&self) -> Result<String> {
        self.inner
            .read()
            .session
            .as_ref()
            .filter(|session| session.has_shop())
            .map(|session| session.shop_id.clone())
            .ok_or(ConsoleError::MissingShop)
    }

    /// Authenticate against the shop API and persist the resulting session.
    pub async fn login<A: ShopApi>(
        &self,
        api: &A,
        shop_id: &str,
        username: &str,
        password: &str,
    ) -> Result<Session> {
        let shop_id = required("shop id", shop_id)?;
        let username = required("username", username)?;
        if password.is_empty() {
            return Err(ValidationError::Empty { field: "password" }.into());
        }
        let request = LoginRequest {
            shop_id,
            username,
            password: password.to_string(),
        };

        let response = api.login(&request).await?;
        let user = response
            .user
            .ok_or_else(|| ConsoleError::Auth("Invalid response from server".to_string()))?;
        let session = Session::from_login(&request.shop_id, &request.username, response.token, user);

        let path = self.path();
        write_persisted(&path, &PersistedSession::from(&session))?;
        self.inner.write().session = Some(session.clone());
        info!(shop_id = %session.shop_id, user = %session.display_name, "Logged in");
        Ok(session)
    }

    /// Forget the session in memory and on disk. Never fails on a missing file.
    pub fn logout(&self) {
        let mut inner = self.inner.write();
        let previous = inner.session.take();
        match fs::remove_file(&inner.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %inner.path.display(), error = %err, "Failed to remove session file");
            }
        }
        if let Some(session) = previous {
            info!(shop_id = %session.shop_id, "Logged out");
        }
    }
}

fn required(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field }.into());
    }
    Ok(trimmed.to_string())
}

fn read_persisted(path: &Path) -> Result<Option<PersistedSession>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .map_err(|err| ConsoleError::Storage(format!("failed to read {}: {err}", path.display())))?;
    let persisted = serde_json::from_str(&contents).map_err(|err| {
        ConsoleError::Storage(format!("failed to parse {}: {err}", path.display()))
    })?;
    Ok(Some(persisted))
}

fn write_persisted(path: &Path, persisted: &PersistedSession) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            ConsoleError::Storage(format!("failed to create {}: {err}", parent.display()))
        })?;
    }
    let serialized = serde_json::to_vec_pretty(persisted)
        .map_err(|err| ConsoleError::Storage(format!("failed to serialize session: {err}")))?;
    fs::write(path, serialized)
        .map_err(|err| ConsoleError::Storage(format!("failed to write {}: {err}", path.display())))
}
