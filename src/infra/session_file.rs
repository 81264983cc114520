//! On-disk persistence of the signed-in session between CLI invocations.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tracing::debug;

use crate::domain::session::Identity;

use super::error::InfraError;

/// Tokens and identity captured from the last successful grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub expires_at: Option<OffsetDateTime>,
    pub identity: Identity,
}

impl StoredSession {
    /// True when the access token is past (or within `leeway_secs` of) expiry.
    pub fn is_expired(&self, now: OffsetDateTime, leeway_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at - time::Duration::seconds(leeway_secs) <= now)
    }
}

#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored session; a missing file means nobody is signed in.
    pub fn load(&self) -> Result<Option<StoredSession>, InfraError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        serde_json::from_slice(&bytes).map(Some).map_err(|err| {
            InfraError::session(format!("{} is not a valid session: {err}", self.path.display()))
        })
    }

    /// Write the session atomically so a crash never leaves a torn file.
    pub fn save(&self, session: &StoredSession) -> Result<(), InfraError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let encoded = serde_json::to_vec_pretty(session)
            .map_err(|err| InfraError::session(format!("failed to encode session: {err}")))?;

        let mut file = NamedTempFile::new_in(&dir)?;
        file.write_all(&encoded)?;
        file.flush()?;
        file.persist(&self.path).map_err(|err| InfraError::Io(err.error))?;

        debug!(path = %self.path.display(), "Session stored");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), InfraError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Session cleared");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
