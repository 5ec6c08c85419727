//! Identity Provider
//!
//! Resolves a stable caller identity. Resolution order on first call:
//! in-memory session cache, durable cache file, server `whoami`, then a
//! synthesized guest id. Successful resolution is written back to both
//! caches so later calls return without I/O.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::services::http::CommandApi;
use crate::utils::error::{CoreError, CoreResult};

/// Resolves and caches the caller's identity
pub struct IdentityProvider {
    api: Arc<dyn CommandApi>,
    allow_guest: bool,
    cache_path: Option<PathBuf>,
    session: RwLock<Option<String>>,
}

impl IdentityProvider {
    /// Create a provider using the platform data directory for the durable
    /// cache
    pub fn new(api: Arc<dyn CommandApi>, allow_guest: bool) -> Self {
        Self::with_cache_path(api, allow_guest, default_cache_path())
    }

    /// Create a provider with an explicit durable cache location
    pub fn with_cache_path(
        api: Arc<dyn CommandApi>,
        allow_guest: bool,
        cache_path: Option<PathBuf>,
    ) -> Self {
        Self {
            api,
            allow_guest,
            cache_path,
            session: RwLock::new(None),
        }
    }

    /// Resolve the caller identity.
    ///
    /// Fails with [`CoreError::IdentityUnavailable`] only when every source
    /// fails and guest synthesis is disabled.
    pub async fn get_identity(&self) -> CoreResult<String> {
        if let Some(cached) = self.session.read().expect("identity lock poisoned").clone() {
            return Ok(cached);
        }

        if let Some(stored) = self.read_durable() {
            self.remember_session(&stored);
            return Ok(stored);
        }

        match self.api.whoami().await {
            Ok(user_id) if !user_id.is_empty() => {
                self.persist(&user_id);
                return Ok(user_id);
            }
            Ok(_) => tracing::debug!("whoami returned an empty user id"),
            Err(e) => tracing::debug!(error = %e, "whoami lookup failed"),
        }

        if !self.allow_guest {
            return Err(CoreError::IdentityUnavailable);
        }

        let guest = synthesize_guest_id();
        self.persist(&guest);
        Ok(guest)
    }

    fn read_durable(&self) -> Option<String> {
        let path = self.cache_path.as_ref()?;
        let contents = std::fs::read_to_string(path).ok()?;
        let trimmed = contents.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn remember_session(&self, identity: &str) {
        *self.session.write().expect("identity lock poisoned") = Some(identity.to_string());
    }

    fn persist(&self, identity: &str) {
        self.remember_session(identity);
        if let Some(path) = &self.cache_path {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Err(e) = std::fs::write(path, identity) {
                tracing::debug!(error = %e, "failed to persist identity cache");
            }
        }
    }
}

fn default_cache_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("command-center").join("identity"))
}

/// Synthesize a guest identity of the form `guest_<epoch-ms>_<random>`
fn synthesize_guest_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!(
        "guest_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        suffix.to_lowercase()
    )
}
