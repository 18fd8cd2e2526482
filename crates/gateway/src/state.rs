//! Application state shared across middlewares and handlers.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::cookies::CookieSigner;
use crate::directory::Directory;
use crate::middleware::rate_limit::RateLimiter;

/// Application state shared across all middlewares.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// configuration, the collaborator directory, the cookie signer and the
/// process-wide rate limiter.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: GatewayConfig,
    directory: Directory,
    signer: CookieSigner,
    rate_limiter: RateLimiter,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.inner.config)
            .field("directory", &self.inner.directory)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Gateway configuration
    /// * `directory` - Host collaborators
    #[must_use]
    pub fn new(config: GatewayConfig, directory: Directory) -> Self {
        let signer = CookieSigner::new(config.signing_key_bytes());
        let rate_limiter = RateLimiter::new(&config.rate_limit);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                directory,
                signer,
                rate_limiter,
            }),
        }
    }

    /// Get a reference to the gateway configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Get a reference to the collaborator directory.
    #[must_use]
    pub fn directory(&self) -> &Directory {
        &self.inner.directory
    }

    /// Get a reference to the cookie signer.
    #[must_use]
    pub fn signer(&self) -> &CookieSigner {
        &self.inner.signer
    }

    /// Get a reference to the rate limiter.
    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }
}
