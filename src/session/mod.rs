//! Session cookie management
//!
//! The HTTP client keeps its cookies in a shared [`SessionJar`]. During a run
//! the jar is authoritative; across runs the store is. This module moves
//! cookies between the two:
//! - `restore_cookies` loads stored cookies into the jar at startup
//! - `persist_cookies` captures the jar and writes it back at checkpoints

mod cookie;
mod jar;

pub use cookie::StoredCookie;
pub use jar::SessionJar;

use crate::config::{SessionConfig, UserAgentConfig};
use crate::storage::{Storage, StorageResult};
use crate::ScraperError;
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// An HTTP client together with the cookie jar backing it
///
/// This is handed to the batch runner as one explicit value instead of
/// living in process-wide state.
#[derive(Clone)]
pub struct Session {
    client: Client,
    jar: Arc<SessionJar>,
    auth_url: Url,
    cookies_key: String,
}

impl Session {
    /// Builds a client whose cookies live in a fresh jar
    ///
    /// # Arguments
    ///
    /// * `user_agent` - Used to format the `User-Agent` header
    /// * `session` - Authentication URL and cookie storage key
    pub fn new(user_agent: &UserAgentConfig, session: &SessionConfig) -> Result<Self, ScraperError> {
        let jar = Arc::new(SessionJar::new());
        let client = build_http_client(user_agent, jar.clone())?;
        let auth_url = Url::parse(&session.auth_url)?;

        Ok(Self::from_parts(
            client,
            jar,
            auth_url,
            session.cookies_key.clone(),
        ))
    }

    /// Assembles a session from an existing client and the jar it was built with
    pub fn from_parts(
        client: Client,
        jar: Arc<SessionJar>,
        auth_url: Url,
        cookies_key: String,
    ) -> Self {
        Self {
            client,
            jar,
            auth_url,
            cookies_key,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn jar(&self) -> &Arc<SessionJar> {
        &self.jar
    }

    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    pub fn cookies_key(&self) -> &str {
        &self.cookies_key
    }

    /// Loads stored cookies into this session's jar
    pub fn restore<S: Storage + ?Sized>(&self, store: &S) -> StorageResult<usize> {
        restore_cookies(&self.jar, store, &self.cookies_key, &self.auth_url)
    }

    /// Writes this session's current cookies to the store
    pub fn persist<S: Storage + ?Sized>(&self, store: &mut S) -> StorageResult<usize> {
        persist_cookies(&self.jar, store, &self.cookies_key)
    }

    /// Cookies the jar currently holds
    pub fn cookies(&self) -> Vec<StoredCookie> {
        capture_cookies(&self.jar)
    }
}

/// Builds the HTTP client used for every API request
pub fn build_http_client(
    config: &UserAgentConfig,
    jar: Arc<SessionJar>,
) -> Result<Client, reqwest::Error> {
    let user_agent = format!("{}/{}", config.crawler_name, config.crawler_version);

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .cookie_provider(jar)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Installs the cookies stored under `domain_key` into `jar`
///
/// Each cookie keeps its own domain scope, path, expiry and flags; `auth_url`
/// supplies the scheme and the host for cookies without a domain. Expired
/// cookies are skipped. With nothing stored the jar is left untouched, so
/// requests go out unauthenticated.
///
/// # Returns
///
/// The number of cookies installed
pub fn restore_cookies<S: Storage + ?Sized>(
    jar: &SessionJar,
    store: &S,
    domain_key: &str,
    auth_url: &Url,
) -> StorageResult<usize> {
    let cookies = store.get_cookies(domain_key)?;
    let now = Utc::now();
    let mut restored = 0;

    for cookie in &cookies {
        if cookie.is_expired_at(now) {
            tracing::debug!("Skipping expired cookie '{}'", cookie.name);
            continue;
        }
        jar.insert(cookie, auth_url);
        restored += 1;
    }

    tracing::debug!(
        "Restored {} of {} stored cookies for {}",
        restored,
        cookies.len(),
        domain_key
    );
    Ok(restored)
}

/// Every unexpired cookie `jar` holds, with its full attributes
pub fn capture_cookies(jar: &SessionJar) -> Vec<StoredCookie> {
    jar.snapshot(Utc::now())
}

/// Captures the jar's cookies and stores them under `domain_key`
///
/// All cookies are written in one call, replacing the previous collection.
///
/// # Returns
///
/// The number of cookies written
pub fn persist_cookies<S: Storage + ?Sized>(
    jar: &SessionJar,
    store: &mut S,
    domain_key: &str,
) -> StorageResult<usize> {
    let cookies = capture_cookies(jar);
    store.set_cookies(domain_key, &cookies)?;
    tracing::debug!("Persisted {} cookies for {}", cookies.len(), domain_key);
    Ok(cookies.len())
}
