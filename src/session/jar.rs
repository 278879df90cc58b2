use crate::session::StoredCookie;
use chrono::{DateTime, Utc};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use std::sync::{Mutex, MutexGuard, PoisonError};
use url::Url;

/// Cookie provider for the HTTP client
///
/// Matching and sending is left to reqwest's [`Jar`]. Alongside it the jar
/// keeps the full record of every cookie it accepted (domain scope, path,
/// expiry and flags) so the session can be written back without loss.
#[derive(Default)]
pub struct SessionJar {
    jar: Jar,
    records: Mutex<Vec<StoredCookie>>,
}

impl SessionJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a stored cookie with all of its attributes
    ///
    /// `fallback` is the URL used when the cookie's own domain already covers it.
    pub fn insert(&self, cookie: &StoredCookie, fallback: &Url) {
        let url = cookie.origin_url(fallback);
        self.jar.add_cookie_str(&cookie.to_set_cookie(), &url);
        self.remember(cookie.clone());
    }

    /// Adds a cookie the way a `Set-Cookie` header from `url` would
    pub fn add_cookie_str(&self, cookie: &str, url: &Url) {
        self.record_header(cookie, url);
        self.jar.add_cookie_str(cookie, url);
    }

    /// Every cookie still alive at `now`, in the order they were first set
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<StoredCookie> {
        self.records()
            .iter()
            .filter(|cookie| !cookie.is_expired_at(now))
            .cloned()
            .collect()
    }

    fn record_header(&self, header: &str, url: &Url) {
        match StoredCookie::from_set_cookie(header, url, Utc::now()) {
            Some(cookie) => self.remember(cookie),
            None => tracing::debug!("Ignoring unusable cookie from {}", url),
        }
    }

    fn remember(&self, cookie: StoredCookie) {
        let mut records = self.records();
        match records.iter_mut().find(|existing| existing.same_slot(&cookie)) {
            Some(existing) => *existing = cookie,
            None => records.push(cookie),
        }
    }

    fn records(&self) -> MutexGuard<'_, Vec<StoredCookie>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let headers: Vec<HeaderValue> = cookie_headers.cloned().collect();

        for header in &headers {
            match header.to_str() {
                Ok(value) => self.record_header(value, url),
                Err(_) => tracing::debug!("Ignoring non-text Set-Cookie from {}", url),
            }
        }

        self.jar.set_cookies(&mut headers.iter(), url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }
}
