use ::cookie::Cookie as RawCookie;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A session cookie as kept in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    /// Sent only to `domain` itself, not to its subdomains
    #[serde(default)]
    pub host_only: bool,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_path() -> String {
    "/".to_string()
}

impl StoredCookie {
    /// Creates a host-only session cookie (no expiry) for `domain` with path `/`
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            host_only: true,
            path: default_path(),
            expires: None,
            secure: false,
            http_only: false,
        }
    }

    /// Reads a `Set-Cookie` header received from `url`
    ///
    /// Returns `None` for unparsable headers and for a `Domain` that `url`'s
    /// host does not belong to. `Max-Age` wins over `Expires`.
    pub fn from_set_cookie(header: &str, url: &Url, now: DateTime<Utc>) -> Option<Self> {
        let raw = RawCookie::parse(header).ok()?;
        let host = url.host_str()?.to_ascii_lowercase();

        let (domain, host_only) = match raw.domain().map(|d| d.trim_start_matches('.')) {
            Some(domain) if !domain.is_empty() => {
                let domain = domain.to_ascii_lowercase();
                if !domain_matches(&host, &domain) {
                    return None;
                }
                (domain, false)
            }
            _ => (host, true),
        };

        let path = match raw.path() {
            Some(path) if path.starts_with('/') => path.to_string(),
            _ => request_default_path(url),
        };

        let expires = match raw.max_age() {
            Some(age) => Duration::try_seconds(age.whole_seconds())
                .and_then(|age| now.checked_add_signed(age)),
            None => raw
                .expires_datetime()
                .and_then(|at| DateTime::from_timestamp(at.unix_timestamp(), 0)),
        };

        Some(Self {
            name: raw.name().to_string(),
            value: raw.value().to_string(),
            domain,
            host_only,
            path,
            expires,
            secure: raw.secure().unwrap_or(false),
            http_only: raw.http_only().unwrap_or(false),
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    /// Two cookies with the same name, domain and path replace each other
    pub fn same_slot(&self, other: &StoredCookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    /// A URL the cookie can be installed from
    ///
    /// `fallback` is used as is when its host is in the cookie's scope;
    /// otherwise its host is replaced by the cookie's domain.
    pub fn origin_url(&self, fallback: &Url) -> Url {
        let in_scope = fallback.host_str().is_some_and(|host| {
            let host = host.to_ascii_lowercase();
            if self.host_only {
                host == self.domain
            } else {
                domain_matches(&host, &self.domain)
            }
        });
        if self.domain.is_empty() || in_scope {
            return fallback.clone();
        }

        let mut url = fallback.clone();
        match url.set_host(Some(&self.domain)) {
            Ok(()) => url,
            Err(_) => fallback.clone(),
        }
    }

    /// Renders the cookie as a `Set-Cookie` value
    ///
    /// Host-only cookies carry no `Domain` attribute, so they stay bound to the
    /// host of the URL they are installed from.
    pub fn to_set_cookie(&self) -> String {
        let mut header = format!("{}={}", self.name, self.value);

        let path = if self.path.is_empty() { "/" } else { &self.path };
        header.push_str("; Path=");
        header.push_str(path);

        if !self.host_only && !self.domain.is_empty() {
            header.push_str("; Domain=");
            header.push_str(&self.domain);
        }

        if let Some(expires) = self.expires {
            header.push_str("; Expires=");
            header.push_str(&expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string());
        }

        if self.secure {
            header.push_str("; Secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }

        header
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|rest| rest.ends_with('.'))
}

/// Directory of the request path, used when `Path` is missing
fn request_default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => default_path(),
        Some(end) => path[..end].to_string(),
    }
}
