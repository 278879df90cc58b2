use serde::Deserialize;

/// Main configuration structure for Tumblr-Scraper
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub blogs: Vec<BlogEntry>,
}

impl Config {
    /// Returns the configured blogs, optionally restricted to `only`
    ///
    /// Configured order is kept; names in `only` that are not configured are ignored.
    pub fn select_blogs(&self, only: &[String]) -> Vec<BlogEntry> {
        self.blogs
            .iter()
            .filter(|b| only.is_empty() || only.iter().any(|name| name == &b.name))
            .cloned()
            .collect()
    }
}

/// Remote API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the posts API (e.g., "https://api.tumblr.com/v2")
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Number of posts requested per page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Optional API key appended to every request
    #[serde(rename = "api-key", default)]
    pub api_key: Option<String>,
}

fn default_page_size() -> u32 {
    20
}

/// Session cookie configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// URL the session cookies are scoped to
    #[serde(rename = "auth-url", default = "default_auth_url")]
    pub auth_url: String,

    /// Key the cookies are stored under
    #[serde(rename = "cookies-key", default = "default_cookies_key")]
    pub cookies_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            cookies_key: default_cookies_key(),
        }
    }
}

fn default_auth_url() -> String {
    "https://www.tumblr.com".to_string()
}

fn default_cookies_key() -> String {
    "www.tumblr.com".to_string()
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// A blog to mirror
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlogEntry {
    /// Blog name as understood by the API (e.g., "staff")
    pub name: String,
}

impl BlogEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
