//! Page sources
//!
//! A page source answers one question: given a blog and the highest post id
//! already seen, what is the next page of posts? The engine only talks to this
//! trait, so tests can script pages without a server.

use crate::config::ApiConfig;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::future::Future;
use thiserror::Error;

/// Errors raised while fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request to {url} failed: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: StatusCode },

    #[error("Unexpected response from {url}: {message}")]
    Format { url: String, message: String },
}

/// A single post as reported by the API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Item {
    pub id: i64,
    #[serde(default)]
    pub post_url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl Item {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            post_url: None,
            timestamp: None,
        }
    }
}

/// One page of posts
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default, rename = "posts")]
    pub items: Vec<Item>,
    #[serde(default)]
    pub has_more: bool,
}

impl Page {
    pub fn new(items: Vec<Item>, has_more: bool) -> Self {
        Self { items, has_more }
    }

    /// Highest post id on this page
    pub fn max_id(&self) -> Option<i64> {
        self.items.iter().map(|item| item.id).max()
    }
}

/// Something that can hand out pages of posts for a blog
pub trait PageSource {
    /// Fetches the page of posts that follows `after_id` for `blog`
    fn fetch_page(
        &self,
        blog: &str,
        after_id: i64,
    ) -> impl Future<Output = Result<Page, FetchError>> + Send;
}

/// Page source backed by the HTTP posts API
///
/// Requests `GET {base_url}/blog/{blog}/posts?after_id=..&limit=..[&api_key=..]`
/// and expects `{"posts": [{"id": ..}, ..], "has_more": bool}` back.
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: Client,
    base_url: String,
    page_size: u32,
    api_key: Option<String>,
}

impl HttpPageSource {
    pub fn new(client: Client, config: &ApiConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
            api_key: config.api_key.clone(),
        }
    }

    fn posts_url(&self, blog: &str) -> String {
        format!("{}/blog/{}/posts", self.base_url, blog)
    }
}

impl PageSource for HttpPageSource {
    async fn fetch_page(&self, blog: &str, after_id: i64) -> Result<Page, FetchError> {
        let url = self.posts_url(blog);

        let mut request = self.client.get(&url).query(&[
            ("after_id", after_id.to_string()),
            ("limit", self.page_size.to_string()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key)]);
        }

        let response = request.send().await.map_err(|source| FetchError::Http {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }

        let body = response.text().await.map_err(|source| FetchError::Http {
            url: url.clone(),
            source,
        })?;

        serde_json::from_str(&body).map_err(|e| FetchError::Format {
            url,
            message: e.to_string(),
        })
    }
}
