//! Batch orchestration
//!
//! Runs the fetch loop for each configured blog in order and records the new
//! cursor after every blog that finishes. The first cancellation or failure
//! ends the batch; blogs after it are left for the next run.

use crate::config::{BlogEntry, SessionConfig, UserAgentConfig};
use crate::crawler::engine::{crawl_blog, CrawlState, ItemSink};
use crate::crawler::source::{FetchError, PageSource};
use crate::session::Session;
use crate::storage::Storage;
use crate::ScraperError;
use tokio_util::sync::CancellationToken;

/// A blog whose cursor was written during this batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedBlog {
    pub name: String,
    pub previous_id: Option<i64>,
    pub highest_id: i64,
    pub new_items: u64,
}

/// How a batch ended
#[derive(Debug)]
pub enum BatchOutcome {
    /// Every blog was fetched to exhaustion
    Completed { blogs: Vec<CompletedBlog> },
    /// The token fired; the blog in progress kept its previous cursor
    Cancelled { completed: Vec<CompletedBlog> },
    /// A fetch failed; the failing blog and everything after it were skipped
    Failed {
        blog: String,
        error: FetchError,
        completed: Vec<CompletedBlog>,
    },
}

impl BatchOutcome {
    /// Blogs whose cursor was written, whatever the outcome
    pub fn completed(&self) -> &[CompletedBlog] {
        match self {
            Self::Completed { blogs } => blogs,
            Self::Cancelled { completed } | Self::Failed { completed, .. } => completed,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Converts a failed batch into `ScraperError::Fetch`
    pub fn into_result(self) -> Result<Vec<CompletedBlog>, ScraperError> {
        match self {
            Self::Completed { blogs } => Ok(blogs),
            Self::Cancelled { completed } => Ok(completed),
            Self::Failed { blog, error, .. } => Err(ScraperError::Fetch {
                blog,
                source: error,
            }),
        }
    }
}

/// Drives the fetch loop over a list of blogs against one store
pub struct BatchRunner<'a, P: ?Sized, S: ?Sized> {
    source: &'a P,
    store: &'a mut S,
}

impl<'a, P, S> BatchRunner<'a, P, S>
where
    P: PageSource + ?Sized,
    S: Storage + ?Sized,
{
    pub fn new(source: &'a P, store: &'a mut S) -> Self {
        Self { source, store }
    }

    /// Processes `blogs` strictly in order
    ///
    /// # Returns
    ///
    /// * `Ok(BatchOutcome)` - How the batch ended; fetch failures are reported here
    /// * `Err(ScraperError::Storage)` - A cursor could not be read or written
    pub async fn run<K>(
        &mut self,
        blogs: &[BlogEntry],
        cancel: &CancellationToken,
        sink: &mut K,
    ) -> Result<BatchOutcome, ScraperError>
    where
        K: ItemSink + ?Sized,
    {
        let mut completed = Vec::with_capacity(blogs.len());

        for blog in blogs {
            let previous_id = self.store.get_highest_id(&blog.name)?;
            let cursor = previous_id.unwrap_or(0);
            tracing::info!("Scraping '{}' from post id {}", blog.name, cursor);

            let report = crawl_blog(self.source, &blog.name, cursor, cancel, sink).await;

            match report.state {
                CrawlState::Cancelled => {
                    tracing::info!(
                        "Cancelled while scraping '{}', keeping stored cursor {}",
                        blog.name,
                        cursor
                    );
                    return Ok(BatchOutcome::Cancelled { completed });
                }
                CrawlState::Failed(error) => {
                    tracing::error!("Scraping '{}' failed: {}", blog.name, error);
                    return Ok(BatchOutcome::Failed {
                        blog: blog.name.clone(),
                        error,
                        completed,
                    });
                }
                CrawlState::Exhausted => {
                    self.store.set_highest_id(&blog.name, report.highest_id)?;
                    tracing::info!(
                        "Finished '{}': {} new posts over {} pages, highest id {}",
                        blog.name,
                        report.new_items,
                        report.pages_fetched,
                        report.highest_id
                    );
                    completed.push(CompletedBlog {
                        name: blog.name.clone(),
                        previous_id,
                        highest_id: report.highest_id,
                        new_items: report.new_items,
                    });
                }
            }
        }

        Ok(BatchOutcome::Completed { blogs: completed })
    }
}

/// Builds the session for a batch and restores its stored cookies
///
/// If either step fails `store` is closed before the error is returned, so
/// the only way to get a store past this point is through `run_batch`.
pub fn start_session<S>(
    user_agent: &UserAgentConfig,
    session: &SessionConfig,
    store: &mut S,
) -> Result<Session, ScraperError>
where
    S: Storage + ?Sized,
{
    let started = Session::new(user_agent, session).and_then(|session| {
        let restored = session.restore(&*store)?;
        Ok((session, restored))
    });

    match started {
        Ok((session, 0)) => {
            tracing::info!("No stored session, requests will be unauthenticated");
            Ok(session)
        }
        Ok((session, restored)) => {
            tracing::info!("Restored {} session cookies", restored);
            Ok(session)
        }
        Err(e) => {
            if let Err(close_err) = store.close() {
                tracing::warn!("Failed to close storage: {}", close_err);
            }
            Err(e)
        }
    }
}

/// Runs a whole batch and tears down on every exit path
///
/// After the blogs are processed (or the batch stops early) the session's
/// cookies are written to `store` and `store` is closed. A failure to persist
/// cookies is only logged. A failure to close is returned only when the batch
/// itself succeeded.
pub async fn run_batch<P, S, K>(
    blogs: &[BlogEntry],
    store: &mut S,
    session: &Session,
    source: &P,
    cancel: &CancellationToken,
    sink: &mut K,
) -> Result<BatchOutcome, ScraperError>
where
    P: PageSource + ?Sized,
    S: Storage + ?Sized,
    K: ItemSink + ?Sized,
{
    let result = BatchRunner::new(source, &mut *store)
        .run(blogs, cancel, sink)
        .await;

    match session.persist(store) {
        Ok(count) => tracing::debug!("Saved {} session cookies", count),
        Err(e) => tracing::warn!("Failed to save session cookies: {}", e),
    }

    if let Err(e) = store.close() {
        if result.is_ok() {
            return Err(e.into());
        }
        tracing::warn!("Failed to close storage: {}", e);
    }

    result
}
