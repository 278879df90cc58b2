//! Per-blog fetch loop
//!
//! Walks one blog page by page from a starting cursor until the source runs
//! dry, a fetch fails, or the cancellation token fires. The token is checked
//! before every request; a request already in flight is allowed to finish.

use crate::crawler::source::{FetchError, Item, PageSource};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// How a blog's fetch loop ended
#[derive(Debug)]
pub enum CrawlState {
    /// The source reported no further pages
    Exhausted,
    /// The token was cancelled before the next request
    Cancelled,
    /// A page fetch failed
    Failed(FetchError),
}

impl CrawlState {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result of fetching one blog
#[derive(Debug)]
pub struct CrawlReport {
    pub blog: String,
    pub state: CrawlState,
    /// Highest post id observed, never below the starting cursor
    pub highest_id: i64,
    pub pages_fetched: u32,
    /// Posts above the starting cursor handed to the sink
    pub new_items: u64,
}

/// Receives posts that are newer than the blog's cursor
pub trait ItemSink {
    fn accept(&mut self, blog: &str, item: &Item);
}

/// Sink that only logs each new post
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ItemSink for LogSink {
    fn accept(&mut self, blog: &str, item: &Item) {
        match &item.post_url {
            Some(url) => tracing::info!("[{}] new post {} ({})", blog, item.id, url),
            None => tracing::info!("[{}] new post {}", blog, item.id),
        }
    }
}

impl ItemSink for Vec<Item> {
    fn accept(&mut self, _blog: &str, item: &Item) {
        self.push(item.clone());
    }
}

/// Fetches pages for `blog` starting after `cursor`
///
/// # Arguments
///
/// * `source` - Where pages come from
/// * `blog` - Blog name
/// * `cursor` - Highest post id from previous runs (0 to start from the beginning)
/// * `cancel` - Checked before every page request
/// * `sink` - Receives each post with an id above `cursor`, once
///
/// # Returns
///
/// A report whose `highest_id` is the maximum of `cursor` and every post id on
/// the pages fetched before the loop stopped
pub async fn crawl_blog<P, K>(
    source: &P,
    blog: &str,
    cursor: i64,
    cancel: &CancellationToken,
    sink: &mut K,
) -> CrawlReport
where
    P: PageSource + ?Sized,
    K: ItemSink + ?Sized,
{
    let mut highest_id = cursor;
    let mut pages_fetched = 0;
    let mut new_items = 0;
    let mut seen = HashSet::new();

    let state = loop {
        if cancel.is_cancelled() {
            tracing::debug!("[{}] cancelled after {} pages", blog, pages_fetched);
            break CrawlState::Cancelled;
        }

        let page = match source.fetch_page(blog, highest_id).await {
            Ok(page) => page,
            Err(e) => break CrawlState::Failed(e),
        };
        pages_fetched += 1;

        let mut unseen = 0;
        for item in &page.items {
            if !seen.insert(item.id) {
                continue;
            }
            unseen += 1;
            highest_id = highest_id.max(item.id);

            if item.id > cursor {
                sink.accept(blog, item);
                new_items += 1;
            }
        }

        tracing::debug!(
            "[{}] page {}: {} posts, highest id {}",
            blog,
            pages_fetched,
            page.items.len(),
            highest_id
        );

        if page.items.is_empty() || !page.has_more {
            break CrawlState::Exhausted;
        }

        if unseen == 0 {
            tracing::warn!(
                "[{}] page {} repeated posts already seen, stopping",
                blog,
                pages_fetched
            );
            break CrawlState::Exhausted;
        }
    };

    CrawlReport {
        blog: blog.to_string(),
        state,
        highest_id,
        pages_fetched,
        new_items,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crawler::source::Page;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted step for a test source
    pub(crate) enum Step {
        Page(Vec<i64>, bool),
        Fail,
    }

    /// Source that replays a fixed script and records every request
    pub(crate) struct ScriptedSource {
        script: Mutex<VecDeque<Step>>,
        pub(crate) requests: Mutex<Vec<(String, i64)>>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl ScriptedSource {
        pub(crate) fn new(script: Vec<Step>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
                cancel_after: None,
            }
        }

        /// Cancels `token` once `n` requests have been answered
        pub(crate) fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
            self.cancel_after = Some((n, token));
            self
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl PageSource for ScriptedSource {
        async fn fetch_page(&self, blog: &str, after_id: i64) -> Result<Page, FetchError> {
            let count = {
                let mut requests = self.requests.lock().unwrap();
                requests.push((blog.to_string(), after_id));
                requests.len()
            };

            if let Some((n, token)) = &self.cancel_after {
                if count >= *n {
                    token.cancel();
                }
            }

            match self.script.lock().unwrap().pop_front() {
                Some(Step::Page(ids, has_more)) => Ok(Page::new(
                    ids.into_iter().map(Item::new).collect(),
                    has_more,
                )),
                Some(Step::Fail) => Err(FetchError::Status {
                    url: format!("test://{}", blog),
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                }),
                None => Ok(Page::default()),
            }
        }
    }

    fn ids(items: &[Item]) -> Vec<i64> {
        items.iter().map(|i| i.id).collect()
    }

    #[tokio::test]
    async fn test_highest_id_is_max_across_pages() {
        let source = ScriptedSource::new(vec![
            Step::Page(vec![5], true),
            Step::Page(vec![3], true),
            Step::Page(vec![9], false),
        ]);
        let mut sink = Vec::new();

        let report = crawl_blog(&source, "alpha", 0, &CancellationToken::new(), &mut sink).await;

        assert!(report.state.is_exhausted());
        assert_eq!(report.highest_id, 9);
        assert_eq!(report.pages_fetched, 3);
        assert_eq!(ids(&sink), vec![5, 3, 9]);
    }

    #[tokio::test]
    async fn test_requests_carry_highest_id_so_far() {
        let source = ScriptedSource::new(vec![
            Step::Page(vec![12, 11], true),
            Step::Page(vec![14], true),
            Step::Page(vec![], true),
        ]);

        crawl_blog(&source, "alpha", 10, &CancellationToken::new(), &mut LogSink).await;

        let after: Vec<i64> = source
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, after)| *after)
            .collect();
        assert_eq!(after, vec![10, 12, 14]);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_fetch() {
        let source = ScriptedSource::new(vec![Step::Page(vec![1, 2], false)]);
        let token = CancellationToken::new();
        token.cancel();

        let report = crawl_blog(&source, "alpha", 4, &token, &mut LogSink).await;

        assert!(report.state.is_cancelled());
        assert_eq!(report.highest_id, 4);
        assert_eq!(report.pages_fetched, 0);
        assert_eq!(source.request_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_between_pages() {
        let token = CancellationToken::new();
        let source = ScriptedSource::new(vec![
            Step::Page(vec![1, 2], true),
            Step::Page(vec![7, 3], true),
            Step::Page(vec![20], false),
        ])
        .cancel_after(2, token.clone());

        let report = crawl_blog(&source, "alpha", 0, &token, &mut LogSink).await;

        assert!(report.state.is_cancelled());
        assert_eq!(report.highest_id, 7);
        assert_eq!(report.pages_fetched, 2);
        assert_eq!(source.request_count(), 2);
    }

    #[tokio::test]
    async fn test_items_at_or_below_cursor_are_not_new() {
        let source = ScriptedSource::new(vec![Step::Page(vec![7, 9, 10, 12], false)]);
        let mut sink = Vec::new();

        let report = crawl_blog(&source, "alpha", 9, &CancellationToken::new(), &mut sink).await;

        assert_eq!(ids(&sink), vec![10, 12]);
        assert_eq!(report.new_items, 2);
        assert_eq!(report.highest_id, 12);
    }

    #[tokio::test]
    async fn test_nothing_new_keeps_cursor() {
        let source = ScriptedSource::new(vec![Step::Page(vec![], false)]);
        let mut sink = Vec::new();

        let report = crawl_blog(&source, "alpha", 9, &CancellationToken::new(), &mut sink).await;

        assert!(report.state.is_exhausted());
        assert_eq!(report.highest_id, 9);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_progress_so_far() {
        let source = ScriptedSource::new(vec![Step::Page(vec![4, 6], true), Step::Fail]);

        let report = crawl_blog(&source, "alpha", 0, &CancellationToken::new(), &mut LogSink).await;

        assert!(matches!(
            report.state,
            CrawlState::Failed(FetchError::Status { .. })
        ));
        assert_eq!(report.highest_id, 6);
        assert_eq!(report.pages_fetched, 1);
    }

    #[tokio::test]
    async fn test_repeated_page_stops_loop() {
        let source = ScriptedSource::new(vec![
            Step::Page(vec![1, 2], true),
            Step::Page(vec![1, 2], true),
            Step::Page(vec![3], false),
        ]);
        let mut sink = Vec::new();

        let report = crawl_blog(&source, "alpha", 0, &CancellationToken::new(), &mut sink).await;

        assert!(report.state.is_exhausted());
        assert_eq!(report.pages_fetched, 2);
        assert_eq!(ids(&sink), vec![1, 2]);
    }
}
