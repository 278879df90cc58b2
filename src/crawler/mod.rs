//! Crawler module for walking blogs page by page
//!
//! This module contains the core scraping logic, including:
//! - Page sources (the HTTP posts API and the `PageSource` seam)
//! - The per-blog fetch loop with cooperative cancellation
//! - Batch orchestration over the configured blogs

mod batch;
mod engine;
mod source;

pub use batch::{run_batch, start_session, BatchOutcome, BatchRunner, CompletedBlog};
pub use engine::{crawl_blog, CrawlReport, CrawlState, ItemSink, LogSink};
pub use source::{FetchError, HttpPageSource, Item, Page, PageSource};
