//! Integration tests for the batch scraper
//!
//! These tests use wiremock to serve a paginated posts API and run the
//! full batch end-to-end against an on-disk database.

use chrono::{TimeZone, Utc};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tumblr_scraper::config::{ApiConfig, BlogEntry, SessionConfig, UserAgentConfig};
use tumblr_scraper::crawler::{run_batch, BatchOutcome, HttpPageSource, Item, LogSink};
use tumblr_scraper::session::{Session, StoredCookie};
use tumblr_scraper::storage::{SqliteStorage, Storage};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COOKIES_KEY: &str = "test-session";

fn api_config(server: &MockServer) -> ApiConfig {
    ApiConfig {
        base_url: format!("{}/v2", server.uri()),
        page_size: 2,
        api_key: None,
    }
}

fn new_session(server: &MockServer) -> Session {
    let user_agent = UserAgentConfig {
        crawler_name: "TestScraper".to_string(),
        crawler_version: "1.0".to_string(),
    };
    let session = SessionConfig {
        auth_url: server.uri(),
        cookies_key: COOKIES_KEY.to_string(),
    };
    Session::new(&user_agent, &session).expect("Failed to build session")
}

fn blogs(names: &[&str]) -> Vec<BlogEntry> {
    names.iter().map(|n| BlogEntry::new(*n)).collect()
}

fn page(ids: &[i64], has_more: bool) -> ResponseTemplate {
    let posts: Vec<_> = ids.iter().map(|id| json!({ "id": id })).collect();
    ResponseTemplate::new(200).set_body_json(json!({ "posts": posts, "has_more": has_more }))
}

async fn mount_page(server: &MockServer, blog: &str, after_id: i64, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/blog/{}/posts", blog)))
        .and(query_param("after_id", after_id.to_string()))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Runs one batch the way the binary does: open, restore, run, tear down
async fn run_once(
    server: &MockServer,
    db_path: &Path,
    names: &[&str],
    cancel: &CancellationToken,
    sink: &mut Vec<Item>,
) -> BatchOutcome {
    let mut storage = SqliteStorage::new(db_path).expect("Failed to open DB");
    let session = new_session(server);
    session.restore(&storage).expect("Failed to restore cookies");
    let source = HttpPageSource::new(session.client().clone(), &api_config(server));

    run_batch(&blogs(names), &mut storage, &session, &source, cancel, sink)
        .await
        .expect("Batch returned a storage error")
}

#[tokio::test]
async fn test_first_run_records_highest_id() {
    let server = MockServer::start().await;
    mount_page(&server, "alpha", 0, page(&[5, 3], true)).await;
    mount_page(&server, "alpha", 5, page(&[9], false)).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tumblr.db");
    let mut sink = Vec::new();

    let outcome = run_once(
        &server,
        &db_path,
        &["alpha"],
        &CancellationToken::new(),
        &mut sink,
    )
    .await;

    assert!(matches!(outcome, BatchOutcome::Completed { .. }));
    assert_eq!(sink.len(), 3);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.get_highest_id("alpha").unwrap(), Some(9));
}

#[tokio::test]
async fn test_second_run_resumes_from_cursor() {
    let server = MockServer::start().await;
    mount_page(&server, "alpha", 0, page(&[5, 3, 9], false)).await;
    mount_page(&server, "alpha", 9, page(&[], false)).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tumblr.db");

    let mut first = Vec::new();
    run_once(&server, &db_path, &["alpha"], &CancellationToken::new(), &mut first).await;
    assert_eq!(first.len(), 3);

    let mut second = Vec::new();
    let outcome = run_once(
        &server,
        &db_path,
        &["alpha"],
        &CancellationToken::new(),
        &mut second,
    )
    .await;

    assert!(second.is_empty(), "no post at or below 9 may be new again");
    assert_eq!(outcome.completed()[0].previous_id, Some(9));

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.get_highest_id("alpha").unwrap(), Some(9));
}

#[tokio::test]
async fn test_failure_on_second_blog_keeps_first_cursor() {
    let server = MockServer::start().await;
    mount_page(&server, "a", 0, page(&[10, 11], false)).await;
    mount_page(&server, "b", 4, page(&[6], true)).await;
    mount_page(&server, "b", 6, ResponseTemplate::new(500)).await;

    Mock::given(method("GET"))
        .and(path("/v2/blog/c/posts"))
        .respond_with(page(&[1], false))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tumblr.db");
    {
        let mut storage = SqliteStorage::new(&db_path).unwrap();
        storage.set_highest_id("b", 4).unwrap();
        storage.close().unwrap();
    }

    let outcome = run_once(
        &server,
        &db_path,
        &["a", "b", "c"],
        &CancellationToken::new(),
        &mut Vec::new(),
    )
    .await;

    match outcome {
        BatchOutcome::Failed { blog, .. } => assert_eq!(blog, "b"),
        other => panic!("expected failure, got {:?}", other),
    }

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.get_highest_id("a").unwrap(), Some(11));
    assert_eq!(storage.get_highest_id("b").unwrap(), Some(4));
    assert_eq!(storage.get_highest_id("c").unwrap(), None);
}

#[tokio::test]
async fn test_malformed_body_fails_batch() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "alpha",
        0,
        ResponseTemplate::new(200).set_body_string("<html>not json</html>"),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tumblr.db");

    let outcome = run_once(
        &server,
        &db_path,
        &["alpha"],
        &CancellationToken::new(),
        &mut Vec::new(),
    )
    .await;

    assert!(outcome.is_failed());
    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.get_highest_id("alpha").unwrap(), None);
}

#[tokio::test]
async fn test_cancelled_before_start_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(page(&[1], false))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tumblr.db");
    let mut expiring = StoredCookie::new("sid", "abc123", "127.0.0.1");
    expiring.expires = Some(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap());
    {
        let mut storage = SqliteStorage::new(&db_path).unwrap();
        storage.set_cookies(COOKIES_KEY, &[expiring.clone()]).unwrap();
        storage.close().unwrap();
    }
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = run_once(&server, &db_path, &["alpha", "beta"], &cancel, &mut Vec::new()).await;

    assert!(matches!(outcome, BatchOutcome::Cancelled { ref completed } if completed.is_empty()));
    let storage = SqliteStorage::new(&db_path).unwrap();
    assert!(storage.list_highest_ids().unwrap().is_empty());
    assert_eq!(storage.get_cookies(COOKIES_KEY).unwrap(), vec![expiring]);
}

#[tokio::test]
async fn test_session_cookies_survive_between_runs() {
    let server = MockServer::start().await;

    // First run: the server hands out a session cookie
    Mock::given(method("GET"))
        .and(path("/v2/blog/alpha/posts"))
        .and(query_param("after_id", "0"))
        .respond_with(page(&[1], false).insert_header("set-cookie", "sid=abc123; Path=/"))
        .expect(1)
        .mount(&server)
        .await;

    // Second run: the cookie must come back without a new login
    Mock::given(method("GET"))
        .and(path("/v2/blog/alpha/posts"))
        .and(query_param("after_id", "1"))
        .and(header("cookie", "sid=abc123"))
        .respond_with(page(&[], false))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tumblr.db");

    run_once(&server, &db_path, &["alpha"], &CancellationToken::new(), &mut Vec::new()).await;

    {
        let storage = SqliteStorage::new(&db_path).unwrap();
        let cookies = storage.get_cookies(COOKIES_KEY).unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, "sid");
        assert_eq!(cookies[0].value, "abc123");
    }

    let outcome = run_once(&server, &db_path, &["alpha"], &CancellationToken::new(), &mut Vec::new()).await;
    assert!(matches!(outcome, BatchOutcome::Completed { .. }));
}

#[tokio::test]
async fn test_request_carries_limit_and_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/blog/alpha/posts"))
        .and(query_param("after_id", "0"))
        .and(query_param("limit", "2"))
        .and(query_param("api_key", "secret"))
        .respond_with(page(&[], false))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut storage = SqliteStorage::new(&dir.path().join("tumblr.db")).unwrap();
    let session = new_session(&server);
    let mut api = api_config(&server);
    api.api_key = Some("secret".to_string());
    let source = HttpPageSource::new(session.client().clone(), &api);

    let outcome = run_batch(
        &blogs(&["alpha"]),
        &mut storage,
        &session,
        &source,
        &CancellationToken::new(),
        &mut LogSink,
    )
    .await
    .unwrap();

    assert!(matches!(outcome, BatchOutcome::Completed { .. }));
}
