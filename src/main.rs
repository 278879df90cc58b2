//! Tumblr-Scraper main entry point
//!
//! This is the command-line interface for the Tumblr-Scraper blog mirror.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tumblr_scraper::config::{load_config_with_hash, BlogEntry, Config};
use tumblr_scraper::crawler::{run_batch, start_session, BatchOutcome, HttpPageSource, LogSink};
use tumblr_scraper::storage::{open_storage, Storage};

/// Tumblr-Scraper: an incremental blog mirror
///
/// Tumblr-Scraper walks each configured blog from the newest post it has
/// not seen yet, remembers where it stopped, and keeps the login session
/// between runs.
#[derive(Parser, Debug)]
#[command(name = "tumblr-scraper")]
#[command(version)]
#[command(about = "An incremental blog mirror", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Only scrape these configured blogs (repeatable)
    #[arg(long, value_name = "NAME")]
    only: Vec<String>,

    /// Validate config and show what would be scraped without scraping
    #[arg(long, conflicts_with = "status")]
    dry_run: bool,

    /// Show stored progress and session state and exit
    #[arg(long, conflicts_with = "dry_run")]
    status: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let blogs = config.select_blogs(&cli.only);
    for name in &cli.only {
        if !blogs.iter().any(|b| &b.name == name) {
            tracing::warn!("--only {} does not match any configured blog", name);
        }
    }
    if blogs.is_empty() {
        return Err("no configured blogs selected".into());
    }

    if cli.dry_run {
        handle_dry_run(&config, &blogs)?;
        Ok(ExitCode::SUCCESS)
    } else if cli.status {
        handle_status(&config, &blogs)?;
        Ok(ExitCode::SUCCESS)
    } else {
        handle_scrape(&config, &blogs).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tumblr_scraper=info,warn"),
            1 => EnvFilter::new("tumblr_scraper=debug,info"),
            2 => EnvFilter::new("tumblr_scraper=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows what would be scraped
fn handle_dry_run(config: &Config, blogs: &[BlogEntry]) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Tumblr-Scraper Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", config.api.base_url);
    println!("  Page size: {}", config.api.page_size);
    println!(
        "  API key: {}",
        if config.api.api_key.is_some() { "set" } else { "not set" }
    );

    println!("\nSession:");
    println!("  Auth URL: {}", config.session.auth_url);
    println!("  Cookies key: {}", config.session.cookies_key);

    println!("\nUser Agent:");
    println!(
        "  {}/{}",
        config.user_agent.crawler_name, config.user_agent.crawler_version
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nBlogs ({}):", blogs.len());
    for blog in blogs {
        println!("  - {}", blog.name);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --status mode: shows stored cursors and session state
fn handle_status(config: &Config, blogs: &[BlogEntry]) -> Result<(), Box<dyn std::error::Error>> {
    println!("Database: {}\n", config.output.database_path);

    let mut storage = open_storage(Path::new(&config.output.database_path))?;

    println!("Blogs:");
    for blog in blogs {
        match storage.get_highest_id(&blog.name)? {
            Some(id) => println!("  {:<30} {}", blog.name, id),
            None => println!("  {:<30} (never scraped)", blog.name),
        }
    }

    let stored = storage.list_highest_ids()?;
    let orphans: Vec<_> = stored
        .iter()
        .filter(|(name, _)| !config.blogs.iter().any(|b| &b.name == name))
        .collect();
    if !orphans.is_empty() {
        println!("\nNo longer configured:");
        for (name, id) in orphans {
            println!("  {:<30} {}", name, id);
        }
    }

    let cookies = storage.get_cookies(&config.session.cookies_key)?;
    println!(
        "\nSession: {} stored cookies for {}",
        cookies.len(),
        config.session.cookies_key
    );

    storage.close()?;
    Ok(())
}

/// Handles the main scrape operation
async fn handle_scrape(
    config: &Config,
    blogs: &[BlogEntry],
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut storage = open_storage(Path::new(&config.output.database_path))?;

    let session = start_session(&config.user_agent, &config.session, &mut storage)?;

    let source = HttpPageSource::new(session.client().clone(), &config.api);

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    tracing::info!("Scraping {} blogs", blogs.len());
    let outcome = run_batch(blogs, &mut storage, &session, &source, &cancel, &mut LogSink).await?;

    let code = match &outcome {
        BatchOutcome::Completed { blogs } => {
            let new_posts: u64 = blogs.iter().map(|b| b.new_items).sum();
            tracing::info!(
                "Batch completed: {} blogs, {} new posts",
                blogs.len(),
                new_posts
            );
            ExitCode::SUCCESS
        }
        BatchOutcome::Cancelled { completed } => {
            tracing::info!("Stopped early after {} blogs", completed.len());
            ExitCode::SUCCESS
        }
        BatchOutcome::Failed { completed, .. } => {
            tracing::error!(
                "Batch aborted after {} of {} blogs",
                completed.len(),
                blogs.len()
            );
            ExitCode::FAILURE
        }
    };

    Ok(code)
}

/// Cancels `cancel` on the first interrupt or terminate signal
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("Shutdown requested, finishing the current request");
        cancel.cancel();
    });
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut terminate, mut quit) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::quit()),
    ) {
        (Ok(terminate), Ok(quit)) => (terminate, quit),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!("Cannot listen for SIGTERM/SIGQUIT: {}", e);
            ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = ctrl_c() => {}
        _ = terminate.recv() => {}
        _ = quit.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    ctrl_c().await;
}
