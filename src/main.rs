use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use star_search::config::Config;
use star_search::display::ProgressBarObserver;
use star_search::models::IndexStats;
use star_search::search::vector::VectorIndex;
use star_search::state::AppState;
use star_search::sync::{RateBudget, SyncMode, SyncReport};
use star_search::Error;

#[derive(Parser)]
#[command(
    name = "stars",
    version,
    about = "Index your GitHub stars and search them in plain language",
    after_help = "Examples:\n  stars fetch\n  stars search \"async http client\" --limit 5\n  stars refresh\n  stars stats"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index starred repositories that are not in the index yet
    Fetch,
    /// Find the starred repositories closest to a query
    Search {
        /// Query text; multiple words are joined with spaces
        #[arg(required = true)]
        query: Vec<String>,
        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Index new stars and drop repositories that are no longer starred
    Refresh,
    /// Show index counters
    Stats,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    // Warnings only by default so the progress bar stays readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            match e.downcast_ref::<Error>() {
                Some(Error::Input(_)) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(command: Command, config: Config) -> anyhow::Result<ExitCode> {
    match command {
        Command::Fetch => sync(config, SyncMode::Fetch).await,
        Command::Refresh => sync(config, SyncMode::Refresh).await,
        Command::Search { query, limit } => search(config, &query.join(" "), limit).await,
        Command::Stats => stats(config),
    }
}

async fn sync(config: Config, mode: SyncMode) -> anyhow::Result<ExitCode> {
    let state = AppState::new(config)?;
    let client = state.github_client()?;

    let observer = Arc::new(ProgressBarObserver::new());
    let reconciler = state.reconciler(client, observer.clone()).await?;

    print_rate_limit(&reconciler.governor().snapshot());
    let before = state.index.stats();
    if mode == SyncMode::Fetch {
        println!("\nIndex before:");
        print_stats(&before);
    }

    let result = match mode {
        SyncMode::Fetch => reconciler.fetch().await,
        SyncMode::Refresh => reconciler.refresh().await,
    };
    observer.finish();
    let report = result?;

    print_report(&report);
    if mode == SyncMode::Fetch {
        println!("\nIndex after:");
        print_stats(&state.index.stats());
    }
    println!("\nIndex saved to: {}", state.index.path().display());

    // Per-repository failures are reported above; they do not fail the run
    Ok(ExitCode::SUCCESS)
}

async fn search(config: Config, query: &str, limit: usize) -> anyhow::Result<ExitCode> {
    let state = AppState::new(config)?;
    let hits = state.search_engine().search(query, limit).await?;

    println!("Searching for: '{}'", query.trim());
    if hits.is_empty() {
        println!("No results found. Run 'stars fetch' first to populate the index.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("\nTop {} matching repositories:\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let record = &hit.record;
        println!("{}. {}", i + 1, record.full_name);
        println!("   {} stars", record.star_count);
        if let Some(description) = record.description.as_deref().filter(|d| !d.is_empty()) {
            println!("   {description}");
        }
        println!("   {}", record.url);
        println!("   Distance: {:.4}", hit.distance);
        println!();
    }
    Ok(ExitCode::SUCCESS)
}

fn stats(config: Config) -> anyhow::Result<ExitCode> {
    let index_dir = config.index_dir();
    if !VectorIndex::exists_at(&index_dir) {
        eprintln!(
            "No index found in {}. Run 'stars fetch' first.",
            index_dir.display()
        );
        return Ok(ExitCode::FAILURE);
    }

    let state = AppState::new(config)?;
    println!("Index: {}", state.index.path().display());
    print_stats(&state.index.stats());
    Ok(ExitCode::SUCCESS)
}

fn print_rate_limit(budget: &RateBudget) {
    let resets_in = budget.resets_in(chrono::Utc::now()).as_secs();
    println!("GitHub API rate limit:");
    println!("  Remaining: {}/{}", budget.remaining, budget.limit);
    println!("  Resets in: {resets_in}s ({}min)", resets_in / 60);
}

fn print_stats(stats: &IndexStats) {
    println!("  Total repositories: {}", stats.total);
    println!("  Embedded repositories: {}", stats.with_embedding);
    println!("  Repositories with README: {}", stats.with_readme);
    match stats.readme_coverage() {
        Some(pct) => println!("  README coverage: {pct:.1}%"),
        None => println!("  README coverage: n/a"),
    }
}

fn print_report(report: &SyncReport) {
    println!("\nFound {} starred repositories", report.remote_total);
    match report.mode {
        SyncMode::Fetch => {
            println!("  New repositories added: {}", report.added.len());
            println!("  Skipped (already indexed): {}", report.unchanged);
        }
        SyncMode::Refresh => {
            if report.added.is_empty() && report.removed.is_empty() && report.failed.is_empty() {
                println!("No changes detected. Index is up to date!");
            }
            println!("  Added: {}", report.added.len());
            println!("  Removed: {}", report.removed.len());
            println!("  Unchanged: {}", report.unchanged);
        }
    }

    if !report.failed.is_empty() {
        println!("  Failed: {}", report.failed.len());
        for failure in &report.failed {
            println!("    {}: {}", failure.full_name, failure.error);
        }
    }
}
