//! update-gitignore CLI

use std::io::{self, Write};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use update_gitignore::error::{FixSuggestion, GitignoreError, Result};
use update_gitignore::{
    commands, output, Config, Context, CrawlOptions, Crawler, GithubProvider, Job, TreeProvider,
};

#[derive(Parser)]
#[command(name = "update-gitignore")]
#[command(about = "List and dump .gitignore templates from a GitHub repository")]
#[command(version)]
struct Cli {
    /// Log debug output to stderr
    #[arg(long, global = true)]
    debug: bool,

    /// Repository to read templates from
    #[arg(long, global = true, value_name = "OWNER/REPO")]
    repo: Option<String>,

    /// Give up after this many seconds (0 = never)
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// GitHub API root
    #[arg(long, global = true, hide = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available templates
    List {
        /// Print a JSON array instead of a table
        #[arg(long)]
        json: bool,

        /// Only show templates whose name or path contains one of these
        filters: Vec<String>,
    },

    /// Print the content of the named templates
    Dump {
        /// Template names, e.g. Python Global/macOS
        #[arg(required = true)]
        templates: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        std::process::exit(report(&e));
    }
}

/// Print the error with its fix suggestion; returns the exit code
fn report(err: &anyhow::Error) -> i32 {
    eprintln!("{} {:#}", "Error:".red().bold(), err);
    match err.downcast_ref::<GitignoreError>() {
        Some(e) => {
            if let Some(suggestion) = e.fix_suggestion() {
                eprintln!("  {} {}", "Fix:".yellow(), suggestion);
            }
            if e.is_usage() {
                2
            } else {
                1
            }
        }
        None => 1,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?.with_env();
    if let Some(repo) = cli.repo {
        config.repo = Some(repo);
    }
    if let Some(secs) = cli.timeout {
        config.timeout_secs = Some(secs);
    }
    if let Some(url) = cli.api_url {
        config.api_url = Some(url);
    }

    let mut github = GithubProvider::new(config.repo()?)?.with_token(config.token.clone());
    if let Some(url) = &config.api_url {
        github = github.with_base_url(url);
    }
    let provider: Arc<dyn TreeProvider> = Arc::new(github);
    let crawler = Crawler::new(Arc::clone(&provider)).with_options(CrawlOptions {
        max_concurrent_fetches: config.max_concurrent_fetches,
        ..Default::default()
    });

    let root = Context::background();
    let ctx = match config.timeout() {
        Some(timeout) => root.with_timeout(timeout),
        None => root.child(),
    };

    let command = cli.command;
    let job = Job::spawn(&ctx, move |ctx| async move {
        execute(&ctx, command, &crawler, &provider).await
    })?;

    tokio::select! {
        result = job.result() => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, canceling");
            job.cancel().await?;
        }
    }
    Ok(())
}

async fn execute(
    ctx: &Context,
    command: Commands,
    crawler: &Crawler,
    provider: &Arc<dyn TreeProvider>,
) -> Result<()> {
    match command {
        Commands::List { json, filters } => {
            let templates = commands::list(ctx, crawler, &filters).await?;
            let mut out = io::stdout().lock();
            if json {
                output::write_json(&mut out, &templates)?;
            } else {
                output::write_table(&mut out, &templates).map_err(write_error)?;
            }
            out.flush().map_err(write_error)
        }
        Commands::Dump { templates } => {
            let dumped = commands::dump(ctx, crawler, provider, &templates).await?;
            let mut out = io::stdout().lock();
            for (template, content) in &dumped {
                output::write_dump(&mut out, template, content).map_err(write_error)?;
            }
            out.flush().map_err(write_error)
        }
    }
}

fn write_error(e: io::Error) -> GitignoreError {
    GitignoreError::Execution(format!("Failed to write output: {}", e))
}
