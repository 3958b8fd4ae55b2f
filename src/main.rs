use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mediafeed::api::{self, AppState};
use mediafeed::cli::{Cli, Commands};
use mediafeed::config::{Config, DEFAULT_MEDIA_NAMESPACE};
use mediafeed::services::{EntryFilter, FeedRewriter, RewriteOptions, ShortsFilter};

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    // Logs go to stderr so `rewrite` output stays clean on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => cmd_serve(&bind).await,
        Commands::Rewrite {
            path,
            base_url,
            remove_existing_media,
            exclude_shorts,
            media_namespace,
            output,
        } => {
            let shorts: Option<&dyn EntryFilter> = if exclude_shorts {
                Some(&ShortsFilter)
            } else {
                None
            };
            let options = RewriteOptions {
                remove_existing_media,
                entry_filter: shorts,
            };
            cmd_rewrite(
                &path,
                &base_url,
                &options,
                media_namespace.as_deref(),
                output.as_deref(),
            )
        }
    }
}

async fn cmd_serve(bind: &str) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let state = AppState::from_config(&config)?;
    match state.slots.purge_stale() {
        Ok(0) => {}
        Ok(removed) => info!(removed, dir = %state.slots.dir().display(), "purged stale download slots"),
        Err(e) => warn!("Failed to purge stale download slots: {}", e),
    }

    info!(
        upstream = %config.rss_bridge_url,
        download_dir = %config.download_dir.display(),
        max_duration = ?config.constraints.max_duration_secs,
        "starting gateway"
    );

    api::serve(state, bind)
        .await
        .with_context(|| format!("serving on {}", bind))
}

fn cmd_rewrite(
    path: &Path,
    base_url: &str,
    options: &RewriteOptions<'_>,
    media_namespace: Option<&str>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let content =
        fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    let rewriter = FeedRewriter::new(media_namespace.unwrap_or(DEFAULT_MEDIA_NAMESPACE));
    let rewritten = rewriter.rewrite(&content, options, base_url.trim_end_matches('/'))?;

    match output {
        Some(output) => {
            fs::write(output, &rewritten)
                .with_context(|| format!("writing {}", output.display()))?;
            info!("Rewrote feed to {}", output.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&rewritten)?;
            stdout.flush()?;
        }
    }

    Ok(())
}
