//! # Jukebox
//!
//! Command-line front end for query classification, resolution and title
//! scoring, without joining any voice channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jukebox_core::Config;
use jukebox_extractor::YtDlpSource;
use jukebox_providers::{SpotifyClient, YouTubeClient};
use jukebox_resolver::{similarity, Resolver, Search};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "jukebox", version, about = "Resolve music queries into playable tracks")]
struct Cli {
    /// Read this config file instead of the default one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show how a query would be classified
    Classify { query: String },
    /// Resolve a query and print the tracks as JSON
    Resolve {
        query: String,
        /// Maximum number of tracks to produce
        #[arg(long, default_value_t = 25)]
        max: usize,
        #[arg(long, default_value = "cli")]
        added_by: String,
    },
    /// Score a candidate title against a query
    Score { title: String, query: String },
    /// Print the effective configuration
    Config,
}

#[derive(Serialize)]
struct ScoreReport<'a> {
    title: &'a str,
    query: &'a str,
    similarity: f64,
    score: f64,
    threshold: f64,
    accepted: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "jukebox=info,jukebox_playback=debug,jukebox_resolver=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    debug!(?config, "Effective configuration");

    match cli.command {
        Command::Classify { query } => {
            let search = Search::classify(&query)?;
            print_json(&search)
        }
        Command::Resolve {
            query,
            max,
            added_by,
        } => resolve(&config, &query, max, &added_by).await,
        Command::Score { title, query } => {
            let score = similarity::score(&title, &query);
            print_json(&ScoreReport {
                title: &title,
                query: &query,
                similarity: similarity::similarity(&title, &query),
                score,
                threshold: config.levenshtein_threshold,
                accepted: score >= config.levenshtein_threshold,
            })
        }
        Command::Config => {
            let mut shown = config;
            redact(&mut shown.credentials.youtube_api_key);
            redact(&mut shown.credentials.spotify_client_id);
            redact(&mut shown.credentials.spotify_client_secret);
            print!("{}", toml::to_string_pretty(&shown)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::from_file(path)?
            .with_env_overrides()
            .validated()?),
        None => Config::load().context("Failed to load configuration"),
    }
}

async fn resolve(config: &Config, query: &str, max: usize, added_by: &str) -> Result<()> {
    let resolver = build_resolver(config)?;
    let resolution = resolver
        .resolve_query(query, max.min(config.max_resolve_items), added_by)
        .await?;
    info!(
        items = resolution.items.len(),
        errors = resolution.errors.len(),
        "Resolved query"
    );
    print_json(&resolution.report())
}

fn build_resolver(config: &Config) -> Result<Resolver> {
    let credentials = &config.credentials;
    let api_key = credentials
        .youtube_api_key
        .clone()
        .context("A YouTube API key is required (set JUKEBOX_YOUTUBE_API_KEY)")?;
    let videos = Arc::new(YouTubeClient::new(api_key)?);
    let resolver = Resolver::new(videos, Arc::new(YtDlpSource::new()), config);

    match (&credentials.spotify_client_id, &credentials.spotify_client_secret) {
        (Some(id), Some(secret)) => {
            let catalog = SpotifyClient::new(id.as_str(), secret.as_str())?;
            Ok(resolver.with_catalog(Arc::new(catalog)))
        }
        _ => {
            info!("No Spotify credentials configured, Spotify links will not resolve");
            Ok(resolver)
        }
    }
}

fn redact(value: &mut Option<String>) {
    if value.is_some() {
        *value = Some("<redacted>".to_string());
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
