use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Target};
use log::LevelFilter;
use photoref_client::{
    ImageResolver, RawImageReference, ResolutionCache, ResolverConfig,
    SessionStore, TokenExpiry,
};

#[derive(Parser)]
#[command(
    name = "photoref-resolve",
    about = "Resolve a backend photo reference into a displayable source"
)]
struct Cli {
    /// URL, protected path, data URI, base64, or a JSON value wrapping one
    reference: String,
    /// Used when the reference is blank
    #[arg(long)]
    fallback: Option<String>,
    /// TOML config file (base_url, request_timeout_secs, user_agent)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, env = "PHOTOREF_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Print cache statistics to stderr after resolving
    #[arg(long)]
    stats: bool,
}

fn init_logger() {
    Builder::new()
        .target(Target::Stderr)
        .filter_level(LevelFilter::Warn)
        .filter_module("photoref_client", LevelFilter::Info)
        .init();
}

/// Arguments that parse as JSON (objects, quoted strings) are taken as
/// backend values; anything else is plain text.
fn parse_reference(raw: &str) -> RawImageReference {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value @ (serde_json::Value::Object(_) | serde_json::Value::Null)) => {
            RawImageReference::from(value)
        }
        _ => RawImageReference::from(raw),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    if std::env::var("RUST_LOG").is_err() {
        init_logger();
    } else {
        env_logger::init();
    }

    let cli = Cli::parse();
    let config = ResolverConfig::load(cli.config.as_deref())
        .context("failed to load resolver configuration")?;
    log::info!("Resolving against {}", config.base_url);

    let session = Arc::new(SessionStore::new());
    if let Some(token) = cli.token.filter(|token| !token.trim().is_empty()) {
        session.save_token(token, TokenExpiry::Default).await;
    }

    let cache = Arc::new(ResolutionCache::new());
    let resolver = ImageResolver::http(config, cache, session)
        .context("failed to build HTTP transport")?;

    let reference = parse_reference(&cli.reference);
    let source = resolver
        .build_source(&reference, cli.fallback.as_deref())
        .await;
    println!("{}", serde_json::to_string_pretty(&source)?);

    if cli.stats {
        eprintln!("{:?}", resolver.stats());
    }
    Ok(())
}
