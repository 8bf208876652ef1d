//! Archive the current liked-works snapshot
//!
//! ```bash
//! cargo run --example sync_likes -- --config likes.json --unlike
//! cargo run --example sync_likes -- --list saved_list.json --concurrency 1
//! ```
//!
//! Settings come from, lowest precedence first: built-in defaults, the JSON
//! file given with `--config`, `LIKES_DL_*` environment variables (a `.env`
//! file is honored), then the command-line options below.
//!
//! Run with `--help` for the option list.
//!
//! `LIKES_DL_COOKIE`, when set, is sent as the `Cookie` header to the list and
//! like endpoints. The process exits non-zero only when the run itself fails.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use likes_dl::provider::WorkListProvider;
use likes_dl::{
    Config, Event, Fetcher, HttpLikeService, HttpWorkListProvider, Pipeline, RunOverrides,
    StaticWorkList,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sync_likes", about = "Archive liked works and remember what was saved")]
struct Args {
    /// JSON config document
    #[arg(long)]
    config: Option<PathBuf>,

    /// Saved JSON list to use instead of the list endpoint
    #[arg(long)]
    list: Option<PathBuf>,

    /// Works processed at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Attempts per media file
    #[arg(long)]
    retries: Option<u32>,

    /// Ledger location
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// Revoke each like once its media is saved
    #[arg(long, conflicts_with = "keep_likes")]
    unlike: bool,

    /// Never revoke likes, whatever the config says
    #[arg(long)]
    keep_likes: bool,
}

impl Args {
    fn overrides(&self) -> RunOverrides {
        RunOverrides {
            concurrency_limit: self.concurrency,
            auto_unlike: match (self.unlike, self.keep_likes) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            },
            download_retries: self.retries,
            ledger_path: self.ledger.clone(),
        }
    }
}

fn load_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => Config::from_json_str(&std::fs::read_to_string(path)?)?,
        None => Config::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    config.apply_overrides(&args.overrides());
    config.validate()?;

    if let Ok(cookie) = std::env::var("LIKES_DL_COOKIE") {
        let cookie = cookie.trim().to_string();
        for endpoint in [config.api.list.as_mut(), config.api.like.as_mut()]
            .into_iter()
            .flatten()
        {
            endpoint.headers.insert("Cookie".into(), cookie.clone());
        }
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("likes_dl=info".parse()?))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let fetcher = Fetcher::new(config.api.fetch_timeout)?;

    let provider: Box<dyn WorkListProvider> = match &args.list {
        Some(path) => Box::new(StaticWorkList::from_json_str(&std::fs::read_to_string(path)?)?),
        None => Box::new(HttpWorkListProvider::from_config(fetcher.clone(), &config.api)?),
    };

    let auto_unlike = config.pipeline.auto_unlike;
    let like_service = if auto_unlike {
        Some(HttpLikeService::from_config(fetcher, &config.api)?)
    } else {
        None
    };

    let mut pipeline = Pipeline::from_config(config).await?;
    if let Some(service) = like_service {
        pipeline = pipeline.with_like_service(Arc::new(service));
    }

    let mut events = pipeline.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::MediaSaved { path, bytes, .. } => {
                    tracing::info!(path = %path.display(), bytes, "saved");
                }
                Event::RunComplete { .. } => break,
                _ => {}
            }
        }
    });

    let report = pipeline.run(provider.as_ref()).await?;
    printer.abort();
    report.log_summary();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
