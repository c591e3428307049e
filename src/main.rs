//! gitrecords - print the JSON records of a collection stored in a Git branch.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gitrecords::handle::{CacheRoot, GithubConnector, LocalConnector, RemoteConnector};
use gitrecords::sync::{Adapter, Model, SyncError, SyncOptions};

#[derive(Debug, Parser)]
#[command(version, about = "Read JSON records straight out of a Git branch")]
struct Cli {
    /// collection address, e.g. https://github.com/acme/widgets/tree/dev/todos
    #[arg(value_name = "url")]
    url: String,

    /// read this record instead of the whole collection
    #[arg(long)]
    id: Option<String>,

    /// access token (defaults to GITRECORDS_TOKEN, then GITHUB_TOKEN)
    #[arg(long)]
    token: Option<String>,

    /// branch to read when the address does not name one
    #[arg(long)]
    branch: Option<String>,

    /// number of objects fetched in parallel
    #[arg(long)]
    concurrency: Option<usize>,

    /// serve `<owner>/<name>` from repositories under this directory instead of GitHub
    #[arg(long, value_name = "PATH")]
    local: Option<PathBuf>,

    /// keep fetched objects in this directory between runs
    #[arg(long, value_name = "DIR", env = "GITRECORDS_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// GitHub API root, for GitHub Enterprise
    #[arg(long, value_name = "URL", env = "GITRECORDS_API_URL")]
    api_url: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let layer = fmt::layer().compact().with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(layer).with(filter).init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut defaults = SyncOptions::from_env();
    if let Some(token) = cli.token {
        defaults.credential = Some(token.into());
    } else if cli.local.is_some() && defaults.credential.is_none() {
        // local repositories don't check it, but the adapter wants one
        defaults.credential = Some("local".into());
    }
    if let Some(branch) = cli.branch {
        defaults.branch = Some(branch);
    }
    if let Some(concurrency) = cli.concurrency {
        defaults.concurrency = Some(concurrency);
    }

    let connector: Arc<dyn RemoteConnector> = match cli.local {
        Some(root) => Arc::new(LocalConnector::new(root)),
        None => {
            let github = GithubConnector::new()?;
            Arc::new(match cli.api_url {
                Some(api_url) => github.with_api_url(api_url),
                None => github,
            })
        }
    };
    let cache = cli.cache_dir.map(CacheRoot::on_disk).unwrap_or_default();

    let adapter = Adapter::with_parts(defaults, connector, cache).context("failed to set up the adapter")?;

    let collection = Model::collection(&cli.url);
    let model = match cli.id {
        Some(id) => Model::record(id, collection),
        None => collection,
    };

    match adapter.read(model).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(SyncError::Collection { first, records }) => {
            println!("{}", serde_json::to_string_pretty(&records)?);
            Err(anyhow::Error::new(*first).context("some records failed to load"))
        }
        Err(err) => Err(anyhow::Error::new(err).context(format!("failed to read {}", cli.url))),
    }
}
