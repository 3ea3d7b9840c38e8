use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use bulktag::relay::credential::CredentialGate;
use bulktag::relay::{self, RelayHandle};
use bulktag::store::SettingsStore;
use bulktag::tagging::{
    job_folder_number, BatchReport, BulkTagger, GalleryRefresher, ItemStatus, ProgressEvent,
    ProgressSink, TagValueType,
};
use bulktag::Config;

/// Bulk metadata tagging for remote file galleries.
#[derive(Parser, Debug)]
#[command(name = "bulktag", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage the API token
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
    /// Allow tagging operations
    Enable,
    /// Block tagging operations until re-enabled
    Disable,
    /// Resolve a display name to its remote file record
    Search { name: String },
    /// Show which job folder each file belongs to
    Status {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Apply one tag to every named file
    Tag {
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
        #[arg(long = "type", value_enum, default_value_t = TagValueType::String)]
        value_type: TagValueType,
        /// Gallery query to re-run when refreshing
        #[arg(long)]
        query: Option<String>,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Add files to a job folder
    JobFolder {
        number: String,
        /// Gallery query to re-run when refreshing
        #[arg(long)]
        query: Option<String>,
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TokenAction {
    /// Save a new token
    Set { token: String },
    /// Show whether a token is saved
    Show,
}

/// Prints running status to stderr.
struct ConsoleProgress;

impl ConsoleProgress {
    fn line(event: &ProgressEvent) -> Option<String> {
        match event {
            // The aborting error is returned from `main`, which prints it.
            ProgressEvent::Aborted { .. } | ProgressEvent::Finished { .. } => None,
            ProgressEvent::Started { total } => Some(format!("Tagging {total} files...")),
            ProgressEvent::Item {
                index,
                total,
                filename,
            } => Some(format!("Processing {index}/{total}: {filename}")),
            ProgressEvent::CredentialExpired { .. } => {
                Some("Token expired. Please update it with `bulktag token set`.".to_string())
            }
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn report(&self, event: &ProgressEvent) {
        if let Some(line) = Self::line(event) {
            eprintln!("{line}");
        }
    }
}

/// Points the user at the gallery view to reload, re-running their query.
struct GalleryLink {
    url: String,
    query: Option<String>,
}

impl GalleryLink {
    fn target(&self) -> String {
        match self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => format!("{}?query={}", self.url, urlencoding::encode(query)),
            None => self.url.clone(),
        }
    }
}

impl GalleryRefresher for GalleryLink {
    fn refresh(&self) {
        println!("Refresh gallery: {}", self.target());
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    bulktag::init_tracing(&config.log_filter);
    let store = SettingsStore::new(&config.store.path);

    match cli.command {
        Command::Token { action } => token(&store, action).await?,
        Command::Enable => {
            store.set_enabled(true).await?;
            println!("Bulk tagging enabled");
        }
        Command::Disable => {
            store.set_enabled(false).await?;
            println!("Bulk tagging disabled");
        }
        Command::Search { name } => {
            let mut tagger = session(&config, &store, None).await?;
            match tagger.resolver_mut().resolve(&name).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => bail!("no file matches {name:?}"),
            }
        }
        Command::Status { names } => {
            let mut tagger = session(&config, &store, None).await?;
            for name in names {
                match tagger.resolver_mut().resolve(&name).await {
                    Ok(Some(record)) => match job_folder_number(&record) {
                        Some(number) => println!("{name}: Job Folder {number}"),
                        None => println!("{name}: no job folder"),
                    },
                    Ok(None) => println!("{name}: not found"),
                    Err(e) => {
                        tracing::debug!(filename = %name, error = %e, "Status check failed");
                        println!("{name}: {e}");
                    }
                }
            }
        }
        Command::Tag {
            key,
            value,
            value_type,
            query,
            names,
        } => {
            let mut tagger = session(&config, &store, query).await?;
            select(&mut tagger, &names);
            let report = tagger.apply_tag(&key, &value, value_type).await?;
            return Ok(finish(&mut tagger, report).await);
        }
        Command::JobFolder {
            number,
            query,
            names,
        } => {
            let mut tagger = session(&config, &store, query).await?;
            select(&mut tagger, &names);
            let report = tagger.add_to_job_folder(&number).await?;
            return Ok(finish(&mut tagger, report).await);
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn token(store: &SettingsStore, action: TokenAction) -> Result<()> {
    match action {
        TokenAction::Set { token } => {
            store.set_token(&token).await?;
            println!("Token saved!");
        }
        TokenAction::Show => match store.load().await?.token {
            Some(token) => {
                let shown: String = token.expose().chars().take(4).collect();
                println!("Token loaded ({shown}****)");
            }
            None => println!("No token saved"),
        },
    }
    Ok(())
}

async fn session(
    config: &Config,
    store: &SettingsStore,
    query: Option<String>,
) -> Result<BulkTagger> {
    let settings = store.load().await?;
    if !settings.enabled {
        bail!("bulk tagging is disabled; run `bulktag enable`");
    }

    let remote = bulktag::build_relay(config)?;
    let (handle, _task) = relay::channel::spawn(remote);
    let client: Arc<RelayHandle> = Arc::new(handle);
    let refresher = GalleryLink {
        url: config.gallery.url.clone(),
        query,
    };

    Ok(
        BulkTagger::new(client, CredentialGate::fixed(settings.token), Arc::new(refresher))
            .with_progress(Arc::new(ConsoleProgress))
            .with_refresh_delay(config.refresh_delay()),
    )
}

fn select(tagger: &mut BulkTagger, names: &[String]) {
    for (i, name) in names.iter().enumerate() {
        if !tagger.selection().contains(name) {
            tagger.toggle(name, &format!("arg-{i}"), "");
        }
    }
}

async fn finish(tagger: &mut BulkTagger, report: BatchReport) -> ExitCode {
    for item in report.items.iter().filter(|i| i.status != ItemStatus::Success) {
        let detail = item.detail().unwrap_or_default();
        eprintln!("  {} ({:?}) {}", item.filename, item.status, detail);
    }

    if report.error_count == 0 {
        println!(
            "Tagged {} files with {} = {}. Refreshing...",
            report.success_count, report.key, report.value
        );
    } else {
        println!(
            "Tagged {} files, {} failed",
            report.success_count, report.error_count
        );
    }

    tagger.wait_for_refresh().await;

    if report.error_count == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}
