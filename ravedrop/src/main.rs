// src/main.rs

mod stems;
mod tui;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use stem_modules::job::{JobId, JobMode, JobRequest};
use stem_modules::observers::{CompletedRecord, QueueSnapshot};
use stem_modules::service::StemService;
use stem_modules::{ClientConfig, StemClient};

#[derive(Parser, Debug)]
#[command(name = "ravedrop", version, about = "Terminal client for the stem-splitting job server")]
struct Cli {
    /// Server base URL (overrides STEM_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a track, follow it, and preview the stems
    Submit {
        /// Source URL (e.g. a YouTube link)
        #[arg(long)]
        url: String,
        /// Track name
        #[arg(long)]
        name: String,
        /// `stem` (split) or `youtube` (download only)
        #[arg(long, default_value = "stem")]
        mode: JobMode,
        /// Where saved stems go
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Print the server queue
    Queue {
        #[arg(long)]
        json: bool,
    },
    /// Print finished jobs
    Completed {
        #[arg(long)]
        json: bool,
    },
    /// Drop a queued job
    Remove { job_id: String },
    /// Download the zip of a finished job
    Archive {
        job_id: String,
        song: String,
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

fn init_logging(verbose: bool, interactive: bool) {
    // The interactive screen owns the terminal; keep stderr quiet unless asked.
    let default = match (verbose, interactive) {
        (true, _) => "debug",
        (false, true) => "warn",
        (false, false) => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose, matches!(cli.command, Command::Submit { .. }));

    let mut config = ClientConfig::from_env();
    if let Some(server) = cli.server {
        config = config.with_base_url(server);
    }
    log::debug!("Using server {}", config.base_url);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting tokio runtime")?;
    runtime.block_on(run(cli.command, config))
}

async fn run(command: Command, config: ClientConfig) -> anyhow::Result<()> {
    let client = StemClient::connect(config).context("configuring the server client")?;
    let service = client.service().clone();

    match command {
        Command::Submit { url, name, mode, out } => {
            tui::run(client, JobRequest::new(url, name, mode), out).await?;
        }
        Command::Queue { json } => {
            let snapshot = service.queue().await.context("fetching the queue")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_queue(&snapshot);
            }
        }
        Command::Completed { json } => {
            let records = service.completed().await.context("fetching completed jobs")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_completed(&records);
            }
        }
        Command::Remove { job_id } => {
            let id = JobId::new(job_id);
            service.remove_job(&id).await.with_context(|| format!("removing {id}"))?;
            println!("🗑️ Requested removal of {id}");
        }
        Command::Archive { job_id, song, out } => {
            let id = JobId::new(job_id);
            let bytes = service
                .fetch_archive(&id, &song)
                .await
                .with_context(|| format!("downloading archive for {id}"))?;
            tokio::fs::create_dir_all(&out).await?;
            let path = out.join(format!("{song}.zip"));
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("📦 Saved {} ({} bytes)", path.display(), bytes.len());
        }
    }
    Ok(())
}

fn print_queue(snapshot: &QueueSnapshot) {
    match &snapshot.current {
        Some(current) => println!("Now processing: {} ({})", current.display_name, current.job_id),
        None => println!("Server idle"),
    }
    if snapshot.entries.is_empty() {
        println!("Queue is empty");
    }
    for (i, entry) in snapshot.entries.iter().enumerate() {
        println!("  {}. {} ({})", i + 1, entry.display_name, entry.job_id);
    }
}

fn print_completed(records: &[CompletedRecord]) {
    if records.is_empty() {
        println!("No finished jobs");
    }
    for record in records {
        match tui::meta_summary(&record.meta) {
            Some(summary) => println!("{} ({}) [{summary}]", record.song_name, record.job_id),
            None => println!("{} ({})", record.song_name, record.job_id),
        }
        if let Some(url) = &record.source_url {
            println!("    source: {url}");
        }
        for stem in record.sorted_stems() {
            println!("    {}  {}", stem.display_name, stem.url);
        }
    }
}
