use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use romferry::audit::source::{LocalDirSource, RemoteShellSource};
use romferry::audit::{AuditEvent, AuditStatus, IntegrityAuditor};
use romferry::catalog::{PlatformTable, PlatformTag, ReferenceIntegrityDatabase};
use romferry::config::AppConfig;
use romferry::discovery::{self, DiscoveryEvent};
use romferry::identify::fetch::CatalogFetcher;
use romferry::identify::hashdb::HashCatalogIdentifier;
use romferry::identify::{CatalogStore, ScanEvent, scan_directory};
use romferry::logging::{self, LogConfig};
use romferry::transfer::{TransferEngine, TransferEvent, TransferItem};

#[derive(Parser)]
#[command(name = "romferry")]
#[command(about = "ROM library transfer and integrity toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify the files in a folder and optionally write a transfer plan
    Scan(ScanArgs),
    /// Copy a transfer plan onto the device content layout
    Transfer(TransferArgs),
    /// Verify firmware/BIOS blobs against the integrity database
    Audit(AuditArgs),
    /// Probe the local network for a device
    Discover,
    /// Download a digest catalog into the local cache
    FetchCatalog(FetchCatalogArgs),
}

#[derive(Args)]
struct ScanArgs {
    /// Folder holding the candidate files
    source: PathBuf,

    /// Write the identified items as a JSON transfer plan
    #[arg(long)]
    plan: Option<PathBuf>,
}

#[derive(Args, Serialize)]
struct TransferArgs {
    /// JSON transfer plan produced by `scan --plan`
    #[arg(long)]
    #[serde(skip)]
    plan: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    destination: Option<PathBuf>,

    /// Platform tags to repackage, comma separated
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, value_delimiter = ',')]
    compress: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    convert_tool: Option<String>,
}

#[derive(Args)]
struct AuditArgs {
    /// Audit a remote device at this host over the shell channel
    #[arg(long, conflicts_with = "dir")]
    host: Option<String>,

    /// Audit a local directory (an SD card's bios folder or its parent)
    #[arg(long)]
    dir: Option<PathBuf>,

    #[arg(long)]
    user: Option<String>,
}

#[derive(Args)]
struct FetchCatalogArgs {
    /// Extension the catalog covers, e.g. `sfc`
    ext: String,
    url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Transfer(args) => AppConfig::load(Some(args))?,
        _ => AppConfig::load(None::<&TransferArgs>)?,
    };

    logging::init(LogConfig {
        json: false,
        verbose: cli.verbose || config.verbose,
    });

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    match &cli.command {
        Commands::Scan(args) => run_scan(args, &config, cancel).await,
        Commands::Transfer(args) => run_transfer(args, &config, cancel).await,
        Commands::Audit(args) => run_audit(args, &config, cancel).await,
        Commands::Discover => run_discover(cancel).await,
        Commands::FetchCatalog(args) => run_fetch_catalog(args, &config).await,
    }
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing up");
            cancel.cancel();
        }
    });
}

async fn run_scan(args: &ScanArgs, config: &AppConfig, cancel: CancellationToken) -> Result<()> {
    let store = CatalogStore::open(&config.catalog_cache_dir);
    let identifier = Arc::new(HashCatalogIdentifier::new(store));

    let (tx, mut rx) = mpsc::channel(256);
    let handle = tokio::spawn(scan_directory(
        args.source.clone(),
        identifier,
        tx,
        cancel,
    ));

    let mut items: Vec<TransferItem> = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            ScanEvent::Log(line) => info!("{line}"),
            ScanEvent::Progress(_) => {}
            ScanEvent::Identified { path, title, tag } => {
                println!(
                    "{:<18} {}",
                    tag,
                    path.file_name().unwrap_or_default().to_string_lossy()
                );
                items.push(TransferItem {
                    source: path,
                    system: tag,
                    name: title,
                });
            }
            ScanEvent::Done {
                scanned,
                identified,
            } => {
                println!("{identified} of {scanned} files identified");
            }
        }
    }
    handle.await?.context("identification sweep failed")?;

    if let Some(plan_path) = &args.plan {
        let json = serde_json::to_string_pretty(&items)?;
        std::fs::write(plan_path, json)
            .with_context(|| format!("writing {}", plan_path.display()))?;
        println!("plan written to {}", plan_path.display());
    }
    Ok(())
}

async fn run_transfer(
    args: &TransferArgs,
    config: &AppConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let plan = std::fs::read_to_string(&args.plan)
        .with_context(|| format!("reading {}", args.plan.display()))?;
    let items: Vec<TransferItem> = serde_json::from_str(&plan).context("invalid transfer plan")?;
    if items.is_empty() {
        bail!("the transfer plan is empty");
    }

    let Some(destination) = &config.destination else {
        bail!("no destination configured; pass --destination or set it in romferry.toml");
    };

    let engine = TransferEngine::new(
        Arc::new(PlatformTable::builtin()),
        config.compress.iter().map(PlatformTag::new),
        &config.convert_tool,
    );

    let (tx, mut rx) = mpsc::channel(256);
    let destination = destination.clone();
    let handle =
        tokio::spawn(async move { engine.run(items, &destination, tx, cancel).await });

    while let Some(event) = rx.recv().await {
        match event {
            TransferEvent::Log(line) => info!("{line}"),
            TransferEvent::Progress(pct) => info!("progress: {pct}%"),
            TransferEvent::ItemFinished(outcome) => {
                if let Some(dest) = &outcome.destination {
                    println!("ok    {} -> {}", outcome.item, dest.display());
                } else {
                    println!(
                        "fail  {}: {}",
                        outcome.item,
                        outcome.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            TransferEvent::Done { .. } => {}
        }
    }

    let summary = handle.await?;
    if !summary.completed {
        bail!("transfer aborted before finishing");
    }
    let failures = summary.failure_count();
    if failures > 0 {
        println!(
            "completed with {failures} failed item(s) out of {}",
            summary.outcomes.len()
        );
    } else {
        println!("completed, {} item(s) delivered", summary.outcomes.len());
    }
    Ok(())
}

async fn run_audit(args: &AuditArgs, config: &AppConfig, cancel: CancellationToken) -> Result<()> {
    let auditor = IntegrityAuditor::new(ReferenceIntegrityDatabase::builtin());
    let host = args.host.clone().or_else(|| config.remote_host.clone());

    let (tx, mut rx) = mpsc::channel(256);

    let aborted = if let Some(host) = &host {
        let user = args.user.as_deref().unwrap_or(&config.remote_user);
        let remote = RemoteShellSource::connect(host, user, &config.remote_bios_dir)
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        let (_, aborted) = tokio::join!(
            auditor.run(&remote, tx, cancel),
            consume_audit_events(&mut rx)
        );
        remote.close().await;
        aborted
    } else if let Some(dir) = &args.dir {
        // Accept either the bios folder itself or its parent.
        let dir = if dir.to_string_lossy().to_ascii_lowercase().contains("bios") {
            dir.clone()
        } else {
            dir.join("bios")
        };
        let local = LocalDirSource::new(&dir);
        let (_, aborted) = tokio::join!(
            auditor.run(&local, tx, cancel),
            consume_audit_events(&mut rx)
        );
        aborted
    } else {
        bail!("pass --host for a remote audit or --dir for a local one");
    };

    if let Some(reason) = aborted {
        bail!("audit aborted: {reason}");
    }
    Ok(())
}

async fn consume_audit_events(rx: &mut mpsc::Receiver<AuditEvent>) -> Option<String> {
    let mut aborted = None;
    while let Some(event) = rx.recv().await {
        match event {
            AuditEvent::Log(line) => info!("{line}"),
            AuditEvent::Entry(result) => {
                let marker = match result.status {
                    AuditStatus::Ok => "ok  ",
                    AuditStatus::PresentUnverifiable => "??  ",
                    AuditStatus::HashMismatch | AuditStatus::Missing => "FAIL",
                };
                println!(
                    "{marker}  {:<20} {:<24} {}",
                    result.name,
                    result.status.describe(),
                    result.platform
                );
            }
            AuditEvent::Aborted(reason) => aborted = Some(reason),
            AuditEvent::Done { checked } => println!("{checked} reference file(s) checked"),
        }
    }
    aborted
}

async fn run_discover(cancel: CancellationToken) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(1024);
    let handle = tokio::spawn(discovery::discover(tx, cancel));

    while let Some(event) = rx.recv().await {
        match event {
            DiscoveryEvent::Log(line) => info!("{line}"),
            DiscoveryEvent::Found(addr) => println!("device: {addr}"),
            DiscoveryEvent::Done { responders } => {
                if responders.len() > 1 {
                    println!(
                        "{} hosts answered; using the lowest address",
                        responders.len()
                    );
                }
            }
        }
    }
    handle.await?;
    Ok(())
}

async fn run_fetch_catalog(args: &FetchCatalogArgs, config: &AppConfig) -> Result<()> {
    let fetcher = CatalogFetcher::new(&config.catalog_cache_dir);
    let titles = fetcher.fetch(&args.ext, &args.url).await?;
    println!("cached {titles} title(s) for .{}", args.ext);
    Ok(())
}
