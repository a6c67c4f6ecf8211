use std::env;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use shardload_core::bootstrap::Bootstrapper;
use shardload_core::config::{Config, Settings};
use shardload_core::memory_store::InMemoryConnector;
use shardload_core::orchestrator::Provisioner;
use shardload_core::traits::{DocumentStore, StoreConnector};
use shardload_core::verify::Verifier;
use shardload_mongo::{reports, MongoConnector};

const USAGE: &str =
    "Usage: shardload <bootstrap|provision|verify|all> [--dry-run]\n       shardload report [name]";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Bootstrap,
    Provision,
    Verify,
    All,
    /// One named report, or all of them.
    Report(Option<String>),
}

fn parse_args() -> (Command, bool) {
    let args: Vec<String> = env::args().skip(1).collect();
    let dry_run = args.iter().any(|a| a == "--dry-run" || a == "-n");
    let mut positional = args.iter().filter(|a| !a.starts_with('-')).map(String::as_str);
    let command = match positional.next() {
        Some("bootstrap") => Command::Bootstrap,
        Some("provision") | None => Command::Provision,
        Some("verify") => Command::Verify,
        Some("all") => Command::All,
        Some("report") => Command::Report(positional.next().map(str::to_string)),
        Some(other) => {
            eprintln!("Unknown command: {}\n{}", other, USAGE);
            std::process::exit(2);
        }
    };
    (command, dry_run)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn dataset_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let template = concat!(
        "{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] ",
        "{pos}/{len} datasets {msg}"
    );
    if let Ok(style) = ProgressStyle::default_bar().template(template) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

async fn execute<C: StoreConnector>(
    command: &Command,
    connector: &C,
    settings: &Settings,
) -> anyhow::Result<()> {
    if matches!(command, Command::Bootstrap | Command::All) {
        let report = Bootstrapper::from_settings(settings).run(connector, &settings.store).await?;
        if !report.changed() {
            info!("cluster already bootstrapped, nothing changed");
        }
    }

    if matches!(command, Command::Provision | Command::All) {
        let provisioner = Provisioner::from_settings(settings);
        let pb = dataset_bar(provisioner.catalog().len());
        let report = provisioner
            .run_with(connector, &settings.store, |dataset| {
                pb.set_message(dataset.name.clone());
                pb.inc(1);
            })
            .await;
        pb.finish_and_clear();
        let report = report?;
        for dataset in &report.datasets {
            match &dataset.error {
                None => info!(
                    dataset = %dataset.name,
                    deleted = dataset.deleted,
                    inserted = dataset.inserted,
                    indexes = ?dataset.indexes,
                    "provisioned"
                ),
                Some(e) => error!(dataset = %dataset.name, "failed: {}", e),
            }
        }
        let failed = report.failed().count();
        if failed > 0 {
            anyhow::bail!("{} of {} datasets failed to provision", failed, report.datasets.len());
        }
    }

    if matches!(command, Command::Verify | Command::All) {
        let report = Verifier::from_settings(settings).run(connector, &settings.store).await?;
        for check in &report.datasets {
            for problem in &check.problems {
                warn!(dataset = %check.name, "{}", problem);
            }
        }
        if !report.is_consistent() {
            anyhow::bail!("verification found inconsistent collections");
        }
        info!("all collections match their sources");
    }
    Ok(())
}

async fn report(name: Option<&str>, settings: &Settings) -> anyhow::Result<()> {
    let selected = match name {
        Some(name) => match reports::named(name) {
            Some(report) => vec![report],
            None => {
                let known: Vec<&str> = reports::all().iter().map(|r| r.name).collect();
                anyhow::bail!("unknown report '{}', expected one of: {}", name, known.join(", "));
            }
        },
        None => reports::all(),
    };

    let store = MongoConnector.connect(&settings.store).await?;
    let mut result = Ok(());
    for report in selected {
        info!(report = report.name, collection = report.collection, "{}", report.description);
        match store.aggregate(report.collection, report.pipeline).await {
            Ok(rows) => {
                println!("== {} ({}): {} rows", report.name, report.collection, rows.len());
                for row in &rows {
                    println!("{}", row);
                }
            }
            Err(e) => {
                result = Err(e.into());
                break;
            }
        }
    }
    store.close().await;
    result
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let settings = config.settings()?;
    let (command, dry_run) = parse_args();
    info!(env = config.env_name(), ?command, dry_run, "shardload starting");

    let runtime = tokio::runtime::Runtime::new()?;
    if let Command::Report(name) = &command {
        if dry_run {
            anyhow::bail!("reports read a live cluster and cannot run with --dry-run");
        }
        return runtime.block_on(report(name.as_deref(), &settings));
    }
    if dry_run {
        warn!("dry run: provisioning an in-memory store, the cluster is not contacted");
        runtime.block_on(execute(&command, &InMemoryConnector::default(), &settings))
    } else {
        runtime.block_on(execute(&command, &MongoConnector, &settings))
    }
}
