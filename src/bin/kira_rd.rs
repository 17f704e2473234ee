use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_refdata::app::{AcquireOptions, App};
use kira_refdata::catalog::Catalog;
use kira_refdata::config::{ConfigLoader, ResolvedConfig};
use kira_refdata::error::KiraError;
use kira_refdata::http::{HttpTransport, Transport};
use kira_refdata::output::{ConsoleOutput, ConsoleSink, JsonOutput, OutputMode};
use kira_refdata::progress::ProgressSink;
use kira_refdata::space::Fs2FreeSpace;
use kira_refdata::store::Store;

#[derive(Parser)]
#[command(name = "kira-rd")]
#[command(about = "Acquire and validate reference datasets (1000 Genomes VCFs, ChEMBL SQLite)")]
#[command(version, author)]
struct Cli {
    /// Config file (defaults to ./kira-rd.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Data root, overriding config and KIRA_RD_DATA_ROOT
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download datasets, skipping ones already valid")]
    Acquire(AcquireArgs),
    #[command(about = "Report which datasets are valid, missing or corrupted (no network)")]
    Status,
    #[command(about = "Validate existing files against the catalog")]
    Validate(ValidateArgs),
    #[command(about = "List the dataset catalog")]
    List,
}

#[derive(Args)]
struct AcquireArgs {
    /// Dataset ids such as chr22, 7, X or chembl
    ids: Vec<String>,

    #[arg(long, conflicts_with = "ids")]
    all: bool,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Args)]
struct ValidateArgs {
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> miette::Result<bool> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Console
    };

    let config = ConfigLoader::resolve(cli.config.as_deref()).into_diagnostic()?;
    let store = match cli.root.as_deref().or(config.data_root.as_deref()) {
        Some(root) => Store::from_path(root).into_diagnostic()?,
        None => Store::new().into_diagnostic()?,
    };
    let catalog = Catalog::builtin(&store, &config.chromosomes, config.chembl_release);

    match cli.command {
        Commands::Acquire(args) => {
            if args.ids.is_empty() && !args.all {
                return Err(miette::Report::msg(
                    "name datasets to acquire or pass --all (try `kira-rd list`)",
                ));
            }
            store.ensure_root().into_diagnostic()?;
            let transport = HttpTransport::new(config.connect_timeout).into_diagnostic()?;
            let app = build_app(catalog, transport, &config);
            run_acquire(args, &app, &config, output_mode)
        }
        Commands::Status => {
            let app = build_app(catalog, OfflineTransport, &config);
            let status = app.status();
            match output_mode {
                OutputMode::Json => JsonOutput::print_status(&status).into_diagnostic()?,
                OutputMode::Console => ConsoleOutput::print_status(&status),
            }
            Ok(status.is_complete())
        }
        Commands::Validate(args) => {
            let app = build_app(catalog, OfflineTransport, &config);
            let reports = app.validate_many(&args.paths);
            match output_mode {
                OutputMode::Json => JsonOutput::print_validation(&reports).into_diagnostic()?,
                OutputMode::Console => ConsoleOutput::print_validation(&reports),
            }
            Ok(reports.iter().all(|report| report.is_valid))
        }
        Commands::List => {
            match output_mode {
                OutputMode::Json => JsonOutput::print_catalog(&catalog).into_diagnostic()?,
                OutputMode::Console => ConsoleOutput::print_catalog(&catalog),
            }
            Ok(true)
        }
    }
}

fn build_app<T: Transport>(
    catalog: Catalog,
    transport: T,
    config: &ResolvedConfig,
) -> App<T, Fs2FreeSpace> {
    App::new(catalog, transport, Fs2FreeSpace)
        .with_retry_policy(config.retry)
        .with_progress_interval(config.progress_interval)
}

fn run_acquire<T: Transport>(
    args: AcquireArgs,
    app: &App<T, Fs2FreeSpace>,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<bool> {
    let options = AcquireOptions {
        force: args.force,
        workers: args.workers.unwrap_or(config.workers).max(1),
    };
    let console = ConsoleSink::default();
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Console => &console,
    };

    let result = app.acquire(&args.ids, options, sink).into_diagnostic()?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_acquire(&result).into_diagnostic()?,
        OutputMode::Console => ConsoleOutput::print_acquire(&result),
    }
    Ok(result.is_complete())
}

/// Stands in for the HTTP client in commands that must stay local.
struct OfflineTransport;

impl Transport for OfflineTransport {
    fn download(
        &self,
        url: &str,
        _destination: &Path,
        _progress: &mut dyn FnMut(u64, u64),
    ) -> Result<u64, KiraError> {
        Err(KiraError::Http(format!(
            "network access disabled for this command: {url}"
        )))
    }
}
