use std::process::ExitCode;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use warc_harvest::archive_it::ArchiveItHttpClient;
use warc_harvest::completeness::{
    COMPLETENESS_REPORT_FILE, CompletenessSummary, reconcile, write_report,
};
use warc_harvest::config::{ConfigLoader, ResolvedConfig};
use warc_harvest::domain::{BoundaryPolicy, DateWindow};
use warc_harvest::error::HarvestError;
use warc_harvest::naming::DepartmentNamingPolicy;
use warc_harvest::output::{ConsoleOutput, JsonOutput, JsonReport, OutputMode};
use warc_harvest::pipeline::{Harvester, ProgressSink, RunSummary};
use warc_harvest::progress::{CsvProgressLog, ProgressStore};
use warc_harvest::seed::SeedTable;
use warc_harvest::tools::{Md5Deep, decompressor_for};

#[derive(Parser)]
#[command(name = "warc-harvest")]
#[command(about = "Download Archive-It WARCs and crawl metadata into per-seed folders")]
#[command(version, author)]
struct Cli {
    /// Print the run summary as JSON instead of progress lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download every seed stored in the window, then check completeness")]
    Download(DownloadArgs),
    #[command(about = "Only check the output directory against the window's inventory")]
    Check(WindowArgs),
}

#[derive(Args, Clone)]
struct WindowArgs {
    /// First day of the window (YYYY-MM-DD).
    start: String,

    /// End of the window (YYYY-MM-DD).
    end: String,

    #[arg(long, default_value = ".")]
    output: Utf8PathBuf,

    #[arg(long)]
    config: Option<String>,

    /// Overrides the configured window boundary policy.
    #[arg(long)]
    boundary: Option<BoundaryPolicy>,
}

#[derive(Args, Clone)]
struct DownloadArgs {
    #[command(flatten)]
    window: WindowArgs,

    /// Seconds to wait between WARC downloads.
    #[arg(long)]
    delay: Option<u64>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(harvest) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(harvest));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::InvalidDate(_)
        | HarvestError::InvalidWindow { .. }
        | HarvestError::MissingConfig
        | HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_)
        | HarvestError::MissingCredentials => 2,
        HarvestError::ApiHttp(_)
        | HarvestError::ApiStatus { .. }
        | HarvestError::ApiPayload(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    match cli.command {
        Commands::Download(args) => run_download(args, output_mode),
        Commands::Check(args) => run_check(args, output_mode),
    }
}

/// Dates are checked before anything else touches the network. Problems are shown
/// on stdout for the operator as well as returned.
fn validate_window(args: &WindowArgs) -> Result<DateWindow, HarvestError> {
    DateWindow::parse(&args.start, &args.end, BoundaryPolicy::default()).inspect_err(|err| {
        println!("{err}");
    })
}

fn prepare(args: &WindowArgs) -> miette::Result<(DateWindow, ResolvedConfig)> {
    let window = validate_window(args)?;
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let policy = args.boundary.unwrap_or(config.boundary);
    let window = DateWindow::new(window.start(), window.end(), policy)?;
    info!(
        start = %window.start(),
        end = %window.end(),
        boundary = %window.policy(),
        "resolved download window"
    );
    Ok((window, config))
}

fn run_download(args: DownloadArgs, output_mode: OutputMode) -> miette::Result<()> {
    let (window, config) = prepare(&args.window)?;
    let output_dir = args.window.output.clone();
    let delay = args
        .delay
        .map(Duration::from_secs)
        .unwrap_or(config.warc_delay);

    let client = ArchiveItHttpClient::new(&config)?;
    let harvester = Harvester::new(
        client,
        Md5Deep::new(&config.fixity_tool),
        decompressor_for(&config),
        Box::new(DepartmentNamingPolicy::new(config.departments.clone())),
        output_dir.clone(),
    )
    .with_warc_delay(delay);

    let mut store = CsvProgressLog::in_dir(&output_dir);
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Text => &ConsoleOutput,
        OutputMode::Json => &JsonOutput,
    };
    let summary = harvester.run(&window, &mut store, sink)?;
    let seeds = store.load_all()?.unwrap_or_default();

    let completeness = check_and_write(
        harvester.client(),
        &window,
        &config,
        &seeds,
        &output_dir,
    )?;
    report(output_mode, Some(&summary), &completeness)
}

fn run_check(args: WindowArgs, output_mode: OutputMode) -> miette::Result<()> {
    let (window, config) = prepare(&args)?;
    let client = ArchiveItHttpClient::new(&config)?;
    let seeds = CsvProgressLog::in_dir(&args.output)
        .load_all()?
        .unwrap_or_default();
    let completeness = check_and_write(&client, &window, &config, &seeds, &args.output)?;
    report(output_mode, None, &completeness)
}

fn check_and_write(
    client: &ArchiveItHttpClient,
    window: &DateWindow,
    config: &ResolvedConfig,
    seeds: &SeedTable,
    output_dir: &Utf8Path,
) -> miette::Result<CompletenessSummary> {
    let naming = DepartmentNamingPolicy::new(config.departments.clone());
    let rows = reconcile(
        client,
        window,
        &naming,
        seeds,
        output_dir,
        &config.ignored_folders,
    )?;
    write_report(&rows, &output_dir.join(COMPLETENESS_REPORT_FILE))?;
    Ok(CompletenessSummary::from_rows(&rows))
}

fn report(
    output_mode: OutputMode,
    download: Option<&RunSummary>,
    completeness: &CompletenessSummary,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::Text => {
            if let Some(summary) = download {
                ConsoleOutput::print_run(summary);
            }
            ConsoleOutput::print_completeness(completeness);
            Ok(())
        }
        OutputMode::Json => JsonOutput::print_report(&JsonReport {
            download,
            completeness: Some(completeness),
        })
        .into_diagnostic(),
    }
}
