//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use sellerreport_core::{
    ArtifactStatus, CreateJobRequest, PipelineDeps, ProgressReporter, RunSummary, UploadedFile,
    create_job, get_artifact, get_job, process_job,
};
use sellerreport_shared::{
    AppConfig, JobId, JobState, Stage, config_file_path, init_config, load_config,
    load_config_from,
};
use sellerreport_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SellerReport: marketplace financial reports as spreadsheets.
#[derive(Parser)]
#[command(
    name = "sellerreport",
    version,
    about = "Collect marketplace sales data and build multi-sheet financial reports.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.sellerreport/sellerreport.toml.
    #[arg(long, global = true, env = "SELLERREPORT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override `storage.data_dir`.
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Output format for `show`.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum ShowFormat {
    Json,
    Xlsx,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create a report job.
    Create {
        /// Marketplace: test or wb.
        #[arg(long)]
        platform: String,

        /// Report kind.
        #[arg(long, default_value = "fin_month")]
        doc_type: String,

        /// First day of the period (YYYY-MM-DD).
        #[arg(long)]
        from: String,

        /// Last day of the period (YYYY-MM-DD).
        #[arg(long)]
        to: String,

        /// Auxiliary input as name=path, e.g. costs=costs.xlsx. Repeatable.
        #[arg(long = "file", value_name = "NAME=PATH")]
        files: Vec<String>,

        /// Run the job right after creating it.
        #[arg(long)]
        run: bool,
    },

    /// Run (or resume) a job until it is complete.
    Run {
        /// Job id.
        job_id: String,
    },

    /// Show a job's metadata, or save its workbook.
    Show {
        /// Job id.
        job_id: String,

        /// json prints metadata; xlsx writes the workbook.
        #[arg(long, default_value = "json")]
        format: ShowFormat,

        /// Where to write the workbook (defaults to <job_id>.xlsx).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// List all jobs.
    List,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sellerreport=info",
        1 => "sellerreport=debug",
        _ => "sellerreport=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;

    match cli.command {
        Command::Create {
            platform,
            doc_type,
            from,
            to,
            files,
            run,
        } => cmd_create(&config, platform, doc_type, from, to, &files, run).await,
        Command::Run { job_id } => cmd_run(&config, &job_id).await,
        Command::Show {
            job_id,
            format,
            out,
        } => cmd_show(&config, &job_id, format, out).await,
        Command::List => cmd_list(&config).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }
    Ok(config)
}

fn parse_job_id(raw: &str) -> Result<JobId> {
    Ok(raw.parse::<JobId>()?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_create(
    config: &AppConfig,
    platform: String,
    doc_type: String,
    from: String,
    to: String,
    files: &[String],
    run_now: bool,
) -> Result<()> {
    let files = files
        .iter()
        .map(|spec| read_upload(spec))
        .collect::<Result<Vec<_>>>()?;

    let deps = PipelineDeps::open(config).await?;
    let job_id = create_job(
        &deps,
        CreateJobRequest {
            platform: Some(platform),
            doc_type: Some(doc_type),
            date_from: Some(from),
            date_to: Some(to),
            files,
        },
    )
    .await?;

    println!("{job_id}");

    if run_now {
        run_with_progress(&deps, &job_id).await?;
    }
    Ok(())
}

/// Parse `name=path` and read the file.
fn read_upload(spec: &str) -> Result<UploadedFile> {
    let (name, path) = spec
        .split_once('=')
        .ok_or_else(|| eyre!("--file expects NAME=PATH, got '{spec}'"))?;
    let bytes = std::fs::read(path).wrap_err_with(|| format!("cannot read '{path}'"))?;
    Ok(UploadedFile {
        name: name.trim().to_string(),
        bytes,
    })
}

async fn cmd_run(config: &AppConfig, job_id: &str) -> Result<()> {
    let job_id = parse_job_id(job_id)?;
    let deps = PipelineDeps::open(config).await?;
    run_with_progress(&deps, &job_id).await
}

async fn run_with_progress(deps: &PipelineDeps, job_id: &JobId) -> Result<()> {
    info!(%job_id, "running report job");
    let reporter = CliProgress::new();
    let result = process_job(job_id, deps, &reporter).await;
    reporter.spinner.finish_and_clear();
    let summary = result?;

    println!();
    println!("  Report ready!");
    println!("  ID:     {}", summary.job_id);
    println!("  From:   {}", summary.started_from);
    println!("  State:  {}", summary.final_state);
    println!("  Stages: {}", summary.stages.len());
    println!("  Time:   {:.1}s", summary.elapsed.as_secs_f64());
    println!();
    Ok(())
}

async fn cmd_show(
    config: &AppConfig,
    job_id: &str,
    format: ShowFormat,
    out: Option<PathBuf>,
) -> Result<()> {
    let job_id = parse_job_id(job_id)?;
    let deps = PipelineDeps::open(config).await?;

    match format {
        ShowFormat::Json => {
            let view = get_job(&deps, &job_id).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        ShowFormat::Xlsx => match get_artifact(&deps, &job_id).await? {
            ArtifactStatus::Ready(bytes) => {
                let out = out.unwrap_or_else(|| PathBuf::from(format!("{job_id}.xlsx")));
                write_file(&out, &bytes)?;
                println!("{}", out.display());
            }
            ArtifactStatus::NotReady(state) => {
                return Err(eyre!(
                    "report {job_id} is not ready yet (state: {state}); run `sellerreport run {job_id}`"
                ));
            }
        },
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("cannot create {}", parent.display()))?;
    }
    std::fs::write(path, bytes).wrap_err_with(|| format!("cannot write {}", path.display()))
}

async fn cmd_list(config: &AppConfig) -> Result<()> {
    let db_path = config.storage.database_path();
    if !db_path.exists() {
        println!("No report jobs yet.");
        return Ok(());
    }

    let storage = Storage::open_readonly(&db_path).await?;
    let reports = storage.list_reports().await?;
    if reports.is_empty() {
        println!("No report jobs yet.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<8}  {:<10}  {:<23}  {:<11}",
        "ID", "PLATFORM", "DOC TYPE", "PERIOD", "STATE"
    );
    for r in reports {
        println!(
            "{:<36}  {:<8}  {:<10}  {} .. {}  {:<11}",
            r.id, r.platform, r.doc_type, r.date_from, r.date_to, r.state
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = config_file_path()?;
    if path.exists() {
        return Err(eyre!("config file already exists at {}", path.display()));
    }
    let path = init_config()?;
    println!("Created {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Extract => "Collecting rows",
        Stage::Transform => "Enriching rows",
        Stage::Load => "Building workbook",
        Stage::Finalize => "Finishing",
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, stage: Stage) {
        self.spinner.set_message(stage_label(stage));
    }

    fn row_enriched(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Enriching rows [{current}/{total}]"));
    }

    fn stage_finished(&self, state: JobState) {
        self.spinner.println(format!("  ✓ {state}"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
