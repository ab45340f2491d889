//! CLI command definitions, routing, and tracing setup.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use ocwharvest_core::{CourseOutcome, Harvester, ProgressReporter, run_pipeline};
use ocwharvest_fetcher::CourseDownload;
use ocwharvest_resources::{
    Bucket, classify, pair_assignments_with_report, read_course_info, read_descriptors,
};
use ocwharvest_shared::{AppConfig, RunSummary, init_config, load_config, load_config_from};
use ocwharvest_storage::{DocumentKind, Storage};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ocwharvest: collect lecture notes, readings, and problem sets from open courseware.
#[derive(Parser)]
#[command(
    name = "ocwharvest",
    version,
    about = "Harvest open courseware archives into a local database and combined PDFs.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.ocwharvest/ocwharvest.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path (overrides the config file).
    #[arg(long, env = "OCWHARVEST_DB", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Per-run path and output overrides.
#[derive(clap::Args, Debug, Clone, Default)]
pub(crate) struct HarvestArgs {
    /// Staging directory for the course being processed.
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Root directory for combined PDFs.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Skip writing combined PDFs.
    #[arg(long)]
    pub no_pdf: bool,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Search the catalog and harvest every matching course.
    Run {
        #[command(flatten)]
        harvest: HarvestArgs,

        /// Department to search (overrides the config file).
        #[arg(long)]
        department: Option<String>,

        /// Stop after this many courses.
        #[arg(long)]
        max_courses: Option<usize>,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Harvest a single course.
    Course {
        /// Course page URL.
        url: String,

        /// Archive URL; looked up on the course download page when omitted.
        #[arg(long)]
        download_url: Option<String>,

        #[command(flatten)]
        harvest: HarvestArgs,
    },

    /// List harvested courses, or the records stored for one course.
    List {
        /// Course number to show in detail.
        #[arg(long)]
        course: Option<String>,
    },

    /// Show buckets and problem/solution pairs for an extracted archive.
    Classify {
        /// Directory holding data.json and resources/.
        dir: PathBuf,
    },

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
        0 => "ocwharvest=info",
        1 => "ocwharvest=debug",
        _ => "ocwharvest=trace",
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
    let config = resolve_config(cli.config.as_deref(), cli.db.as_deref())?;

    match cli.command {
        Command::Run {
            harvest,
            department,
            max_courses,
            json,
        } => {
            let mut config = apply_harvest_args(config, &harvest);
            if let Some(department) = department {
                config.catalog.department = department;
            }
            if max_courses.is_some() {
                config.catalog.max_courses = max_courses;
            }
            cmd_run(&config, json).await
        }
        Command::Course {
            url,
            download_url,
            harvest,
        } => cmd_course(&apply_harvest_args(config, &harvest), &url, download_url).await,
        Command::List { course } => cmd_list(&config, course.as_deref()).await,
        Command::Classify { dir } => cmd_classify(&dir),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

/// Load the config file (explicit path or default location) and apply `--db`.
fn resolve_config(path: Option<&Path>, db: Option<&Path>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(db) = db {
        config.defaults.database_path = db.display().to_string();
    }
    Ok(config)
}

fn apply_harvest_args(mut config: AppConfig, args: &HarvestArgs) -> AppConfig {
    if let Some(corpus) = &args.corpus {
        config.defaults.corpus_dir = corpus.display().to_string();
    }
    if let Some(out) = &args.out {
        config.defaults.out_dir = out.display().to_string();
    }
    if args.no_pdf {
        config.defaults.combine_pdfs = false;
    }
    config
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig, json: bool) -> Result<()> {
    let storage = Storage::open(Path::new(&config.defaults.database_path)).await?;
    let harvester = Harvester::new(config)?;
    let progress = CliProgress::new();

    info!(
        department = %config.catalog.department,
        db = %config.defaults.database_path,
        "starting harvest run"
    );

    let result = run_pipeline(config, &harvester, &storage, &progress).await;
    progress.spinner.finish_and_clear();
    storage.close();
    let summary = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

async fn cmd_course(config: &AppConfig, url: &str, download_url: Option<String>) -> Result<()> {
    let harvester = Harvester::new(config)?;

    let download_url = match download_url {
        Some(download_url) => download_url,
        None => harvester
            .fetcher()
            .find_download_url(url)
            .await?
            .ok_or_else(|| eyre!("no course archive link found on {url}/download"))?,
    };

    let storage = Storage::open(Path::new(&config.defaults.database_path)).await?;
    let course = CourseDownload {
        course_url: url.to_string(),
        download_url,
    };

    let progress = CliProgress::new();
    progress.course_started(url, 1, 1);
    let result = harvester.harvest(&storage, &course).await;
    progress.spinner.finish_and_clear();
    storage.close();
    let outcome = result?;

    print_outcome(&outcome);
    Ok(())
}

async fn cmd_list(config: &AppConfig, course: Option<&str>) -> Result<()> {
    let storage = Storage::open_readonly(Path::new(&config.defaults.database_path)).await?;
    let result = render_listing(&storage, course).await;
    storage.close();
    print!("{}", result?);
    Ok(())
}

/// Course table, or one course's stored records when `course` is set.
async fn render_listing(storage: &Storage, course: Option<&str>) -> Result<String> {
    let mut out = String::new();

    let Some(number) = course else {
        let courses = storage.list_courses().await?;
        writeln!(out, "{} courses", courses.len())?;
        for c in &courses {
            writeln!(out, "  {:<10} {} ({} {})", c.course_number, c.title, c.term, c.year)?;
        }
        return Ok(out);
    };

    let record = storage
        .get_course_by_number(number)
        .await?
        .ok_or_else(|| eyre!("course {number} is not in the database"))?;
    writeln!(out, "{} {}", record.course_number, record.title)?;
    writeln!(out, "  url: {}", record.url)?;
    if let Some(sha) = &record.archive_sha256 {
        writeln!(out, "  archive sha256: {sha}")?;
    }

    let problem_sets = storage.list_problem_sets(&record.id).await?;
    writeln!(out, "\nProblem sets ({})", problem_sets.len())?;
    for set in &problem_sets {
        writeln!(out, "  {} ({} chars)", set.remote_problem_url, set.character_count)?;
    }

    for (label, kind) in [("Lectures", DocumentKind::Lecture), ("Readings", DocumentKind::Reading)] {
        let docs = storage.list_documents(kind, &record.id).await?;
        writeln!(out, "\n{label} ({})", docs.len())?;
        for doc in &docs {
            writeln!(out, "  {} ({} chars)", doc.remote_url, doc.character_count)?;
        }
    }
    Ok(out)
}

fn cmd_classify(dir: &Path) -> Result<()> {
    match read_course_info(dir) {
        Ok(info) => println!("{} ({})", info.course_title, info.primary_course_number),
        Err(e) => println!("(no course metadata: {e})"),
    }

    let descriptors = read_descriptors(dir)?;
    let buckets = classify(&descriptors);
    println!("{} resource descriptors", descriptors.len());

    for bucket in Bucket::ALL {
        let names = buckets.get(bucket);
        println!("\n{bucket} ({})", names.len());
        for name in names {
            println!("  {name}");
        }
    }

    let pairing = pair_assignments_with_report(&buckets.assignments);
    println!("\nProblem sets ({})", pairing.pairs.len());
    for pair in &pairing.pairs {
        println!("  {}  {}  +  {}", pair.id, pair.problem_file, pair.solution_file);
    }
    if !pairing.unmatched_problems.is_empty() {
        println!("Problems without a solution: {}", pairing.unmatched_problems.join(", "));
    }
    if !pairing.unmatched_solutions.is_empty() {
        println!("Solutions without a problem: {}", pairing.unmatched_solutions.join(", "));
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_summary(summary: &RunSummary) {
    let elapsed = summary
        .finished_at
        .map(|end| (end - summary.started_at).num_seconds())
        .unwrap_or_default();

    println!("Harvest finished in {elapsed}s");
    println!("  courses:    {}", summary.total_courses);
    println!("  successful: {}", summary.successful);
    println!("  failed:     {}", summary.failed);
    for url in &summary.failed_courses {
        println!("    - {url}");
    }
}

fn print_outcome(outcome: &CourseOutcome) {
    println!("{} ({})", outcome.course_number, outcome.slug);
    println!("  problem sets: {}", outcome.problem_sets);
    println!("  lectures:     {}", outcome.lectures);
    println!("  readings:     {}", outcome.readings);
    if outcome.skipped > 0 {
        println!("  skipped:      {}", outcome.skipped);
    }
    for path in outcome
        .artifacts
        .lectures
        .iter()
        .chain(&outcome.artifacts.readings)
        .chain(&outcome.artifacts.problem_sets)
    {
        println!("  wrote {}", path.display());
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn course_started(&self, course_url: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Harvesting [{current}/{total}] {course_url}"));
    }

    fn course_finished(&self, course_url: &str, outcome: Option<&CourseOutcome>) {
        match outcome {
            Some(o) => self.spinner.println(format!(
                "✓ {} ({} problem sets, {} lectures, {} readings)",
                o.course_number, o.problem_sets, o.lectures, o.readings
            )),
            None => self.spinner.println(format!("✗ {course_url}")),
        }
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
