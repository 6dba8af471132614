//! CLI entry point for the `view-select` command-line tool.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;
use std::time::Instant;

use chrono::Utc;
use clap::Parser;

use view_selection::db::{
    count_distinct_edges, store_staged_views, DatabaseBackend, DatabaseError, DatabaseScorer,
};
use view_selection::report::{export_report_json_path, export_scores_json};
use view_selection::{
    import_view_set_json_from_path, InMemoryScorer, RelationIndexBuilder, RunConfig, Runtimes,
    ScoreMatrix, ScoringError, SelectionError, SelectionMethod, SelectionReport,
    SimilarityMeasure, ViewError, ViewSetInput, ViewSummary,
};

#[derive(Parser)]
#[command(
    name = "view-select",
    about = "Select a small, diverse and representative set of views of an event log"
)]
struct Cli {
    /// JSON file with the candidate views
    #[arg(long)]
    input: PathBuf,

    /// JSON file with the run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of views to select (default: all non-empty views)
    #[arg(long)]
    k: Option<usize>,

    /// MMR trade-off between representativeness (1) and novelty (0)
    #[arg(long)]
    weight: Option<f64>,

    /// Selection method: "mmr" or "enumeration"
    #[arg(long)]
    method: Option<String>,

    /// Similarity measure: "jaccard" or "matching"
    #[arg(long)]
    measure: Option<String>,

    /// Number of workers computing pairwise scores
    #[arg(long)]
    workers: Option<usize>,

    /// Stage the relation indices in this database and score views in SQL
    #[arg(long)]
    database: Option<PathBuf>,

    /// Reuse per-instance edge counts already stored in the database
    #[arg(long)]
    reuse_counts: bool,

    /// Memory limit of DuckDB connections (e.g., "4GB")
    #[arg(long)]
    max_mem: Option<String>,

    /// Maximum number of threads per DuckDB connection
    #[arg(long)]
    db_threads: Option<usize>,

    /// Write the selection report to this file (default: stdout)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write overall and pairwise scores to `<prefix>_overall.json` and `<prefix>_pairwise.json`
    #[arg(long)]
    scores_output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug)]
enum CliError {
    View(ViewError),
    Selection(SelectionError),
    Database(DatabaseError),
    Io(std::io::Error),
    Config(serde_json::Error),
    Output(serde_json::Error),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::View(e) => write!(f, "{}", e),
            CliError::Selection(e) => write!(f, "{}", e),
            CliError::Database(e) => write!(f, "{}", e),
            CliError::Io(e) => write!(f, "IO Error: {}", e),
            CliError::Config(e) => write!(f, "Invalid configuration: {}", e),
            CliError::Output(e) => write!(f, "Could not write report: {}", e),
        }
    }
}

impl From<ViewError> for CliError {
    fn from(e: ViewError) -> Self {
        CliError::View(e)
    }
}

impl From<SelectionError> for CliError {
    fn from(e: SelectionError) -> Self {
        CliError::Selection(e)
    }
}

impl From<ScoringError> for CliError {
    fn from(e: ScoringError) -> Self {
        CliError::Selection(SelectionError::Scoring(e))
    }
}

impl From<DatabaseError> for CliError {
    fn from(e: DatabaseError) -> Self {
        CliError::Database(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

/// Load the run configuration, also reporting whether it sets `k` explicitly
fn load_config(path: &Path) -> Result<(RunConfig, bool), CliError> {
    let reader = BufReader::new(File::open(path)?);
    let value: serde_json::Value = serde_json::from_reader(reader).map_err(CliError::Config)?;
    let sets_k = value
        .get("selection")
        .and_then(|s| s.get("k"))
        .is_some();
    let config = serde_json::from_value(value).map_err(CliError::Config)?;
    Ok((config, sets_k))
}

/// Scores and summaries of the scorable views, plus how long building and scoring took
struct ScoredViews {
    matrix: ScoreMatrix,
    summaries: Vec<ViewSummary>,
    index_computation: f64,
    score_computation: f64,
}

fn score_in_memory(input: &ViewSetInput, config: &RunConfig) -> Result<ScoredViews, CliError> {
    let now = Instant::now();
    let mut session = RelationIndexBuilder::new();
    let views = input.build_views(&mut session)?;
    let index_computation = now.elapsed().as_secs_f64();
    log::info!(
        "Built relation indices of {} views ({} distinct edges) in {:.3}s",
        views.len(),
        session.num_edges(),
        index_computation
    );

    let now = Instant::now();
    let scorer = InMemoryScorer::new(&views, config.scoring.measure);
    let matrix = ScoreMatrix::compute(&scorer, config.scoring.workers)?;
    let score_computation = now.elapsed().as_secs_f64();

    Ok(ScoredViews {
        matrix,
        summaries: views.iter().map(ViewSummary::from).collect(),
        index_computation,
        score_computation,
    })
}

fn score_in_database(
    input: &ViewSetInput,
    config: &RunConfig,
    path: &Path,
) -> Result<ScoredViews, CliError> {
    let backend = DatabaseBackend::from_path(path);
    let now = Instant::now();
    let mut session = RelationIndexBuilder::new();
    let staged = input.stage_views(&mut session, &config.staging)?;
    let metas = {
        let con = backend.open_with_options(path, false, &config.database)?;
        store_staged_views(&con, &staged)?
    };
    drop(staged);
    let summaries = {
        let con = backend.open_with_options(path, true, &config.database)?;
        metas
            .iter()
            .map(|meta| {
                let num_edges = count_distinct_edges(&con, meta.view_index)?;
                Ok(ViewSummary::from_meta(meta, num_edges as usize))
            })
            .collect::<Result<Vec<_>, DatabaseError>>()?
    };
    let index_computation = now.elapsed().as_secs_f64();
    log::info!(
        "Stored relation indices of {} views in {:?} in {:.3}s",
        metas.len(),
        path,
        index_computation
    );

    let now = Instant::now();
    let scorer = DatabaseScorer::open_with_options(
        path,
        backend,
        config.scoring.measure,
        config.database.clone(),
    )?;
    let matrix = ScoreMatrix::compute(&scorer, config.scoring.workers)?;
    let score_computation = now.elapsed().as_secs_f64();

    Ok(ScoredViews {
        matrix,
        summaries,
        index_computation,
        score_computation,
    })
}

fn run(cli: Cli) -> Result<(), CliError> {
    let run_start = Instant::now();
    let (mut config, mut k_given) = match &cli.config {
        Some(path) => load_config(path)?,
        None => (RunConfig::default(), false),
    };
    if let Some(k) = cli.k {
        config.selection.k = k;
        k_given = true;
    }
    if let Some(weight) = cli.weight {
        config.selection.weight = weight;
    }
    if let Some(method) = &cli.method {
        config.selection.method = SelectionMethod::from_str(method)?;
    }
    if let Some(measure) = &cli.measure {
        config.scoring.measure = SimilarityMeasure::from_str(measure)
            .map_err(SelectionError::UnknownMeasure)?;
    }
    if let Some(workers) = cli.workers {
        config.scoring.workers = workers;
    }
    if cli.reuse_counts {
        config.database.reuse_counts = true;
    }
    if let Some(max_mem) = &cli.max_mem {
        config.database.memory_limit = Some(max_mem.clone());
    }
    if let Some(threads) = cli.db_threads {
        config.database.threads = Some(threads);
    }
    // Reject an invalid weight before doing any expensive work
    config.selection.selector()?;

    let input = import_view_set_json_from_path(&cli.input)?;
    log::info!(
        "Loaded {} candidate views from {:?}",
        input.views.len(),
        cli.input
    );

    let scored = match &cli.database {
        Some(path) => score_in_database(&input, &config, path)?,
        None => score_in_memory(&input, &config)?,
    };
    if !k_given {
        config.selection.k = scored.matrix.len();
    }

    if let Some(prefix) = &cli.scores_output {
        let labels: Vec<String> = scored.summaries.iter().map(|s| s.label.clone()).collect();
        export_scores_json(&scored.matrix, &labels, prefix)?;
    }

    let selection_start = Utc::now();
    let now = Instant::now();
    let result = config.selection.select(&scored.matrix)?;
    let view_selection = now.elapsed().as_secs_f64();

    let runtimes = Runtimes {
        index_computation: scored.index_computation,
        score_computation: scored.score_computation,
        view_selection,
        run_time: run_start.elapsed().as_secs_f64(),
    };
    let report = SelectionReport::new(
        config.selection.method,
        config.scoring.measure,
        cli.input.display().to_string(),
        runtimes,
        &result,
        &scored.summaries,
        selection_start,
    );

    match &cli.output {
        Some(path) => {
            export_report_json_path(&report, path)?;
            log::info!("Wrote report to {:?}", path);
        }
        None => println!("{}", render_report(&report)?),
    }
    Ok(())
}

fn render_report(report: &SelectionReport) -> Result<String, CliError> {
    serde_json::to_string_pretty(report).map_err(CliError::Output)
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
