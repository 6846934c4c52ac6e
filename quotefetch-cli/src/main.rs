//! quotefetch CLI — batch fetch, catalog inspection, analysis prompts.
//!
//! Commands:
//! - `fetch` — run a batch of (subject, endpoint) items and save artifacts
//! - `catalog list` — list endpoint identifiers in the catalog
//! - `catalog show <id>` — show one endpoint and its field mapping
//! - `prompt` — print the analysis prompt for a run summary file

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use quotefetch_core::{CatalogStore, Params, ReqwestTransport};
use quotefetch_runner::{
    BatchItem, BatchPlan, BatchResult, BatchRunner, ItemOutcome, LogProgress, Settings, SinkPlan,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "quotefetch",
    about = "quotefetch — catalog-driven market data fetcher"
)]
struct Cli {
    /// Settings file.
    #[arg(long, global = true, default_value = "config/settings.toml")]
    config: PathBuf,

    /// Log at debug level.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every subject × endpoint pair (or a batch plan) and save the results.
    Fetch {
        /// Batch plan file. Mutually exclusive with --subject/--endpoint.
        #[arg(long)]
        batch: Option<PathBuf>,

        /// Subjects, e.g. stock codes (repeatable).
        #[arg(long = "subject")]
        subjects: Vec<String>,

        /// Endpoint identifiers (repeatable).
        #[arg(long = "endpoint")]
        endpoints: Vec<String>,

        /// Extra path parameter, KEY=VALUE (repeatable).
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,

        /// Query-string parameter, KEY=VALUE (repeatable).
        #[arg(long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,

        /// Keep records whose identity is >= this value.
        #[arg(long)]
        start: Option<String>,

        /// Keep records whose identity is <= this value.
        #[arg(long)]
        end: Option<String>,

        /// Output directory. Overrides [output].dir.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Run label used for the summary file. Defaults to a timestamp.
        #[arg(long)]
        label: Option<String>,

        /// Do not write any artifacts.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Catalog inspection commands.
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Print the analysis prompt for a run summary.
    Prompt {
        /// Summary text file written by `fetch`.
        #[arg(long)]
        input: PathBuf,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// List endpoint identifiers.
    List,
    /// Show one endpoint definition and its field mapping.
    Show {
        /// Endpoint identifier.
        id: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Fetch {
            batch,
            subjects,
            endpoints,
            params,
            query,
            start,
            end,
            output,
            label,
            dry_run,
        } => {
            let items = match batch {
                Some(path) => {
                    if !subjects.is_empty() || !endpoints.is_empty() {
                        bail!("--batch and --subject/--endpoint are mutually exclusive");
                    }
                    BatchPlan::from_file(&path)?.items()?
                }
                None => items_from_args(&subjects, &endpoints, &params, &query, start, end)?,
            };
            let options = FetchOptions {
                output,
                label,
                dry_run,
            };
            let result = run_fetch(&cli.config, &items, options)?;
            print_summary(&result);
            if !result.all_succeeded() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Catalog { action } => {
            let catalog = load_catalog(&cli.config)?;
            match action {
                CatalogAction::List => run_catalog_list(&catalog),
                CatalogAction::Show { id } => run_catalog_show(&catalog, &id),
            }
        }
        Commands::Prompt { input } => {
            let summary = std::fs::read_to_string(&input)
                .with_context(|| format!("read {}", input.display()))?;
            if summary.trim().is_empty() {
                bail!("{} is empty", input.display());
            }
            print!("{}", quotefetch_runner::prompt::analysis_prompt(&summary));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(log_filter(verbose, std::env::var("RUST_LOG").ok().as_deref())?)
        .init();
    Ok(())
}

/// `RUST_LOG` wins when set; otherwise `quotefetch` logs at info, or debug
/// with `--verbose`.
fn log_filter(verbose: bool, rust_log: Option<&str>) -> Result<EnvFilter> {
    match rust_log.filter(|v| !v.trim().is_empty()) {
        Some(directives) => Ok(EnvFilter::try_new(directives)?),
        None => {
            let level = if verbose { "debug" } else { "info" };
            Ok(EnvFilter::try_new(format!("quotefetch={level}"))?)
        }
    }
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

fn items_from_args(
    subjects: &[String],
    endpoints: &[String],
    params: &[(String, String)],
    query: &[(String, String)],
    start: Option<String>,
    end: Option<String>,
) -> Result<Vec<BatchItem>> {
    if subjects.is_empty() || endpoints.is_empty() {
        bail!("one of --batch or (--subject and --endpoint) is required");
    }
    let params: Params = params.iter().cloned().collect();
    let query: Params = query.iter().cloned().collect();

    let mut items = Vec::with_capacity(subjects.len() * endpoints.len());
    for subject in subjects {
        for endpoint in endpoints {
            let mut item = BatchItem::new(subject, endpoint)
                .with_range(start.as_deref(), end.as_deref());
            item.params = params.clone();
            item.query = query.clone();
            items.push(item);
        }
    }
    Ok(items)
}

struct FetchOptions {
    output: Option<PathBuf>,
    label: Option<String>,
    dry_run: bool,
}

fn run_fetch(config_path: &Path, items: &[BatchItem], options: FetchOptions) -> Result<BatchResult> {
    let mut settings = Settings::from_file(config_path)?;
    if let Some(dir) = options.output {
        settings.output.dir = dir;
    }

    let catalog = settings.load_catalog()?;
    let transport = ReqwestTransport::new(settings.timeout(), settings.vendor.user_agent.as_deref())?;
    let mut runner = BatchRunner::from_settings(&catalog, transport, &settings);

    if !options.dry_run {
        let label = options
            .label
            .unwrap_or_else(|| chrono::Local::now().format("%Y%m%d_%H%M%S").to_string());
        runner = runner.with_sink(SinkPlan::from_output(&settings.output, &label));
    }

    tracing::info!(
        items = items.len(),
        catalog = %catalog.fingerprint(),
        "starting batch"
    );
    Ok(runner.run_batch(items, &LogProgress))
}

fn load_catalog(config_path: &Path) -> Result<CatalogStore> {
    let settings = Settings::from_file(config_path)?;
    Ok(settings.load_catalog()?)
}

fn print_summary(result: &BatchResult) {
    println!();
    println!("=== Batch Summary ===");
    for (label, outcome) in &result.outcomes {
        match outcome {
            ItemOutcome::Succeeded(report) => {
                let mut line = format!("  ok    {label:<40} {:>6} records", report.records.len());
                if !report.rejected.is_empty() {
                    line.push_str(&format!(", {} rejected", report.rejected.len()));
                }
                if report.out_of_range > 0 {
                    line.push_str(&format!(", {} out of range", report.out_of_range));
                }
                println!("{line}");
            }
            ItemOutcome::Failed(failure) => {
                println!("  FAIL  {label:<40} {failure}");
            }
        }
    }
    println!(
        "{} of {} succeeded, {} failed",
        result.succeeded,
        result.total(),
        result.failed
    );
}

fn run_catalog_list(catalog: &CatalogStore) -> Result<()> {
    for id in catalog.endpoint_ids() {
        println!("{id}");
    }
    println!();
    println!("{} endpoints (fingerprint {})", catalog.len(), catalog.fingerprint());
    Ok(())
}

fn run_catalog_show(catalog: &CatalogStore, id: &str) -> Result<()> {
    let endpoint = catalog.lookup_endpoint(id)?;
    let required: Vec<&str> = endpoint.required_params.iter().map(String::as_str).collect();

    println!("Endpoint:  {}", endpoint.id);
    println!("Template:  {}", endpoint.url_template);
    println!("Required:  {}", required.join(", "));
    println!("Shape:     {:?}", endpoint.shape);

    let mapping = catalog.lookup_field_mapping(id);
    if mapping.is_empty() {
        println!("Fields:    (no mapping, keys kept verbatim)");
    } else {
        println!("Fields:");
        for pair in mapping.pairs() {
            println!("  {:<12} -> {}", pair.raw, pair.human);
        }
    }
    Ok(())
}
