use casecorr::normalize::normalize;
use casecorr::{
    ingest_directory, record_attribute, AttributeObservation, AttributeStore, AttributeType,
    CaseContext, CentralRepository, CommonAttributeSearchResults, CommonAttributeSearcher, Config,
    FrequencyIndex, FrequencyThreshold, IngestOptions, KnownStatus, MimeFilter, SearchFilters,
    SearchScope, StaticCaseContext,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// casecorr - Find attribute values the open case shares with other cases
#[derive(Parser)]
#[command(name = "casecorr")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = ".casecorr.toml")]
    config: PathBuf,

    /// Central repository file (overrides the config)
    #[arg(short, long, global = true)]
    repository: Option<PathBuf>,

    /// Name of the currently open case (overrides the config)
    #[arg(long = "case", global = true)]
    current_case: Option<String>,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash a data source directory and correlate its files
    Ingest {
        /// Data source root directory
        path: PathBuf,

        /// Data source name
        #[arg(short, long)]
        data_source: String,

        /// Case to ingest into (defaults to the current case)
        #[arg(long)]
        into: Option<String>,

        /// Device identifier of the data source
        #[arg(long, default_value = "")]
        device_id: String,

        /// Glob patterns to exclude (can be repeated)
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Comment attached to every recorded file
        #[arg(long)]
        comment: Option<String>,
    },

    /// Record a single attribute value (email, phone, device id, ...)
    Record {
        /// Attribute type (files, domain, email, phone, usb_device, ...)
        #[arg(short = 't', long = "type")]
        attribute_type: AttributeType,

        /// Attribute value
        value: String,

        /// Data source name
        #[arg(short, long)]
        data_source: String,

        /// Case to record into (defaults to the current case)
        #[arg(long)]
        into: Option<String>,

        /// File the value was found in
        #[arg(short, long, default_value = "")]
        path: String,

        #[arg(long)]
        comment: Option<String>,

        /// Known status (unknown, known, notable)
        #[arg(long)]
        known_status: Option<KnownStatus>,
    },

    /// List cases in the central repository
    Cases {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find values the current case shares with other cases
    Search {
        /// Only match against this case id (default: all other cases)
        #[arg(short, long)]
        other_case: Option<i64>,

        /// Attribute type to correlate
        #[arg(short = 't', long = "type")]
        attribute_type: Option<AttributeType>,

        /// Maximum frequency percentage (0 disables filtering)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: Option<u8>,

        /// Only anchor on media files in the current case
        #[arg(long)]
        media: bool,

        /// Only anchor on document files in the current case
        #[arg(long)]
        documents: bool,

        /// Maximum values to show per case
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show how common a value is across the repository
    Frequency {
        /// Attribute type
        #[arg(short = 't', long = "type", default_value = "files")]
        attribute_type: AttributeType,

        /// Attribute value
        value: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show repository statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match Config::load(&cli.config) {
        Ok(config) => run(cli, config),
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "casecorr=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let repo_path = cli.repository.clone().unwrap_or_else(|| config.repository.clone());
    let current_case = cli.current_case.clone().or_else(|| config.current_case.clone());

    match cli.command {
        Commands::Ingest { path, data_source, into, device_id, mut exclude, comment } => {
            exclude.extend(config.ingest.exclude.iter().cloned());
            let case_name = into.or(current_case)
                .ok_or("no case to ingest into. Pass --into or --case.")?;
            let options = IngestOptions { case_name, data_source, device_id, exclude, comment };
            cmd_ingest(&path, &options, &repo_path, cli.quiet)
        }
        Commands::Record { attribute_type, value, data_source, into, path, comment, known_status } => {
            let case_name = into.or(current_case)
                .ok_or("no case to record into. Pass --into or --case.")?;
            let observation = AttributeObservation {
                case_name,
                data_source,
                attribute_type,
                value,
                path,
                comment,
                known_status,
            };
            cmd_record(observation, &repo_path, cli.quiet)
        }
        Commands::Cases { json } => cmd_cases(json, &repo_path),
        Commands::Search { other_case, attribute_type, threshold, media, documents, limit, json } => {
            let filters = SearchFilters {
                attribute_type: match attribute_type {
                    Some(t) => t,
                    None => config.attribute_type()?,
                },
                mime: if media || documents {
                    MimeFilter { media, documents }
                } else {
                    config.mime_filter()
                },
                threshold: match threshold {
                    Some(t) => FrequencyThreshold::explicit(t),
                    None => config.threshold()?,
                },
            };
            let scope = match other_case {
                Some(id) => SearchScope::SpecificCase(id),
                None => SearchScope::AllOtherCases,
            };
            cmd_search(current_case.as_deref(), scope, filters, limit, json, &repo_path)
        }
        Commands::Frequency { attribute_type, value, json } => {
            cmd_frequency(attribute_type, &value, json, &repo_path)
        }
        Commands::Stats { json } => cmd_stats(json, &repo_path),
    }
}

fn cmd_ingest(
    path: &Path,
    options: &IngestOptions,
    repo_path: &Path,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let repo = CentralRepository::load_or_create(repo_path)?;

    if !quiet {
        println!("{} {} into {}", "Ingesting".cyan().bold(), path.display(), options.case_name.cyan());
    }

    let report = ingest_directory(&repo, path, options)?;
    repo.save(repo_path)?;

    if !quiet {
        println!();
        println!("{}", "Ingest Summary".green().bold());
        println!("  Case:             {} (id {})", report.case.display_name.cyan(), report.case.id);
        println!("  Data source:      {}", report.data_source.name.cyan());
        println!("  Files seen:       {}", report.files_seen.to_string().cyan());
        println!("  Recorded:         {}", report.recorded.to_string().cyan());
        println!("  Already present:  {}", report.already_present.to_string().dimmed());
        println!("  Excluded:         {}", report.excluded.to_string().dimmed());
        if report.unreadable > 0 {
            println!("  Unreadable:       {}", report.unreadable.to_string().yellow());
        }
        if report.skipped > 0 {
            println!("  Not regular:      {}", report.skipped.to_string().dimmed());
        }
        println!("  Time elapsed:     {:.2?}", start.elapsed());
        println!();
        println!("{} {}", "Repository written to".green(), repo_path.display().to_string().cyan());
    }

    Ok(())
}

fn cmd_record(
    observation: AttributeObservation,
    repo_path: &Path,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let repo = CentralRepository::load_or_create(repo_path)?;
    let attribute_type = observation.attribute_type;
    let case_name = observation.case_name.clone();
    let inserted = record_attribute(&repo, observation)?;
    repo.save(repo_path)?;

    if !quiet {
        if inserted {
            println!("{} {} value in {}", "Recorded".green(), attribute_type, case_name.cyan());
        } else {
            println!("{}", "Value already recorded for this file.".dimmed());
        }
    }
    Ok(())
}

fn cmd_cases(json: bool, repo_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let repo = CentralRepository::load(repo_path)?;
    let cases = repo.cases();

    if json {
        println!("{}", serde_json::to_string_pretty(&cases)?);
        return Ok(());
    }

    if cases.is_empty() {
        println!("{}", "No cases in the central repository.".yellow());
        return Ok(());
    }

    println!("{}", "Central Repository Cases".green().bold());
    println!();
    for summary in &cases {
        println!("  {:>4}  {}  {} data sources, {} instances",
            summary.case.id.to_string().cyan(),
            summary.case.display_name.yellow(),
            summary.data_sources,
            summary.instances
        );
    }
    Ok(())
}

fn cmd_search(
    current_case: Option<&str>,
    scope: SearchScope,
    filters: SearchFilters,
    limit: usize,
    json: bool,
    repo_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let repo = CentralRepository::load(repo_path)?;
    let cases = resolve_current_case(&repo, current_case)?;
    let start = Instant::now();

    // Fail before searching if no case is open
    cases.current_case()?;

    let searcher = CommonAttributeSearcher::new(&repo, &cases, filters);
    let results = searcher.find_matches(scope)?;
    let elapsed = start.elapsed();

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    print_results(&results, limit);
    eprintln!("\nCommon attribute search: {:?} ({} values, {} instances)",
        elapsed,
        results.value_count(),
        results.instance_count()
    );
    Ok(())
}

fn resolve_current_case(
    repo: &CentralRepository,
    name: Option<&str>,
) -> Result<StaticCaseContext, Box<dyn std::error::Error>> {
    let Some(name) = name else {
        return Ok(StaticCaseContext::closed());
    };
    let session = repo.open_session()?;
    match session.find_case_by_name(name)? {
        Some(case) => Ok(StaticCaseContext::open(case)),
        None => Err(format!("current case '{}' is not in the central repository", name).into()),
    }
}

fn print_results(results: &CommonAttributeSearchResults, limit: usize) {
    println!("{}", results.title().green().bold());
    println!();

    if results.is_empty() {
        println!("{}", "No common values found.".green());
        return;
    }

    for list in results.lists() {
        println!("{} {} ({} values, {} instances)",
            "Case:".cyan().bold(),
            list.case_name().yellow(),
            list.values().len(),
            list.total_instances()
        );

        for value in list.values().iter().take(limit) {
            println!("  {} {} [{}]",
                value.value().yellow(),
                format!("({} instances in {} data sources)",
                    value.instance_count(),
                    value.data_source_count()
                ).dimmed(),
                value.case_names().join(", ")
            );
            for inst in value.instances() {
                let mut line = format!("    {} / {}  {}",
                    inst.case.display_name,
                    inst.data_source.name,
                    inst.file.path
                );
                if let Some(status) = inst.known_status {
                    line.push_str(&format!("  [{}]", status));
                }
                if let Some(comment) = &inst.comment {
                    line.push_str(&format!("  \"{}\"", comment));
                }
                println!("{}", line);
            }
        }

        if list.values().len() > limit {
            println!("{}", format!("  ... and {} more", list.values().len() - limit).dimmed());
        }
        println!();
    }
}

fn cmd_frequency(
    attribute_type: AttributeType,
    value: &str,
    json: bool,
    repo_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let repo = CentralRepository::load(repo_path)?;
    let value = normalize(attribute_type, value)?;
    let session = repo.open_session()?;

    let mut index = FrequencyIndex::new();
    let pct = index.frequency_percentage_of(&*session, attribute_type, &value)?;
    let holding = session.count_data_sources_with_value(attribute_type, &value)?;
    let total = session.count_data_sources()?;

    if json {
        let output = serde_json::json!({
            "attribute_type": attribute_type,
            "value": value,
            "data_sources": holding,
            "total_data_sources": total,
            "frequency_percentage": pct,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{} {:.1}% ({} of {} data sources)",
        value.cyan(),
        pct,
        holding,
        total
    );
    Ok(())
}

fn cmd_stats(json: bool, repo_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let repo = CentralRepository::load(repo_path)?;
    let stats = repo.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "Repository Statistics".green().bold());
    println!();
    println!("  Cases:             {}", stats.cases.to_string().cyan());
    println!("  Data sources:      {}", stats.data_sources.to_string().cyan());
    println!("  Instances:         {}", stats.instances.to_string().cyan());
    println!("  Distinct values:   {}", stats.distinct_values.to_string().cyan());
    println!("  Repository version: {}", stats.version.to_string().dimmed());
    println!("  Updated at:        {}", stats.updated_at.to_rfc3339().dimmed());
    println!();
    println!("{}", "Instances by Type".green().bold());
    println!();

    for (attribute_type, count) in &stats.instances_by_type {
        let bar = "=".repeat((count / 2).min(40));
        println!("  {:>20} {:>6} {}", attribute_type.display_name().cyan(), count, bar.dimmed());
    }

    Ok(())
}
