use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use parasol_core::consolidator;
use parasol_core::domain_language::{
    domain_language_to_markdown, markdown_to_domain_language, validate_domain_language_markdown,
};
use parasol_core::duplication_analyzer::{normalize_name, MergeStrategy, SimilarityPass};
use parasol_core::layer_classifier;
use parasol_core::report_formatter;
use parasol_core::spec_parsers::{self, read_markdown};
use parasol_core::{DocScanner, DuplicationAnalyzer, ImportOptions, ImportOrchestrator, InMemoryStore};

#[derive(Parser)]
#[command(name = "parasol")]
#[command(about = "Parse, classify and consolidate Parasol business documentation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
    Markdown,
}

#[derive(Clone, Copy, ValueEnum)]
enum DocKind {
    Domain,
    Api,
    Db,
    Integration,
    Operation,
    Usecase,
    Page,
    Test,
}

impl DocKind {
    fn name(&self) -> &'static str {
        match self {
            DocKind::Domain => "domain",
            DocKind::Api => "api",
            DocKind::Db => "db",
            DocKind::Integration => "integration",
            DocKind::Operation => "operation",
            DocKind::Usecase => "usecase",
            DocKind::Page => "page",
            DocKind::Test => "test",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a services tree for page and use-case documents
    Scan {
        /// Root directory containing `services/`
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// Output JSON file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Classify a single page or use-case document
    Classify {
        /// Markdown file; its path decides the layer before content does
        #[arg(short, long)]
        file: PathBuf,

        /// Output JSON file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report duplicated use cases and pages
    Analyze {
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        #[arg(long, value_enum, default_value = "json")]
        format: ReportFormat,

        /// Also report near-miss names scoring at or above this threshold (0.0-1.0)
        #[arg(long)]
        similarity: Option<f64>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Preview (or apply to an in-memory store) the consolidation of one group
    Consolidate {
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// Normalized display name of the group
        #[arg(short, long)]
        key: String,

        /// Merge strategy; defaults to the proposed one
        #[arg(short, long)]
        strategy: Option<String>,

        /// Write the merged markdown to this file
        #[arg(long)]
        write_merged: Option<PathBuf>,

        /// Commit instead of a dry run
        #[arg(long, default_value_t = false)]
        apply: bool,

        #[arg(long, value_enum, default_value = "json")]
        format: ReportFormat,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Scan, classify, analyze and persist a services tree
    Import {
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Consolidate every duplicate group with its proposed strategy
        #[arg(long, default_value_t = false)]
        consolidate: bool,

        #[arg(long)]
        similarity: Option<f64>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse a markdown document into JSON
    Parse {
        #[arg(short, long, value_enum)]
        kind: DocKind,

        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate markdown from a JSON model
    Generate {
        #[arg(short, long, value_enum)]
        kind: DocKind,

        /// JSON file as produced by `parse`
        #[arg(short, long)]
        input: PathBuf,

        /// Output markdown file path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a markdown document's structure
    Validate {
        #[arg(short, long, value_enum)]
        kind: DocKind,

        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Scan { .. } => "scan",
            Commands::Classify { .. } => "classify",
            Commands::Analyze { .. } => "analyze",
            Commands::Consolidate { .. } => "consolidate",
            Commands::Import { .. } => "import",
            Commands::Parse { .. } => "parse",
            Commands::Generate { .. } => "generate",
            Commands::Validate { .. } => "validate",
        }
    }
}

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Scan { root, output } => match DocScanner::new().scan(root) {
            Ok(scan) => output_result(&scan, output.as_ref(), "scan"),
            Err(e) => Err(e.into()),
        },
        Commands::Classify { file, output } => match read_markdown(file) {
            Ok(content) => {
                let path = file.to_string_lossy().replace('\\', "/");
                let classification = layer_classifier::explain(&path, &content);
                output_result(&classification, output.as_ref(), "classify")
            }
            Err(e) => Err(e.into()),
        },
        Commands::Analyze { root, format, similarity, output } => {
            run_analyze(root, *format, *similarity, output.as_ref())
        }
        Commands::Consolidate { root, key, strategy, write_merged, apply, format, output } => {
            run_consolidate(
                root,
                key,
                strategy.as_deref(),
                write_merged.as_ref(),
                *apply,
                *format,
                output.as_ref(),
            )
        }
        Commands::Import { root, dry_run, consolidate, similarity, output } => {
            let options = ImportOptions {
                dry_run: *dry_run,
                consolidate: *consolidate,
                similarity: *similarity,
            };
            let mut orchestrator = ImportOrchestrator::new(InMemoryStore::new());
            match orchestrator.run(root, &options) {
                Ok(summary) => output_result(&summary, output.as_ref(), "import"),
                Err(e) => Err(e.into()),
            }
        }
        Commands::Parse { kind, file, output } => match read_markdown(file) {
            Ok(text) => run_parse(*kind, &text, output.as_ref()),
            Err(e) => Err(e.into()),
        },
        Commands::Generate { kind, input, output } => run_generate(*kind, input, output.as_ref()),
        Commands::Validate { kind, file, output } => match read_markdown(file) {
            Ok(text) => {
                let result = match kind {
                    DocKind::Domain => validate_domain_language_markdown(&text),
                    DocKind::Api => spec_parsers::validate_api_spec_markdown(&text),
                    DocKind::Db => spec_parsers::validate_db_schema_markdown(&text),
                    DocKind::Integration => spec_parsers::validate_integration_spec_markdown(&text),
                    DocKind::Operation => spec_parsers::validate_business_operation_markdown(&text),
                    other => {
                        return fail(
                            cli.command.name(),
                            &format!("No validator for kind '{}'", other.name()),
                        )
                    }
                };
                output_result(&result, output.as_ref(), "validate")
            }
            Err(e) => Err(e.into()),
        },
    };

    if let Err(e) = result {
        fail(cli.command.name(), &e);
    }
}

fn fail(command_name: &str, e: &dyn std::fmt::Display) -> ! {
    eprintln!("Error in '{}' command: {}", command_name, e);
    eprintln!("Hint: Use --help for usage information");
    std::process::exit(1);
}

fn run_analyze(root: &Path, format: ReportFormat, similarity: Option<f64>, output: Option<&PathBuf>) -> CmdResult {
    let scan = DocScanner::new().scan(root)?;
    let mut analyzer = DuplicationAnalyzer::new();
    if let Some(threshold) = similarity {
        analyzer = analyzer.with_similarity(SimilarityPass::new(threshold));
    }
    let report = analyzer.report(&scan.documents);
    match format {
        ReportFormat::Json => output_result(&report, output, "analyze"),
        ReportFormat::Markdown => {
            output_text(&report_formatter::format_duplication_report(&report), output, "analyze")
        }
    }
}

fn run_consolidate(
    root: &Path,
    key: &str,
    strategy: Option<&str>,
    write_merged: Option<&PathBuf>,
    apply: bool,
    format: ReportFormat,
    output: Option<&PathBuf>,
) -> CmdResult {
    let strategy = match strategy {
        Some(name) => Some(MergeStrategy::from_name(name).ok_or_else(|| {
            let known: Vec<&str> = MergeStrategy::ALL.iter().map(|s| s.as_str()).collect();
            format!("Unknown strategy '{}' (expected one of: {})", name, known.join(", "))
        })?),
        None => None,
    };

    // Imported into a throwaway store so that --apply exercises the real commit path
    let mut orchestrator = ImportOrchestrator::new(InMemoryStore::new());
    let summary = orchestrator.run(root, &ImportOptions::default())?;
    let key = normalize_name(key);
    let group = summary
        .duplication
        .usecase_duplications
        .groups
        .iter()
        .chain(summary.duplication.page_duplications.groups.iter())
        .find(|g| g.normalized_key == key)
        .ok_or_else(|| format!("No duplicate group named '{}'", key))?;

    let strategy = strategy.unwrap_or(group.merge_strategy);
    let stored_ids = orchestrator.stored_ids().clone();
    let mut store = orchestrator.into_store();
    let result = consolidator::consolidate_stored(group, strategy, !apply, &mut store, &stored_ids);

    if let Some(path) = write_merged {
        if result.success {
            std::fs::write(path, &result.merged_content).map_err(|e| {
                format!("Failed to write merged content to '{}': {}", path.display(), e)
            })?;
        }
    }

    match format {
        ReportFormat::Json => output_result(&result, output, "consolidate"),
        ReportFormat::Markdown => {
            output_text(&report_formatter::format_consolidation(&result), output, "consolidate")
        }
    }
}

fn run_parse(kind: DocKind, text: &str, output: Option<&PathBuf>) -> CmdResult {
    match kind {
        DocKind::Domain => output_result(&markdown_to_domain_language(text), output, "parse"),
        DocKind::Api => output_result(&spec_parsers::parse_api_spec_markdown(text), output, "parse"),
        DocKind::Db => output_result(&spec_parsers::parse_db_schema_markdown(text), output, "parse"),
        DocKind::Integration => {
            output_result(&spec_parsers::parse_integration_spec_markdown(text), output, "parse")
        }
        DocKind::Operation => {
            output_result(&spec_parsers::parse_business_operation_markdown(text), output, "parse")
        }
        DocKind::Usecase => output_result(&spec_parsers::parse_use_case_markdown(text), output, "parse"),
        DocKind::Page => output_result(&spec_parsers::parse_page_markdown(text), output, "parse"),
        DocKind::Test => {
            output_result(&spec_parsers::parse_test_definition_markdown(text), output, "parse")
        }
    }
}

fn read_model<T: serde::de::DeserializeOwned>(input: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(input)
        .map_err(|e| format!("Failed to read input file '{}': {}", input.display(), e))?;
    let model = serde_json::from_str(&json)
        .map_err(|e| format!("Failed to parse model JSON from '{}': {}", input.display(), e))?;
    Ok(model)
}

fn run_generate(kind: DocKind, input: &Path, output: Option<&PathBuf>) -> CmdResult {
    let markdown = match kind {
        DocKind::Domain => domain_language_to_markdown(&read_model(input)?),
        DocKind::Api => spec_parsers::api_spec_to_markdown(&read_model(input)?),
        DocKind::Db => spec_parsers::db_schema_to_markdown(&read_model(input)?),
        DocKind::Integration => spec_parsers::integration_spec_to_markdown(&read_model(input)?),
        DocKind::Operation => spec_parsers::business_operation_to_markdown(&read_model(input)?),
        DocKind::Usecase => spec_parsers::use_case_to_markdown(&read_model(input)?),
        DocKind::Page => spec_parsers::page_to_markdown(&read_model(input)?),
        DocKind::Test => spec_parsers::test_definition_to_markdown(&read_model(input)?),
    };
    output_text(&markdown, output, "generate")
}

fn output_text(text: &str, output_path: Option<&PathBuf>, command_name: &str) -> CmdResult {
    match output_path {
        Some(path) => {
            std::fs::write(path, format!("{}\n", text.trim_end())).map_err(|e| {
                format!(
                    "Failed to write {} output to '{}': {} (check directory exists and permissions)",
                    command_name,
                    path.display(),
                    e
                )
            })?;
            println!("Output written to: {}", path.display());
        }
        None => {
            println!("{}", text.trim_end());
        }
    }
    Ok(())
}

fn output_result<T: serde::Serialize>(result: &T, output_path: Option<&PathBuf>, command_name: &str) -> CmdResult {
    let json = serde_json::to_string_pretty(result)
        .map_err(|e| format!("Failed to serialize {} result to JSON: {}", command_name, e))?;

    match output_path {
        Some(path) => {
            std::fs::write(path, &json).map_err(|e| {
                format!(
                    "Failed to write output to '{}': {} (check directory exists and permissions)",
                    path.display(),
                    e
                )
            })?;
            println!("Output written to: {}", path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}
