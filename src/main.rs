use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use projected_source::config::{load_from_path, DEFAULT_MANIFEST};
use projected_source::coverage::{validate, ChangeSet, CoverageReport};
use projected_source::diff::DiffOptions;
use projected_source::marker::{self, Directive};
use projected_source::pipeline::{self, Outcome, RunReport};
use projected_source::query::{ArgFilter, Query, Target};
use projected_source::resolve::{resolve, ResolvedRange};
use projected_source::strip::{source_files, StripPlan, StripResult};
use projected_source::ts::{Grammar, SourceFile};
use serde::Serialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "projected-source")]
#[command(about = "Extract live C/C++ snippets and check diff coverage", long_about = None)]
#[command(version)]
struct Cli {
    /// Log verbosity (RUST_LOG overrides)
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve every projection in a manifest, or a single ad-hoc query
    Resolve {
        /// Manifest to resolve (default: ./projected-source.toml)
        #[arg(short, long, conflicts_with = "file")]
        manifest: Option<PathBuf>,

        /// Resolve one query against this file instead of a manifest
        #[arg(long)]
        file: Option<PathBuf>,

        #[command(flatten)]
        query: QueryArgs,

        /// Print the extracted text under each result
        #[arg(long)]
        show_text: bool,
    },

    /// Report changed lines not covered by any projection
    Coverage {
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// Unified diff file; reads stdin when omitted or "-"
        #[arg(short, long)]
        diff: Option<PathBuf>,

        /// Treat diff context lines as changed
        #[arg(long)]
        include_context: bool,

        /// Exit with status 1 when anything is uncovered
        #[arg(long)]
        strict: bool,
    },

    /// List marker directives and check that they pair up
    Markers {
        /// Files or directories to scan
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Remove stand-alone marker directive lines from source files
    Strip {
        /// Files or directories to rewrite
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Show what would be removed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
}

#[derive(clap::Args, Default)]
struct QueryArgs {
    #[arg(long)]
    grammar: Option<Grammar>,
    #[arg(long)]
    function: Option<String>,
    #[arg(long = "type")]
    type_name: Option<String>,
    #[arg(long)]
    variable: Option<String>,
    #[arg(long = "macro")]
    macro_name: Option<String>,
    #[arg(long = "macro-definition")]
    macro_definition: Option<String>,
    /// Explicit lines, `START-END`
    #[arg(long)]
    lines: Option<String>,
    /// Marker tag; alone it is the target, otherwise searched inside it
    #[arg(long)]
    marker: Option<String>,
    /// Parameter-list substring used to pick an overload
    #[arg(long)]
    signature: Option<String>,
    #[arg(long)]
    arity: Option<usize>,
    /// Enclosing scope, e.g. `ns::Widget`
    #[arg(long)]
    scope: Option<String>,
    /// Macro argument filter, `INDEX=VALUE`
    #[arg(long = "arg")]
    args: Vec<String>,
}

impl QueryArgs {
    fn to_query(&self) -> Result<Query> {
        let mut targets = Vec::new();
        if let Some(name) = &self.function {
            targets.push(Target::Function {
                name: name.clone(),
                signature: self.signature.clone(),
                arity: self.arity,
            });
        }
        if let Some(name) = &self.type_name {
            targets.push(Target::Type { name: name.clone() });
        }
        if let Some(name) = &self.variable {
            targets.push(Target::Variable { name: name.clone() });
        }
        if let Some(name) = &self.macro_name {
            let args = self
                .args
                .iter()
                .map(|arg| parse_arg_filter(arg))
                .collect::<Result<Vec<_>>>()?;
            targets.push(Target::Macro {
                name: name.clone(),
                args,
            });
        }
        if let Some(name) = &self.macro_definition {
            targets.push(Target::MacroDefinition { name: name.clone() });
        }
        if let Some(lines) = &self.lines {
            let (start, end) = lines
                .split_once('-')
                .map_or((lines.as_str(), lines.as_str()), |(start, end)| (start, end));
            targets.push(Target::Lines {
                start: start.trim().parse().context("invalid --lines start")?,
                end: end.trim().parse().context("invalid --lines end")?,
            });
        }

        let mut query = match (targets.len(), &self.marker) {
            (0, Some(tag)) => Query::marker_tag(tag.clone()),
            (0, None) => bail!("no query given; use --function, --type, --marker, --lines, ..."),
            (1, marker) => Query {
                target: targets.remove(0),
                scope: None,
                marker: marker.clone(),
            },
            _ => bail!("only one of --function/--type/--variable/--macro/--macro-definition/--lines may be given"),
        };
        query.scope = self.scope.clone();
        query.validate()?;
        Ok(query)
    }
}

fn parse_arg_filter(raw: &str) -> Result<ArgFilter> {
    let (index, value) = raw
        .split_once('=')
        .with_context(|| format!("--arg expects INDEX=VALUE, got '{raw}'"))?;
    Ok(ArgFilter {
        index: index.trim().parse().with_context(|| format!("bad index in '{raw}'"))?,
        value: value.to_string(),
    })
}

fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    match cli.command {
        Commands::Resolve {
            manifest,
            file,
            query,
            show_text,
        } => match file {
            Some(file) => cmd_resolve_file(&file, &query, show_text, cli.format),
            None => cmd_resolve_manifest(manifest, show_text, cli.format),
        },

        Commands::Coverage {
            manifest,
            diff,
            include_context,
            strict,
        } => cmd_coverage(manifest, diff, include_context, strict, cli.format),

        Commands::Markers { paths } => cmd_markers(&paths, cli.format),

        Commands::Strip { paths, dry_run } => cmd_strip(&paths, dry_run),
    }
}

/// Load the manifest and resolve all of its entries.
fn run_manifest(manifest: Option<PathBuf>) -> Result<RunReport> {
    let path = manifest.unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST));
    let config = load_from_path(&path)?;
    let root = config.root_dir(&path);
    Ok(pipeline::run(&config, &root))
}

#[derive(Serialize)]
struct ResolveRow<'a> {
    id: &'a str,
    file: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a ResolvedRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> From<&'a Outcome> for ResolveRow<'a> {
    fn from(outcome: &'a Outcome) -> Self {
        ResolveRow {
            id: &outcome.id,
            file: &outcome.file,
            result: outcome.result.as_ref().ok(),
            error: outcome.result.as_ref().err().map(ToString::to_string),
        }
    }
}

fn print_outcome(outcome: &Outcome, show_text: bool) {
    match &outcome.result {
        Ok(resolved) => {
            println!(
                "{} {}: {}:{}",
                "✓".green(),
                outcome.id,
                outcome.file.display(),
                resolved.lines
            );
            if show_text {
                for line in resolved.text.lines() {
                    println!("    {}", line.dimmed());
                }
            }
        }
        Err(e) => {
            eprintln!("{} {}: {}", "✗".red(), outcome.id, e);
            eprintln!("  File: {}", outcome.file.display());
        }
    }
}

fn cmd_resolve_manifest(
    manifest: Option<PathBuf>,
    show_text: bool,
    format: OutputFormat,
) -> Result<()> {
    let report = run_manifest(manifest)?;

    match format {
        OutputFormat::Json => {
            let rows: Vec<ResolveRow<'_>> = report.outcomes.iter().map(ResolveRow::from).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            for outcome in &report.outcomes {
                print_outcome(outcome, show_text);
            }
            for ignore in report.ignore_failures() {
                if let Err(e) = &ignore.result {
                    eprintln!("{} ignore {}: {}", "✗".red(), ignore.file.display(), e);
                }
            }

            let failed = report.failures().count();
            println!();
            println!("{}", "Summary:".bold());
            println!(
                "  {} resolved",
                format!("{}", report.outcomes.len() - failed).green()
            );
            println!("  {} failed", format!("{failed}").red());
        }
    }

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_resolve_file(
    file: &Path,
    args: &QueryArgs,
    show_text: bool,
    format: OutputFormat,
) -> Result<()> {
    let query = args.to_query()?;
    let source = SourceFile::read(file, args.grammar)?;
    let outcome = Outcome {
        id: query.to_string(),
        file: file.to_path_buf(),
        result: resolve(&source, &query),
    };

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&ResolveRow::from(&outcome))?
            );
        }
        OutputFormat::Text => print_outcome(&outcome, show_text),
    }

    if outcome.result.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

fn read_diff(diff: Option<PathBuf>) -> Result<String> {
    match diff {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read diff {}", path.display())),
        _ => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read diff from stdin")?;
            Ok(text)
        }
    }
}

fn print_coverage(report: &CoverageReport) {
    for (file, ranges) in &report.uncovered {
        let ranges: Vec<String> = ranges.iter().map(ToString::to_string).collect();
        println!(
            "{} {}: {}",
            "✗".red(),
            file.display(),
            ranges.join(", ")
        );
    }

    println!();
    println!("{}", "Coverage:".bold());
    println!("  {} files changed", report.files_changed);
    println!("  {} lines changed", report.lines_changed);
    println!(
        "  {} lines uncovered in {} regions",
        format!("{}", report.lines_uncovered).red(),
        report.regions_uncovered
    );
    println!("  {:.1}% covered", report.covered_percent());
}

fn cmd_coverage(
    manifest: Option<PathBuf>,
    diff: Option<PathBuf>,
    include_context: bool,
    strict: bool,
    format: OutputFormat,
) -> Result<()> {
    let diff_text = read_diff(diff)?;
    let changes = ChangeSet::from_unified_diff(&diff_text, DiffOptions { include_context });

    let run = run_manifest(manifest)?;
    for outcome in run.failures() {
        if let Err(e) = &outcome.result {
            eprintln!(
                "{} {}: {} (its lines count as uncovered)",
                "⊘".yellow(),
                outcome.id,
                e
            );
        }
    }

    let report = validate(&changes, &run.known_projections());
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            if report.is_complete() {
                println!("{} all changed lines are covered", "✓".green());
            }
            print_coverage(&report);
        }
    }

    if strict && !report.is_complete() {
        std::process::exit(1);
    }
    Ok(())
}

#[derive(Serialize)]
struct MarkerRow {
    file: PathBuf,
    directives: Vec<Directive>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn collect_sources(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        files.extend(source_files(path)?);
    }
    Ok(files)
}

fn cmd_markers(paths: &[PathBuf], format: OutputFormat) -> Result<()> {
    let mut rows = Vec::new();
    let mut unreadable = 0;
    for file in collect_sources(paths)? {
        let source = match SourceFile::read(&file, None) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "skipping unreadable source");
                unreadable += 1;
                rows.push(MarkerRow {
                    file,
                    directives: Vec::new(),
                    error: Some(e.to_string()),
                });
                continue;
            }
        };
        let directives = marker::directives(&source, None);
        if directives.is_empty() {
            continue;
        }
        let error = marker::scan(&directives).err().map(|e| e.to_string());
        rows.push(MarkerRow {
            file,
            directives,
            error,
        });
    }

    let broken = rows.iter().filter(|row| row.error.is_some()).count();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Text => {
            for row in &rows {
                match &row.error {
                    None => println!("{} {}", "✓".green(), row.file.display()),
                    Some(e) => println!("{} {}: {}", "✗".red(), row.file.display(), e),
                }
                for directive in &row.directives {
                    println!(
                        "    {:>5}  {:<5}  {}",
                        directive.line,
                        directive.kind,
                        directive.tag
                    );
                }
            }
            println!();
            println!("{}", "Summary:".bold());
            println!("  {} files with markers", rows.len() - unreadable);
            println!(
                "  {} with unbalanced markers",
                format!("{}", broken - unreadable).red()
            );
            if unreadable > 0 {
                println!("  {} unreadable", format!("{unreadable}").red());
            }
        }
    }

    if broken > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_strip(paths: &[PathBuf], dry_run: bool) -> Result<()> {
    let mut total_removed = 0;
    let mut files_changed = 0;
    let mut failed = 0;

    for file in collect_sources(paths)? {
        let plan = match StripPlan::for_file(&file) {
            Ok(plan) => plan,
            Err(e) => {
                println!("{} {}: {}", "✗".red(), file.display(), e);
                failed += 1;
                continue;
            }
        };
        if plan.is_empty() {
            continue;
        }

        if dry_run {
            println!(
                "{} {}: would remove {} lines",
                "⊙".yellow(),
                file.display(),
                plan.directives.len()
            );
            for directive in &plan.directives {
                println!("    {:>5}  {} {}", directive.line, directive.kind, directive.tag);
            }
            total_removed += plan.directives.len();
            files_changed += 1;
            continue;
        }

        match plan.apply() {
            Err(e) => {
                println!("{} {}: {}", "✗".red(), file.display(), e);
                failed += 1;
            }
            Ok(StripResult::Stripped {
                path,
                lines_removed,
            }) => {
                println!(
                    "{} {}: removed {} lines",
                    "✓".green(),
                    path.display(),
                    lines_removed
                );
                total_removed += lines_removed;
                files_changed += 1;
            }
            Ok(StripResult::Unchanged { .. }) => {}
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} files", format!("{files_changed}").green());
    println!("  {} directive lines", format!("{total_removed}").green());
    if failed > 0 {
        println!("  {} failed", format!("{failed}").red());
        std::process::exit(1);
    }
    Ok(())
}
