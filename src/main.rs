use anyhow::Result;
use clap::{Parser, ValueEnum};
use colored::control::set_override as set_color_override;
use exercise_harness::check::check_collection;
use exercise_harness::config::HarnessConfig;
use exercise_harness::engine::{evaluate_all, evaluate_selection};
use exercise_harness::i18n;
use exercise_harness::registry::CallableRegistry;
use exercise_harness::report::{OutputKind, ReportOptions, print_human, render_consistency};
use exercise_harness::session::{FileStore, Session, StoreError};
use exercise_harness::source::SuiteLoader;
use exercise_harness::types::SuiteCollection;
use exercise_harness::{t, t_args};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Normal,
    Terse,
    Json,
}

impl From<OutputFormat> for OutputKind {
    fn from(v: OutputFormat) -> Self {
        match v {
            OutputFormat::Normal => OutputKind::Normal,
            OutputFormat::Terse => OutputKind::Terse,
            OutputFormat::Json => OutputKind::Json,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(version, about = t!("cli-about"))]
struct Cli {
    #[arg(long, value_name = "FILE", help = t!("cli-config"))]
    config: Option<PathBuf>,

    #[arg(long, value_name = "URL", conflicts_with = "file", help = t!("cli-url"))]
    url: Option<String>,

    #[arg(long, value_name = "FILE", help = t!("cli-file"))]
    file: Option<PathBuf>,

    #[arg(long, help = t!("cli-fresh"))]
    fresh: bool,

    #[arg(long = "timeout", value_name = "SECS", help = t!("cli-timeout"))]
    timeout_secs: Option<u64>,

    #[arg(long = "invoke-timeout", value_name = "SECS", help = t!("cli-invoke-timeout"))]
    invoke_timeout_secs: Option<u64>,

    #[arg(
        long = "functions",
        value_name = "DIR",
        visible_alias = "functions-dir",
        help = t!("cli-functions")
    )]
    functions_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = t!("cli-state-file"))]
    state_file: Option<PathBuf>,

    #[arg(short = 's', long = "set", value_name = "SET", help = t!("cli-set"))]
    set: Option<String>,

    #[arg(short = 't', long = "problem", value_name = "NAME", help = t!("cli-problem"))]
    problem: Option<String>,

    #[arg(long = "clear", help = t!("cli-clear"))]
    clear: bool,

    #[arg(long = "check-data", help = t!("cli-check-data"))]
    check_data: bool,

    #[arg(short = 'l', long = "list", help = t!("cli-list"))]
    list: bool,

    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value = "normal",
        help = t!("cli-output")
    )]
    output: OutputFormat,

    #[arg(
        short = 'f',
        long = "hide-fails",
        conflicts_with = "hide_passes",
        help = t!("cli-hide-fails")
    )]
    hide_fails: bool,

    #[arg(
        short = 'p',
        long = "hide-passes",
        conflicts_with = "hide_fails",
        help = t!("cli-hide-passes")
    )]
    hide_passes: bool,

    #[arg(long = "no-color", help = t!("cli-no-color"))]
    no_color: bool,

    #[arg(short = 'v', long = "verbose", help = t!("cli-verbose"))]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> HarnessConfig {
        HarnessConfig {
            url: self.url.clone(),
            file: self.file.clone(),
            timeout_secs: self.timeout_secs,
            invoke_timeout_secs: self.invoke_timeout_secs,
            functions_dir: self.functions_dir.clone(),
            state_file: self.state_file.clone(),
        }
    }
}

fn print_sets(collection: &SuiteCollection) {
    println!("{}", t!("available-sets"));
    for set in &collection.sets {
        let problems = collection
            .problems_in(set)
            .map(|p| p.join(", "))
            .unwrap_or_default();
        println!(
            "  {}",
            t_args!("set-list-item", "set" => set, "problems" => problems)
        );
    }
}

fn apply_selection(session: &mut Session<FileStore>, cli: &Cli) -> Result<(), StoreError> {
    if cli.clear {
        session.clear()?;
    }
    if let Some(set) = &cli.set {
        session.select_set(set)?;
    }
    if let Some(problem) = &cli.problem {
        session.toggle_problem(problem)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize localization first
    i18n::init();

    let cli = Cli::parse();

    // With -v, show INFO and above; RUST_LOG overrides either way
    let filter = if cli.verbose {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "exercise_harness=info".to_string())
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "exercise_harness=warn".to_string())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    set_color_override(!cli.no_color && cli.output != OutputFormat::Json);

    if cli.verbose {
        info!(
            "{}",
            t_args!("info-version",
                "name" => env!("CARGO_PKG_NAME"),
                "version" => env!("CARGO_PKG_VERSION")
            )
        );
    }

    let config = match &cli.config {
        Some(path) => match HarnessConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                error!("{}", t_args!("error-config", "error" => format!("{e:#}")));
                std::process::exit(2);
            }
        },
        None => HarnessConfig::default(),
    }
    .merge(cli.overrides());

    // Selection changes are saved before anything is loaded, so they stick
    // even when the data source is unreachable.
    let mut session = match Session::open(FileStore::new(config.state_file())) {
        Ok(s) => s,
        Err(e) => {
            error!("{}", t_args!("error-selection", "error" => e));
            std::process::exit(2);
        }
    };
    if let Err(e) = apply_selection(&mut session, &cli) {
        error!("{}", t_args!("error-selection", "error" => e));
        std::process::exit(2);
    }
    let selection = session.selection().clone();
    info!(
        "{}",
        t_args!("info-selection",
            "set" => selection.problem_set.as_deref().unwrap_or("-"),
            "problem" => selection.problem.as_deref().unwrap_or("-")
        )
    );

    if config.url.is_none() && config.file.is_none() {
        error!("{}", t!("error-no-source"));
        std::process::exit(2);
    }
    let source = match config.data_source() {
        Ok(s) => s,
        Err(e) => {
            error!("{}", t_args!("error-load-failed", "error" => e));
            std::process::exit(2);
        }
    };
    let loader = SuiteLoader::new(source);
    let collection = match loader.load(cli.fresh).await {
        Ok(c) => c,
        Err(e) => {
            error!("{}", t_args!("error-load-failed", "error" => e));
            std::process::exit(2);
        }
    };

    if cli.check_data {
        let findings = check_collection(&collection);
        print!("{}", render_consistency(&findings));
        std::process::exit(if findings.is_consistent() { 0 } else { 1 });
    }
    if cli.list {
        print_sets(&collection);
        return Ok(());
    }
    if let Some(set) = &selection.problem_set {
        if collection.problems_in(set).is_none() {
            warn!("{}", t_args!("error-unknown-set", "set" => set));
        }
    }

    let registry = match &config.functions_dir {
        Some(dir) => {
            let registry = match CallableRegistry::from_dir(dir, config.invoke_timeout()) {
                Ok(r) => r,
                Err(e) => {
                    error!("{}", t_args!("error-functions", "error" => format!("{e:#}")));
                    std::process::exit(2);
                }
            };
            info!(
                "{}",
                t_args!("info-registry", "count" => registry.len(), "dir" => dir.display())
            );
            registry
        }
        None => {
            warn!("{}", t!("warn-no-functions"));
            CallableRegistry::new()
        }
    };

    let report = if selection.is_empty() {
        evaluate_all(&collection, &registry)
    } else {
        evaluate_selection(&collection, &registry, &selection)
    };

    print_human(
        &report,
        ReportOptions {
            kind: cli.output.into(),
            hide_passes: cli.hide_passes,
            hide_fails: cli.hide_fails,
        },
    );

    info!(
        "{}",
        t_args!("info-finished",
            "passed" => report.passed_cases(),
            "failed" => report.failed_cases(),
            "missing" => report.missing.len()
        )
    );

    if !report.all_passed() {
        std::process::exit(1);
    }

    Ok(())
}
