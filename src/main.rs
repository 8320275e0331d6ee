// KwTheme - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. Configuration loading (file, then environment overrides)
// 3. Logging initialisation (debug mode support)
// 4. Dispatch to analysis or rule document management

use clap::{Args, Parser, Subcommand};
use kwtheme::app::pipeline::{AnalysisRequest, Pipeline};
use kwtheme::app::rules_store;
use kwtheme::core::export;
use kwtheme::core::model::{AnalysisResult, Theme};
use kwtheme::platform::config::{self, AppConfig, PlatformPaths};
use kwtheme::util::{constants, logging};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// KwTheme - keyword theme analysis.
///
/// Extracts keywords from exported CSV/TSV tables, keeps those matching the
/// rule document, classifies each into a theme and writes a per-theme report.
#[derive(Parser, Debug)]
#[command(name = "kwtheme", version, about)]
struct Cli {
    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse keyword tables and write a theme report.
    Analyze(AnalyzeArgs),

    /// Manage the saved rule document.
    #[command(subcommand)]
    Rules(RulesCommand),

    /// List the theme labels.
    Themes,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Input tables or directories containing them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Rule document (defaults to the saved one).
    #[arg(short = 'r', long = "rules")]
    rules: Option<PathBuf>,

    /// Report file name prefix.
    #[arg(short = 'p', long = "prefix")]
    prefix: Option<String>,

    /// Directory for generated reports.
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Classify with local rules only.
    #[arg(long = "no-remote")]
    no_remote: bool,

    /// Print the run result as JSON.
    #[arg(long = "json")]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    /// Replace the saved rules. Separate rules with commas, spaces or newlines.
    Save {
        /// Rule text. Read from stdin when omitted.
        text: Vec<String>,
    },
    /// Print the saved rules.
    Show,
    /// Delete the saved rule document.
    Clear,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let paths = PlatformPaths::resolve();
    let (mut app_config, mut warnings) = config::load_config(&paths.config_dir);
    warnings.extend(config::apply_env_overrides(&mut app_config, |key| {
        std::env::var(key).ok()
    }));

    logging::init(
        cli.debug,
        app_config.log_level.as_deref(),
        app_config.log_file.as_deref().map(Path::new),
    );
    for warning in &warnings {
        tracing::warn!(warning = %warning, "Configuration warning");
    }

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        "KwTheme starting"
    );

    let rules_file = app_config
        .rules_file
        .clone()
        .unwrap_or_else(|| paths.rules_file.clone());

    match cli.command {
        Command::Analyze(args) => run_analyze(args, app_config, rules_file),
        Command::Rules(cmd) => run_rules(cmd, &rules_file),
        Command::Themes => {
            for theme in Theme::ALL {
                println!("{}", theme.label());
            }
            ExitCode::SUCCESS
        }
    }
}

fn run_analyze(args: AnalyzeArgs, mut app_config: AppConfig, rules_file: PathBuf) -> ExitCode {
    if args.no_remote {
        app_config.remote.enabled = false;
    }
    if let Some(dir) = args.output_dir {
        app_config.results_dir = Some(dir);
    }

    let mut request = AnalysisRequest::new(args.inputs, args.rules.unwrap_or(rules_file));
    if let Some(prefix) = args.prefix {
        request = request.with_prefix(prefix);
    }

    let pipeline = match Pipeline::from_config(app_config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match pipeline.run(&request) {
        Ok(result) => {
            if args.json {
                let stdout = std::io::stdout();
                let written =
                    export::write_result_json(&result, stdout.lock(), Path::new("<stdout>"));
                if let Err(e) = written {
                    eprintln!("error: {e}");
                    return ExitCode::FAILURE;
                }
                println!();
            } else {
                print_summary(&result);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Analysis failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn print_summary(result: &AnalysisResult) {
    println!("Report:   {}", result.output_location.display());
    if let Some(detail) = &result.detail_location {
        println!("Detail:   {}", detail.display());
    }
    println!(
        "Keywords: {} extracted, {} kept by rules",
        result.total_keywords, result.filtered_keywords
    );
    println!(
        "Classified: {} remote, {} local, {} fallback",
        result.remote_classified, result.local_classified, result.fallback_count
    );
    for (reason, count) in &result.fallback_reasons {
        println!("  fallback {reason}: {count}");
    }
    for warning in &result.rule_warnings {
        println!("Rule warning: {warning}");
    }
    if result.cancelled {
        println!("Run was cancelled; remaining keywords were classified locally.");
    }
    println!();
    for summary in &result.summaries {
        println!("  {:<24} {:>6}", summary.theme.label(), summary.keyword_count);
    }
}

fn run_rules(cmd: RulesCommand, rules_file: &Path) -> ExitCode {
    let outcome = match cmd {
        RulesCommand::Save { text } => {
            let input = if text.is_empty() {
                match std::io::read_to_string(std::io::stdin()) {
                    Ok(s) => s,
                    Err(e) => {
                        eprintln!("error: failed to read stdin: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                text.join("\n")
            };
            rules_store::save_rules(rules_file, &input).map(|n| {
                println!("Saved {n} rules to {}", rules_file.display());
            })
        }
        RulesCommand::Show => rules_store::load_rules(rules_file).map(|rules| {
            if rules.is_empty() {
                println!("No rules saved ({})", rules_file.display());
            }
            for rule in rules {
                println!("{rule}");
            }
        }),
        RulesCommand::Clear => rules_store::clear_rules(rules_file).map(|existed| {
            if existed {
                println!("Cleared {}", rules_file.display());
            } else {
                println!("No rule document at {}", rules_file.display());
            }
        }),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
