use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cloudsweep_core::config::{self, ConfigSources};
use cloudsweep_core::descriptor::Provider;
use cloudsweep_core::finding::Confidence;
use cloudsweep_core::orchestrator::{run_scan, ScanError, ScanOptions};
use cloudsweep_core::rules::{RuleInfo, RuleRegistry};

mod exit_policy;
mod input;
mod render;

use exit_policy::{
    determine_exit_code, EXIT_ERROR, EXIT_OK, EXIT_PERMISSION_ERROR, EXIT_POLICY_VIOLATION,
};

#[derive(Parser, Debug)]
#[command(
    name = "cloudsweep",
    author,
    version,
    about = "Safe cloud hygiene scanner"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a descriptor snapshot and report hygiene findings
    Scan(ScanArgs),
    /// List the shipped rule catalogue
    ListRules {
        /// Emit rules as JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ProviderArg {
    Aws,
    Azure,
}

impl From<ProviderArg> for Provider {
    fn from(value: ProviderArg) -> Self {
        match value {
            ProviderArg::Aws => Provider::Aws,
            ProviderArg::Azure => Provider::Azure,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ConfidenceArg {
    Low,
    Medium,
    High,
}

impl From<ConfidenceArg> for Confidence {
    fn from(value: ConfidenceArg) -> Self {
        match value {
            ConfidenceArg::Low => Confidence::Low,
            ConfidenceArg::Medium => Confidence::Medium,
            ConfidenceArg::High => Confidence::High,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum OutputFormat {
    Human,
    Json,
    Csv,
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Cloud provider to scan
    #[arg(long, value_enum)]
    provider: ProviderArg,

    /// Scope to scan (AWS region or Azure subscription); repeatable
    #[arg(long = "scope", value_name = "SCOPE")]
    scopes: Vec<String>,

    /// Scan every scope that has resources
    #[arg(long)]
    all_scopes: bool,

    /// Path to a cloudsweep.yaml config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override a single config value, e.g.
    /// aws.unattached_volumes.confidence.high=30; repeatable
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Ignore findings by tag (key or key:value); repeatable. Replaces
    /// any ignore list from config files.
    #[arg(long = "ignore-tag", value_name = "KEY[:VALUE]")]
    ignore_tag: Vec<String>,

    /// Descriptor snapshot to scan (JSON, as exported by a collector)
    #[arg(long, value_name = "PATH")]
    input: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    output: OutputFormat,

    /// Write the rendered report here instead of stdout (required for
    /// json/csv)
    #[arg(long, value_name = "PATH")]
    output_file: Option<PathBuf>,

    /// Exit non-zero if any finding survives filtering
    #[arg(long)]
    fail_on_findings: bool,

    /// Exit non-zero if findings at or above this confidence exist
    #[arg(long, value_enum, value_name = "LEVEL")]
    fail_on_confidence: Option<ConfidenceArg>,

    /// Maximum scopes scanned concurrently
    #[arg(long, default_value_t = 5, value_name = "N")]
    max_concurrent: usize,

    /// Per-scope timeout in seconds
    #[arg(long, default_value_t = 300, value_name = "SECS")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Scan(args) => scan(args).await,
        Commands::ListRules { json } => list_rules(json),
    };
    std::process::exit(code);
}

async fn scan(args: ScanArgs) -> i32 {
    let provider: Provider = args.provider.into();

    if provider == Provider::Aws && args.scopes.is_empty() && !args.all_scopes {
        eprintln!("error: AWS scans need either --scope or --all-scopes");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  cloudsweep scan --provider aws --scope us-east-1 --input snapshot.json");
        eprintln!("  cloudsweep scan --provider aws --all-scopes --input snapshot.json");
        return EXIT_ERROR;
    }
    if !args.scopes.is_empty() && args.all_scopes {
        eprintln!("error: --scope and --all-scopes are mutually exclusive");
        return EXIT_ERROR;
    }
    if args.output != OutputFormat::Human && args.output_file.is_none() {
        eprintln!("error: --output-file is required for json/csv output");
        return EXIT_ERROR;
    }

    let cfg = match config::resolve(&ConfigSources {
        cli_overrides: &args.set,
        cli_ignore_tags: &args.ignore_tag,
        explicit_path: args.config.as_deref(),
        cwd_path: Some(PathBuf::from("cloudsweep.yaml")),
        home_path: dirs::home_dir().map(|home| home.join(".cloudsweep/config.yaml")),
    }) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            return EXIT_ERROR;
        }
    };

    let fetcher = match input::load_snapshot(&args.input) {
        Ok(fetcher) => fetcher,
        Err(err) => {
            eprintln!("error: {err:#}");
            return EXIT_ERROR;
        }
    };

    let mut opts = ScanOptions::new(provider);
    opts.scopes = args.scopes.clone();
    opts.max_concurrent_scopes = args.max_concurrent;
    opts.scope_timeout = Duration::from_secs(args.timeout_secs);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received, cancelling scan");
            let _ = cancel_tx.send(true);
        }
    });

    let report = match run_scan(
        RuleRegistry::builtin(),
        Arc::new(fetcher),
        &cfg,
        &opts,
        cancel_rx,
    )
    .await
    {
        Ok(report) => report,
        Err(ScanError::AllScopesFailed {
            attempted,
            failures,
            access_denied,
        }) => {
            eprintln!("error: all {attempted} scope(s) failed; nothing was scanned");
            for (scope, reason) in &failures {
                eprintln!("  - {scope}: {reason}");
            }
            return if access_denied {
                EXIT_PERMISSION_ERROR
            } else {
                EXIT_ERROR
            };
        }
        Err(ScanError::Discovery(err)) => {
            eprintln!("error: scope discovery failed: {err}");
            return if err.is_access_denied() {
                EXIT_PERMISSION_ERROR
            } else {
                EXIT_ERROR
            };
        }
        Err(ScanError::Cancelled) => {
            eprintln!("scan cancelled");
            return EXIT_ERROR;
        }
    };

    let rendered = match args.output {
        OutputFormat::Human => render::render_human(&report),
        OutputFormat::Json => match render::render_json(&report) {
            Ok(json) => json,
            Err(err) => {
                eprintln!("error: {err:#}");
                return EXIT_ERROR;
            }
        },
        OutputFormat::Csv => render::render_csv(&report),
    };

    if let Err(err) = emit(&rendered, args.output_file.as_deref()) {
        eprintln!("error: {err:#}");
        return EXIT_ERROR;
    }

    let code = determine_exit_code(
        &report.findings,
        report.is_partial(),
        args.fail_on_findings,
        args.fail_on_confidence.map(Confidence::from),
    );
    if code == EXIT_POLICY_VIOLATION {
        eprintln!("policy violation: findings at or above the failure threshold");
    } else if code == EXIT_ERROR {
        eprintln!("scan incomplete: one or more scopes failed");
    }
    code
}

fn emit(rendered: &str, output_file: Option<&std::path::Path>) -> Result<()> {
    match output_file {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            println!("report written to {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

fn list_rules(json: bool) -> i32 {
    let registry = RuleRegistry::builtin();
    let rules: Vec<RuleInfo<'_>> = registry.iter().map(RuleInfo::from).collect();
    if json {
        match serde_json::to_string_pretty(&rules) {
            Ok(out) => println!("{out}"),
            Err(err) => {
                eprintln!("error: {err}");
                return EXIT_ERROR;
            }
        }
        return EXIT_OK;
    }

    println!("{} rule(s)", rules.len());
    for rule in rules {
        let kinds: Vec<&str> = rule
            .resource_types
            .iter()
            .map(|kind| kind.as_str())
            .collect();
        println!(
            "- {id:<32} [{provider:5}] {title} ({kinds})",
            id = rule.rule_id,
            provider = rule.provider.as_str(),
            title = rule.title,
            kinds = kinds.join(", ")
        );
    }
    EXIT_OK
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,tokio=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
