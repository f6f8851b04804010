use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{ArgAction, Parser, ValueEnum};
use satrep_core::{
    Config, FailurePolicy, HttpInventoryClient, find_report, registered_reports, schema,
};
use tempfile::NamedTempFile;
use tracing_subscriber::EnvFilter;

// Link report modules so their generators register.
use mod_errata as _;
use mod_facts as _;
use mod_hypervisor as _;
use mod_listings as _;
use mod_params as _;
use mod_usergroups as _;

/// Exit status when the report was written but some facets failed.
const EXIT_PARTIAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "satrep",
    version,
    about = "Host inventory reports for Foreman/Katello"
)]
struct Cli {
    /// Report to generate (see --list)
    #[arg(required_unless_present_any = ["list", "schema"])]
    report: Option<String>,

    /// List available reports and exit
    #[arg(long)]
    list: bool,

    /// Print the JSON schema of `--format json` output and exit
    #[arg(long, conflicts_with = "list")]
    schema: bool,

    /// Configuration file
    #[arg(short, long, env = "SATREP_CONFIG")]
    config: Option<PathBuf>,

    /// Server host name or base URL
    #[arg(long, env = "SATREP_SERVER")]
    server: Option<String>,

    #[arg(long, env = "SATREP_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "SATREP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// PEM bundle used to verify the server certificate
    #[arg(long, env = "SATREP_CA_CERT")]
    ca_cert: Option<PathBuf>,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Concurrent API requests
    #[arg(long, env = "SATREP_WORKERS")]
    workers: Option<usize>,

    /// Fact name for the `hosts_by_fact` report
    #[arg(long)]
    fact: Option<String>,

    /// What to do when a single group cannot be fetched
    #[arg(long, value_enum)]
    on_error: Option<OnError>,

    /// Output format: html or json
    #[arg(long, value_enum, default_value_t = OutputFormat::Html)]
    format: OutputFormat,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Errors only
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Html,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OnError {
    Abort,
    Mark,
}

impl From<OnError> for FailurePolicy {
    fn from(value: OnError) -> Self {
        match value {
            OnError::Abort => FailurePolicy::Abort,
            OnError::Mark => FailurePolicy::Mark,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if cli.list || cli.schema {
        let printed = if cli.list { list_reports() } else { print_schema() };
        return match printed {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                tracing::error!("{:#}", err);
                ExitCode::FAILURE
            }
        };
    }

    match run(&cli) {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => {
            tracing::warn!("report written with failed groups");
            ExitCode::from(EXIT_PARTIAL)
        }
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn list_reports() -> Result<()> {
    let mut stdout = io::stdout().lock();
    for report in registered_reports() {
        writeln!(stdout, "{:<40} {}", report.id, report.description)?;
    }
    Ok(())
}

fn print_schema() -> Result<()> {
    let rendered = serde_json::to_string_pretty(schema::report_schema())?;
    writeln!(io::stdout().lock(), "{}", rendered)?;
    Ok(())
}

/// Returns whether the written report carries failed groups.
fn run(cli: &Cli) -> Result<bool> {
    let report_id = cli.report.as_deref().context("no report given")?;
    // Unknown ids fail before any configuration or network work.
    let generator = find_report(report_id)?;

    let mut config = Config::load(cli.config.as_deref())?;
    apply_overrides(&mut config, cli);
    config.validate()?;

    let client = HttpInventoryClient::new(&config)?;
    let settings = config.report_settings(cli.fact.clone());
    let report = satrep_core::run_report(generator.as_ref(), &client, &settings, config.workers)?;

    let rendered = match cli.format {
        OutputFormat::Html => report.to_html(client.base_url())?,
        OutputFormat::Json => serde_json::to_string_pretty(&report.to_json_value())?,
    };
    write_output(cli.output.as_deref(), &rendered)?;

    Ok(report.has_failures())
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(server) = &cli.server {
        config.server = server.clone();
    }
    if let Some(username) = &cli.username {
        config.username = username.clone();
    }
    if let Some(password) = &cli.password {
        config.password = Some(password.clone());
    }
    if let Some(ca_cert) = &cli.ca_cert {
        config.ca_cert = Some(ca_cert.clone());
    }
    if cli.insecure {
        config.insecure = true;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(on_error) = cli.on_error {
        config.reports.failure_policy = on_error.into();
    }
}

/// Writes to `path` through a temp file in the same directory, or to stdout.
fn write_output(path: Option<&Path>, contents: &str) -> Result<()> {
    let Some(path) = path else {
        let mut stdout = io::stdout().lock();
        stdout.write_all(contents.as_bytes())?;
        stdout.write_all(b"\n")?;
        return Ok(());
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    staged
        .write_all(contents.as_bytes())
        .with_context(|| format!("failed to write {}", staged.path().display()))?;
    staged
        .persist(path)
        .with_context(|| format!("failed to move report to {}", path.display()))?;

    tracing::info!(path = %path.display(), bytes = contents.len(), "report written");
    Ok(())
}
