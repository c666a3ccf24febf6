//! # Email Verifier CLI
//!
//! Command-line interface for the email verifier library (`email_verifier_core`).
//! This binary parses arguments, sets up configuration, initializes the verifier,
//! validates a single address or a JSON/CSV record file, and handles output.

use email_verifier_core::{
    check_smtp_connectivity, initialize_verifier, validate_batch, BatchEvent, BatchRecord,
    ConfigBuilder, FileSource, ValidationResult,
};

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Verifies email address deliverability.",
    long_about = "Email Verifier checks address syntax, DNS, MX and SPF records, then probes the mailbox with an SMTP handshake that stops before any message is sent."
)]
struct AppArgs {
    /// Single address to verify; the result is printed to standard output as JSON.
    #[arg(short, long, env = "EMAIL_VERIFIER_EMAIL", conflicts_with = "input")]
    email: Option<String>,

    /// Path to the input file: a JSON array of objects, or CSV with a header row.
    #[arg(short, long, env = "EMAIL_VERIFIER_INPUT")]
    input: Option<String>,

    /// Path to the output JSON file where results will be saved.
    #[arg(
        short,
        long,
        default_value = "results.json",
        env = "EMAIL_VERIFIER_OUTPUT"
    )]
    output: String,

    /// Path to a configuration file (TOML format) to load settings from. CLI args override file settings.
    #[arg(long, env = "EMAIL_VERIFIER_CONFIG")]
    config_file: Option<String>,

    /// Number of records validated concurrently per group.
    #[arg(short, long, env = "EMAIL_VERIFIER_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Sender email address for SMTP verification checks.
    #[arg(long, env = "EMAIL_VERIFIER_SMTP_SENDER")]
    smtp_sender: Option<String>,

    /// Identity announced in EHLO/HELO.
    #[arg(long, env = "EMAIL_VERIFIER_HELO_HOST")]
    helo_host: Option<String>,

    /// SMTP command timeout in seconds.
    #[arg(long, env = "EMAIL_VERIFIER_SMTP_TIMEOUT")]
    smtp_timeout: Option<u64>,

    /// SMTP connect timeout in seconds.
    #[arg(long, env = "EMAIL_VERIFIER_SMTP_CONNECT_TIMEOUT")]
    smtp_connect_timeout: Option<u64>,

    /// SMTP port to probe.
    #[arg(long, env = "EMAIL_VERIFIER_SMTP_PORT")]
    smtp_port: Option<u16>,

    /// Attempts per MX host for providers without their own policy.
    #[arg(long, env = "EMAIL_VERIFIER_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Delay between attempts against the same host, in milliseconds.
    #[arg(long, env = "EMAIL_VERIFIER_RETRY_BACKOFF_MS")]
    retry_backoff_ms: Option<u64>,

    /// DNS resolution timeout in seconds.
    #[arg(long, env = "EMAIL_VERIFIER_DNS_TIMEOUT")]
    dns_timeout: Option<u64>,

    /// Comma-separated list of DNS servers to use for lookups.
    #[arg(long, value_delimiter = ',', env = "EMAIL_VERIFIER_DNS_SERVERS")]
    dns_servers: Option<Vec<String>>,

    /// Test outbound port 25 connectivity before verifying.
    #[arg(long, default_value = "false", env = "EMAIL_VERIFIER_CHECK_CONNECTIVITY")]
    check_connectivity: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Setting up tracing subscriber failed")?;

    tracing::info!(
        "Email Verifier CLI v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let args = AppArgs::parse();
    tracing::debug!("Parsed CLI arguments: {:?}", args);

    let mut config_builder = ConfigBuilder::new();

    if let Some(ref path) = args.config_file {
        config_builder = config_builder.config_file(path);
    }
    if let Some(size) = args.batch_size {
        config_builder = config_builder.batch_size(size);
    }
    if let Some(ref s) = args.smtp_sender {
        config_builder = config_builder.smtp_sender_email(s);
    }
    if let Some(ref h) = args.helo_host {
        config_builder = config_builder.helo_host(h);
    }
    if let Some(t) = args.smtp_timeout {
        config_builder = config_builder.smtp_timeout(Duration::from_secs(t));
    }
    if let Some(t) = args.smtp_connect_timeout {
        config_builder = config_builder.smtp_connect_timeout(Duration::from_secs(t));
    }
    if let Some(port) = args.smtp_port {
        config_builder = config_builder.smtp_port(port);
    }
    if let Some(n) = args.max_attempts {
        config_builder = config_builder.max_verification_attempts(n);
    }
    if let Some(ms) = args.retry_backoff_ms {
        config_builder = config_builder.retry_backoff(Duration::from_millis(ms));
    }
    if let Some(t) = args.dns_timeout {
        config_builder = config_builder.dns_timeout(Duration::from_secs(t));
    }
    if let Some(ref servers) = args.dns_servers {
        if !servers.is_empty() {
            config_builder = config_builder.dns_servers(servers.clone());
        }
    }

    let config = match config_builder.build() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            return Err(anyhow::anyhow!("Failed to build configuration: {}", e));
        }
    };
    tracing::debug!("Effective configuration loaded: {:?}", config);

    let verifier = match initialize_verifier(&config) {
        Ok(v) => Arc::new(v),
        Err(e) => {
            tracing::error!("Initialization error: {}", e);
            return Err(anyhow::anyhow!("Failed to initialize verifier: {}", e));
        }
    };

    if args.check_connectivity {
        match check_smtp_connectivity().await {
            Ok(_) => tracing::info!(
                "SMTP connectivity test to Google passed (outbound port 25 likely open)."
            ),
            Err(e) => {
                tracing::error!("SMTP connectivity test failed: {}", e);
                tracing::warn!("Mailbox checks (port 25) may fail or be unreliable.");
                tracing::warn!("Check firewall rules or ISP restrictions if SMTP checks are needed.");
            }
        }
    }

    let start_time = Instant::now();
    let execution_result = match (&args.email, &args.input) {
        (Some(email), _) => {
            tracing::info!("Running in single address mode.");
            let result = verifier.validate(email).await;
            println!(
                "{}",
                serde_json::to_string_pretty(&result).context("Failed to serialize result")?
            );
            Ok(())
        }
        (None, Some(input)) => process_file_mode(verifier, input, &args.output, start_time).await,
        (None, None) => Err(anyhow::anyhow!(
            "Nothing to do: pass --email <ADDRESS> or --input <FILE>"
        )),
    };

    if let Err(e) = execution_result {
        tracing::error!("Execution failed: {}", e);
        return Err(e);
    }

    tracing::info!("Finished. Total duration: {:.2?}", start_time.elapsed());
    Ok(())
}

async fn process_file_mode(
    verifier: Arc<email_verifier_core::EmailVerifier>,
    input: &str,
    output: &str,
    start_time: Instant,
) -> Result<()> {
    tracing::info!(
        "Running in file processing mode. Input: '{}', Output: '{}'",
        input,
        output
    );
    let input_path = Path::new(input);
    let output_path = Path::new(output);

    if !input_path.is_file() {
        return Err(anyhow::anyhow!(
            "Input file not found or is not a file: {}",
            input
        ));
    }
    if let Some(parent_dir) = output_path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            tracing::debug!("Creating output directory: {}", parent_dir.display());
            std::fs::create_dir_all(parent_dir).with_context(|| {
                format!(
                    "Failed to create output directory '{}'",
                    parent_dir.display()
                )
            })?;
        }
    }

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% | ETA: {eta} | {msg}")
            .context("Failed to set progress bar template")?
            .progress_chars("=> "),
    );
    pb.set_message("Counting records...");

    let mut results: Vec<BatchRecord> = Vec::new();
    let mut total_records = 0;
    let mut events = Box::pin(validate_batch(verifier, FileSource::from_path(input_path)));

    while let Some(event) = events.next().await {
        match event {
            BatchEvent::Init {
                total_records: total,
                field_names,
            } => {
                total_records = total;
                tracing::info!(
                    "Loaded {} records (fields: {}).",
                    total,
                    field_names.join(", ")
                );
                pb.set_message(format!("Validating {} records...", total));
            }
            BatchEvent::Progress { percent, records } => {
                results.extend(records);
                pb.set_position(u64::from(percent));
                pb.set_message(format!("{}/{} records", results.len(), total_records));
            }
            BatchEvent::Error { message } => {
                pb.abandon_with_message(message.clone());
                return Err(anyhow::anyhow!("Batch failed: {}", message));
            }
            BatchEvent::Complete => {
                pb.finish_with_message(format!("Processed {} records", results.len()));
            }
        }
    }

    tracing::info!("Saving results to '{}'...", output);
    save_results(&results, output)?;
    tracing::info!("Results saved successfully.");

    log_summary(&results, total_records, start_time.elapsed());
    Ok(())
}

/// Saves the processed results to the specified JSON file.
/// Uses `serde_json` with pretty printing for human readability.
fn save_results(results: &[BatchRecord], file_path: &str) -> Result<()> {
    tracing::debug!("Creating output file: {}", file_path);
    let file = File::create(file_path)
        .with_context(|| format!("Failed to create/truncate output file '{}'", file_path))?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, results)
        .with_context(|| format!("Failed to serialize results to JSON for '{}'", file_path))?;

    Ok(())
}

/// Logs a summary of the processing results to the console using `tracing::info`.
fn log_summary(results: &[BatchRecord], original_total: usize, duration: Duration) {
    let validations: Vec<&ValidationResult> = results.iter().map(|r| &r.validation).collect();
    let valid = validations.iter().filter(|v| v.valid).count();
    let protected = validations
        .iter()
        .filter(|v| {
            v.details
                .smtp_response
                .as_ref()
                .map(|o| o.protected)
                .unwrap_or(false)
        })
        .count();
    let bad_format = validations.iter().filter(|v| !v.checks.format).count();
    let no_mail_servers = validations
        .iter()
        .filter(|v| v.checks.dns && !v.checks.mx)
        .count();
    let undecided = validations
        .iter()
        .filter(|v| v.checks.mx && !v.checks.smtp)
        .count();

    tracing::info!("-------------------- Verification Summary --------------------");
    tracing::info!("Total Records in Input File : {}", original_total);
    tracing::info!("Records Processed           : {}", results.len());
    tracing::info!("  - Valid                   : {}", valid);
    tracing::info!("    (presumed, protected)   : {}", protected);
    tracing::info!("  - Invalid                 : {}", results.len() - valid);
    tracing::info!("  - Bad Format / Missing    : {}", bad_format);
    tracing::info!("  - No Mail Servers         : {}", no_mail_servers);
    tracing::info!("  - SMTP Undecided          : {}", undecided);
    tracing::info!("Total Time Taken            : {:.2?}", duration);
    if duration.as_secs_f64() > 0.01 && !results.is_empty() {
        let rate = (results.len() as f64) / duration.as_secs_f64();
        tracing::info!("Processing Rate             : {:.2} records/sec", rate);
    }
    tracing::info!("--------------------------------------------------------------");
}
