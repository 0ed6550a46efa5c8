//! # Email Enricher CLI
//!
//! Command-line interface for the Email Enricher library (`email_enricher_core`).
//! This binary parses arguments, sets up configuration, runs an upload job (or a
//! single contact) through the enrichment pipeline and reports the outcome.

use email_enricher_core::utils::domain::clean_domain;
use email_enricher_core::utils::names::{clean_name, first_token, last_token};
use email_enricher_core::{
    enrich_contacts, initialize_enricher, ActiveJobs, Config, ConfigBuilder, Contact,
    DeliveryStatus, EnrichedRecord, JobMetadata, JobOutcome, JobRunner, JobStatus, JobStorage,
    KeyPolicy, UploadedFile,
};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Finds verified work email addresses for CSV contact lists.",
    long_about = "Email Enricher guesses candidate addresses from first name, last name and company domain, verifies them one by one against a rate-limited verification API and writes an enriched CSV that is updated after every contact."
)]
struct AppArgs {
    /// Path to the CSV upload to process as a job.
    #[arg(short, long, env = "ENRICHER_INPUT", conflicts_with_all = ["status", "list_jobs", "name"])]
    input: Option<String>,

    /// Job id to use for the run (a random id is generated otherwise).
    #[arg(long, requires = "input")]
    job_id: Option<String>,

    /// Also save the per-row results as JSON to this path.
    #[arg(long, requires = "input")]
    results_json: Option<String>,

    /// Print the stored metadata of a job and exit.
    #[arg(long)]
    status: Option<String>,

    /// List the most recent jobs and exit.
    #[arg(long, num_args = 0..=1, default_missing_value = "20")]
    list_jobs: Option<usize>,

    /// Full name of a single person to enrich. Requires --domain.
    #[arg(long, requires = "domain")]
    name: Option<String>,

    /// Domain or website for single contact mode. Requires --name.
    #[arg(long, requires = "name")]
    domain: Option<String>,

    /// Path to a configuration file (TOML format). CLI args override file settings.
    #[arg(long, env = "ENRICHER_CONFIG")]
    config_file: Option<String>,

    /// Base URL of the verification API.
    #[arg(long, env = "MAILTESTER_BASE_URL")]
    verification_base_url: Option<String>,

    /// URL of the key allocator.
    #[arg(long, env = "KEY_PROVIDER_URL")]
    key_provider_url: Option<String>,

    /// Key allocation policy: fresh (per attempt) or cached (per process).
    #[arg(long, env = "KEY_POLICY")]
    key_policy: Option<KeyPolicy>,

    /// Minimum delay between verification calls, in milliseconds.
    #[arg(long, env = "MIN_DELAY_MS")]
    min_delay_ms: Option<u64>,

    /// Contacts per wave.
    #[arg(long, env = "COMBO_BATCH_SIZE")]
    wave_size: Option<usize>,

    /// Contacts in flight within a wave.
    #[arg(short, long, env = "ENRICHER_CONCURRENCY")]
    concurrency: Option<usize>,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "ENRICHER_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    /// User agent string for outgoing requests.
    #[arg(long, env = "ENRICHER_USER_AGENT")]
    user_agent: Option<String>,

    /// Directory holding one sub-directory per job.
    #[arg(long, env = "ENRICHER_STORAGE_ROOT")]
    storage_root: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Setting up tracing subscriber failed")?;

    let args = AppArgs::parse();
    tracing::debug!("Parsed CLI arguments: {:?}", args);

    let config = build_config(&args)?;
    tracing::debug!("Effective configuration loaded: {:?}", config);
    let storage = JobStorage::new(&config.storage_root);

    if let Some(ref job_id) = args.status {
        return print_job_status(&storage, job_id).await;
    }
    if let Some(limit) = args.list_jobs {
        return print_job_list(&storage, limit).await;
    }

    tracing::info!("Email Enricher CLI v{} starting...", env!("CARGO_PKG_VERSION"));
    let enricher = initialize_enricher(&config).context("Failed to initialize enricher")?;

    if args.name.is_some() {
        return process_single_contact(&enricher, &args).await;
    }

    let Some(ref input) = args.input else {
        return Err(anyhow::anyhow!(
            "Nothing to do: pass --input <file.csv>, --name/--domain, --status <job> or --list-jobs"
        ));
    };

    let runner = JobRunner::new(enricher, storage, ActiveJobs::new());
    let start_time = Instant::now();
    let outcome = process_file_mode(&runner, input, &args).await?;

    if let Some(ref path) = args.results_json {
        save_results(&outcome.results, path)?;
        tracing::info!("Results saved to '{}'.", path);
    }

    let metadata = runner
        .storage()
        .job_metadata(&outcome.job_id)
        .await
        .context("Job metadata missing after completion")?;
    log_summary(&outcome, &metadata, start_time.elapsed());
    Ok(())
}

fn build_config(args: &AppArgs) -> Result<Config> {
    let mut config_builder = ConfigBuilder::new();

    if let Some(ref path) = args.config_file {
        config_builder = config_builder.config_file(path);
    }
    if let Some(ref url) = args.verification_base_url {
        config_builder = config_builder.verification_base_url(url);
    }
    if let Some(ref url) = args.key_provider_url {
        config_builder = config_builder.key_provider_url(url);
    }
    if let Some(policy) = args.key_policy {
        config_builder = config_builder.key_policy(policy);
    }
    if let Some(ms) = args.min_delay_ms {
        config_builder = config_builder.min_delay(Duration::from_millis(ms));
    }
    if let Some(size) = args.wave_size {
        config_builder = config_builder.wave_size(size);
    }
    if let Some(c) = args.concurrency {
        config_builder = config_builder.max_concurrency(c);
    }
    if let Some(t) = args.request_timeout {
        config_builder = config_builder.request_timeout(Duration::from_secs(t));
    }
    if let Some(ref ua) = args.user_agent {
        config_builder = config_builder.user_agent(ua);
    }
    if let Some(ref root) = args.storage_root {
        config_builder = config_builder.storage_root(root);
    }

    config_builder.build().map_err(|e| {
        tracing::error!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to build configuration: {}", e)
    })
}

async fn process_file_mode(runner: &JobRunner, input: &str, args: &AppArgs) -> Result<JobOutcome> {
    let input_path = Path::new(input);
    if !input_path.is_file() {
        return Err(anyhow::anyhow!("Input file not found or is not a file: {}", input));
    }

    let job_id = args
        .job_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let original_filename = input_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.to_string());
    let file = UploadedFile {
        original_filename,
        path: input_path.to_path_buf(),
    };
    tracing::info!("Running job {} for '{}'.", job_id, input);

    let (ready_tx, ready_rx) = oneshot::channel();
    let job = {
        let runner = runner.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move { runner.process_upload(&job_id, file, Some(ready_tx)).await })
    };

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) | ETA: {eta} | {msg}")
            .context("Failed to set progress bar template")?
            .progress_chars("=> "),
    );

    if let Ok(ready) = ready_rx.await {
        if let Some(progress) = ready.progress {
            pb.set_length(progress.total_contacts as u64);
        }
        if let Some(ref path) = ready.output_filename {
            pb.set_message(format!("writing {}", path));
        }
    }

    while !job.is_finished() {
        if let Some(progress) = runner
            .storage()
            .job_metadata(&job_id)
            .await
            .and_then(|metadata| metadata.progress)
        {
            pb.set_position(progress.processed_contacts as u64);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    let outcome = job.await.context("Job task panicked")?;
    match outcome {
        Ok(outcome) => {
            pb.finish_with_message(format!("Wrote {}", outcome.output_path.display()));
            Ok(outcome)
        }
        Err(e) => {
            pb.abandon_with_message("Job failed");
            Err(anyhow::anyhow!("Job {} failed: {}", job_id, e))
        }
    }
}

async fn process_single_contact(
    enricher: &email_enricher_core::EmailEnricher,
    args: &AppArgs,
) -> Result<()> {
    let name = args.name.clone().unwrap_or_default();
    let domain_input = args.domain.clone().unwrap_or_default();
    let cleaned = clean_name(&name);
    let contact = Contact::new(
        first_token(&cleaned),
        last_token(&cleaned),
        clean_domain(&domain_input),
        0,
    );
    tracing::info!("Finding email for Name='{}', Domain='{}'", name, contact.domain);

    let records = enrich_contacts(enricher, vec![contact]).await?;
    let record = records
        .first()
        .context("Enrichment returned no result for the contact")?;
    print_cli_result(record);
    Ok(())
}

async fn print_job_status(storage: &JobStorage, job_id: &str) -> Result<()> {
    let metadata = storage
        .job_metadata(job_id)
        .await
        .with_context(|| format!("No metadata found for job '{}'", job_id))?;
    let json = serde_json::to_string_pretty(&metadata).context("Failed to serialize metadata")?;
    println!("{}", json);
    Ok(())
}

async fn print_job_list(storage: &JobStorage, limit: usize) -> Result<()> {
    let jobs = storage
        .list_jobs(limit)
        .await
        .with_context(|| format!("Failed to list jobs under '{}'", storage.root().display()))?;
    if jobs.is_empty() {
        println!("No jobs found under {}", storage.root().display());
        return Ok(());
    }
    for job in jobs {
        let (processed, total) = job
            .progress
            .as_ref()
            .map_or((0, 0), |p| (p.processed_contacts, p.total_contacts));
        println!(
            "{}  {:<10}  {:>5}/{:<5}  {}  {}",
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            format!("{:?}", job.status).to_lowercase(),
            processed,
            total,
            job.job_id,
            job.original_filename
        );
    }
    Ok(())
}

fn save_results(results: &[EnrichedRecord], file_path: &str) -> Result<()> {
    let file = File::create(file_path)
        .with_context(|| format!("Failed to create/truncate output file '{}'", file_path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), results)
        .with_context(|| format!("Failed to serialize results to JSON for '{}'", file_path))?;
    Ok(())
}

fn log_summary(outcome: &JobOutcome, metadata: &JobMetadata, duration: Duration) {
    let status_counts = metadata
        .progress
        .as_ref()
        .map(|p| p.status_counts.clone())
        .unwrap_or_default();
    let breakdown = metadata
        .totals
        .as_ref()
        .map(|t| t.skipped_breakdown.clone())
        .unwrap_or_default();

    tracing::info!("-------------------- Job Summary --------------------");
    tracing::info!("Job                     : {} ({:?})", outcome.job_id, metadata.status);
    tracing::info!("Rows                    : {}", outcome.results.len());
    tracing::info!("  - Valid               : {}", status_counts.valid);
    tracing::info!("  - Catch-all           : {}", status_counts.catch_all);
    tracing::info!("  - Not found           : {}", status_counts.not_found);
    tracing::info!(
        "  - Skipped             : {} (existing email {}, no domain {}, no name {})",
        status_counts.skipped,
        breakdown.existing_email,
        breakdown.missing_domain,
        breakdown.missing_name
    );
    tracing::info!("Output                  : {}", outcome.output_path.display());
    tracing::info!("Download URL            : {}", outcome.download_url);
    tracing::info!("Total Time Taken        : {:.2?}", duration);
    if metadata.status != JobStatus::Completed {
        tracing::warn!("Job did not complete: {:?}", metadata.error);
    }
    tracing::info!("-----------------------------------------------------");
}

/// Prints the result for a single contact to standard output.
fn print_cli_result(record: &EnrichedRecord) {
    const BLUE: &str = "\x1b[34m";
    const GREEN: &str = "\x1b[32m";
    const YELLOW: &str = "\x1b[33m";
    const RESET: &str = "\x1b[0m";

    println!("\n{BLUE}===== Email Enricher Result ====={RESET}");
    println!("Name:   {} {}", record.first_name, record.last_name);
    println!("Domain: {}", record.domain);

    match (record.status, &record.best_email) {
        (DeliveryStatus::Valid, Some(email)) => {
            println!("\n{GREEN}Status: VALID{RESET}");
            println!("Email:  {GREEN}{}{RESET}", email);
        }
        (DeliveryStatus::CatchAll, Some(email)) => {
            println!("\n{YELLOW}Status: CATCH-ALL{RESET}");
            println!("Email:  {}", email);
        }
        _ => {
            println!("\n{YELLOW}Status: NOT FOUND{RESET}");
        }
    }
    if let Some(ref reason) = record.details.reason {
        println!("Reason: {}", reason);
    }
    if let Some(ref error) = record.details.error {
        println!("Error:  {}", error);
    }

    if !record.all_checked_candidates.is_empty() {
        println!("\n{BLUE}Checked Candidates:{RESET}");
        for outcome in &record.all_checked_candidates {
            let verdict = match (&outcome.error, outcome.verdict()) {
                (Some(error), _) => format!("error: {}", error),
                (None, Some(status)) => status.to_string(),
                (None, None) => "unknown".to_string(),
            };
            println!("- {}: {}", outcome.email, verdict);
        }
    }
    println!("{BLUE}================================={RESET}\n");
}
