use anyhow::{Context, Result};
use ci_agent::{
    cli::{
        commands::{UploadCommand, ValidateCommand},
        input::read_pipeline,
        output::*,
        Cli, Command,
    },
    core::config::AgentConfig,
    if_changed::IfChangedApplicator,
    upload::{HttpUploader, RetryPolicy, UploadDriver},
    CancelSignal, Environment, Experiments, RunContext, RunMode, UploadEngine,
};
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let config = match &cli.config {
        Some(path) => AgentConfig::from_file(path)
            .with_context(|| format!("Failed to load agent config {}", path.display()))?,
        None => AgentConfig::default(),
    };

    // Ctrl-C cancels in-flight uploads and backoff delays
    let (canceller, cancel) = CancelSignal::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            canceller.cancel();
        }
    });

    let result = match &cli.command {
        Command::Upload(cmd) => upload_pipeline(cmd, config, cancel).await,
        Command::Validate(cmd) => validate_pipeline(cmd, config, cancel).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", CROSS, style(format!("{:#}", e)).red());
        std::process::exit(1);
    }

    Ok(())
}

fn run_context(config: &AgentConfig, cancel: CancelSignal) -> RunContext {
    let experiments: Experiments = config.experiments.iter().cloned().collect();
    RunContext::new(experiments, cancel)
}

fn runtime_env() -> Environment {
    runtime_env_from(std::env::vars_os())
}

/// Keep the entries that are valid Unicode; the rest cannot be interpolated
fn runtime_env_from<I>(vars: I) -> Environment
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (key, _) => {
                let name = match &key {
                    Ok(name) => name.clone(),
                    Err(raw) => raw.to_string_lossy().into_owned(),
                };
                debug!(name = %name, "Ignoring non-Unicode environment variable");
                None
            }
        })
        .collect()
}

async fn upload_pipeline(
    cmd: &UploadCommand,
    mut config: AgentConfig,
    cancel: CancelSignal,
) -> Result<()> {
    cmd.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;

    let dry_run = config.dry_run;
    let format = config.format;

    let input = read_pipeline(cmd.file.as_deref(), Path::new(".")).await?;
    if !dry_run {
        println!("{} Loaded pipeline: {}", INFO, style(&input.name).bold());
    }

    let ctx = run_context(&config, cancel);
    let applicator = IfChangedApplicator::from_config(&config);

    let mode = if dry_run {
        RunMode::DryRun
    } else {
        let job_id = cmd
            .job
            .clone()
            .context("A job id is required, pass --job or set CI_AGENT_JOB_ID")?;
        RunMode::Upload { job_id }
    };

    let mut engine = UploadEngine::new(config.clone(), ctx, applicator);
    if !dry_run {
        let endpoint = config
            .endpoint
            .clone()
            .context("An endpoint is required, pass --endpoint or set CI_AGENT_ENDPOINT")?;
        let uploader = HttpUploader::new(endpoint, config.token.clone());
        engine = engine.with_driver(UploadDriver::new(
            Arc::new(uploader),
            RetryPolicy::from_config(&config),
        ));
        engine.add_event_handler(|event| println!("{}", format_upload_event(&event)));
    }

    let summary = engine
        .run(&mode, &input.bytes, &runtime_env(), &input.name)
        .await?;

    if dry_run {
        println!("{}", format_pipelines(&summary.pipelines, format)?);
        return Ok(());
    }

    println!(
        "\n{} {} {}",
        ROCKET,
        style(format!("{} pipeline(s)", summary.receipts.len())).bold(),
        style("uploaded successfully").green()
    );
    Ok(())
}

async fn validate_pipeline(
    cmd: &ValidateCommand,
    mut config: AgentConfig,
    cancel: CancelSignal,
) -> Result<()> {
    println!("{} Validating pipeline...", INFO);
    cmd.apply_to(&mut config);

    let input = read_pipeline(cmd.file.as_deref(), Path::new(".")).await?;
    let ctx = run_context(&config, cancel);
    let mut engine = UploadEngine::new(config.clone(), ctx, IfChangedApplicator::disabled());

    let summary = engine
        .run(&RunMode::Validate, &input.bytes, &runtime_env(), &input.name)
        .await?;

    println!("{} Pipeline is valid!", CHECK);
    println!("  Source: {}", style(&input.name).bold());
    println!("  Documents: {}", style(summary.documents).cyan());
    println!("  Steps: {}", style(summary.step_count()).cyan());

    if cmd.format.is_some() {
        println!("\n{}", format_pipelines(&summary.pipelines, config.format)?);
    }
    Ok(())
}
