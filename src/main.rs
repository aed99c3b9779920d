//! reelcast - narrated story videos from text
//!
//! Entry point: loads configuration, wires the adapters and renders the
//! pipeline's progress events on the terminal.

use anyhow::{Result, bail};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use reelcast::cli::{Args, Commands};
use reelcast::config::Config;
use reelcast::pipeline::{
    PipelineConfig, PipelineEvent, PipelineHandle, PipelineResult, PipelineStep, StepKind, StepStatus,
};
use reelcast::workflow::Workflow;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Secrets may live in a local .env file
    let dotenv = dotenvy::dotenv().ok();

    let _log_guard = setup_logging(args.verbose)?;
    if let Some(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let success = match args.command {
        Commands::InitConfig { path, force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Config::default().save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
            true
        }
        Commands::Chunk { file, limit } => {
            let config = load_config(args.config.as_deref())?;
            let text = std::fs::read_to_string(&file)?;
            let workflow = Workflow::new(config)?;
            let chunks = workflow.chunk_preview(&text, limit);

            if args.json {
                println!("{}", serde_json::to_string_pretty(&chunks)?);
            } else {
                println!("{} characters -> {} chunk(s)", text.chars().count(), chunks.len());
                for (i, chunk) in chunks.iter().enumerate() {
                    let preview: String = chunk.chars().take(60).collect();
                    println!("{:>3} {:>5} chars  {}", i + 1, chunk.chars().count(), preview.replace('\n', " "));
                }
            }
            true
        }
        Commands::Check => {
            let workflow = Workflow::new(load_config(args.config.as_deref())?)?;
            let report = workflow.check_dependencies().await?;

            println!("Media tools:        {}", report.media_version);
            println!("Speech API key:     {}", configured(report.speech_key));
            println!("Image API key:      {}", configured(report.image_key));
            println!("Upload credentials: {}", configured(report.upload_credentials));
            true
        }
        Commands::Run(run) => {
            let job = run.into_config()?;
            execute(args.config.as_deref(), job, args.json).await?
        }
        Commands::RunJob { file } => {
            info!("Loading job from {}", file.display());
            let job = Workflow::load_job(&file)?;
            execute(args.config.as_deref(), job, args.json).await?
        }
    };

    if !success {
        // Flush the file log before exiting
        drop(_log_guard);
        std::process::exit(1);
    }
    Ok(())
}

/// Run one job; returns whether it succeeded
async fn execute(config_path: Option<&Path>, job: PipelineConfig, json: bool) -> Result<bool> {
    let workflow = Workflow::new(load_config(config_path)?)?;
    workflow.check_dependencies().await?;

    let handle = workflow.start(job);
    let bars = if json { None } else { Some(StepBars::new()) };
    let result = drive(handle, bars).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    Ok(result.success)
}

/// Load configuration: explicit path, then ./config.toml, then defaults
fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    config.apply_env();
    config.validate()?;
    Ok(config)
}

/// What a Ctrl-C does, given how many came before it
#[derive(Debug, PartialEq)]
enum Interrupt {
    /// Finish the running step, then stop
    Cancel,
    /// Exit immediately
    Abort,
}

fn on_interrupt(previous: u32) -> Interrupt {
    if previous == 0 { Interrupt::Cancel } else { Interrupt::Abort }
}

/// Consume the event stream until the terminal event.
///
/// The first Ctrl-C cancels between steps; a second one exits with status 130.
async fn drive(mut handle: PipelineHandle, mut bars: Option<StepBars>) -> Result<PipelineResult> {
    let mut interrupts = 0;

    loop {
        let event = tokio::select! {
            event = handle.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                match on_interrupt(interrupts) {
                    Interrupt::Cancel => {
                        warn!("Interrupted, stopping after the current step (Ctrl-C again to quit now)");
                        handle.cancel();
                    }
                    Interrupt::Abort => {
                        warn!("Interrupted again, exiting");
                        std::process::exit(130);
                    }
                }
                interrupts += 1;
                continue;
            }
        };

        match event {
            Some(PipelineEvent::Progress(step)) => {
                if let Some(bars) = bars.as_mut() {
                    bars.update(&step);
                }
            }
            Some(PipelineEvent::Finished(result)) => return Ok(result),
            Some(PipelineEvent::Rejected(reason)) => bail!("Pipeline run rejected: {}", reason),
            None => bail!("Pipeline ended without a result"),
        }
    }
}

/// One progress bar per step, created when the step starts
struct StepBars {
    multi: MultiProgress,
    bars: HashMap<StepKind, ProgressBar>,
    style: ProgressStyle,
}

impl StepBars {
    fn new() -> Self {
        let style = ProgressStyle::with_template("{spinner:.green} {prefix:<20} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
            style,
        }
    }

    fn update(&mut self, step: &PipelineStep) {
        let bar = self.bars.entry(step.kind).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(100));
            bar.set_style(self.style.clone());
            bar.set_prefix(step.name.clone());
            bar
        });

        bar.set_position(step.progress as u64);
        match step.status {
            StepStatus::Completed => bar.finish_with_message(format!("✓ {}", step.message)),
            StepStatus::Failed => {
                bar.abandon_with_message(format!("✗ {}", step.error.as_deref().unwrap_or(&step.message)))
            }
            StepStatus::Pending | StepStatus::InProgress => bar.set_message(step.message.clone()),
        }
    }
}

fn print_summary(result: &PipelineResult) {
    println!();
    if result.success {
        println!("Done in {:.1}s (run {})", result.elapsed_secs(), result.run_id);
    } else {
        println!("Failed: {}", result.error.as_deref().unwrap_or("unknown error"));
        if let Some(step) = result.failed_step() {
            println!("  at step: {}", step.name);
        }
    }

    let outputs: [(&str, &Option<PathBuf>); 3] = [
        ("Voiceover", &result.voiceover_path),
        ("Video", &result.video_path),
        ("Thumbnail", &result.thumbnail_path),
    ];
    for (label, path) in outputs {
        if let Some(path) = path {
            println!("  {:<10} {}", label, path.display());
        }
    }
    if result.thumbnail_is_placeholder {
        println!("  (thumbnail is a placeholder, see the log for the reason)");
    }
    if let Some(upload) = &result.upload {
        println!("  {:<10} {} ({})", "Uploaded", upload.url, upload.status);
    }
}

fn configured(present: bool) -> &'static str {
    if present { "configured" } else { "missing" }
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    // Create log directory
    let log_dir = std::env::current_dir()?.join(".reelcast").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "reelcast.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console logs go to stderr so --json output stays clean
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}", log_level, log_dir.join("reelcast.log").display());

    Ok(guard)
}
