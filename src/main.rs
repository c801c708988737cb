//! # MailCadence: quota-aware outbound email scheduler
//!
//! Usage:
//!   mailcadence enqueue recipients.json     # Compose drafts and assign send slots
//!   mailcadence approve                     # draft → queued
//!   mailcadence run                         # Dispatch worker (Ctrl+C to stop)
//!   mailcadence status                      # Queue counts and next due item
//!   mailcadence schedule 10                 # Preview slots, queue untouched
//!   mailcadence resume cv.pdf               # Signature + suggested prompt from a résumé

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand};
use mailcadence_compose::prompt::load_template;
use mailcadence_compose::resume::read_resume;
use mailcadence_compose::{ContentCache, GeminiComposer};
use mailcadence_core::MailCadenceConfig;
use mailcadence_core::config::{ScheduleConfig, expand_path};
use mailcadence_core::traits::{ComposeRequest, Recipient, Signature};
use mailcadence_core::types::now_ms;
use mailcadence_scheduler::{
    DispatchWorker, QueueStore, ScheduleParams, WorkerSettings, enqueue_batch, schedule,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mailcadence",
    version,
    about = "📬 MailCadence — quota-aware outbound email scheduler"
)]
struct Cli {
    /// Config file (default: ~/.mailcadence/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the dispatch worker until Ctrl+C / SIGTERM
    Run,
    /// Compose drafts for a JSON list of recipients and add them to the queue
    Enqueue {
        /// JSON array of {"recipient"|"email", "name"?, "company"?}
        recipients: PathBuf,
        #[command(flatten)]
        schedule: ScheduleOverrides,
        /// Prompt template file (overrides compose.prompt_template_path)
        #[arg(long)]
        prompt_template: Option<PathBuf>,
    },
    /// Approve every draft (draft → queued)
    Approve,
    /// Edit the subject and/or body of a draft
    Edit {
        id: String,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    /// Show per-status counts and the next scheduled item
    Status {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Preview send slots without touching the queue
    Schedule {
        count: usize,
        #[command(flatten)]
        schedule: ScheduleOverrides,
    },
    /// Extract a signature and a suggested prompt template from a résumé (PDF or text)
    Resume {
        file: PathBuf,
        /// Write the suggested template to this file instead of printing it
        #[arg(long)]
        save_template: Option<PathBuf>,
        /// Only extract the signature
        #[arg(long)]
        signature_only: bool,
    },
}

#[derive(Args, Default)]
struct ScheduleOverrides {
    /// First day to schedule (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<String>,
    /// Window start (HH:MM)
    #[arg(long)]
    window_start: Option<String>,
    /// Window end (HH:MM)
    #[arg(long)]
    window_end: Option<String>,
    /// Sends per allowed day
    #[arg(long)]
    daily_limit: Option<u32>,
}

impl ScheduleOverrides {
    fn params(&self, base: &ScheduleConfig) -> Result<ScheduleParams> {
        let mut config = base.clone();
        if let Some(v) = &self.start_date {
            config.start_date = Some(v.clone());
        }
        if let Some(v) = &self.window_start {
            config.window_start = v.clone();
        }
        if let Some(v) = &self.window_end {
            config.window_end = v.clone();
        }
        if let Some(v) = self.daily_limit {
            config.daily_limit = v;
        }
        Ok(ScheduleParams::from_config(&config)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "mailcadence=debug,mailcadence_scheduler=debug,mailcadence_channels=debug,mailcadence_compose=debug"
    } else {
        "mailcadence=info,mailcadence_scheduler=info,mailcadence_channels=info,mailcadence_compose=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run => run_worker(&config).await,
        Command::Enqueue {
            recipients,
            schedule,
            prompt_template,
        } => enqueue(&config, &recipients, &schedule, prompt_template.as_deref()).await,
        Command::Approve => {
            let store = QueueStore::open(&config.queue)?;
            let approved = store.approve_drafts()?;
            println!("✅ Approved {approved} drafts");
            Ok(())
        }
        Command::Edit { id, subject, body } => {
            if subject.is_none() && body.is_none() {
                anyhow::bail!("nothing to edit: pass --subject and/or --body");
            }
            let store = QueueStore::open(&config.queue)?;
            let item = store.edit_draft(&id, subject.as_deref(), body.as_deref())?;
            println!("✏️  Updated draft {} → {}", item.id, item.recipient);
            Ok(())
        }
        Command::Status { json } => status(&config, json),
        Command::Schedule { count, schedule } => {
            let params = schedule.params(&config.schedule)?;
            for (i, at) in schedule_preview(count, &params)?.iter().enumerate() {
                println!("{:>4}  {}", i + 1, format_local(*at));
            }
            Ok(())
        }
        Command::Resume {
            file,
            save_template,
            signature_only,
        } => resume(&config, &file, save_template.as_deref(), signature_only).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<MailCadenceConfig> {
    load_config_with(path, |key| std::env::var(key).ok())
}

fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<MailCadenceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(path) = path else {
        return Ok(MailCadenceConfig::load_with(lookup)?);
    };
    let mut config = MailCadenceConfig::load_from(path)
        .with_context(|| format!("loading {}", path.display()))?;
    config.apply_overrides(lookup)?;
    config.validate()?;
    Ok(config)
}

async fn run_worker(config: &MailCadenceConfig) -> Result<()> {
    let store = Arc::new(QueueStore::open(&config.queue)?);
    let transport = mailcadence_channels::build_transport(config)?;
    let worker = DispatchWorker::new(
        store,
        transport,
        WorkerSettings::from_config(&config.worker),
    );

    let cancel = install_signal_handler()?;
    worker.run(cancel).await?;
    Ok(())
}

async fn enqueue(
    config: &MailCadenceConfig,
    recipients: &Path,
    overrides: &ScheduleOverrides,
    prompt_template: Option<&Path>,
) -> Result<()> {
    let params = overrides.params(&config.schedule)?;
    let raw = std::fs::read_to_string(recipients)
        .with_context(|| format!("reading {}", recipients.display()))?;
    let rows: Vec<Recipient> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", recipients.display()))?;

    let template_path = prompt_template
        .map(Path::to_path_buf)
        .or_else(|| config.compose.prompt_template_path.as_deref().map(expand_path));
    let request = ComposeRequest {
        prompt_template: template_path.as_deref().map(load_template).transpose()?,
        signature: config.compose.signature.clone(),
    };

    let store = QueueStore::open(&config.queue)?;
    let composer = GeminiComposer::from_config(&config.compose, Arc::new(ContentCache::new()))?;
    let report = enqueue_batch(
        &store,
        &composer,
        &rows,
        &params,
        &request,
        &Local::now(),
        Duration::from_millis(config.compose.delay_ms),
    )
    .await?;

    println!(
        "📦 Enqueued {} drafts ({} skipped, {} failed)",
        report.enqueued(),
        report.skipped,
        report.failed.len()
    );
    for item in &report.items {
        println!("   {}  {}  {}", format_local(item.send_at), item.recipient, item.subject);
    }
    for (recipient, reason) in &report.failed {
        println!("   ❌ {recipient}: {reason}");
    }
    if report.enqueued() > 0 {
        println!("👉 Review with `mailcadence status`, then `mailcadence approve`");
    }
    Ok(())
}

fn status(config: &MailCadenceConfig, json: bool) -> Result<()> {
    let store = QueueStore::open(&config.queue)?;
    let summary = store.summary(now_ms())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!("📬 MailCadence queue: {}", store.describe());
    println!("   Total:    {}", summary.total);
    println!("   Draft:    {}", summary.draft);
    println!("   Queued:   {} ({} due now)", summary.queued, summary.due);
    println!("   Sent:     {}", summary.sent);
    println!("   Dry run:  {}", summary.dry_run);
    println!("   Error:    {}", summary.error);
    match &summary.next {
        Some(next) => println!(
            "   Next:     {} at {}",
            next.recipient,
            format_local(next.send_at)
        ),
        None => println!("   Next:     —"),
    }
    Ok(())
}

async fn resume(
    config: &MailCadenceConfig,
    file: &Path,
    save_template: Option<&Path>,
    signature_only: bool,
) -> Result<()> {
    let text = read_resume(file).with_context(|| format!("reading {}", file.display()))?;
    if text.is_empty() {
        anyhow::bail!("no text found in {}", file.display());
    }
    println!("📄 {} characters of résumé text", text.chars().count());

    let composer = GeminiComposer::from_config(&config.compose, Arc::new(ContentCache::new()))?;
    let signature = composer.extract_signature(&text).await?;
    println!("{}", signature_toml(&signature)?);
    if signature_only {
        return Ok(());
    }

    let template = composer.suggest_prompt(&text).await?;
    match save_template {
        Some(path) => {
            std::fs::write(path, &template)
                .with_context(|| format!("writing {}", path.display()))?;
            println!(
                "💾 Suggested template saved to {} (set compose.prompt_template_path to use it)",
                path.display()
            );
        }
        None => println!("{template}"),
    }
    Ok(())
}

/// `[compose.signature]` block ready to paste into config.toml.
fn signature_toml(signature: &Signature) -> Result<String> {
    let body = toml::to_string(signature).context("rendering signature")?;
    Ok(format!("[compose.signature]\n{body}"))
}

fn schedule_preview(count: usize, params: &ScheduleParams) -> Result<Vec<i64>> {
    Ok(schedule(count, params, &Local::now())?)
}

fn format_local(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|d| d.with_timezone(&Local).format("%a %Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Cancel the returned token on Ctrl+C or SIGTERM.
fn install_signal_handler() -> Result<CancellationToken> {
    let token = CancellationToken::new();
    let trigger = token.clone();

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("installing SIGTERM handler")?;

    tokio::spawn(async move {
        #[cfg(unix)]
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("🛑 Ctrl+C received, shutting down"),
            _ = sigterm.recv() => tracing::info!("🛑 SIGTERM received, shutting down"),
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("🛑 Ctrl+C received, shutting down");
        }
        trigger.cancel();
    });

    Ok(token)
}
