//! # Rollcall — Notification Engine for the Attendance Portal
//!
//! Usage:
//!   rollcall run                               # Start the scheduler loop
//!   rollcall trigger --owner 7 absence         # Fire one batch right now
//!   rollcall deliveries --owner 7              # Recent delivery log
//!   rollcall settings --owner 7                # Show (or update) settings
//!   rollcall schedule list                     # Manage recurring entries

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rollcall_channels::{EmailProvider, Provider, SmsProvider};
use rollcall_core::RollcallConfig;
use rollcall_core::schedule::{Recurrence, RecurrenceKind};
use rollcall_core::types::{AttendanceDirectory, SettingsPatch, TriggerKind};
use rollcall_engine::Engine;
use rollcall_store::Store;

#[derive(Parser)]
#[command(
    name = "rollcall",
    version,
    about = "📋 Rollcall — attendance notification dispatch & scheduling"
)]
struct Cli {
    /// Config file path (default: ~/.rollcall/config.toml)
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
    /// Start the scheduler and run until interrupted
    Run,
    /// Fire one notification batch immediately
    Trigger {
        /// Owner (teacher/admin) id the batch runs for
        #[arg(short, long)]
        owner: i64,
        /// Trigger kind: absence, low_attendance, weekly_report, monthly_report
        kind: String,
        /// Attendance date to evaluate, YYYY-MM-DD (default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Show the most recent delivery log rows for an owner
    Deliveries {
        #[arg(short, long)]
        owner: i64,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show or update an owner's notification settings
    Settings {
        #[arg(short, long)]
        owner: i64,
        #[arg(long)]
        email: Option<bool>,
        #[arg(long)]
        sms: Option<bool>,
        #[arg(long)]
        absence: Option<bool>,
        #[arg(long)]
        low_attendance: Option<bool>,
        #[arg(long)]
        weekly: Option<bool>,
        #[arg(long)]
        monthly: Option<bool>,
        /// Low-attendance threshold percentage
        #[arg(long)]
        threshold: Option<u32>,
        /// Preferred report weekday, e.g. friday
        #[arg(long)]
        report_day: Option<String>,
        /// Preferred report time, HH:MM
        #[arg(long)]
        report_time: Option<String>,
    },
    /// Manage recurring schedule entries
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// List every entry, active or not
    List,
    /// Add a per-owner recurring entry
    Add {
        #[arg(short, long)]
        owner: i64,
        /// Trigger kind: absence, low_attendance, weekly_report, monthly_report
        kind: String,
        /// Recurrence: daily, weekly, monthly
        recurrence: String,
        /// Weekday 1-7 (weekly, 1 = Monday) or day of month 1-31 (monthly)
        #[arg(long)]
        day: Option<u32>,
        /// Time of day, HH:MM (UTC)
        #[arg(long, default_value = "08:00")]
        time: String,
    },
    /// Re-activate an entry
    Enable { id: i64 },
    /// Deactivate an entry (kept, never deleted)
    Disable { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "rollcall=debug" } else { "rollcall=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => RollcallConfig::load_from(path)?,
        None => RollcallConfig::load()?,
    };

    let store = Arc::new(Store::open(&config.database_path())?);
    let providers: Vec<Arc<dyn Provider>> = vec![
        Arc::new(EmailProvider::new(config.email.clone())),
        Arc::new(SmsProvider::new(config.sms.clone())),
    ];
    let directory: Arc<dyn AttendanceDirectory> = Arc::clone(&store) as _;
    let engine = Engine::new(&config, Arc::clone(&store), directory, providers);

    match cli.command {
        Command::Run => {
            println!("📋 Rollcall v{}", env!("CARGO_PKG_VERSION"));
            println!("   Database: {}", config.database_path().display());
            let scheduler = engine.scheduler()?;
            scheduler.run().await;
        }
        Command::Trigger { owner, kind, date } => {
            let kind = TriggerKind::parse(&kind)
                .ok_or_else(|| anyhow!("unknown trigger kind: {kind}"))?;
            let summary = engine.trigger_now(owner, kind, date).await?;
            println!(
                "📨 {kind}: {} attempted — {} sent, {} skipped, {} failed{}",
                summary.attempted,
                summary.sent,
                summary.skipped,
                summary.failed,
                if summary.truncated { " (truncated)" } else { "" }
            );
        }
        Command::Deliveries { owner, limit } => {
            let records = engine.recent_deliveries(owner, limit)?;
            if records.is_empty() {
                println!("No deliveries logged for owner {owner}.");
            }
            for r in records {
                println!(
                    "{}  {:<14} {:<5} {:<9} {}{}",
                    r.sent_at.format("%Y-%m-%d %H:%M:%S"),
                    r.kind.as_str(),
                    r.channel.as_str(),
                    r.status.as_str(),
                    r.recipient_contact,
                    r.error.map(|e| format!("  ({e})")).unwrap_or_default()
                );
            }
        }
        Command::Settings {
            owner,
            email,
            sms,
            absence,
            low_attendance,
            weekly,
            monthly,
            threshold,
            report_day,
            report_time,
        } => {
            let patch = SettingsPatch {
                email_enabled: email,
                sms_enabled: sms,
                absence_alerts: absence,
                low_attendance_alerts: low_attendance,
                weekly_reports: weekly,
                monthly_reports: monthly,
                low_attendance_threshold: threshold,
                report_day,
                report_time,
            };
            let settings = engine.update_settings(owner, &patch)?;
            println!("Settings for owner {owner}:");
            println!("   email:           {}", on_off(settings.email_enabled));
            println!("   sms:             {}", on_off(settings.sms_enabled));
            println!("   absence:         {}", on_off(settings.absence_alerts));
            println!("   low attendance:  {} (threshold {}%)",
                on_off(settings.low_attendance_alerts),
                settings.low_attendance_threshold
            );
            println!("   weekly reports:  {}", on_off(settings.weekly_reports));
            println!("   monthly reports: {}", on_off(settings.monthly_reports));
            println!("   report slot:     {} {}", settings.report_day, settings.report_time);
        }
        Command::Schedule { action } => match action {
            ScheduleAction::List => {
                let entries = engine.schedules()?;
                if entries.is_empty() {
                    println!("No schedule entries (run `rollcall run` once to seed the system sweeps).");
                }
                for e in entries {
                    println!(
                        "{:>4}  {:<14} {:<8} owner {:<6} next {}  {}",
                        e.id,
                        e.trigger.as_str(),
                        e.recurrence.kind.as_str(),
                        e.owner_id.map_or_else(|| "all".into(), |o| o.to_string()),
                        e.next_run.format("%Y-%m-%d %H:%M"),
                        if e.active { "active" } else { "inactive" }
                    );
                }
            }
            ScheduleAction::Add { owner, kind, recurrence, day, time } => {
                let kind = TriggerKind::parse(&kind)
                    .ok_or_else(|| anyhow!("unknown trigger kind: {kind}"))?;
                let rec = RecurrenceKind::parse(&recurrence)
                    .ok_or_else(|| anyhow!("unknown recurrence: {recurrence}"))?;
                let at = NaiveTime::parse_from_str(&time, "%H:%M")
                    .map_err(|e| anyhow!("invalid time {time:?}: {e}"))?;
                let rule = Recurrence { kind: rec, anchor_day: day, at };
                let id = engine.add_schedule(Some(owner), kind, rule)?;
                println!("📅 Schedule entry {id} added for owner {owner} ({kind})");
            }
            ScheduleAction::Enable { id } => {
                engine.set_schedule_active(id, true)?;
                println!("Schedule entry {id} enabled");
            }
            ScheduleAction::Disable { id } => {
                engine.set_schedule_active(id, false)?;
                println!("Schedule entry {id} disabled");
            }
        },
    }

    Ok(())
}

fn on_off(v: bool) -> &'static str {
    if v { "on" } else { "off" }
}
