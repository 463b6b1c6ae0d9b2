//! daybook - per-occurrence completion tracking and daily timelines
//!
//! Command-line front end over a SQLite store and a JSON sources file.

use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use daybook::{
    AssigneeFilter, CoverageRequest, CoverageRequestId, DaybookConfig, DaybookError, DaySection,
    Delegation, EntityId, EntityKind, FileSources, InstanceId, InstanceNote, InstanceStatus,
    InstanceStore, IntoDaybookError, NoteId, SqliteBackend, StaticSession, Timeline,
    TimelineAggregator, TimelineItem, UserId, UuidGenerator,
};

#[derive(Parser)]
#[command(name = "daybook")]
#[command(version)]
#[command(about = "Track routine and event occurrences and view your day", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// SQLite database file (defaults to the configured store path)
    #[arg(long, global = true, env = "DAYBOOK_DB")]
    db: Option<PathBuf>,

    /// Acting user id
    #[arg(short, long, global = true, env = "DAYBOOK_USER")]
    user: Option<String>,

    /// JSON file with tasks, routines and events
    #[arg(short, long, global = true, env = "DAYBOOK_SOURCES")]
    sources: Option<PathBuf>,

    /// Config file (defaults to <config_dir>/daybook/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the sectioned timeline for a day
    Timeline {
        /// Date to show (defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// all, unassigned, or a user id
        #[arg(short, long, default_value = "all")]
        assignee: AssigneeFilter,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored instances for a day
    Instances {
        #[arg(short, long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        json: bool,
    },

    /// Mark an occurrence done
    Done(Occurrence),

    /// Return a completed occurrence to pending
    Undo(Occurrence),

    /// Skip an occurrence
    Skip(Occurrence),

    /// Move an occurrence to another time or day
    Defer {
        #[command(flatten)]
        occurrence: Occurrence,

        /// Target time, RFC 3339 (e.g. 2024-01-15T18:00:00+01:00)
        #[arg(long)]
        to: DateTime<FixedOffset>,
    },

    /// Set or clear the assignee of one occurrence
    Assign {
        #[command(flatten)]
        occurrence: Occurrence,

        /// New assignee; omit to clear
        #[arg(long)]
        to: Option<UserId>,
    },

    /// Instance notes
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },

    /// Coverage requests
    Cover {
        #[command(subcommand)]
        action: CoverAction,
    },
}

/// One occurrence: kind, entity and date.
#[derive(clap::Args)]
struct Occurrence {
    /// routine or calendar_event
    kind: EntityKind,

    /// Entity id from the sources file
    entity: EntityId,

    /// Occurrence date (defaults to today)
    #[arg(short, long)]
    date: Option<NaiveDate>,
}

impl Occurrence {
    fn date(&self) -> NaiveDate {
        self.date.unwrap_or_else(today)
    }

    fn label(&self) -> String {
        format!("{}:{} on {}", self.kind, self.entity, self.date())
    }
}

#[derive(Subcommand)]
enum NoteAction {
    /// Attach a note to an occurrence
    Add {
        #[command(flatten)]
        occurrence: Occurrence,

        text: String,
    },

    /// List notes on an instance
    List { instance: InstanceId },

    /// Delete one of your notes
    Delete { note: NoteId },
}

#[derive(Subcommand)]
enum CoverAction {
    /// Ask someone to cover an occurrence
    Request {
        #[command(flatten)]
        occurrence: Occurrence,
    },

    /// List coverage requests on an instance
    List { instance: InstanceId },

    /// Pending requests from other users
    Open,

    /// Accept or decline a request
    Respond {
        request: CoverageRequestId,

        #[arg(long, conflicts_with = "decline", required_unless_present = "decline")]
        accept: bool,

        #[arg(long)]
        decline: bool,
    },
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "daybook=debug,info"
    } else {
        "daybook=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn fail(err: &DaybookError) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), err);
    std::process::exit(err.exit_code());
}

/// Print the outcome of a mutation; exit 1 with the last error on failure.
fn report(ok: bool, message: String, store: &InstanceStore) {
    if ok {
        println!("{} {}", "✓".green().bold(), message);
    } else {
        let reason = store
            .last_error()
            .unwrap_or_else(|| "unknown error".to_string());
        eprintln!("{} {}: {}", "✗".red().bold(), message, reason);
        std::process::exit(1);
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn status_marker(status: InstanceStatus) -> colored::ColoredString {
    match status {
        InstanceStatus::Pending => "○".normal(),
        InstanceStatus::Completed => "✓".green(),
        InstanceStatus::Skipped => "-".dimmed(),
        InstanceStatus::Deferred => "→".yellow(),
    }
}

fn print_item(item: &TimelineItem) {
    let time = match item.start {
        Some(start) if !item.all_day => start.format("%H:%M").to_string(),
        _ => "     ".to_string(),
    };
    let mut line = format!("  {} {} {}", status_marker(item.status), time, item.title);
    if item.carried_over {
        line.push_str(&format!(" {}", "(carried over)".dimmed()));
    } else if item.time_overridden {
        line.push_str(&format!(" {}", "(moved)".dimmed()));
    }
    if let Some(assignee) = &item.assignee {
        line.push_str(&format!(" {}", format!("@{}", assignee).cyan()));
    } else if !item.assignees.is_empty() {
        let names: Vec<String> = item.assignees.iter().map(|a| format!("@{}", a)).collect();
        line.push_str(&format!(" {}", names.join(" ").cyan()));
    }
    println!("{}", line);
}

fn print_timeline(timeline: &Timeline) {
    println!(
        "{} {}  {}/{} done",
        "Day".bold(),
        timeline.date.format("%A %Y-%m-%d"),
        timeline.completed,
        timeline.total
    );
    if timeline.is_empty() {
        println!("  {}", "Nothing scheduled".dimmed());
        return;
    }
    for section in DaySection::ALL {
        let items = timeline.section(section);
        if items.is_empty() {
            continue;
        }
        println!("\n{}", section.label().bold());
        items.iter().for_each(print_item);
    }
}

fn print_note(note: &InstanceNote) {
    println!(
        "{} {} {}: {}",
        note.id.to_string().dimmed(),
        note.created_at.format("%Y-%m-%d %H:%M"),
        note.author.to_string().cyan(),
        note.text
    );
}

fn print_request(request: &CoverageRequest) {
    let responder = request
        .covered_by
        .as_ref()
        .map(|u| format!(" by {}", u))
        .unwrap_or_default();
    println!(
        "{} instance {} from {} [{}{}]",
        request.id.to_string().dimmed(),
        request.instance_id,
        request.requested_by.to_string().cyan(),
        request.status,
        responder
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = match &cli.config {
        Some(path) => DaybookConfig::load(path),
        None => DaybookConfig::load_default(),
    }
    .unwrap_or_else(|e| fail(&e));

    let db_path = cli.db.clone().unwrap_or_else(|| config.database_path());
    debug!(db = %db_path.display(), "Opening store");
    let backend = SqliteBackend::open(&db_path, config.store.enforce_unique_instances)
        .unwrap_or_else(|e| fail(&e));

    let sources = match &cli.sources {
        Some(path) => FileSources::load(path)
            .into_config_error()
            .unwrap_or_else(|e| fail(&e)),
        None => FileSources::empty(),
    };
    let sources = Arc::new(sources);

    let session = match cli.user.as_deref().map(str::trim) {
        Some(user) if !user.is_empty() => StaticSession::signed_in(user),
        _ => fail(&DaybookError::NotAuthenticated),
    };

    let store = InstanceStore::new(
        Arc::new(backend),
        Arc::new(session),
        Arc::new(UuidGenerator),
    );
    let delegation = Delegation::new(store.clone());

    match cli.command {
        Commands::Timeline {
            date,
            assignee,
            json,
        } => {
            let aggregator = TimelineAggregator::new(
                store.clone(),
                sources.clone(),
                sources.clone(),
                sources,
            )
            .with_config(config.timeline.clone());
            let timeline = aggregator
                .timeline(date.unwrap_or_else(today), &assignee)
                .await;
            if json {
                print_json(&timeline)?;
            } else {
                print_timeline(&timeline);
            }
            if let Some(warning) = store.last_error() {
                eprintln!("{} {}", "Warning:".yellow().bold(), warning);
            }
        }

        Commands::Instances { date, json } => {
            let date = date.unwrap_or_else(today);
            let rows = store.get_instances_for_date(date).await;
            if json {
                print_json(&rows)?;
            } else if rows.is_empty() {
                println!("No instances on {}", date);
            } else {
                for row in &rows {
                    println!(
                        "{} {}:{} {}",
                        row.id.to_string().dimmed(),
                        row.kind,
                        row.entity_id,
                        status_marker(row.status)
                    );
                }
            }
        }

        Commands::Done(o) => {
            let ok = store.mark_done(o.kind, &o.entity, o.date()).await;
            report(ok, format!("Marked {} done", o.label()), &store);
        }

        Commands::Undo(o) => {
            let ok = store.undo_done(o.kind, &o.entity, o.date()).await;
            report(ok, format!("Reopened {}", o.label()), &store);
        }

        Commands::Skip(o) => {
            let ok = store.skip(o.kind, &o.entity, o.date()).await;
            report(ok, format!("Skipped {}", o.label()), &store);
        }

        Commands::Defer { occurrence: o, to } => {
            let ok = store.defer(o.kind, &o.entity, o.date(), to).await;
            report(ok, format!("Deferred {} to {}", o.label(), to.to_rfc3339()), &store);
        }

        Commands::Assign { occurrence: o, to } => {
            let message = match &to {
                Some(user) => format!("Assigned {} to {}", o.label(), user),
                None => format!("Cleared assignee of {}", o.label()),
            };
            let ok = store.assign(o.kind, &o.entity, o.date(), to).await;
            report(ok, message, &store);
        }

        Commands::Note { action } => match action {
            NoteAction::Add {
                occurrence: o,
                text,
            } => {
                let note = delegation.add_note(o.kind, &o.entity, o.date(), &text).await;
                let message = match &note {
                    Some(n) => format!("Added note {} to {}", n.id, o.label()),
                    None => format!("Add note to {}", o.label()),
                };
                report(note.is_some(), message, &store);
            }
            NoteAction::List { instance } => {
                let notes = delegation.get_notes(instance).await;
                if notes.is_empty() {
                    println!("No notes on {}", instance);
                }
                notes.iter().for_each(print_note);
            }
            NoteAction::Delete { note } => {
                let ok = delegation.delete_note(note).await;
                report(ok, format!("Deleted note {}", note), &store);
            }
        },

        Commands::Cover { action } => match action {
            CoverAction::Request { occurrence: o } => {
                let request = delegation
                    .request_coverage(o.kind, &o.entity, o.date())
                    .await;
                let message = match &request {
                    Some(r) => format!("Requested coverage {} for {}", r.id, o.label()),
                    None => format!("Request coverage for {}", o.label()),
                };
                report(request.is_some(), message, &store);
            }
            CoverAction::List { instance } => {
                let requests = delegation.get_coverage_requests(instance).await;
                if requests.is_empty() {
                    println!("No coverage requests on {}", instance);
                }
                requests.iter().for_each(print_request);
            }
            CoverAction::Open => {
                let requests = delegation.open_coverage_requests().await;
                if requests.is_empty() {
                    println!("No open coverage requests");
                }
                requests.iter().for_each(print_request);
            }
            CoverAction::Respond {
                request,
                accept,
                decline: _,
            } => {
                let ok = delegation.respond_to_coverage(request, accept).await;
                let verb = if accept { "Accepted" } else { "Declined" };
                report(ok, format!("{} coverage request {}", verb, request), &store);
            }
        },
    }

    Ok(())
}
