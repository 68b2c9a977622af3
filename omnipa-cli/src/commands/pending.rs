use chrono::{Local, TimeZone};
use clap::Subcommand;

use omnipa_core::{Mutation, PendingChange, RecordId, ShoppingSync};

use super::shopping::OutputFormat;

#[derive(Debug, Subcommand)]
pub enum PendingCommand {
    /// List changes waiting to be synced
    List {
        /// Only show changes for this list
        #[arg(long, short)]
        list: Option<RecordId>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Discard every queued change
    Clear,

    /// Show changes that were given up on
    DeadLetters {
        /// Output format
        #[arg(long, short, value_enum, default_value = "table")]
        format: OutputFormat,

        /// Discard the dead letters instead of listing them
        #[arg(long)]
        clear: bool,
    },
}

impl PendingCommand {
    pub fn run(&self, sync: &ShoppingSync) -> Result<(), Box<dyn std::error::Error>> {
        match self {
            PendingCommand::List { list, format } => {
                let changes: Vec<PendingChange> = sync
                    .pending_changes()
                    .into_iter()
                    .filter(|change| list.as_ref().map_or(true, |id| belongs_to(change, id)))
                    .collect();
                print_changes(&changes, format, "No pending changes.")
            }

            PendingCommand::Clear => {
                let count = sync.pending_changes_count(None);
                sync.tracker().clear_pending_changes();
                println!("Discarded {} pending change(s).", count);
                Ok(())
            }

            PendingCommand::DeadLetters { format, clear } => {
                let tracker = sync.tracker();
                if *clear {
                    let count = tracker.dead_letters().len();
                    tracker.clear_dead_letters();
                    println!("Discarded {} dead letter(s).", count);
                    return Ok(());
                }
                print_changes(&tracker.dead_letters(), format, "No dead letters.")
            }
        }
    }
}

/// A queued create belongs to the list it will create.
fn belongs_to(change: &PendingChange, list_id: &RecordId) -> bool {
    if change.targets(list_id) {
        return true;
    }
    matches!(change.mutation, Mutation::CreateList(_))
        && list_id
            .local_id()
            .is_some_and(|local| change.provisional_ids.first() == Some(&local))
}

fn print_changes(
    changes: &[PendingChange],
    format: &OutputFormat,
    empty: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(changes)?);
        }
        OutputFormat::Table => {
            if changes.is_empty() {
                println!("{}", empty);
                return Ok(());
            }
            println!(
                "{:<20} {:<12} {:>8}  {}",
                "QUEUED", "TYPE", "ATTEMPTS", "CHANGE"
            );
            println!("{}", "-".repeat(80));
            for change in changes {
                println!(
                    "{:<20} {:<12} {:>8}  {}",
                    format_timestamp(change.timestamp),
                    change.change_type().to_string(),
                    change.attempts,
                    describe(&change.mutation)
                );
            }
        }
    }
    Ok(())
}

fn describe(mutation: &Mutation) -> String {
    match mutation {
        Mutation::CreateList(req) => format!("create list '{}'", req.name),
        Mutation::AddItems(req) => {
            let names: Vec<&str> = req.items.iter().map(|item| item.name.as_str()).collect();
            format!("add {} to {}", names.join(", "), req.list_id)
        }
        Mutation::UpdateItem(req) => format!("update {} on {}", req.item_id, req.list_id),
        Mutation::DeleteList(req) => format!("delete list {}", req.list_id),
    }
}

fn format_timestamp(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}
