//! Shopping list CLI commands.
//!
//! Reads and writes go through the sync service, so they work the same way
//! online and offline. Offline writes are queued and shown with their
//! provisional ids (`local:<uuid>`), which are accepted wherever an id is.

use clap::{Subcommand, ValueEnum};

use omnipa_core::{
    AddItemsRequest, CreateListRequest, DeleteListRequest, ItemChanges, MutationOutcome, NewItem,
    RecordId, ShoppingList, ShoppingListDetail, ShoppingSync, UpdateItemRequest,
};

#[derive(Debug, Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum ShoppingCommand {
    /// List shopping lists
    Lists {
        /// Output format
        #[arg(long, short, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show a shopping list with its items
    Show {
        /// List id
        list_id: RecordId,

        /// Output format
        #[arg(long, short, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Create a shopping list
    Create {
        /// List name
        name: String,

        /// Description
        #[arg(long, short)]
        description: Option<String>,
    },

    /// Add items to a shopping list
    Add {
        /// List id
        list_id: RecordId,

        /// Item names
        #[arg(required = true)]
        names: Vec<String>,

        /// Quantity for each item
        #[arg(long, short)]
        quantity: Option<f64>,

        /// Unit (e.g., "kg", "bags")
        #[arg(long, short)]
        unit: Option<String>,

        /// Category (e.g., "Dairy")
        #[arg(long, short)]
        category: Option<String>,

        /// Notes
        #[arg(long, short)]
        notes: Option<String>,
    },

    /// Update an item on a shopping list
    Update {
        /// List id
        list_id: RecordId,

        /// Item id
        item_id: RecordId,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New quantity
        #[arg(long, short)]
        quantity: Option<f64>,

        /// New unit
        #[arg(long, short)]
        unit: Option<String>,

        /// New category
        #[arg(long, short)]
        category: Option<String>,

        /// New notes
        #[arg(long, short)]
        notes: Option<String>,

        /// Mark the item as bought
        #[arg(long, conflicts_with = "not_done")]
        done: bool,

        /// Mark the item as not bought
        #[arg(long)]
        not_done: bool,

        /// Price actually paid
        #[arg(long, short)]
        price: Option<f64>,
    },

    /// Delete (archive) a shopping list
    Delete {
        /// List id
        list_id: RecordId,
    },
}

impl ShoppingCommand {
    pub async fn run(&self, sync: &ShoppingSync) -> Result<(), Box<dyn std::error::Error>> {
        match self {
            ShoppingCommand::Lists { format } => {
                let lists = sync.queries().lists().await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&lists)?);
                    }
                    OutputFormat::Table => print_lists(sync, &lists),
                }
                Ok(())
            }

            ShoppingCommand::Show { list_id, format } => {
                let detail = sync.queries().list_detail(list_id).await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&detail)?);
                    }
                    OutputFormat::Table => print_detail(sync, &detail),
                }
                Ok(())
            }

            ShoppingCommand::Create { name, description } => {
                if name.trim().is_empty() {
                    return Err("List name cannot be empty".into());
                }
                let mut request = CreateListRequest::new(name.trim());
                if let Some(description) = description {
                    request = request.with_description(description.clone());
                }

                match sync.dispatcher().create_list(request).await? {
                    MutationOutcome::Applied(list) => {
                        println!("Created list '{}' ({})", list.name, list.id);
                    }
                    MutationOutcome::Queued(change) => {
                        let id = change
                            .provisional_ids
                            .first()
                            .map(|local| RecordId::Local(*local).to_string())
                            .unwrap_or_default();
                        println!("Queued list '{}' ({})", name.trim(), id);
                    }
                }
                Ok(())
            }

            ShoppingCommand::Add {
                list_id,
                names,
                quantity,
                unit,
                category,
                notes,
            } => {
                let items = build_items(
                    names,
                    *quantity,
                    unit.as_deref(),
                    category.as_deref(),
                    notes.as_deref(),
                )?;
                let request = AddItemsRequest::new(list_id.clone(), items);

                match sync.dispatcher().add_items(request).await? {
                    MutationOutcome::Applied(items) => {
                        for item in &items {
                            println!("Added {} ({})", item.name, item.id);
                        }
                    }
                    MutationOutcome::Queued(change) => {
                        for (name, local) in names.iter().zip(&change.provisional_ids) {
                            println!("Queued {} ({})", name, RecordId::Local(*local));
                        }
                    }
                }
                Ok(())
            }

            ShoppingCommand::Update {
                list_id,
                item_id,
                name,
                quantity,
                unit,
                category,
                notes,
                done,
                not_done,
                price,
            } => {
                let changes = ItemChanges {
                    name: name.clone(),
                    quantity: *quantity,
                    unit: unit.clone(),
                    category: category.clone(),
                    notes: notes.clone(),
                    is_completed: completion(*done, *not_done),
                    actual_price: *price,
                };
                if changes.is_empty() {
                    return Err("Nothing to update. Pass at least one field to change.".into());
                }
                let request = UpdateItemRequest::new(list_id.clone(), item_id.clone(), changes);

                match sync.dispatcher().update_item(request).await? {
                    MutationOutcome::Applied(item) => println!("Updated {}", item),
                    MutationOutcome::Queued(_) => println!("Queued update to {}", item_id),
                }
                Ok(())
            }

            ShoppingCommand::Delete { list_id } => {
                let request = DeleteListRequest::new(list_id.clone());
                match sync.dispatcher().delete_list(request).await? {
                    MutationOutcome::Applied(()) => println!("Deleted list {}", list_id),
                    MutationOutcome::Queued(_) => println!("Queued deletion of list {}", list_id),
                }
                Ok(())
            }
        }
    }
}

/// Build the add-items payload, one item per name.
fn build_items(
    names: &[String],
    quantity: Option<f64>,
    unit: Option<&str>,
    category: Option<&str>,
    notes: Option<&str>,
) -> Result<Vec<NewItem>, String> {
    names
        .iter()
        .map(|name| {
            let name = name.trim();
            if name.is_empty() {
                return Err("Item name cannot be empty".to_string());
            }
            let mut item = NewItem::new(name);
            if let Some(qty) = quantity {
                item = item.with_quantity(qty, unit.unwrap_or(""));
            } else if let Some(unit) = unit {
                item.unit = Some(unit.to_string());
            }
            if let Some(category) = category {
                item = item.with_category(category);
            }
            if let Some(notes) = notes {
                item = item.with_notes(notes);
            }
            Ok(item)
        })
        .collect()
}

fn completion(done: bool, not_done: bool) -> Option<bool> {
    match (done, not_done) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

fn print_lists(sync: &ShoppingSync, lists: &[ShoppingList]) {
    if lists.is_empty() {
        println!("No shopping lists.");
    } else {
        println!("{:<44} {:<25} {:>9}", "ID", "NAME", "DONE");
        println!("{}", "-".repeat(80));
        for list in lists {
            // Not yet on the server, or has queued changes
            let marker = if list.id.is_local() || sync.has_pending_changes(Some(&list.id)) {
                "*"
            } else {
                ""
            };
            println!(
                "{:<44} {:<25} {:>9}{}",
                list.id.to_string(),
                truncate(&list.name, 25),
                format!("{}/{}", list.completed_count, list.item_count),
                marker
            );
        }
    }
    if lists.iter().any(|l| l.id.is_local() || sync.has_pending_changes(Some(&l.id))) {
        println!("\n* waiting to sync");
    }
    print_status_footer(sync);
}

fn print_detail(sync: &ShoppingSync, detail: &ShoppingListDetail) {
    println!("{}", detail.list.name);
    println!("{}", "=".repeat(detail.list.name.chars().count().max(4)));
    if let Some(description) = &detail.list.description {
        println!("{}", description);
    }
    println!("ID: {}", detail.list.id);
    println!();

    if detail.items.is_empty() {
        println!("No items.");
    } else {
        let mut items: Vec<_> = detail.items.iter().collect();
        // Unbought first, then alphabetical
        items.sort_by(|a, b| {
            a.is_completed
                .cmp(&b.is_completed)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        for item in items {
            let mut line = format!("{:<40}", item.to_string());
            if let Some(category) = &item.category {
                line.push_str(&format!(" [{}]", category));
            }
            if let Some(price) = item.actual_price.or(item.estimated_price) {
                line.push_str(&format!(" ${:.2}", price));
            }
            println!("{}  {}", line, item.id);
        }
        println!("{}", "-".repeat(44));
        println!(
            "{} of {} items done",
            detail.list.completed_count, detail.list.item_count
        );
    }
    print_status_footer(sync);
}

fn print_status_footer(sync: &ShoppingSync) {
    let pending = sync.pending_changes_count(None);
    if sync.is_offline() {
        println!("\nOffline: showing saved data.");
    }
    if pending > 0 {
        println!("{} change(s) waiting to sync.", pending);
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
