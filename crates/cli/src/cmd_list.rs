//! `chatmend list`: show workspaces with sessions and what is out of sync.

use chatmend_engine::{scan_storage, Namespace, StorageConfig};
use comfy_table::presets::UTF8_HORIZONTAL_ONLY;
use comfy_table::{CellAlignment, ContentArrangement, Table};
use console::style;

use crate::VERSION;

pub fn run(config: &StorageConfig, all: bool) -> anyhow::Result<()> {
    let namespaces = scan_storage(config)?;
    let shown = select(&namespaces, all);

    println!();
    println!("  chatmend v{}", VERSION);
    println!("  Storage: {}", config.root.display());
    println!();

    if shown.is_empty() {
        if all {
            println!("  No workspaces with chat sessions found.");
        } else {
            println!("  {}", style("Every workspace is in sync.").green());
        }
        println!();
        return Ok(());
    }

    println!("{}", table(&shown));
    println!();
    let broken = shown.iter().filter(|ns| ns.needs_repair()).count();
    if broken > 0 {
        println!(
            "  {} workspace(s) need repair. Run: chatmend repair [<id>]",
            style(broken).yellow().bold()
        );
        println!();
    }
    Ok(())
}

/// Namespaces with at least one session on disk; only broken ones unless
/// `all` is set.
fn select(namespaces: &[Namespace], all: bool) -> Vec<&Namespace> {
    namespaces
        .iter()
        .filter(|ns| ns.has_sessions())
        .filter(|ns| all || ns.needs_repair())
        .collect()
}

fn table(namespaces: &[&Namespace]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Workspace", "Disk", "Index", "Cache", "Unindexed", "Uncached", "Orphaned",
        ]);
    for ns in namespaces {
        table.add_row(vec![
            ns.display_name(),
            ns.disk_ids.len().to_string(),
            ns.index_ids.len().to_string(),
            ns.cache_ids.len().to_string(),
            ns.missing_from_index().len().to_string(),
            ns.missing_from_cache().len().to_string(),
            ns.orphaned_in_index().len().to_string(),
        ]);
    }
    for column in 1..7 {
        if let Some(column) = table.column_mut(column) {
            column.set_cell_alignment(CellAlignment::Right);
        }
    }
    table
}
