//! `chatmend repair [<id>]`: rebuild the index and cache of one workspace,
//! or of every workspace that needs it.

use chatmend_engine::namespace::find_namespace;
use chatmend_engine::{
    repair_targets, scan_storage, Namespace, RepairError, RepairOptions, RepairReport, Repairer,
    StorageConfig,
};
use chatmend_extractor::Extractor;
use console::style;

use crate::prompt::{self, Confirm};

pub fn run(
    config: &StorageConfig,
    namespace_id: Option<&str>,
    options: RepairOptions,
    confirm: Confirm,
) -> anyhow::Result<()> {
    let all = scan_storage(config)?;
    let requested = namespace_id.map(|id| find_namespace(config, id)).transpose()?;
    let targets: Vec<&Namespace> = match &requested {
        Some(ns) => vec![ns],
        None => repair_targets(&all).collect(),
    };

    println!();
    if targets.is_empty() {
        println!("  {}", style("Every workspace is in sync.").green());
        println!();
        return Ok(());
    }

    if options.dry_run {
        println!("  {}", style("Dry run: nothing will be written.").cyan());
    }
    println!("  Workspaces to repair:");
    for ns in targets.iter().copied() {
        println!(
            "    {}  +{} index, +{} cache, {} orphaned",
            ns.display_name(),
            ns.missing_from_index().len(),
            ns.missing_from_cache().len(),
            ns.orphaned_in_index().len(),
        );
    }
    println!();

    if !options.dry_run {
        println!("  Close VS Code before continuing; it overwrites these values on exit.");
    }
    if !prompt::confirm(confirm, "Proceed?")? {
        println!("  Aborted.");
        println!();
        return Ok(());
    }

    let repairer = Repairer::new(Extractor::default(), options);
    let results = match &requested {
        Some(ns) => vec![(ns, repairer.repair(ns, &all))],
        None => repairer.repair_all(&all),
    };
    let mut failed = 0;
    for (ns, result) in &results {
        match result {
            Ok(report) => print_report(ns, report),
            Err(err) => {
                failed += 1;
                print_failure(ns, err);
            }
        }
    }
    println!();

    if failed > 0 {
        anyhow::bail!("{failed} of {} workspace(s) could not be repaired", results.len());
    }
    if !options.dry_run {
        println!("  Done. Reopen VS Code to see the restored sessions.");
        println!();
    }
    Ok(())
}

fn print_failure(ns: &Namespace, err: &RepairError) {
    println!("  {} {}", style("✗").red(), ns.display_name());
    println!("      {err}");
    tracing::error!(
        component = "cli",
        event = "repair.failed",
        namespace = %ns.id,
        stage = ?err.stage,
        error = %err,
    );
}

fn print_report(ns: &Namespace, report: &RepairReport) {
    let verb = if report.dry_run { "would restore" } else { "restored" };
    println!("  {} {}", style("✓").green(), ns.display_name());
    println!(
        "      {} {} session(s), cache +{} model / +{} state",
        verb,
        report.restored.len(),
        report.cache.model_added,
        report.cache.state_added,
    );
    for entry in &report.restored {
        println!("        {}  {}", style(&entry.session_id).dim(), entry.title);
    }
    if report.cache.empty_pruned > 0 {
        println!("      dropped {} cache entr(ies) for empty sessions", report.cache.empty_pruned);
    }
    if !report.orphans_removed.is_empty() {
        println!("      removed {} orphaned index entr(ies)", report.orphans_removed.len());
    } else if !report.orphaned_in_index.is_empty() && report.recoverable.is_empty() {
        println!(
            "      kept {} orphaned index entr(ies); use --remove-orphans or --recover-orphans",
            report.orphaned_in_index.len()
        );
    }
    for candidate in &report.recoverable {
        let verb = if report.dry_run { "would recover" } else { "recovered" };
        let hint = if candidate.same_project { "" } else { " (different project)" };
        println!(
            "      {} {} from {}{}",
            verb, candidate.session_id, candidate.source_namespace, hint
        );
    }
    for failure in &report.recovery.failures {
        println!(
            "      {} copy {} -> {}: {}",
            style("!").yellow(),
            failure.source.display(),
            failure.destination.display(),
            failure.error
        );
    }
    for failure in &report.failures {
        println!(
            "      {} skipped {} ({:?}): {}",
            style("!").yellow(),
            failure.session_id,
            failure.reason,
            failure.message
        );
    }
    if let Some(backup) = &report.backup {
        println!("      backup: {}", backup.display());
    }
}
