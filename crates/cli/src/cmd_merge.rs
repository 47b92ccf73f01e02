//! `chatmend merge`: fold sessions from stale duplicate workspaces into the
//! active one for each project.

use chatmend_engine::merge::plan;
use chatmend_engine::{scan_storage, MergeOutcome, MergePlan, Merger, StorageConfig};
use chatmend_extractor::Extractor;
use console::style;

use crate::prompt::{self, Confirm};

pub fn run(config: &StorageConfig, dry_run: bool, confirm: Confirm) -> anyhow::Result<()> {
    let namespaces = scan_storage(config)?;
    let plans: Vec<MergePlan> = plan(&namespaces).into_iter().filter(|p| !p.is_noop()).collect();

    println!();
    if plans.is_empty() {
        println!("  {}", style("No duplicate workspaces with sessions to merge.").green());
        println!();
        return Ok(());
    }

    if dry_run {
        println!("  {}", style("Dry run: nothing will be written.").cyan());
    }
    for plan in &plans {
        print_plan(plan);
    }
    println!();

    if !dry_run {
        println!("  Close VS Code before continuing; it overwrites these values on exit.");
    }
    if !prompt::confirm(confirm, "Merge these sessions?")? {
        println!("  Aborted.");
        println!();
        return Ok(());
    }

    let merger = Merger::new(Extractor::default());
    let mut failed = 0;
    for plan in &plans {
        match merger.apply(plan, dry_run) {
            Ok(outcome) => print_outcome(plan, &outcome),
            Err(err) => {
                failed += 1;
                println!("  {} {}", style("✗").red(), plan.project_name);
                println!("      {err}");
                tracing::error!(
                    component = "cli",
                    event = "merge.failed",
                    identity = %plan.identity,
                    error = %err,
                );
            }
        }
    }
    println!();

    if failed > 0 {
        anyhow::bail!("{failed} of {} project(s) could not be merged", plans.len());
    }
    Ok(())
}

fn print_plan(plan: &MergePlan) {
    println!("  {} {}", style(&plan.project_name).bold(), style(&plan.identity).dim());
    println!("    active: {}", plan.active.id);
    for stale in &plan.stale {
        println!("    stale:  {} ({} to merge)", stale.id, stale.contributes.len());
    }
    println!("    {} session(s) to merge", plan.to_merge.len());
}

fn print_outcome(plan: &MergePlan, outcome: &MergeOutcome) {
    println!("  {} {}", style("✓").green(), plan.project_name);
    if outcome.dry_run {
        println!(
            "      would copy {} session(s) into {}, index {}, cache +{} model / +{} state",
            plan.to_merge.len(),
            outcome.active,
            outcome.added.len(),
            outcome.cache.model_added,
            outcome.cache.state_added,
        );
        for entry in &outcome.added {
            println!("        {}  {}", style(&entry.session_id).dim(), entry.title);
        }
    } else {
        println!(
            "      copied {} file(s), skipped {} existing, indexed {}, cache +{} model / +{} state",
            outcome.recovery.files_copied,
            outcome.recovery.files_skipped,
            outcome.added.len(),
            outcome.cache.model_added,
            outcome.cache.state_added,
        );
    }
    for failure in &outcome.recovery.failures {
        println!(
            "      {} copy {} -> {}: {}",
            style("!").yellow(),
            failure.source.display(),
            failure.destination.display(),
            failure.error
        );
    }
    for failure in &outcome.failures {
        println!(
            "      {} skipped {} ({:?}): {}",
            style("!").yellow(),
            failure.session_id,
            failure.reason,
            failure.message
        );
    }
    if let Some(backup) = &outcome.backup {
        println!("      backup: {}", backup.display());
    }
}
