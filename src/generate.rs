use crate::args::Args;
use crate::filters::{self, FilterFile, FilterRule};
use crate::ledger::Ledger;
use anyhow::Result;
use chrono::Utc;
use std::collections::HashSet;

pub fn run(args: &Args) -> Result<()> {
    let workspace = args.workspace();
    let ledger = Ledger::load(&workspace.ledger)?;
    let mut merged = FilterFile::load(&workspace.filters)?;
    let original_pairs = merged.label_pairs();
    let original_rules = merged.rules.len();

    // Snapshot the previous output before overwriting it, to diff
    // against afterwards.
    let previous = if workspace.output.exists() {
        Some(FilterFile::load(&workspace.output)?)
    } else {
        None
    };

    let mut known_labels: HashSet<String> = merged.labels().into_iter().collect();
    let now = Utc::now();
    let mut appended = 0;
    for (address, labels) in ledger.entries() {
        for label in labels {
            if known_labels.insert(label.clone()) {
                log::info!("label {:?} is new, creating it for {}", label, address);
            } else {
                log::info!("label {:?} exists, appending {}", label, address);
            }
            merged.push_rule(FilterRule::new(address, label, now));
            appended += 1;
        }
    }
    merged.save(&workspace.output)?;
    println!(
        "Appended {} filter entries; wrote {}.",
        appended,
        workspace.output.display()
    );
    log::info!(
        "{} ledger entries merged into {} existing rules, {} total",
        ledger.len(),
        original_rules,
        merged.rules.len()
    );

    if let Some(previous) = previous {
        let previous_pairs = previous.label_pairs();
        println!(
            "\nChanges between {} and the previous {}:",
            workspace.filters.display(),
            workspace.output.display()
        );
        println!("{}", filters::diff(&original_pairs, &previous_pairs));
        println!("\nChanges introduced by this run:");
        println!("{}", filters::diff(&previous_pairs, &merged.label_pairs()));
    }
    Ok(())
}
