use crate::args::{Args, Workspace};
use crate::filters::FilterFile;
use crate::ledger::{self, Ledger};
use crate::report;
use anyhow::Result;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};
use std::collections::HashSet;
use std::slice;

pub fn run(args: &Args) -> Result<()> {
    let workspace = args.workspace();
    let mut ledger = Ledger::load_or_create(&workspace.ledger)?;
    let tagged: HashSet<String> = ledger
        .senders()
        .into_iter()
        .map(str::to_string)
        .collect();
    let pending: Vec<String> = report::read_frequency_order(&workspace.report)?
        .into_iter()
        .filter(|address| !tagged.contains(address))
        .collect();
    if pending.is_empty() {
        println!("Every sender in the report is already tagged.");
        return Ok(());
    }

    let mut labels = collect_labels(&workspace, &ledger)?;

    let theme = ColorfulTheme::default();
    let total = pending.len();
    for (i, address) in pending.iter().enumerate() {
        println!("Tagging {} ({} senders remaining)", address, total - i - 1);

        let new_label_choice = labels.len();
        let skip_choice = labels.len() + 1;
        let mut items = labels.clone();
        items.push("(define a new label)".to_string());
        items.push("(skip this sender)".to_string());
        let selection = Select::with_theme(&theme)
            .with_prompt(address.as_str())
            .items(&items)
            .default(0)
            .interact_opt()?;
        let choice = match selection {
            Some(choice) => choice,
            // Esc ends the session; everything tagged so far is
            // already on disk.
            None => {
                println!("Tagging session ended.");
                break;
            }
        };
        if choice == skip_choice {
            continue;
        }

        let label = if choice == new_label_choice {
            let label: String = Input::with_theme(&theme)
                .with_prompt("New label")
                .interact_text()?;
            let label = label.trim().to_string();
            if label.is_empty() {
                continue;
            }
            if let Err(pos) = labels.binary_search(&label) {
                labels.insert(pos, label.clone());
            }
            label
        } else {
            items[choice].clone()
        };
        ledger.append(address, slice::from_ref(&label))?;
    }
    Ok(())
}

/// Label choices: filter-file labels, ledger labels, and the seed
/// file, sorted and deduplicated.
fn collect_labels(workspace: &Workspace, ledger: &Ledger) -> Result<Vec<String>> {
    let mut labels = match FilterFile::load(&workspace.filters) {
        Ok(file) => file.labels(),
        Err(err) => {
            log::warn!("{:#}; offering ledger and seed labels only", err);
            Vec::new()
        }
    };
    labels.extend(ledger.labels().map(str::to_string));
    labels.extend(ledger::read_label_seeds(&workspace.labels)?);
    labels.sort();
    labels.dedup();
    Ok(labels)
}
