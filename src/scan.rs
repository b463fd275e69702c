use crate::args::{Args, Workspace};
use crate::auth;
use crate::filters::FilterFile;
use crate::gmail::GmailClient;
use crate::report;
use crate::utils;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

const STALL_WARNING: Duration = Duration::from_secs(10);

pub fn run(args: &Args, count: usize) -> Result<()> {
    let workspace = args.workspace();
    let token = auth::obtain(&workspace.credentials, &workspace.token)?;
    let client = GmailClient::new(&token.access_token);

    eprintln!("Listing messages...");
    let started = Instant::now();
    let ids = client.list_message_ids(count)?;
    eprintln!(
        "Fetched {} message ids in {:.2}s.",
        ids.len(),
        started.elapsed().as_secs_f64()
    );

    let known = known_senders(&workspace);

    eprintln!("Counting senders...");
    let progress = utils::create_progress_bar(args.quiet, ids.len());
    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut last_success = Instant::now();
    let mut stall_warned = false;
    for id in &ids {
        // A single best-effort pass: failed fetches are logged and
        // skipped, never retried.
        match client.sender(id) {
            Ok(sender) => {
                if let Some(address) = sender {
                    if !known.contains(&address) {
                        *counts.entry(address).or_insert(0) += 1;
                    }
                }
                last_success = Instant::now();
                stall_warned = false;
            }
            Err(err) => {
                log::warn!("{:#}", err);
                if !stall_warned && last_success.elapsed() > STALL_WARNING {
                    log::warn!(
                        "no message fetched for {}s, the API quota is likely exhausted",
                        STALL_WARNING.as_secs()
                    );
                    stall_warned = true;
                }
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    report::write(&workspace.report, &counts, ids.len())?;
    eprintln!(
        "Found {} senders with no filter rule yet; report written to {}.",
        counts.len(),
        workspace.report.display()
    );
    Ok(())
}

fn known_senders(workspace: &Workspace) -> HashSet<String> {
    match FilterFile::load(&workspace.filters) {
        Ok(file) => file.senders(),
        Err(err) => {
            log::warn!("{:#}; treating every sender as new", err);
            HashSet::new()
        }
    }
}
