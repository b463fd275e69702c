use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const SEPARATOR: &str = "-----------------------------";
const ALPHABETICAL_HEADER: &str = "BY ALPHABETICAL";
const FREQUENCY_HEADER: &str = "BY FREQUENCY";
const COLUMN_SEPARATOR: &str = " || ";

/// Writes the sender frequency report: the same table twice, sorted by
/// address and by descending count. The `BY FREQUENCY` section is what
/// the tag job reads back, so the layout is part of the file format.
pub fn write(path: &Path, counts: &HashMap<String, u64>, fetched: usize) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);

    if fetched == 0 {
        writeln!(out, "No messages were fetched.")?;
    }

    let mut alphabetical: Vec<(&str, u64)> =
        counts.iter().map(|(addr, &n)| (addr.as_str(), n)).collect();
    alphabetical.sort();
    let mut frequency = alphabetical.clone();
    frequency.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    writeln!(out, "{}", SEPARATOR)?;
    writeln!(out, "{}", ALPHABETICAL_HEADER)?;
    for (address, count) in &alphabetical {
        writeln!(out, "{}{}{}", address, COLUMN_SEPARATOR, count)?;
    }
    writeln!(out, "{}", SEPARATOR)?;
    writeln!(out, "{}", FREQUENCY_HEADER)?;
    for (address, count) in &frequency {
        writeln!(out, "{}{}{}", address, COLUMN_SEPARATOR, count)?;
    }
    writeln!(out, "{}", SEPARATOR)?;
    Ok(())
}

/// Reads back the addresses of the `BY FREQUENCY` section, in order.
pub fn read_frequency_order(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut addresses = Vec::new();
    let mut in_section = false;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line == FREQUENCY_HEADER {
            in_section = true;
        } else if in_section {
            if line == SEPARATOR {
                break;
            }
            match line.split_once(COLUMN_SEPARATOR) {
                Some((address, _)) => addresses.push(address.to_string()),
                None => log::warn!("skipping malformed report line: {:?}", line),
            }
        }
    }
    Ok(addresses)
}
