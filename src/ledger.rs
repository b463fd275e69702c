use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// The tagging ledger: an append-only file of `address: Label1, Label2`
/// lines recording which senders have already been labelled.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: Vec<(String, Vec<String>)>,
}

impl Ledger {
    /// Loads an existing ledger; a missing file is an error.
    pub fn load(path: &Path) -> Result<Ledger> {
        let file = File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ledger::parse(path, file)
    }

    /// Loads the ledger, creating an empty file first if none exists.
    pub fn load_or_create(path: &Path) -> Result<Ledger> {
        if !path.exists() {
            File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
        }
        Ledger::load(path)
    }

    fn parse(path: &Path, file: File) -> Result<Ledger> {
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match line.split_once(": ") {
                Some((address, labels)) => {
                    let labels = labels
                        .split(", ")
                        .map(|label| label.trim().to_string())
                        .filter(|label| !label.is_empty())
                        .collect();
                    entries.push((address.to_string(), labels));
                }
                None => log::warn!("skipping malformed ledger line: {:?}", line),
            }
        }
        Ok(Ledger {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn senders(&self) -> HashSet<&str> {
        self.entries
            .iter()
            .map(|(address, _)| address.as_str())
            .collect()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .flat_map(|(_, labels)| labels.iter())
            .map(String::as_str)
    }

    pub fn entries(&self) -> &[(String, Vec<String>)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Appends one line and flushes, so an interrupted tagging session
    /// keeps everything recorded so far.
    pub fn append(&mut self, address: &str, labels: &[String]) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        writeln!(file, "{}: {}", address, labels.join(", "))?;
        file.flush()?;
        self.entries.push((address.to_string(), labels.to_vec()));
        Ok(())
    }
}

/// Reads the optional label seed file, one label per line; a leading
/// `N. ` ordinal is stripped. The file is created empty when missing so
/// the operator can find and edit it.
pub fn read_label_seeds(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        return Ok(Vec::new());
    }
    let file = File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut labels = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let label = strip_ordinal(line.trim());
        if !label.is_empty() {
            labels.push(label.to_string());
        }
    }
    Ok(labels)
}

fn strip_ordinal(line: &str) -> &str {
    if let Some((prefix, rest)) = line.split_once(". ") {
        if !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()) {
            return rest;
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("xmlupdate.txt");
        let mut ledger = Ledger::load_or_create(&path).unwrap();
        assert_eq!(ledger.len(), 0);

        ledger
            .append("news@example.com", &["News".to_string()])
            .unwrap();
        ledger
            .append(
                "spam@example.com",
                &["Junk".to_string(), "Later".to_string()],
            )
            .unwrap();
        assert!(ledger.senders().contains("news@example.com"));

        let reloaded = Ledger::load(&path).unwrap();
        assert_eq!(reloaded.entries().len(), 2);
        assert_eq!(
            reloaded.entries()[1],
            (
                "spam@example.com".to_string(),
                vec!["Junk".to_string(), "Later".to_string()]
            )
        );
        let labels: Vec<_> = reloaded.labels().collect();
        assert_eq!(labels, ["News", "Junk", "Later"]);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("xmlupdate.txt");
        std::fs::write(&path, "good@example.com: News\nno separator here\n\n").unwrap();
        let ledger = Ledger::load(&path).unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_missing_ledger_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(Ledger::load(&dir.path().join("absent.txt")).is_err());
    }

    #[test]
    fn test_label_seeds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.txt");

        // First touch creates the file empty.
        assert!(read_label_seeds(&path).unwrap().is_empty());
        assert!(path.exists());

        std::fs::write(&path, "1. News\n2. Receipts\nPlain\n12x. Odd\n\n").unwrap();
        let labels = read_label_seeds(&path).unwrap();
        assert_eq!(labels, ["News", "Receipts", "Plain", "12x. Odd"]);
    }
}
