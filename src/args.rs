use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_COUNT: usize = 80000;

#[derive(Debug, Parser)]
#[clap(name = "inbox-triage")]
#[clap(author, version, about)]
pub struct Args {
    /// Directory holding the working files (report, ledger, filter XML).
    #[clap(short, long, default_value = ".")]
    pub dir: PathBuf,
    /// Suppress any progress output if set.
    #[clap(short, long)]
    pub quiet: bool,
    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Fetch message metadata and count senders with no filter rule yet.
    Scan {
        /// How many messages to read.
        #[clap(short = 'n', long, default_value_t = DEFAULT_COUNT)]
        count: usize,
    },
    /// Interactively assign labels to senders from the last scan.
    Tag,
    /// Merge the tagging ledger into a new filter-import file.
    Generate,
}

/// Well-known file locations inside the working directory.
#[derive(Debug)]
pub struct Workspace {
    pub credentials: PathBuf,
    pub token: PathBuf,
    pub filters: PathBuf,
    pub report: PathBuf,
    pub ledger: PathBuf,
    pub labels: PathBuf,
    pub output: PathBuf,
}

impl Args {
    pub fn workspace(&self) -> Workspace {
        Workspace {
            credentials: self.dir.join("credentials.json"),
            token: self.dir.join("token.json"),
            filters: self.dir.join("mailFilters.xml"),
            report: self.dir.join("output.txt"),
            ledger: self.dir.join("xmlupdate.txt"),
            labels: self.dir.join("labels.txt"),
            output: self.dir.join("newMailFilters.xml"),
        }
    }
}
