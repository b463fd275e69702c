mod address;
mod args;
mod auth;
mod filters;
mod generate;
mod gmail;
mod ledger;
mod report;
mod scan;
mod tag;
mod utils;

use crate::args::{Args, Command, DEFAULT_COUNT};
use anyhow::Result;
use clap::Parser;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use env_logger::Env;
use std::process;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(err) = do_main(&args) {
        eprintln!("Error: {:#}", err);
        process::exit(1);
    }
}

fn do_main(args: &Args) -> Result<()> {
    let command = match &args.command {
        Some(command) => command.clone(),
        None => match choose_command()? {
            Some(command) => command,
            None => return Ok(()),
        },
    };
    match command {
        Command::Scan { count } => scan::run(args, count),
        Command::Tag => tag::run(args),
        Command::Generate => generate::run(args),
    }
}

/// The menu shown when the binary is invoked without a subcommand.
fn choose_command() -> Result<Option<Command>> {
    const CHOICES: &[&str] = &[
        "Scan - read message metadata and index senders with no filter rule [takes a long time]",
        "Tag - assign a label to each indexed sender so it gets binned correctly",
        "Generate - build the filter XML file that can be uploaded to Gmail",
    ];
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Choose a job to run")
        .items(CHOICES)
        .default(0)
        .interact_opt()?;
    Ok(selection.map(|choice| match choice {
        0 => Command::Scan {
            count: DEFAULT_COUNT,
        },
        1 => Command::Tag,
        _ => Command::Generate,
    }))
}
