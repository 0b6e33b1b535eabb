mod cli;
mod logger;
mod progress;

use clap::{ColorChoice, Parser};
use cli::Args;
use kdam::{term, term::Colorizer};
use std::{
    io::{IsTerminal, stderr},
    process,
};

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    term::init(match args.color {
        ColorChoice::Always => true,
        ColorChoice::Auto => stderr().is_terminal(),
        ColorChoice::Never => false,
    });
    logger::init(args.verbose, args.quiet);

    args.execute().await
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {:#}", "error".colorize("bold red"), e);
        process::exit(1);
    }
}
