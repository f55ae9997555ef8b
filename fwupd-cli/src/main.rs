// Licensed under the Apache-2.0 license

//! `bmc-fwupd`: the update orchestrator binary (SPEC_FULL.md's CLI
//! section). Library crates log through `log` and never install a logger
//! themselves; only this entry point does, matching the teacher's split
//! between its libraries and its binaries.

mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;

#[derive(Parser)]
#[command(name = "bmc-fwupd", version, about = "Firmware update orchestrator")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the long-lived watch loop for one configured domain.
    Run {
        /// Path to the domain's TOML configuration file.
        #[arg(short, long)]
        config: PathBuf,

        /// The machine name this board identifies as (spec.md 4.1 step 5).
        #[arg(short, long)]
        machine: String,
    },
    /// Parse a MANIFEST file and print its fields without applying anything.
    ManifestCheck {
        /// Path to a MANIFEST file, as produced by extracting an update package.
        #[arg(short, long)]
        manifest: PathBuf,
    },
}

fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn manifest_check(path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let manifest = fwupd_core::Manifest::parse(&text)?;
    println!("version:      {}", manifest.version);
    println!("purpose:      {}", manifest.purpose());
    println!("machine_name: {}", manifest.machine_name);
    println!("compatible:   {}", manifest.compatible_names.join(", "));
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let _ = simple_logger::SimpleLogger::new()
        .with_level(level_for(cli.verbose))
        .init();

    let result = match &cli.command {
        Commands::Run { config, machine } => run::run(config, machine),
        Commands::ManifestCheck { manifest } => manifest_check(manifest),
    };

    if let Err(e) = result {
        log::error!("{e}");
        std::process::exit(1);
    }
}
