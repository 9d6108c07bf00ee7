//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `docmap_core` linkage.
//! - Run table probes against a store configured through `DOCMAP_*`
//!   environment variables.

use docmap_core::{open_template, DocumentOperations, StoreConfig};
use log::info;
use std::process::ExitCode;

const USAGE: &str = "usage: docmap_cli <ping|version|exists <table>|create <table>|count <table>>";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), String> {
    let (command, table) = match args {
        [command] => (command.as_str(), None),
        [command, table] => (command.as_str(), Some(table.as_str())),
        _ => return Err(USAGE.to_string()),
    };

    match (command, table) {
        ("ping", None) => {
            println!("docmap_core ping={}", docmap_core::ping());
            Ok(())
        }
        ("version", None) => {
            println!("docmap_core version={}", docmap_core::core_version());
            Ok(())
        }
        ("exists" | "create" | "count", Some(table)) => run_table_command(command, table),
        _ => Err(USAGE.to_string()),
    }
}

fn run_table_command(command: &str, table: &str) -> Result<(), String> {
    let config = StoreConfig::from_env().map_err(|err| err.to_string())?;
    if let Some(settings) = &config.log {
        settings.init().map_err(|err| err.to_string())?;
    }
    info!("event=cli_command module=cli status=start command={command}");

    let template = open_template(&config).map_err(|err| err.to_string())?;
    match command {
        "exists" => {
            let exists = template.table_exists(table).map_err(|err| err.to_string())?;
            println!("{} exists={exists}", template.absolute_path(table));
        }
        "create" => {
            template.create_table(table).map_err(|err| err.to_string())?;
            println!("{} created", template.absolute_path(table));
        }
        _ => {
            let count = template.count_in(table).map_err(|err| err.to_string())?;
            println!("{} count={count}", template.absolute_path(table));
        }
    }
    Ok(())
}
