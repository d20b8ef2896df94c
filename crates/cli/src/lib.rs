pub mod commands;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "claimlens",
    about = "ClaimLens operator CLI",
    long_about = "Inspect configuration, prepare the claims database, and query claim analytics as JSON.",
    after_help = "Examples:\n  claimlens doctor --json\n  claimlens seed\n  claimlens insights CLM-1000\n  claimlens trends Sales --months 3"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo organisation and verify it")]
    Seed {
        #[arg(long, help = "Anchor date for the demo claims (defaults to today)")]
        as_of: Option<NaiveDate>,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, database connectivity and schema version")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Related claims by amount, category and employee, with pattern statistics")]
    Similar {
        claim_id: String,
    },
    #[command(about = "Natural-language insights for one claim")]
    Insights {
        claim_id: String,
    },
    #[command(about = "Approval history of one claim")]
    History {
        claim_id: String,
    },
    #[command(about = "Department rollup: spend, budget utilization, top categories")]
    Department {
        name: String,
        #[arg(long, help = "Reference date for the rollup window (defaults to today)")]
        as_of: Option<NaiveDate>,
    },
    #[command(about = "Monthly spend trend for a department")]
    Trends {
        name: String,
        #[arg(long, help = "Number of calendar months, ending with the current one")]
        months: Option<u32>,
        #[arg(long, help = "Reference date for the trend window (defaults to today)")]
        as_of: Option<NaiveDate>,
    },
    #[command(about = "Roll up several departments side by side")]
    Compare {
        #[arg(required = true, num_args = 1..)]
        names: Vec<String>,
        #[arg(long, help = "Reference date for the rollup window (defaults to today)")]
        as_of: Option<NaiveDate>,
    },
    #[command(about = "Spend and approval rollup for one employee")]
    Employee {
        employee_id: String,
        #[arg(long, help = "Number of calendar months, ending with the current one")]
        months: Option<u32>,
        #[arg(long, help = "Reference date for the rollup window (defaults to today)")]
        as_of: Option<NaiveDate>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { as_of } => commands::seed::run(as_of),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Similar { claim_id } => commands::analytics::similar(&claim_id),
        Command::Insights { claim_id } => commands::analytics::insights(&claim_id),
        Command::History { claim_id } => commands::analytics::history(&claim_id),
        Command::Department { name, as_of } => commands::analytics::department(&name, as_of),
        Command::Trends { name, months, as_of } => {
            commands::analytics::trends(&name, months, as_of)
        }
        Command::Compare { names, as_of } => commands::analytics::compare(&names, as_of),
        Command::Employee { employee_id, months, as_of } => {
            commands::analytics::employee(&employee_id, months, as_of)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
