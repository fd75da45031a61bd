// bdaycal - birthday events for a Google calendar
// Command-line entry point

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::{debug, info};

use bdaycal::command_handlers::{CommandHandlers, SyncRequest};
use bdaycal::config::AppConfig;
use bdaycal::utils::logging;
use bdaycal::SyncReport;

#[derive(Parser)]
#[command(name = "bdaycal", version)]
#[command(about = "Create \"Nth Birthday\" events on a Google calendar from a birthday list")]
struct Cli {
    /// Configuration file (default: <config dir>/bday-calendar/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging; repeat for trace output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add birthday events for a range of years (the default command)
    Sync {
        /// First year to add
        #[arg(long)]
        from: Option<i32>,

        /// Last year to add, inclusive
        #[arg(long)]
        to: Option<i32>,

        /// Birthday file, one `last,first,YYYY-MM-DD` per line
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Calendar display name
        #[arg(short, long)]
        calendar: Option<String>,

        /// Print the events that would be added without contacting the calendar
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete every event whose title starts with PREFIX
    Remove {
        prefix: String,

        /// Start of the search range (YYYY-MM-DD, default 2015-01-01)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// End of the search range (YYYY-MM-DD, default 2053-01-01)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Calendar display name
        #[arg(short, long)]
        calendar: Option<String>,
    },
    /// List the calendars visible to the account
    Calendars,
}

fn print_report(report: &SyncReport) {
    println!(
        "inserted {}, already present {}, leap-day skipped {}, deleted {}, already gone {}",
        report.inserted, report.already_present, report.leap_day_skipped, report.deleted, report.already_gone
    );
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    debug!("Configuration: {:?}", config);

    let command = cli.command.unwrap_or(Commands::Sync {
        from: None,
        to: None,
        file: None,
        calendar: None,
        dry_run: false,
    });

    match command {
        Commands::Sync {
            from,
            to,
            file,
            calendar,
            dry_run,
        } => {
            let handlers = CommandHandlers::new(config);
            let request = SyncRequest { from, to, file, calendar };

            if dry_run {
                let plans = handlers.plan_sync(&request).context("Failed to plan sync")?;
                for plan in &plans {
                    for event in &plan.events {
                        println!("{}\t{}", event.date, event.title);
                    }
                }
                info!("Dry run: {} events planned", plans.iter().map(|p| p.events.len()).sum::<usize>());
                return Ok(());
            }

            let service = handlers.calendar_service().context("Failed to set up calendar client")?;
            let report = handlers.run_sync(service, &request).await.context("Sync failed")?;
            print_report(&report);
        }
        Commands::Remove {
            prefix,
            start,
            end,
            calendar,
        } => {
            if let Some(calendar) = calendar {
                config.calendar_name = calendar;
            }
            let handlers = CommandHandlers::new(config);
            let service = handlers.calendar_service().context("Failed to set up calendar client")?;
            let report = handlers
                .run_remove(service, &prefix, start, end)
                .await
                .with_context(|| format!("Failed to remove events starting with '{}'", prefix))?;
            print_report(&report);
        }
        Commands::Calendars => {
            let handlers = CommandHandlers::new(config);
            let service = handlers.calendar_service().context("Failed to set up calendar client")?;
            let calendars = handlers.list_calendars(service).await.context("Failed to list calendars")?;
            for calendar in calendars {
                println!("{}\t{}", calendar.display_name, calendar.id);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(cli).await {
        logging::log_error_with_context(&e, "bdaycal");
        std::process::exit(1);
    }
}
