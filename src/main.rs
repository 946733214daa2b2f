//! Twack CLI
//!
//! Track who follows an account, and whom it follows, over time.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use twack::config::AppConfig;
use twack::logging::{self, LogFormat};
use twack::twitter::{Offline, SocialApi, TwitterClient};
use twack::{db, Application, Event};

#[derive(Debug, Parser)]
#[command(name = "twack", version)]
#[command(about = "Track your follows and followers", long_about = None)]
struct Cli {
    /// Database file (overrides TWACK_DB_PATH and config files)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Initialise an empty database
    Initdb,
    /// Destroy an existing database schema
    Blitz,
    /// Load and store an account's current friends and followers
    Load { screen_name: String },
    /// Regenerate an account's events from its stored loads
    Rebuild { screen_name: String },
    /// Print an account's follow/unfollow history
    Events {
        screen_name: String,
        /// Write CSV to stdout instead of a table
        #[arg(long)]
        csv: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    logging::init(LogFormat::from_env(), cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Credentials are checked before anything touches the database
    let api: Box<dyn SocialApi> = match cli.command {
        Commands::Load { .. } => Box::new(TwitterClient::new(config.twitter()?)),
        _ => Box::new(Offline),
    };

    let mut db_config = config.database()?;
    if let Some(path) = cli.db {
        db_config.path = path;
    }
    let conn = db::open(&db_config.path, db_config.busy_timeout)
        .with_context(|| format!("Failed to open database {}", db_config.path.display()))?;
    let mut app = Application::new(conn, api);

    match cli.command {
        Commands::Initdb => {
            println!("Init database");
            app.initialize_schema()?;
        }
        Commands::Blitz => {
            app.reset_schema()?;
            println!("✓ Schema dropped");
        }
        Commands::Load { screen_name } => {
            let report = app
                .ingest_for_handle(&screen_name)
                .with_context(|| format!("Failed to load @{}", screen_name))?;
            println!("✓ Stored load #{} for @{}", report.load_id, screen_name);
            println!("  events generated:   {}", report.generated);
            if report.invalidated > 0 {
                println!("  events invalidated: {}", report.invalidated);
            }
        }
        Commands::Rebuild { screen_name } => match app.rebuild_events(&screen_name)? {
            Some(count) => println!("✓ Rebuilt {} events for @{}", count, screen_name),
            None => println!("Unknown account @{} (run `twack load` first)", screen_name),
        },
        Commands::Events { screen_name, csv } => match app.history(&screen_name)? {
            Some(events) if csv => write_csv(&events)?,
            Some(events) => print_table(&events),
            None => println!("Unknown account @{} (run `twack load` first)", screen_name),
        },
    }

    Ok(())
}

fn write_csv(events: &[Event]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    for event in events {
        wtr.serialize(event)?;
    }
    wtr.flush()?;
    Ok(())
}

fn print_table(events: &[Event]) {
    if events.is_empty() {
        println!("No events yet (needs at least two loads)");
        return;
    }

    println!(
        "{:<21} {:<21} {:>20} {:<8} {:>20}",
        "from", "until", "subject", "verb", "object"
    );
    for event in events {
        println!(
            "{:<21} {:<21} {:>20} {:<8} {:>20}",
            event.event_start_dt.format("%Y-%m-%d %H:%M:%S"),
            event.event_end_dt.format("%Y-%m-%d %H:%M:%S"),
            event.subject_id,
            event.verb.as_str(),
            event.object_id,
        );
    }
    println!("\n{} events", events.len());
}
