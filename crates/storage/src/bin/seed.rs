use std::fmt;

use practice_core::model::SourceId;
use storage::repository::Storage;
use storage::seed::{SeedOptions, seed_demo};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    options: SeedOptions,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidExercises { raw: String },
    InvalidSource { flag: &'static str },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidExercises { raw } => write!(f, "invalid --exercises value: {raw}"),
            ArgsError::InvalidSource { flag } => write!(f, "{flag} must not be empty"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn require_source(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<SourceId, ArgsError> {
    let value = require_value(args, flag)?;
    if value.trim().is_empty() {
        return Err(ArgsError::InvalidSource { flag });
    }
    Ok(SourceId::new(value))
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("PRACTICE_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut options = SeedOptions::default();
        if let Some(count) = std::env::var("PRACTICE_SEED_EXERCISES")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
        {
            options.exercises = count;
        }

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--bank-id" => {
                    options.exercise_source = require_source(&mut args, "--bank-id")?;
                }
                "--homework-id" => {
                    options.homework_source = require_source(&mut args, "--homework-id")?;
                }
                "--exercises" => {
                    let value = require_value(&mut args, "--exercises")?;
                    options.exercises = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidExercises { raw: value.clone() })?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url, options })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --bank-id <id>            Exercise bank source id (default: demo-bank)");
    eprintln!("  --homework-id <id>        Homework source id (default: demo-homework)");
    eprintln!("  --exercises <n>           Number of exercise items to upsert (default: 6)");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  PRACTICE_DB_URL, PRACTICE_SEED_EXERCISES");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let summary = seed_demo(&storage, &args.options).await?;

    println!(
        "Seeded {} exercises into {} and {} homework items into {} ({})",
        summary.exercises,
        args.options.exercise_source,
        summary.homework,
        args.options.homework_source,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
