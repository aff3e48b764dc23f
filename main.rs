mod config;
mod csv_row;
mod db;
mod error;
mod loader;
mod models;
mod normalize;
mod queries;
mod schema;

use crate::config::Settings;
use crate::db::DbPool;
use crate::error::{Error, Result};
use crate::models::{MarketDetail, MarketSummary, NewReview, Page, Rating};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "markets")]
#[command(about = "Import and browse a farmers' market catalog", long_about = None)]
struct Cli {
    /// Catalog database file
    #[arg(long, global = true, env = "MARKETS_DB")]
    db: Option<PathBuf>,

    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a fresh catalog and import a market export into it
    Create {
        /// Market export CSV
        #[arg(value_name = "CSV")]
        csv: PathBuf,

        /// Delete an existing database file first (irreversible)
        #[arg(long)]
        force: bool,
    },
    /// List markets by name, one page at a time
    List {
        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Find markets in a city and state
    Search {
        #[arg(long)]
        city: String,
        #[arg(long)]
        state: String,
    },
    /// Find markets by ZIP code
    Zip { zip: String },
    /// Show one market with its categories and reviews
    Show { id: i64 },
    /// Delete a market
    Delete { id: i64 },
    /// Add a review to a market
    Review {
        id: i64,
        #[arg(long)]
        first: String,
        #[arg(long)]
        last: String,
        /// Whole number from 1 to 5
        #[arg(long)]
        rating: String,
        #[arg(long)]
        content: Option<String>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run(Cli::parse()) {
        log::error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(db) = cli.db {
        settings.database_path = db;
    }

    match cli.command {
        Command::Create { csv, force } => {
            let summary = db::create_database(&settings.database_path, force, |conn| {
                loader::import_csv(conn, &csv, &settings.layout)
            })?;
            if cli.json {
                return print_json(&summary);
            }
            println!(
                "Imported {} rows: {} markets, {} cities, {} states, {} categories, {} links ({} rows without city/state skipped)",
                summary.rows,
                summary.normalized.markets,
                summary.normalized.cities,
                summary.normalized.states,
                summary.categories,
                summary.normalized.links,
                summary.normalized.dropped,
            );
        }
        Command::List { page } => {
            let pool = open(&settings)?;
            let conn = pool.get()?;
            let page = Page {
                number: page.saturating_sub(1),
                size: settings.page_size,
            };
            let total = queries::count_markets(&conn)?;
            let markets = queries::list_markets(&conn, page)?;
            if cli.json {
                return print_json(&markets);
            }
            let pages = (total + i64::from(page.size) - 1) / i64::from(page.size);
            print_summaries(&markets);
            println!("Page {} of {} ({} markets)", page.number + 1, pages.max(1), total);
        }
        Command::Search { city, state } => {
            let pool = open(&settings)?;
            let conn = pool.get()?;
            let markets = queries::search_by_city_state(&conn, &city, &state)?;
            if cli.json {
                return print_json(&markets);
            }
            print_summaries(&markets);
        }
        Command::Zip { zip } => {
            let pool = open(&settings)?;
            let conn = pool.get()?;
            let markets = queries::search_by_zip(&conn, &zip)?;
            if cli.json {
                return print_json(&markets);
            }
            print_summaries(&markets);
        }
        Command::Show { id } => {
            let pool = open(&settings)?;
            let conn = pool.get()?;
            let detail = queries::get_market(&conn, id)?.ok_or(Error::NotFound(id))?;
            if cli.json {
                return print_json(&detail);
            }
            print_detail(&detail);
        }
        Command::Delete { id } => {
            let pool = open(&settings)?;
            let conn = pool.get()?;
            queries::delete_market(&conn, id)?;
            println!("Deleted market {id}");
        }
        Command::Review {
            id,
            first,
            last,
            rating,
            content,
        } => {
            let review = NewReview {
                first_name: first,
                last_name: last,
                rating: rating.parse::<Rating>()?,
                content,
            };
            let pool = open(&settings)?;
            let conn = pool.get()?;
            let review_id = queries::add_review(&conn, id, &review)?;
            println!("Saved review {review_id} for market {id}");
        }
    }
    Ok(())
}

fn open(settings: &Settings) -> Result<DbPool> {
    db::open_database(&settings.database_path)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_summaries(markets: &[MarketSummary]) {
    if markets.is_empty() {
        println!("No markets found.");
        return;
    }
    for market in markets {
        println!(
            "{:>8}  {:<50}  {}, {} {}",
            market.id,
            market.name.as_deref().unwrap_or("(unnamed)"),
            market.city.as_deref().unwrap_or("-"),
            market.state.as_deref().unwrap_or("-"),
            market.zip.as_deref().unwrap_or(""),
        );
    }
}

fn print_detail(detail: &MarketDetail) {
    println!("{} (#{})", detail.name.as_deref().unwrap_or("(unnamed)"), detail.id);
    if let Some(street) = &detail.street {
        println!("  {street}");
    }
    println!(
        "  {}, {} {}",
        detail.city.as_deref().unwrap_or("-"),
        detail.state.as_deref().unwrap_or("-"),
        detail.zip.as_deref().unwrap_or("")
    );
    if let (Some(x), Some(y)) = (detail.x, detail.y) {
        println!("  Coordinates: {x}, {y}");
    }
    if detail.categories.is_empty() {
        println!("  Categories: none");
    } else {
        println!("  Categories: {}", detail.categories.join(", "));
    }
    if detail.reviews.is_empty() {
        println!("  No reviews yet.");
        return;
    }
    println!("  Reviews:");
    for review in &detail.reviews {
        let date = chrono::DateTime::from_timestamp(review.created_at, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "    {}/{} by {} {} on {}{}",
            review.rating,
            Rating::MAX,
            review.first_name,
            review.last_name,
            date,
            review
                .content
                .as_deref()
                .map(|c| format!(": {c}"))
                .unwrap_or_default()
        );
    }
}
