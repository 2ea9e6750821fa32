use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lodging_scout::config::AcquisitionConfig;
use lodging_scout::models::DestinationQuery;
use lodging_scout::scrapers::types::{DateRange, Party, SearchRequest};
use lodging_scout::scrapers::worker::{emit_payload, run_worker_process};
use lodging_scout::Acquisition;

#[derive(Parser)]
#[command(
    name = "lodging-scout",
    about = "Lodging offers with live, proxy, cache and synthetic fallbacks"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Acquire offers for a destination and print them as JSON
    Search {
        destination: String,
        #[arg(long = "max")]
        max_offers: Option<usize>,
        #[arg(long)]
        check_in: Option<NaiveDate>,
        #[arg(long)]
        check_out: Option<NaiveDate>,
        #[arg(long)]
        adults: Option<u32>,
        #[arg(long)]
        rooms: Option<u32>,
    },
    /// Scrape one search page in headless Chrome and print a single JSON line
    #[command(hide = true)]
    Worker {
        destination: String,
        max_offers: usize,
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        headless: bool,
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        use_proxy: bool,
        check_in: Option<NaiveDate>,
        check_out: Option<NaiveDate>,
        adults: Option<u32>,
        rooms: Option<u32>,
        currency: Option<String>,
    },
}

fn stay(check_in: Option<NaiveDate>, check_out: Option<NaiveDate>) -> Option<DateRange> {
    match (check_in, check_out) {
        (Some(check_in), Some(check_out)) => Some(DateRange::new(check_in, check_out)),
        (Some(check_in), None) => {
            let check_out = check_in + chrono::Duration::days(1);
            Some(DateRange::new(check_in, check_out))
        }
        _ => None,
    }
}

fn party(adults: Option<u32>, rooms: Option<u32>) -> Option<Party> {
    if adults.is_none() && rooms.is_none() {
        return None;
    }
    let defaults = Party::default();
    Some(Party {
        adults: adults.unwrap_or(defaults.adults).max(1),
        rooms: rooms.unwrap_or(defaults.rooms).max(1),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so a worker's stdout carries nothing but its payload
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Search {
            destination,
            max_offers,
            check_in,
            check_out,
            adults,
            rooms,
        } => {
            let config = AcquisitionConfig::from_env()?;
            let acquisition = Acquisition::from_config(&config)?;

            let offers = acquisition
                .acquire_offers(
                    &destination,
                    stay(check_in, check_out),
                    party(adults, rooms),
                    max_offers,
                )
                .await?;

            if let Some(first) = offers.first() {
                info!("🏨 {} offers from the {} tier", offers.len(), first.source);
            }
            println!("{}", serde_json::to_string_pretty(&offers)?);
        }
        Command::Worker {
            destination,
            max_offers,
            headless,
            use_proxy,
            check_in,
            check_out,
            adults,
            rooms,
            currency,
        } => {
            let query =
                DestinationQuery::parse(&destination).context("Worker needs a destination")?;
            let mut request = SearchRequest::new(query)
                .with_stay(stay(check_in, check_out))
                .with_party(party(adults, rooms))
                .with_max_offers(Some(max_offers));
            if let Some(currency) = currency {
                request = request.with_currency(currency.to_uppercase());
            }

            let payload = run_worker_process(&request, headless, use_proxy).await;
            emit_payload(&payload, &mut std::io::stdout().lock())?;
        }
    }

    Ok(())
}
