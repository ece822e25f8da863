use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use schwab_history::client::CancelSignal;
use schwab_history::config::{default_config_path, ResolvedConfig};
use schwab_history::duration::{format_duration, parse_duration};
use schwab_history::report::{log_report, report};
use schwab_history::{TransactionService, ValidationMode};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| format!("{e} (expected YYYY-MM-DD)"))
}

#[derive(Parser, Debug)]
#[command(name = "schwab-history")]
#[command(about = "Fetch and validate Schwab account transaction history")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List linked accounts and their hashes
    Accounts,

    /// Fetch, validate and print transactions for a date range
    Transactions {
        /// Account number as shown by `accounts`
        #[arg(long)]
        account: String,

        #[arg(long, value_parser = parse_date_arg)]
        from: NaiveDate,

        /// Inclusive end date
        #[arg(long, value_parser = parse_date_arg)]
        to: NaiveDate,

        /// Skip invalid records instead of failing
        #[arg(long)]
        lenient: bool,

        /// Only fetch one transaction type (e.g. TRADE)
        #[arg(long = "type", value_name = "TYPE")]
        types: Option<String>,

        /// Give up after this long (e.g. "5m")
        #[arg(long, value_name = "DURATION", value_parser = parse_duration_arg)]
        timeout: Option<Duration>,

        /// Print records as JSON on stdout instead of the text report
        #[arg(long)]
        raw: bool,
    },

    /// List option legs traded in a date range
    Options {
        #[arg(long)]
        account: String,

        #[arg(long, value_parser = parse_date_arg)]
        from: NaiveDate,

        #[arg(long, value_parser = parse_date_arg)]
        to: NaiveDate,

        /// Only legs on this underlying symbol
        #[arg(long)]
        underlying: Option<String>,
    },

    /// Show current configuration
    Config,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = ResolvedConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;

    match cli.command {
        Command::Config => {
            println!("Config file: {}", config.config_path.display());
            println!("Token file: {}", config.token_file.display());
            println!(
                "Request timeout: {}",
                format_duration(config.config.client.request_timeout)
            );
            println!();
            print!("{}", toml::to_string_pretty(&config.config)?);
        }
        Command::Accounts => {
            let service = TransactionService::connect(&config)?;
            for account in service.list_accounts().await? {
                println!("{}\t{}", account.account_number, account.account_hash);
            }
        }
        Command::Transactions {
            account,
            from,
            to,
            lenient,
            types,
            timeout,
            raw,
        } => {
            let mut service = TransactionService::connect(&config)?.with_types(types);
            if lenient {
                service = service.with_validation(ValidationMode::Lenient);
            }
            let cancel = match timeout {
                Some(timeout) => CancelSignal::new().with_timeout(timeout),
                None => CancelSignal::new(),
            };

            let batch = service
                .get_transactions_with(&account, from, to, &cancel)
                .await?;
            if raw {
                println!("{}", serde_json::to_string_pretty(&batch.records)?);
            } else if cli.json {
                log_report(&batch.records);
            } else {
                for line in report(&batch.records) {
                    println!("{line}");
                }
            }
            if batch.skipped_count() > 0 || batch.duplicates > 0 {
                eprintln!(
                    "{} records, {} skipped as invalid, {} duplicates dropped",
                    batch.records.len(),
                    batch.skipped_count(),
                    batch.duplicates
                );
            }
        }
        Command::Options {
            account,
            from,
            to,
            underlying,
        } => {
            let service = TransactionService::connect(&config)?;
            let legs = service
                .get_option_legs(&account, from, to, underlying.as_deref(), &CancelSignal::new())
                .await?;
            for leg in legs {
                println!(
                    "{} {} {} {} {} qty {}{}",
                    leg.timestamp.format("%Y-%m-%d"),
                    leg.contract.underlying,
                    leg.contract.expiration,
                    leg.contract.put_call,
                    leg.contract.strike.normalize(),
                    leg.quantity.normalize(),
                    leg.position_effect
                        .map(|e| format!(" [{e}]"))
                        .unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}
