//! depositd - Deposit Pipeline Launcher
//!
//! Run modes:
//!   depositd run                              - Start watchers, monitor and API
//!   depositd assign-address <user> <currency> - Assign a deposit address
//!   depositd history <user> [currency]        - Print a user's deposits
//!   depositd balance <user> <currency>        - Print a user's balance

use depositd::common::{init_from_config, log_system_event};
use depositd::types::{units_to_display, Currency};
use depositd::{DepositService, DepositdConfig, DepositdError};
use std::env;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let result = match args[1].as_str() {
        "run" => run(&args[2..]).await,
        "assign-address" => assign_address(&args[2..]).await,
        "history" => history(&args[2..]).await,
        "balance" => balance(&args[2..]).await,
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error [{}]: {}", e.error_code(), e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    println!("depositd - Multi-chain Deposit Pipeline");
    println!();
    println!("Usage:");
    println!("  depositd run [--port <port>] [--no-api]          Start the pipeline");
    println!("  depositd assign-address <user_id> <currency>     Assign a deposit address");
    println!("  depositd history <user_id> [currency]            List a user's deposits");
    println!("  depositd balance <user_id> <currency>            Show a user's balance");
    println!();
    println!("Environment Variables:");
    println!("  DEPOSITD_NETWORK            mainnet | testnet | regtest (default: regtest)");
    println!("  DEPOSITD_DATABASE_PATH      SQLite database file");
    println!("  DEPOSITD_CURRENCIES         Comma-separated list, e.g. BTC,ETH");
    println!("  DEPOSITD_BTC_RPC_URL        Bitcoin Core JSON-RPC endpoint");
    println!("  DEPOSITD_BTC_RPC_USER       Bitcoin Core RPC user");
    println!("  DEPOSITD_BTC_RPC_PASSWORD   Bitcoin Core RPC password");
    println!("  DEPOSITD_ETH_RPC_URL        Ethereum JSON-RPC endpoint");
    println!("  DEPOSITD_ETH_WS_URL         Ethereum WebSocket endpoint (newHeads)");
    println!("  DEPOSITD_API_PORT           REST API port (default: 3001)");
    println!("  DEPOSITD_LOG_LEVEL          trace | debug | info | warn | error");
}

fn load_config() -> Result<DepositdConfig, DepositdError> {
    let config = DepositdConfig::from_env()?;
    init_from_config(&config)?;
    Ok(config)
}

fn parse_currency(raw: Option<&String>) -> Result<Currency, DepositdError> {
    let raw = raw.ok_or_else(|| DepositdError::validation("currency is required"))?;
    raw.parse().map_err(DepositdError::validation)
}

async fn run(args: &[String]) -> Result<(), DepositdError> {
    let mut config = load_config()?;
    let mut with_api = true;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.api_port = args[i + 1]
                    .parse()
                    .map_err(|_| DepositdError::validation("--port expects a number"))?;
                i += 2;
            }
            "--no-api" => {
                with_api = false;
                i += 1;
            }
            _ => i += 1,
        }
    }

    if config.network == depositd::Network::Mainnet {
        config.validate_for_production()?;
    }
    config.log_summary();

    let mut service = DepositService::from_config(config)?;
    service.start();
    if with_api {
        service.spawn_api();
    }

    tokio::signal::ctrl_c().await?;
    log_system_event("Shutdown requested", serde_json::json!({}));
    service.shutdown().await
}

async fn assign_address(args: &[String]) -> Result<(), DepositdError> {
    let user_id = args
        .first()
        .ok_or_else(|| DepositdError::validation("user_id is required"))?;
    let currency = parse_currency(args.get(1))?;

    let service = DepositService::from_config(load_config()?)?;
    let address = service.directory().assign_address(user_id, currency).await?;

    println!("{} deposit address for {}: {}", currency, user_id, address.address);
    Ok(())
}

async fn history(args: &[String]) -> Result<(), DepositdError> {
    let user_id = args
        .first()
        .ok_or_else(|| DepositdError::validation("user_id is required"))?;
    let currency = args.get(1).map(|c| parse_currency(Some(c))).transpose()?;

    let service = DepositService::from_config(load_config()?)?;
    let transactions = service.processor().transaction_history(user_id, currency).await?;

    if transactions.is_empty() {
        println!("No deposits for {}", user_id);
        return Ok(());
    }
    for tx in transactions {
        println!(
            "{:<10} {:<5} {:>4} conf  {}  {}",
            tx.status.to_string(),
            tx.currency.to_string(),
            tx.confirmations,
            units_to_display(tx.amount, &tx.currency.to_string()),
            tx.tx_hash
        );
    }
    Ok(())
}

async fn balance(args: &[String]) -> Result<(), DepositdError> {
    let user_id = args
        .first()
        .ok_or_else(|| DepositdError::validation("user_id is required"))?;
    let currency = parse_currency(args.get(1))?;

    let service = DepositService::from_config(load_config()?)?;
    let amount = service
        .processor()
        .balance(user_id, currency)
        .await?
        .map(|b| b.amount)
        .unwrap_or(0);

    println!("{} {}: {}", user_id, currency, units_to_display(amount, &currency.to_string()));
    Ok(())
}
