//! `vehnt` command line
//!
//! Results are printed to stdout as JSON. Configuration comes from the
//! environment (see `EngineConfig`), or from a TOML file given with
//! `--config` / `VEHNT_CONFIG`.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use tracing::info;

use vehnt_engine::logging::init_subscriber;
use vehnt_engine::rewards::{estimate_for, parse_vehnt_amount};
use vehnt_engine::stats::{vehnt_by_epoch, StatsClient};
use vehnt_engine::{EngineConfig, SubDao, VotingPowerEngine};

#[derive(Parser, Debug)]
#[command(name = "vehnt")]
#[command(version)]
#[command(
    about = "veHNT voting power and delegation rewards for Helium sub-DAOs",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file. Environment variables still override it.
    #[arg(short, long, global = true, env = "VEHNT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Voting power a wallet has delegated to a sub-DAO
    Power {
        /// Wallet address
        #[arg(value_parser = Pubkey::from_str)]
        owner: Pubkey,

        /// Sub-DAO: iot or mobile
        #[arg(short, long, default_value = "iot", value_parser = SubDao::from_str)]
        sub_dao: SubDao,
    },

    /// Expected per-epoch reward for an amount of veHNT
    Estimate {
        /// veHNT amount, at most 8 decimals
        #[arg(value_parser = parse_vehnt_amount)]
        vehnt: f64,

        /// Sub-DAO: iot or mobile
        #[arg(short, long, default_value = "iot", value_parser = SubDao::from_str)]
        sub_dao: SubDao,
    },

    /// Delegation stats per sub-DAO
    Stats,

    /// veHNT delegated to a sub-DAO at the start of each epoch
    Epochs {
        /// Sub-DAO: iot or mobile
        #[arg(short, long, default_value = "iot", value_parser = SubDao::from_str)]
        sub_dao: SubDao,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::from_env()?,
    };
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Power { owner, sub_dao } => {
            let engine = VotingPowerEngine::from_config(&config)?;
            info!(
                %owner,
                %sub_dao,
                mode = %engine.mode(),
                rpc = %config.rpc_endpoint,
                "Starting voting power lookup"
            );
            let power = engine.compute_voting_power(&owner, sub_dao).await?;
            print_json(&power)?;
        }
        Commands::Estimate { vehnt, sub_dao } => {
            let stats = StatsClient::new(&config.stats_api_url)?;
            let info = stats.delegated_stakes_info().await?;
            let estimate = estimate_for(sub_dao, vehnt, &info, Utc::now())?;
            print_json(&estimate)?;
        }
        Commands::Stats => {
            let stats = StatsClient::new(&config.stats_api_url)?;
            print_json(&stats.delegated_stakes_info().await?)?;
        }
        Commands::Epochs { sub_dao } => {
            let stats = StatsClient::new(&config.stats_api_url)?;
            let epochs = stats.epoch_info().await?;
            print_json(&vehnt_by_epoch(&epochs, sub_dao))?;
        }
    }

    Ok(())
}
