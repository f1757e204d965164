//! veHNT voting power engine
//!
//! Computes the HNT a wallet has delegated to a Helium sub-DAO, with and
//! without vote multipliers, straight from on-chain accounts. Also exposes the
//! hnt-explorer delegation statistics and per-epoch reward estimates.

pub mod accounts;
pub mod collectibles;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod pda;
pub mod rewards;
pub mod stats;

pub use config::EngineConfig;
pub use constants::SubDao;
pub use engine::{AggregationMode, VotingPower, VotingPowerEngine};
pub use error::{EngineError, Result};
