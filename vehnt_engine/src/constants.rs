use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey, pubkey::Pubkey};

use crate::error::EngineError;

// Programs
pub const VOTER_STAKE_REGISTRY_PROGRAM_ID: Pubkey =
    pubkey!("hvsrNC3NKbcryqDs2DocYHZ9yPKEVzdSjQG6RVtK1s8");
pub const HELIUM_SUB_DAOS_PROGRAM_ID: Pubkey =
    pubkey!("hdaoVTCqhfHHo75XdAMxBKdUqvq1i5bF23sisBqVgGR");
pub const GOVERNANCE_PROGRAM_ID: Pubkey = pubkey!("hgovkRU6Ghe1Qoyb54HdSLdqN7VtxaifBzRmh9jtd3S");

// Mints
pub const HNT_MINT: Pubkey = pubkey!("hntyVP6YFm1Hg25TN9WGLqM12b8TQmcknKrdu1oxWux");
pub const IOT_MINT: Pubkey = pubkey!("iotEVVZLEywoTn1QdwNPddxPWszn3zFhEot3MfL9fns");
pub const MOBILE_MINT: Pubkey = pubkey!("mb1eu7TzEc71KxDpsmsKoucSSuuoGLv1drys1oP2jh6");

// Sub-DAO accounts
pub const IOT_SUB_DAO: Pubkey = pubkey!("39Lw1RH6zt8AJvKn3BTxmUDofzduCM2J3kSaGDZ8L7Sk");
pub const MOBILE_SUB_DAO: Pubkey = pubkey!("Gm9xDCJawDEKDrrQW6haw94gABaYzQwCq4ZQU8h8bd22");

pub const HELIUM_REALM_NAME: &str = "Helium";

pub const HNT_DECIMALS: u8 = 8;

// getMultipleAccounts accepts at most 100 keys per request
pub const DEFAULT_BATCH_SIZE: usize = 99;

// Vote weight factors are scaled by 1e9
pub const SCALED_FACTOR_BASE: u64 = 1_000_000_000;

// Genesis positions are weighted 3x by the dashboard aggregate
pub const GENESIS_FLAT_MULTIPLIER: u64 = 3;

/// Helium sub-networks a position can be delegated to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubDao {
    Iot,
    Mobile,
}

impl SubDao {
    pub const ALL: [SubDao; 2] = [SubDao::Iot, SubDao::Mobile];

    /// Address of the sub-DAO account that delegated positions point at
    pub fn address(&self) -> Pubkey {
        match self {
            SubDao::Iot => IOT_SUB_DAO,
            SubDao::Mobile => MOBILE_SUB_DAO,
        }
    }

    pub fn mint(&self) -> Pubkey {
        match self {
            SubDao::Iot => IOT_MINT,
            SubDao::Mobile => MOBILE_MINT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubDao::Iot => "iot",
            SubDao::Mobile => "mobile",
        }
    }
}

impl fmt::Display for SubDao {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubDao {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iot" => Ok(SubDao::Iot),
            "mobile" => Ok(SubDao::Mobile),
            other => Err(EngineError::InvalidInput(format!("unknown sub-DAO: {}", other))),
        }
    }
}
