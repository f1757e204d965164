//! Delegation reward estimates
//!
//! A sub-DAO pays 6% of its per-epoch emissions to veHNT delegators, split
//! pro rata by veHNT.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::constants::{SubDao, HNT_DECIMALS};
use crate::engine::to_number;
use crate::error::{EngineError, Result};
use crate::stats::DelegatedStakesInfo;

/// Share of sub-DAO emissions paid to delegators
pub const DELEGATOR_SHARE: f64 = 0.06;

/// (start of period as unix seconds, emissions per epoch)
const IOT_EMISSIONS: &[(i64, f64)] = &[
    (1_681_776_000, 165_616_438.356164), // 2023-04-18
    (1_690_848_000, 82_581_967.213115),  // 2023-08-01
    (1_722_470_400, 82_808_219.178082),  // 2024-08-01
];

const MOBILE_EMISSIONS: &[(i64, f64)] = &[
    (1_681_776_000, 108_493_150.684932),
    (1_690_848_000, 54_098_360.655738),
    (1_722_470_400, 54_246_575.342466),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmissionPeriod {
    pub start: DateTime<Utc>,
    pub emissions_per_epoch: f64,
}

/// Emission periods of one sub-DAO, ordered by start
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionSchedule {
    periods: Vec<EmissionPeriod>,
}

impl EmissionSchedule {
    pub fn new(mut periods: Vec<EmissionPeriod>) -> Self {
        periods.sort_by_key(|p| p.start);
        Self { periods }
    }

    pub fn for_sub_dao(sub_dao: SubDao) -> Self {
        let table = match sub_dao {
            SubDao::Iot => IOT_EMISSIONS,
            SubDao::Mobile => MOBILE_EMISSIONS,
        };
        Self::new(
            table
                .iter()
                .filter_map(|&(start, emissions_per_epoch)| {
                    Some(EmissionPeriod {
                        start: Utc.timestamp_opt(start, 0).single()?,
                        emissions_per_epoch,
                    })
                })
                .collect(),
        )
    }

    pub fn periods(&self) -> &[EmissionPeriod] {
        &self.periods
    }

    /// The period in force at `at`: the latest one starting on or before it
    pub fn period_at(&self, at: DateTime<Utc>) -> Option<&EmissionPeriod> {
        self.periods.iter().rev().find(|p| p.start <= at)
    }

    pub fn emissions_at(&self, at: DateTime<Utc>) -> Result<f64> {
        self.period_at(at)
            .map(|p| p.emissions_per_epoch)
            .ok_or_else(|| {
                EngineError::InvalidInput(format!("no emission schedule in force at {}", at))
            })
    }
}

/// Expected per-epoch reward for `your_vehnt` (whole tokens) against a
/// sub-DAO total of `total_vehnt_native`.
pub fn estimate_reward(
    your_vehnt: f64,
    total_vehnt_native: f64,
    emissions_per_epoch: f64,
) -> Result<f64> {
    if your_vehnt < 0.0 || !your_vehnt.is_finite() {
        return Err(EngineError::InvalidInput(format!("invalid veHNT amount: {}", your_vehnt)));
    }
    let total_vehnt = total_vehnt_native / 10f64.powi(i32::from(HNT_DECIMALS));
    if total_vehnt <= 0.0 || !total_vehnt.is_finite() {
        return Err(EngineError::InvalidInput("sub-DAO has no delegated veHNT".to_string()));
    }

    Ok(your_vehnt / total_vehnt * (emissions_per_epoch * DELEGATOR_SHARE))
}

/// Parse a user supplied veHNT amount. At most `HNT_DECIMALS` fractional digits.
pub fn parse_vehnt_amount(input: &str) -> Result<f64> {
    let trimmed = input.trim();
    let invalid = || EngineError::InvalidInput(format!("invalid veHNT amount: {:?}", input));

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };
    let digits_only = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !digits_only(whole) || !digits_only(fraction) {
        return Err(invalid());
    }
    if fraction.len() > usize::from(HNT_DECIMALS) {
        return Err(EngineError::InvalidInput(format!(
            "veHNT amount {} has more than {} decimals",
            trimmed, HNT_DECIMALS
        )));
    }

    trimmed.parse().map_err(|_| invalid())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardEstimate {
    pub sub_dao: SubDao,
    pub your_vehnt: f64,
    pub total_vehnt: f64,
    pub emissions_per_epoch: f64,
    pub estimated_reward: f64,
}

/// Estimate the reward for `your_vehnt` in `sub_dao` using the latest
/// delegation totals and the schedule in force at `at`.
pub fn estimate_for(
    sub_dao: SubDao,
    your_vehnt: f64,
    info: &DelegatedStakesInfo,
    at: DateTime<Utc>,
) -> Result<RewardEstimate> {
    let total_native = info.sub_dao(sub_dao)?.total.vehnt;
    let emissions = EmissionSchedule::for_sub_dao(sub_dao).emissions_at(at)?;
    let estimated_reward = estimate_reward(your_vehnt, total_native, emissions)?;

    Ok(RewardEstimate {
        sub_dao,
        your_vehnt,
        total_vehnt: to_number(total_native.max(0.0) as u128, HNT_DECIMALS),
        emissions_per_epoch: emissions,
        estimated_reward,
    })
}
