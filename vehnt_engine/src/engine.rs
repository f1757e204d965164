//! Voting power computation
//!
//! For one wallet and one sub-DAO: find the wallet's position NFTs, load the
//! positions and their delegation records, then sum the deposited amounts of
//! the positions delegated to that sub-DAO, with and without multipliers.
//!
//! Records are joined by derived address, never by list index.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, sysvar};
use tracing::{debug, info, warn, Instrument};

use crate::accounts::{
    decode_clock, AnchorAccount, DelegatedPosition, Position, Registrar, VotingMintConfig,
};
use crate::collectibles::{CollectibleSource, DasCollectibleSource};
use crate::config::EngineConfig;
use crate::constants::{GENESIS_FLAT_MULTIPLIER, HNT_DECIMALS, SCALED_FACTOR_BASE, SubDao};
use crate::error::{EngineError, Result};
use crate::fetcher::{AccountSource, BatchAccountFetcher, RpcAccountSource};
use crate::logging::{computation_span, OperationTimer};
use crate::pda::PdaGenerator;

/// How the multiplied total is formed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Genesis positions count 3x, everything else 1x. This is what the
    /// dashboard reports.
    #[default]
    GenesisFlat,
    /// Deposits are scaled by the lockup multiplier of their mint config
    LockupWeighted,
}

impl FromStr for AggregationMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "genesis_flat" | "flat" => Ok(AggregationMode::GenesisFlat),
            "lockup_weighted" | "weighted" => Ok(AggregationMode::LockupWeighted),
            other => Err(EngineError::InvalidInput(format!("unknown aggregation mode: {}", other))),
        }
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationMode::GenesisFlat => f.write_str("genesis_flat"),
            AggregationMode::LockupWeighted => f.write_str("lockup_weighted"),
        }
    }
}

/// Totals for one wallet in one sub-DAO
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct VotingPower {
    /// Deposited HNT, in whole tokens
    pub total_amount_deposited: f64,
    /// Deposited HNT after multipliers, in whole tokens
    pub total_amount_deposited_with_mult: f64,
    pub total_deposited_native: u128,
    pub total_with_mult_native: u128,
    pub positions_counted: usize,
}

impl VotingPower {
    fn from_native(base: u128, with_mult: u128, positions_counted: usize) -> Self {
        Self {
            total_amount_deposited: to_number(base, HNT_DECIMALS),
            total_amount_deposited_with_mult: to_number(with_mult, HNT_DECIMALS),
            total_deposited_native: base,
            total_with_mult_native: with_mult,
            positions_counted,
        }
    }
}

/// Convert a native amount into whole tokens
pub fn to_number(native: u128, decimals: u8) -> f64 {
    native as f64 / 10f64.powi(i32::from(decimals))
}

/// Fraction of the saturation window covered by `lockup_secs`, clamped to [0, 1]
pub fn saturation_ratio(lockup_secs: i64, lockup_saturation_secs: u64) -> f64 {
    if lockup_saturation_secs == 0 {
        return if lockup_secs > 0 { 1.0 } else { 0.0 };
    }
    (lockup_secs as f64 / lockup_saturation_secs as f64).clamp(0.0, 1.0)
}

/// Lockup multiplier: `ratio * max_extra / baseline`, where a zero baseline
/// means the 1e9 scale.
pub fn calc_multiplier(
    baseline_scaled_factor: u64,
    max_extra_lockup_scaled_factor: u64,
    lockup_secs: i64,
    lockup_saturation_secs: u64,
) -> f64 {
    let base = if baseline_scaled_factor != 0 {
        baseline_scaled_factor
    } else {
        SCALED_FACTOR_BASE
    };

    saturation_ratio(lockup_secs, lockup_saturation_secs) * max_extra_lockup_scaled_factor as f64
        / base as f64
}

/// Multiplier inputs and outputs for one position at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionEvaluation {
    pub has_genesis_multiplier: bool,
    pub lockup_secs: i64,
    pub multiplier: f64,
    pub effective_multiplier: f64,
}

pub fn evaluate_position(
    position: &Position,
    config: &VotingMintConfig,
    now: i64,
) -> PositionEvaluation {
    let has_genesis_multiplier = position.has_genesis_multiplier(now);
    let lockup_secs = position.lockup.duration_secs(now);
    let multiplier = calc_multiplier(
        config.baseline_vote_weight_scaled_factor,
        config.max_extra_lockup_vote_weight_scaled_factor,
        lockup_secs,
        config.lockup_saturation_secs,
    );
    let genesis = if has_genesis_multiplier {
        config.genesis_multiplier()
    } else {
        1
    };

    PositionEvaluation {
        has_genesis_multiplier,
        lockup_secs,
        multiplier,
        effective_multiplier: genesis as f64 * multiplier,
    }
}

/// Integer form of `amount * effective_multiplier`, floored.
///
/// `amount * genesis * max_extra * covered / (window * baseline)` is evaluated
/// in two exact division steps so the full product never has to fit in a
/// u128. Fails with `InvalidInput` only when an intermediate still overflows.
fn weighted_amount(
    amount: u64,
    config: &VotingMintConfig,
    lockup_secs: i64,
    has_genesis: bool,
) -> Result<u128> {
    let baseline = u128::from(match config.baseline_vote_weight_scaled_factor {
        0 => SCALED_FACTOR_BASE,
        factor => factor,
    });
    let genesis = if has_genesis { config.genesis_multiplier() } else { 1 };

    let (covered, window) = match config.lockup_saturation_secs {
        0 => (u128::from(lockup_secs > 0), 1u128),
        saturation => {
            let secs = u128::try_from(lockup_secs.max(0)).unwrap_or(0);
            (secs.min(u128::from(saturation)), u128::from(saturation))
        }
    };

    let overflow = || {
        EngineError::InvalidInput(format!("weighted amount of {} native units overflows", amount))
    };

    let scaled = u128::from(amount)
        .checked_mul(u128::from(genesis))
        .and_then(|v| v.checked_mul(u128::from(config.max_extra_lockup_vote_weight_scaled_factor)))
        .ok_or_else(overflow)?;
    let (quotient, remainder) = (scaled / baseline, scaled % baseline);

    let covered_quotient = quotient.checked_mul(covered).ok_or_else(overflow)?;
    let (whole, rest) = (covered_quotient / window, covered_quotient % window);

    // remainder / baseline and rest / window, carried over the common denominator
    let carry = rest
        .checked_mul(baseline)
        .and_then(|v| v.checked_add(remainder.checked_mul(covered)?))
        .ok_or_else(overflow)?;
    let denominator = window.checked_mul(baseline).ok_or_else(overflow)?;

    whole.checked_add(carry / denominator).ok_or_else(overflow)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Contribution {
    pub base: u128,
    pub with_mult: u128,
}

/// A decoded position joined with its delegation record, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRecord {
    pub address: Pubkey,
    pub position: Position,
    pub delegation: Option<DelegatedPosition>,
}

impl PositionRecord {
    pub fn delegated_to(&self, sub_dao: &Pubkey) -> bool {
        self.delegation
            .as_ref()
            .map_or(false, |d| d.sub_dao == *sub_dao)
    }
}

/// Contribution of one position to the `sub_dao` totals.
///
/// Fails with `MissingConfig` when the position's mint config index is not in
/// the registrar.
pub fn position_contribution(
    record: &PositionRecord,
    registrar: &Registrar,
    sub_dao: &Pubkey,
    now: i64,
    mode: AggregationMode,
) -> Result<Contribution> {
    if !record.delegated_to(sub_dao) {
        return Ok(Contribution::default());
    }

    let position = &record.position;
    let config = registrar.voting_mint(position.voting_mint_config_idx)?;
    let evaluation = evaluate_position(position, config, now);
    let base = u128::from(position.amount_deposited_native);

    let with_mult = match mode {
        AggregationMode::GenesisFlat => {
            let factor = if evaluation.has_genesis_multiplier {
                GENESIS_FLAT_MULTIPLIER
            } else {
                1
            };
            base * u128::from(factor)
        }
        AggregationMode::LockupWeighted => weighted_amount(
            position.amount_deposited_native,
            config,
            evaluation.lockup_secs,
            evaluation.has_genesis_multiplier,
        )?,
    };

    Ok(Contribution { base, with_mult })
}

/// Sum the contributions of `records` to `sub_dao`. Positions with a missing
/// mint config contribute nothing.
pub fn aggregate(
    records: &[PositionRecord],
    registrar: &Registrar,
    sub_dao: &Pubkey,
    now: i64,
    mode: AggregationMode,
) -> Result<VotingPower> {
    let mut base = 0u128;
    let mut with_mult = 0u128;
    let mut counted = 0usize;

    for record in records {
        match position_contribution(record, registrar, sub_dao, now, mode) {
            Ok(contribution) => {
                if record.delegated_to(sub_dao) {
                    counted += 1;
                }
                base = base.saturating_add(contribution.base);
                with_mult = with_mult.saturating_add(contribution.with_mult);
            }
            Err(EngineError::MissingConfig { index, available }) => {
                warn!(
                    position = %record.address,
                    index,
                    available,
                    "Position references a missing voting mint config, skipping"
                );
            }
            Err(e) => return Err(e),
        }
    }

    Ok(VotingPower::from_native(base, with_mult, counted))
}

pub struct VotingPowerEngine {
    fetcher: BatchAccountFetcher,
    collectibles: Arc<dyn CollectibleSource>,
    pdas: PdaGenerator,
    mode: AggregationMode,
}

impl VotingPowerEngine {
    pub fn new(
        accounts: Arc<dyn AccountSource>,
        collectibles: Arc<dyn CollectibleSource>,
        batch_size: usize,
        mode: AggregationMode,
    ) -> Result<Self> {
        Ok(Self {
            fetcher: BatchAccountFetcher::new(accounts, batch_size)?,
            collectibles,
            pdas: PdaGenerator::default(),
            mode,
        })
    }

    /// Engine talking to the configured RPC and DAS endpoints
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let accounts =
            RpcAccountSource::new(config.rpc_url()?.to_string(), config.commitment_config()?);
        let collectibles = DasCollectibleSource::new(config.das_url()?);
        Self::new(
            Arc::new(accounts),
            Arc::new(collectibles),
            config.batch_size,
            config.aggregation,
        )
    }

    pub fn with_pdas(mut self, pdas: PdaGenerator) -> Self {
        self.pdas = pdas;
        self
    }

    pub fn mode(&self) -> AggregationMode {
        self.mode
    }

    /// Voting power as of the cluster clock
    pub async fn compute_voting_power(
        &self,
        owner: &Pubkey,
        sub_dao: SubDao,
    ) -> Result<VotingPower> {
        self.compute(owner, sub_dao, None)
            .instrument(computation_span(owner, sub_dao))
            .await
    }

    /// Voting power as of `now` (unix seconds)
    pub async fn compute_voting_power_at(
        &self,
        owner: &Pubkey,
        sub_dao: SubDao,
        now: i64,
    ) -> Result<VotingPower> {
        self.compute(owner, sub_dao, Some(now))
            .instrument(computation_span(owner, sub_dao))
            .await
    }

    async fn compute(
        &self,
        owner: &Pubkey,
        sub_dao: SubDao,
        now: Option<i64>,
    ) -> Result<VotingPower> {
        info!(%owner, %sub_dao, mode = %self.mode, "Computing voting power");

        let (registrar_key, collection) = self.pdas.hnt_registrar_and_collection()?;
        let mints = self.position_mints(owner, &collection).await?;
        if mints.is_empty() {
            info!(%owner, "Wallet holds no position NFTs");
            return Ok(VotingPower::default());
        }

        let records = self.load_positions(&mints).await?;
        let registrar = self.fetch_registrar(&registrar_key).await?;
        let now = match now {
            Some(now) => now,
            None => self.fetch_clock().await?,
        };

        let power = aggregate(&records, &registrar, &sub_dao.address(), now, self.mode)?;
        info!(
            %owner,
            %sub_dao,
            positions = records.len(),
            counted = power.positions_counted,
            total = power.total_amount_deposited,
            total_with_mult = power.total_amount_deposited_with_mult,
            "Computed voting power"
        );
        Ok(power)
    }

    /// Mints of the wallet's NFTs that belong to the position collection
    async fn position_mints(&self, owner: &Pubkey, collection: &Pubkey) -> Result<Vec<Pubkey>> {
        let owned = self.collectibles.owned_collectibles(owner).await?;
        let mut seen = HashSet::new();
        let mints: Vec<Pubkey> = owned
            .iter()
            .filter(|c| c.belongs_to(collection))
            .map(|c| c.mint)
            .filter(|mint| seen.insert(*mint))
            .collect();

        debug!(%owner, owned = owned.len(), positions = mints.len(), "Resolved position NFTs");
        Ok(mints)
    }

    /// Load positions and delegations for `mints`, joined by address
    pub async fn load_positions(&self, mints: &[Pubkey]) -> Result<Vec<PositionRecord>> {
        let _timer = OperationTimer::start("load_positions");
        let position_keys = mints
            .iter()
            .map(|mint| -> Result<Pubkey> { Ok(self.pdas.position_key(mint)?.0) })
            .collect::<Result<Vec<_>>>()?;

        let position_accounts = self.fetcher.fetch_map(&position_keys).await?;
        let mut positions: HashMap<Pubkey, Position> = HashMap::new();
        let mut present = Vec::new();
        for key in &position_keys {
            if let Some(Some(account)) = position_accounts.get(key) {
                positions.insert(*key, Position::decode(&account.data)?);
                present.push(*key);
            } else {
                debug!(position = %key, "Position account not found, skipping");
            }
        }

        let delegated_keys: HashMap<Pubkey, Pubkey> = present
            .iter()
            .map(|position| -> Result<(Pubkey, Pubkey)> {
                Ok((*position, self.pdas.delegated_position_key(position)?.0))
            })
            .collect::<Result<_>>()?;
        let lookup: Vec<Pubkey> = present.iter().map(|p| delegated_keys[p]).collect();
        let delegated_accounts = self.fetcher.fetch_map(&lookup).await?;

        let mut records = Vec::with_capacity(present.len());
        for address in present {
            let delegation = match delegated_accounts.get(&delegated_keys[&address]) {
                Some(Some(account)) => {
                    let delegation = DelegatedPosition::decode(&account.data)?;
                    if delegation.position != address {
                        return Err(EngineError::decode(
                            DelegatedPosition::NAME,
                            format!(
                                "record points at position {}, expected {}",
                                delegation.position, address
                            ),
                        ));
                    }
                    Some(delegation)
                }
                _ => None,
            };

            if let Some(position) = positions.remove(&address) {
                records.push(PositionRecord {
                    address,
                    position,
                    delegation,
                });
            }
        }

        Ok(records)
    }

    pub async fn fetch_registrar(&self, key: &Pubkey) -> Result<Registrar> {
        let account = self
            .fetcher
            .source()
            .get_account(key)
            .await?
            .ok_or_else(|| EngineError::decode(Registrar::NAME, format!("no account at {}", key)))?;
        Registrar::decode(&account.data)
    }

    /// Unix timestamp of the cluster clock sysvar
    pub async fn fetch_clock(&self) -> Result<i64> {
        let account = self
            .fetcher
            .source()
            .get_account(&sysvar::clock::id())
            .await?
            .ok_or_else(|| EngineError::decode("Clock", "clock sysvar not found"))?;
        Ok(decode_clock(&account.data)?.unix_timestamp)
    }
}
