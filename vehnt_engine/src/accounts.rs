//! On-chain account layouts and their decoders
//!
//! Positions and registrars belong to the voter-stake-registry program,
//! delegated positions to the helium-sub-daos program. All three are Anchor
//! accounts: an 8 byte discriminator (`sha256("account:<Name>")[..8]`)
//! followed by the Borsh encoded body. Accounts are allocated with spare
//! space, so trailing bytes after the body are ignored.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::{clock::Clock, hash::hash, pubkey::Pubkey};

use crate::error::{EngineError, Result};

pub const DISCRIMINATOR_LEN: usize = 8;

/// Anchor account discriminator for a type name
pub fn account_discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let preimage = format!("account:{}", name);
    let digest = hash(preimage.as_bytes());
    let mut discriminator = [0u8; DISCRIMINATOR_LEN];
    discriminator.copy_from_slice(&digest.to_bytes()[..DISCRIMINATOR_LEN]);
    discriminator
}

/// An Anchor account with a fixed name and Borsh layout
pub trait AnchorAccount: BorshDeserialize {
    const NAME: &'static str;

    fn discriminator() -> [u8; DISCRIMINATOR_LEN] {
        account_discriminator(Self::NAME)
    }

    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < DISCRIMINATOR_LEN {
            return Err(EngineError::decode(
                Self::NAME,
                format!("{} bytes is shorter than the discriminator", data.len()),
            ));
        }

        let (discriminator, mut body) = data.split_at(DISCRIMINATOR_LEN);
        if discriminator != Self::discriminator() {
            return Err(EngineError::decode(Self::NAME, "discriminator mismatch"));
        }

        Self::deserialize(&mut body).map_err(|e| EngineError::decode(Self::NAME, e.to_string()))
    }
}

/// Serialize an account with its discriminator, as it would sit on chain
pub fn encode_account<T: AnchorAccount + BorshSerialize>(account: &T) -> Result<Vec<u8>> {
    let mut data = T::discriminator().to_vec();
    let body = account
        .try_to_vec()
        .map_err(|e| EngineError::decode(T::NAME, e.to_string()))?;
    data.extend_from_slice(&body);
    Ok(data)
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockupKind {
    None,
    Cliff,
    Constant,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lockup {
    pub start_ts: i64,
    pub end_ts: i64,
    pub kind: LockupKind,
}

impl Lockup {
    /// Seconds of lockup remaining as seen at `now`.
    ///
    /// Constant lockups do not decay, so their duration is the full window.
    /// Others count down and go negative once expired.
    pub fn duration_secs(&self, now: i64) -> i64 {
        match self.kind {
            LockupKind::Constant => self.end_ts.saturating_sub(self.start_ts),
            LockupKind::None | LockupKind::Cliff => self.end_ts.saturating_sub(now),
        }
    }
}

/// `PositionV0`: one locked stake, owned through an NFT
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub registrar: Pubkey,
    pub mint: Pubkey,
    pub lockup: Lockup,
    pub amount_deposited_native: u64,
    pub voting_mint_config_idx: u8,
    pub num_active_votes: u16,
    pub genesis_end: i64,
    pub bump_seed: u8,
}

impl AnchorAccount for Position {
    const NAME: &'static str = "PositionV0";
}

impl Position {
    pub fn has_genesis_multiplier(&self, now: i64) -> bool {
        now < self.genesis_end
    }
}

/// `VotingMintConfigV0`: vote weight parameters for one deposit mint
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct VotingMintConfig {
    pub mint: Pubkey,
    pub baseline_vote_weight_scaled_factor: u64,
    pub max_extra_lockup_vote_weight_scaled_factor: u64,
    pub genesis_vote_power_multiplier: u8,
    pub genesis_vote_power_multiplier_expiration_ts: i64,
    pub lockup_saturation_secs: u64,
}

impl VotingMintConfig {
    /// Zero is stored for mints that never set a multiplier
    pub fn genesis_multiplier(&self) -> u64 {
        u64::from(self.genesis_vote_power_multiplier.max(1))
    }
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct Registrar {
    pub governance_program_id: Pubkey,
    pub realm: Pubkey,
    pub realm_governing_token_mint: Pubkey,
    pub realm_authority: Pubkey,
    pub time_offset: i64,
    pub position_update_authority: Option<Pubkey>,
    pub collection: Pubkey,
    pub bump_seed: u8,
    pub collection_bump_seed: u8,
    pub reserved1: [u8; 4],
    pub reserved2: [u64; 8],
    pub voting_mints: Vec<VotingMintConfig>,
}

impl AnchorAccount for Registrar {
    const NAME: &'static str = "Registrar";
}

impl Registrar {
    pub fn voting_mint(&self, index: u8) -> Result<&VotingMintConfig> {
        self.voting_mints
            .get(usize::from(index))
            .ok_or(EngineError::MissingConfig {
                index,
                available: self.voting_mints.len(),
            })
    }
}

/// `DelegatedPositionV0`: links a position to the sub-DAO it is delegated to
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct DelegatedPosition {
    pub mint: Pubkey,
    pub position: Pubkey,
    pub hnt_amount: u64,
    pub sub_dao: Pubkey,
    pub last_claimed_epoch: u64,
    pub start_ts: i64,
    pub purged: bool,
    pub bump_seed: u8,
}

impl AnchorAccount for DelegatedPosition {
    const NAME: &'static str = "DelegatedPositionV0";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Position,
    Registrar,
    DelegatedPosition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedRecord {
    Position(Position),
    Registrar(Registrar),
    DelegatedPosition(DelegatedPosition),
}

/// Decode raw account data as the requested record kind
pub fn decode_account(kind: RecordKind, data: &[u8]) -> Result<TypedRecord> {
    Ok(match kind {
        RecordKind::Position => TypedRecord::Position(Position::decode(data)?),
        RecordKind::Registrar => TypedRecord::Registrar(Registrar::decode(data)?),
        RecordKind::DelegatedPosition => {
            TypedRecord::DelegatedPosition(DelegatedPosition::decode(data)?)
        }
    })
}

/// Decode the clock sysvar account
pub fn decode_clock(data: &[u8]) -> Result<Clock> {
    bincode::deserialize::<Clock>(data).map_err(|e| EngineError::decode("Clock", e.to_string()))
}
