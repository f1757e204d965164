//! Program Derived Address (PDA) utilities
//!
//! Every record the engine reads is located by a deterministic address. The
//! seed sequences here must match the ones the on-chain programs use.

use solana_sdk::pubkey::{Pubkey, MAX_SEED_LEN};

use crate::constants::{
    GOVERNANCE_PROGRAM_ID, HELIUM_REALM_NAME, HELIUM_SUB_DAOS_PROGRAM_ID, HNT_MINT,
    VOTER_STAKE_REGISTRY_PROGRAM_ID,
};
use crate::error::{EngineError, Result};

/// PDA seeds for the account types the engine touches
pub mod seeds {
    pub const GOVERNANCE: &[u8] = b"governance";
    pub const REGISTRAR: &[u8] = b"registrar";
    pub const COLLECTION: &[u8] = b"collection";
    pub const POSITION: &[u8] = b"position";
    pub const DELEGATED_POSITION: &[u8] = b"delegated_position";
    pub const SUB_DAO: &[u8] = b"sub_dao";
}

fn find(seeds: &[&[u8]], program_id: &Pubkey) -> Result<(Pubkey, u8)> {
    if let Some(seed) = seeds.iter().find(|s| s.len() > MAX_SEED_LEN) {
        return Err(EngineError::InvalidInput(format!(
            "seed of {} bytes exceeds the {} byte limit",
            seed.len(),
            MAX_SEED_LEN
        )));
    }

    Pubkey::try_find_program_address(seeds, program_id).ok_or_else(|| {
        EngineError::InvalidInput(format!("no viable bump seed under program {}", program_id))
    })
}

/// PDA generator for the governance, voter-stake-registry and sub-DAO programs
#[derive(Debug, Clone, Copy)]
pub struct PdaGenerator {
    governance_program: Pubkey,
    vsr_program: Pubkey,
    hsd_program: Pubkey,
}

impl Default for PdaGenerator {
    fn default() -> Self {
        Self::new(
            GOVERNANCE_PROGRAM_ID,
            VOTER_STAKE_REGISTRY_PROGRAM_ID,
            HELIUM_SUB_DAOS_PROGRAM_ID,
        )
    }
}

impl PdaGenerator {
    pub fn new(governance_program: Pubkey, vsr_program: Pubkey, hsd_program: Pubkey) -> Self {
        Self {
            governance_program,
            vsr_program,
            hsd_program,
        }
    }

    /// Get the realm PDA for a realm name
    pub fn realm_key(&self, name: &str) -> Result<(Pubkey, u8)> {
        find(&[seeds::GOVERNANCE, name.as_bytes()], &self.governance_program)
    }

    /// Get the registrar PDA for a realm and its governing mint
    pub fn registrar_key(&self, realm: &Pubkey, mint: &Pubkey) -> Result<(Pubkey, u8)> {
        find(
            &[realm.as_ref(), seeds::REGISTRAR, mint.as_ref()],
            &self.vsr_program,
        )
    }

    /// Get the collection PDA that every position NFT of a registrar belongs to
    pub fn registrar_collection_key(&self, registrar: &Pubkey) -> Result<(Pubkey, u8)> {
        find(&[seeds::COLLECTION, registrar.as_ref()], &self.vsr_program)
    }

    /// Get the position PDA for a position NFT mint
    pub fn position_key(&self, mint: &Pubkey) -> Result<(Pubkey, u8)> {
        find(&[seeds::POSITION, mint.as_ref()], &self.vsr_program)
    }

    /// Get the delegated position PDA for a position
    pub fn delegated_position_key(&self, position: &Pubkey) -> Result<(Pubkey, u8)> {
        find(
            &[seeds::DELEGATED_POSITION, position.as_ref()],
            &self.hsd_program,
        )
    }

    /// Get the sub-DAO PDA for a sub-network's mint
    pub fn sub_dao_key(&self, mint: &Pubkey) -> Result<(Pubkey, u8)> {
        find(&[seeds::SUB_DAO, mint.as_ref()], &self.hsd_program)
    }

    /// The HNT registrar and the collection its position NFTs are minted into
    pub fn hnt_registrar_and_collection(&self) -> Result<(Pubkey, Pubkey)> {
        let (realm, _) = self.realm_key(HELIUM_REALM_NAME)?;
        let (registrar, _) = self.registrar_key(&realm, &HNT_MINT)?;
        let (collection, _) = self.registrar_collection_key(&registrar)?;
        Ok((registrar, collection))
    }
}

/// Convenience functions against the mainnet program ids
pub mod helpers {
    use super::*;

    pub fn position_key(mint: &Pubkey) -> Result<Pubkey> {
        Ok(PdaGenerator::default().position_key(mint)?.0)
    }

    pub fn delegated_position_key(position: &Pubkey) -> Result<Pubkey> {
        Ok(PdaGenerator::default().delegated_position_key(position)?.0)
    }

    pub fn registrar_collection_key(registrar: &Pubkey) -> Result<Pubkey> {
        Ok(PdaGenerator::default().registrar_collection_key(registrar)?.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{IOT_MINT, IOT_SUB_DAO, MOBILE_MINT, MOBILE_SUB_DAO};

    #[test]
    fn test_position_pda_is_deterministic() {
        let generator = PdaGenerator::default();
        let mint = Pubkey::new_unique();

        let (pda1, bump1) = generator.position_key(&mint).unwrap();
        let (pda2, bump2) = generator.position_key(&mint).unwrap();
        assert_eq!(pda1, pda2);
        assert_eq!(bump1, bump2);

        let (pda3, _) = generator.position_key(&Pubkey::new_unique()).unwrap();
        assert_ne!(pda1, pda3);
    }

    #[test]
    fn test_collection_key_matches_raw_derivation() {
        let registrar = Pubkey::new_unique();
        let expected = Pubkey::find_program_address(
            &[b"collection", registrar.as_ref()],
            &VOTER_STAKE_REGISTRY_PROGRAM_ID,
        );
        assert_eq!(
            PdaGenerator::default().registrar_collection_key(&registrar).unwrap(),
            expected
        );
    }

    #[test]
    fn test_delegated_position_uses_sub_dao_program() {
        let position = Pubkey::new_unique();
        let (under_hsd, _) = Pubkey::find_program_address(
            &[b"delegated_position", position.as_ref()],
            &HELIUM_SUB_DAOS_PROGRAM_ID,
        );
        assert_eq!(helpers::delegated_position_key(&position).unwrap(), under_hsd);
    }

    #[test]
    fn test_sub_dao_keys_match_known_addresses() {
        let generator = PdaGenerator::default();
        assert_eq!(generator.sub_dao_key(&IOT_MINT).unwrap().0, IOT_SUB_DAO);
        assert_eq!(generator.sub_dao_key(&MOBILE_MINT).unwrap().0, MOBILE_SUB_DAO);
    }

    #[test]
    fn test_oversized_seed_is_invalid_input() {
        let generator = PdaGenerator::default();
        let long_name = "x".repeat(MAX_SEED_LEN + 1);
        assert!(matches!(
            generator.realm_key(&long_name),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_custom_program_ids_change_addresses() {
        let mint = Pubkey::new_unique();
        let custom = PdaGenerator::new(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
        );
        assert_ne!(
            custom.position_key(&mint).unwrap(),
            PdaGenerator::default().position_key(&mint).unwrap()
        );
    }
}
