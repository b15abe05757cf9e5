//! Swap and compute-budget instruction builders

use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;

use crate::domain::pool::{PoolMeta, PoolProgram};

/// ComputeBudget instructions for an arbitrage transaction
pub fn compute_budget_instructions(
    compute_units: u32,
    priority_fee_microlamports: u64,
) -> Vec<Instruction> {
    vec![
        ComputeBudgetInstruction::set_compute_unit_limit(compute_units),
        ComputeBudgetInstruction::set_compute_unit_price(priority_fee_microlamports),
    ]
}

/// Swap `amount_in` of the leg's input side for at least `min_amount_out`.
///
/// `reversed` sells the pool's quote side. User token accounts are the
/// wallet's associated accounts for the two mints.
pub fn swap_instruction(
    meta: &PoolMeta,
    wallet: &Pubkey,
    reversed: bool,
    amount_in: u64,
    min_amount_out: u64,
) -> Instruction {
    let user_source = get_associated_token_address(wallet, &meta.mint_in(reversed));
    let user_dest = get_associated_token_address(wallet, &meta.mint_out(reversed));
    let (pool_in_vault, pool_out_vault) = if reversed {
        (meta.quote_vault, meta.base_vault)
    } else {
        (meta.base_vault, meta.quote_vault)
    };

    let accounts = match meta.program {
        PoolProgram::AmmV4 => vec![
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new(meta.address, false),
            AccountMeta::new_readonly(meta.authority, false),
            AccountMeta::new(pool_in_vault, false),
            AccountMeta::new(pool_out_vault, false),
            AccountMeta::new(user_source, false),
            AccountMeta::new(user_dest, false),
            AccountMeta::new_readonly(*wallet, true),
        ],
        PoolProgram::TokenSwap => vec![
            AccountMeta::new_readonly(meta.address, false),
            AccountMeta::new_readonly(meta.authority, false),
            AccountMeta::new_readonly(*wallet, true),
            AccountMeta::new(user_source, false),
            AccountMeta::new(pool_in_vault, false),
            AccountMeta::new(pool_out_vault, false),
            AccountMeta::new(user_dest, false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
    };

    Instruction {
        program_id: meta.program_id,
        accounts,
        data: swap_data(meta.program, amount_in, min_amount_out),
    }
}

fn swap_data(program: PoolProgram, amount_in: u64, min_amount_out: u64) -> Vec<u8> {
    let tag: u8 = match program {
        PoolProgram::AmmV4 => 9,
        PoolProgram::TokenSwap => 1,
    };
    let mut data = Vec::with_capacity(17);
    data.push(tag);
    data.extend_from_slice(&amount_in.to_le_bytes());
    data.extend_from_slice(&min_amount_out.to_le_bytes());
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::math::FeeRate;
    use crate::shared::types::TokenInfo;

    fn meta(program: PoolProgram) -> PoolMeta {
        PoolMeta {
            name: "SOL-USDC".to_string(),
            address: Pubkey::new_unique(),
            program,
            program_id: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
            base: TokenInfo::new(Pubkey::new_unique(), "SOL", 9),
            quote: TokenInfo::new(Pubkey::new_unique(), "USDC", 6),
            base_vault: Pubkey::new_unique(),
            quote_vault: Pubkey::new_unique(),
            fee: FeeRate::new(25, 10_000),
            risk_ratio: None,
        }
    }

    #[test]
    fn test_swap_data_layout() {
        let data = swap_data(PoolProgram::AmmV4, 1_000, 990);
        assert_eq!(data.len(), 17);
        assert_eq!(data[0], 9);
        assert_eq!(u64::from_le_bytes(data[1..9].try_into().unwrap()), 1_000);
        assert_eq!(u64::from_le_bytes(data[9..17].try_into().unwrap()), 990);

        assert_eq!(swap_data(PoolProgram::TokenSwap, 1, 1)[0], 1);
    }

    #[test]
    fn test_swap_instruction_signs_with_wallet() {
        let meta = meta(PoolProgram::AmmV4);
        let wallet = Pubkey::new_unique();
        let ix = swap_instruction(&meta, &wallet, false, 1_000, 990);

        assert_eq!(ix.program_id, meta.program_id);
        let signer = ix
            .accounts
            .iter()
            .find(|a| a.is_signer)
            .expect("wallet must sign");
        assert_eq!(signer.pubkey, wallet);
    }

    #[test]
    fn test_swap_instruction_orients_vaults() {
        let meta = meta(PoolProgram::TokenSwap);
        let wallet = Pubkey::new_unique();

        let forward = swap_instruction(&meta, &wallet, false, 1_000, 1);
        assert_eq!(forward.accounts[4].pubkey, meta.base_vault);
        assert_eq!(forward.accounts[5].pubkey, meta.quote_vault);

        let reversed = swap_instruction(&meta, &wallet, true, 1_000, 1);
        assert_eq!(reversed.accounts[4].pubkey, meta.quote_vault);
        assert_eq!(reversed.accounts[5].pubkey, meta.base_vault);
    }

    #[test]
    fn test_user_accounts_differ_per_direction() {
        let meta = meta(PoolProgram::AmmV4);
        let wallet = Pubkey::new_unique();
        let forward = swap_instruction(&meta, &wallet, false, 1, 1);
        let reversed = swap_instruction(&meta, &wallet, true, 1, 1);
        // source and destination swap places when the direction flips
        assert_eq!(forward.accounts[5].pubkey, reversed.accounts[6].pubkey);
        assert_eq!(forward.accounts[6].pubkey, reversed.accounts[5].pubkey);
    }

    #[test]
    fn test_compute_budget_instruction_count() {
        assert_eq!(compute_budget_instructions(400_000, 1_000).len(), 2);
    }
}
