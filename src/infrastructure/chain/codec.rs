//! Fixed-width account codecs for AMM pool state and SPL token accounts

use bytemuck::{Pod, Zeroable};
use spl_token::solana_program::program_pack::Pack;

use crate::domain::math::FeeRate;
use crate::domain::pool::Reserves;
use crate::shared::errors::CodecError;

/// On-chain AMM pool state layout.
///
/// Little-endian fixed-width fields; the reserve pair is accompanied by
/// the open-order reservations and pending ("need take") PnL that enter
/// the effective-liquidity derivation.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct AmmStateLayout {
    pub status: u64,
    pub base_decimals: u64,
    pub quote_decimals: u64,
    pub swap_fee_numerator: u64,
    pub swap_fee_denominator: u64,
    pub base_need_take_pnl: u64,
    pub quote_need_take_pnl: u64,
    pub base_open_orders: u64,
    pub quote_open_orders: u64,
    pub base_reserve: u64,
    pub quote_reserve: u64,
    pub base_vault: [u8; 32],
    pub quote_vault: [u8; 32],
    pub base_mint: [u8; 32],
    pub quote_mint: [u8; 32],
}

pub const AMM_STATE_LEN: usize = std::mem::size_of::<AmmStateLayout>();

/// Reserve state plus the fee the account itself advertises
#[derive(Debug, Clone, Copy)]
pub struct DecodedPool {
    pub reserves: Reserves,
    pub fee: FeeRate,
}

/// Decode a pool account payload into its reserve structure
pub fn decode_pool(data: &[u8]) -> Result<DecodedPool, CodecError> {
    if data.len() < AMM_STATE_LEN {
        return Err(CodecError::TooShort {
            got: data.len(),
            want: AMM_STATE_LEN,
        });
    }
    let layout: AmmStateLayout = bytemuck::pod_read_unaligned(&data[..AMM_STATE_LEN]);

    if layout.status == 0 {
        return Err(CodecError::PoolDisabled(layout.status));
    }
    if layout.swap_fee_denominator == 0 || layout.swap_fee_numerator >= layout.swap_fee_denominator
    {
        return Err(CodecError::Malformed);
    }

    Ok(DecodedPool {
        reserves: Reserves {
            base_vault: layout.base_reserve,
            quote_vault: layout.quote_reserve,
            base_open_orders: layout.base_open_orders,
            quote_open_orders: layout.quote_open_orders,
            base_pending_pnl: layout.base_need_take_pnl,
            quote_pending_pnl: layout.quote_need_take_pnl,
            refresh_seq: 0,
        },
        fee: FeeRate::new(layout.swap_fee_numerator, layout.swap_fee_denominator),
    })
}

/// Decode an SPL token account payload into its balance
pub fn decode_token_amount(data: &[u8]) -> Result<u64, CodecError> {
    let account = spl_token::state::Account::unpack(data)
        .map_err(|e| CodecError::TokenAccount(e.to_string()))?;
    Ok(account.amount)
}
