//! DEX swap instruction assembly.
//!
//! Pumpfun buy/sell instructions are fully supported. The Raydium AMM v4
//! swap builder assembles the documented account order from decoded pool
//! state; its sell path is not used for honeypot simulation until the
//! account list has been verified against a live pool.

use anyhow::{anyhow, Result};
use borsh::BorshSerialize;
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_instruction;
use solana_sdk::system_program;
use solana_sdk::sysvar;
use std::str::FromStr;

use crate::constants::*;
use crate::raydium_decoder::RaydiumPoolState;

/// Raydium AMM v4 swap discriminator (single byte, not anchor-style)
pub const RAYDIUM_SWAP_DISCRIMINATOR: u8 = 9;

/// Pumpfun `buy` args (borsh, little-endian)
#[derive(BorshSerialize)]
struct PumpfunBuyArgs {
    amount: u64,
    max_sol_cost: u64,
}

/// Pumpfun `sell` args (borsh, little-endian)
#[derive(BorshSerialize)]
struct PumpfunSellArgs {
    amount: u64,
    min_sol_output: u64,
}

/// AMM v4 `swap_base_in` args
#[derive(BorshSerialize)]
struct RaydiumSwapArgs {
    amount_in: u64,
    minimum_amount_out: u64,
}

/// Derive the associated token account for `wallet` and `mint`
pub fn derive_ata(wallet: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[wallet.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM,
    )
    .0
}

/// Idempotent create-ATA instruction (instruction tag 1)
pub fn create_ata_instruction(payer: &Pubkey, owner: &Pubkey, mint: &Pubkey) -> Instruction {
    let token_program = *TOKEN_PROGRAM;
    let ata = derive_ata(owner, mint, &token_program);
    Instruction {
        program_id: *ASSOCIATED_TOKEN_PROGRAM,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(ata, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(token_program, false),
        ],
        data: vec![1],
    }
}

/// Compute-budget prefix: unit limit plus unit price (the priority fee)
pub fn compute_budget_instructions(unit_limit: u32, unit_price_micro_lamports: u64) -> Vec<Instruction> {
    vec![
        ComputeBudgetInstruction::set_compute_unit_limit(unit_limit),
        ComputeBudgetInstruction::set_compute_unit_price(unit_price_micro_lamports),
    ]
}

/// Lamport transfer to a block-engine tip recipient
pub fn tip_instruction(from: &Pubkey, tip_account: &Pubkey, lamports: u64) -> Instruction {
    system_instruction::transfer(from, tip_account, lamports)
}

/// Pumpfun global-state PDA
pub fn pumpfun_global() -> Pubkey {
    Pubkey::find_program_address(&[b"global"], &PUMPFUN_PROGRAM).0
}

/// Bonding-curve PDA for a mint
pub fn pumpfun_curve_for_mint(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"bonding-curve", mint.as_ref()], &PUMPFUN_PROGRAM).0
}

fn pumpfun_fee_recipient() -> Result<Pubkey> {
    Pubkey::from_str(PUMPFUN_FEE_RECIPIENT).map_err(|e| anyhow!("bad fee recipient: {e}"))
}

fn pumpfun_event_authority() -> Result<Pubkey> {
    Pubkey::from_str(PUMPFUN_EVENT_AUTHORITY).map_err(|e| anyhow!("bad event authority: {e}"))
}

/// Pumpfun `buy`: data = discriminator, token amount out, max SOL cost.
pub fn pumpfun_buy_instruction(
    wallet: &Pubkey,
    mint: &Pubkey,
    bonding_curve: &Pubkey,
    token_amount_out: u64,
    max_sol_cost: u64,
) -> Result<Instruction> {
    let mut data = PUMPFUN_BUY_DISCRIMINATOR.to_vec();
    PumpfunBuyArgs {
        amount: token_amount_out,
        max_sol_cost,
    }
    .serialize(&mut data)
    .map_err(|e| anyhow!("buy args encoding: {e}"))?;

    let token_program = *TOKEN_PROGRAM;
    let associated_curve = derive_ata(bonding_curve, mint, &token_program);
    let user_ata = derive_ata(wallet, mint, &token_program);

    Ok(Instruction {
        program_id: *PUMPFUN_PROGRAM,
        accounts: vec![
            AccountMeta::new_readonly(pumpfun_global(), false),
            AccountMeta::new(pumpfun_fee_recipient()?, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(*bonding_curve, false),
            AccountMeta::new(associated_curve, false),
            AccountMeta::new(user_ata, false),
            AccountMeta::new(*wallet, true),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(token_program, false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
            AccountMeta::new_readonly(pumpfun_event_authority()?, false),
            AccountMeta::new_readonly(*PUMPFUN_PROGRAM, false),
        ],
        data,
    })
}

/// Pumpfun `sell`: data = discriminator, token amount in, min SOL out.
pub fn pumpfun_sell_instruction(
    wallet: &Pubkey,
    mint: &Pubkey,
    bonding_curve: &Pubkey,
    token_amount_in: u64,
    min_sol_output: u64,
) -> Result<Instruction> {
    let mut data = PUMPFUN_SELL_DISCRIMINATOR.to_vec();
    PumpfunSellArgs {
        amount: token_amount_in,
        min_sol_output,
    }
    .serialize(&mut data)
    .map_err(|e| anyhow!("sell args encoding: {e}"))?;

    let token_program = *TOKEN_PROGRAM;
    let associated_curve = derive_ata(bonding_curve, mint, &token_program);
    let user_ata = derive_ata(wallet, mint, &token_program);

    Ok(Instruction {
        program_id: *PUMPFUN_PROGRAM,
        accounts: vec![
            AccountMeta::new_readonly(pumpfun_global(), false),
            AccountMeta::new(pumpfun_fee_recipient()?, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(*bonding_curve, false),
            AccountMeta::new(associated_curve, false),
            AccountMeta::new(user_ata, false),
            AccountMeta::new(*wallet, true),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(*ASSOCIATED_TOKEN_PROGRAM, false),
            AccountMeta::new_readonly(token_program, false),
            AccountMeta::new_readonly(pumpfun_event_authority()?, false),
            AccountMeta::new_readonly(*PUMPFUN_PROGRAM, false),
        ],
        data,
    })
}

/// Raydium AMM v4 `swap_base_in`. Account order follows the AMM v4
/// interface; the authority PDA is derived from the fixed seed.
pub fn raydium_swap_instruction(
    pool: &Pubkey,
    state: &RaydiumPoolState,
    user_source_token: &Pubkey,
    user_dest_token: &Pubkey,
    user_owner: &Pubkey,
    amount_in: u64,
    min_amount_out: u64,
) -> Instruction {
    let mut data = vec![RAYDIUM_SWAP_DISCRIMINATOR];
    RaydiumSwapArgs {
        amount_in,
        minimum_amount_out: min_amount_out,
    }
    .serialize(&mut data)
    .expect("vec write is infallible");

    let authority = raydium_amm_authority();

    Instruction {
        program_id: *RAYDIUM_AMM_V4_PROGRAM,
        accounts: vec![
            AccountMeta::new_readonly(*TOKEN_PROGRAM, false),
            AccountMeta::new(*pool, false),
            AccountMeta::new_readonly(authority, false),
            AccountMeta::new(state.open_orders, false),
            AccountMeta::new(state.target_orders, false),
            AccountMeta::new(state.base_vault, false),
            AccountMeta::new(state.quote_vault, false),
            AccountMeta::new_readonly(state.market_program, false),
            AccountMeta::new(state.market_id, false),
            AccountMeta::new(*user_source_token, false),
            AccountMeta::new(*user_dest_token, false),
            AccountMeta::new_readonly(*user_owner, true),
        ],
        data,
    }
}

/// The AMM v4 authority PDA (fixed seed, shared across pools)
pub fn raydium_amm_authority() -> Pubkey {
    Pubkey::find_program_address(&[b"amm authority"], &RAYDIUM_AMM_V4_PROGRAM).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ata_derivation_is_deterministic() {
        let wallet = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let a = derive_ata(&wallet, &mint, &TOKEN_PROGRAM);
        let b = derive_ata(&wallet, &mint, &TOKEN_PROGRAM);
        assert_eq!(a, b);
        assert_ne!(a, derive_ata(&wallet, &Pubkey::new_unique(), &TOKEN_PROGRAM));
    }

    #[test]
    fn test_buy_instruction_layout() {
        let wallet = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let curve = pumpfun_curve_for_mint(&mint);
        let ix = pumpfun_buy_instruction(&wallet, &mint, &curve, 1_000, 2_000).unwrap();

        assert_eq!(ix.program_id, *PUMPFUN_PROGRAM);
        assert_eq!(ix.accounts.len(), 12);
        assert_eq!(&ix.data[..8], &PUMPFUN_BUY_DISCRIMINATOR);
        assert_eq!(u64::from_le_bytes(ix.data[8..16].try_into().unwrap()), 1_000);
        assert_eq!(u64::from_le_bytes(ix.data[16..24].try_into().unwrap()), 2_000);
        // The wallet is the only signer.
        let signers: Vec<_> = ix.accounts.iter().filter(|a| a.is_signer).collect();
        assert_eq!(signers.len(), 1);
        assert_eq!(signers[0].pubkey, wallet);
    }

    #[test]
    fn test_sell_instruction_layout() {
        let wallet = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let curve = pumpfun_curve_for_mint(&mint);
        let ix = pumpfun_sell_instruction(&wallet, &mint, &curve, 500, 100).unwrap();

        assert_eq!(&ix.data[..8], &PUMPFUN_SELL_DISCRIMINATOR);
        assert_eq!(ix.accounts.len(), 12);
        assert_eq!(u64::from_le_bytes(ix.data[8..16].try_into().unwrap()), 500);
    }

    #[test]
    fn test_create_ata_marks_payer_signer() {
        let payer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let ix = create_ata_instruction(&payer, &payer, &mint);
        assert_eq!(ix.program_id, *ASSOCIATED_TOKEN_PROGRAM);
        assert!(ix.accounts[0].is_signer);
        assert_eq!(ix.data, vec![1]);
    }

    #[test]
    fn test_raydium_swap_account_order() {
        let state = RaydiumPoolState {
            status: 6,
            base_decimal: 6,
            quote_decimal: 9,
            pool_open_time: 0,
            base_vault: Pubkey::new_unique(),
            quote_vault: Pubkey::new_unique(),
            base_mint: Pubkey::new_unique(),
            quote_mint: Pubkey::new_unique(),
            lp_mint: Pubkey::new_unique(),
            open_orders: Pubkey::new_unique(),
            market_id: Pubkey::new_unique(),
            market_program: Pubkey::new_unique(),
            target_orders: Pubkey::new_unique(),
            withdraw_queue: Pubkey::new_unique(),
        };
        let pool = Pubkey::new_unique();
        let ix = raydium_swap_instruction(
            &pool,
            &state,
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            10,
            5,
        );
        assert_eq!(ix.data[0], RAYDIUM_SWAP_DISCRIMINATOR);
        assert_eq!(ix.accounts.len(), 12);
        assert_eq!(ix.accounts[1].pubkey, pool);
        assert_eq!(ix.accounts[5].pubkey, state.base_vault);
    }

    #[test]
    fn test_compute_budget_prefix() {
        let ixs = compute_budget_instructions(200_000, 50_000);
        assert_eq!(ixs.len(), 2);
    }
}
