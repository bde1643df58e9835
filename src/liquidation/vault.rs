//! Vault deleverage and the vault entry/exit ratio check.
//!
//! A liquidator repays part of one debt leg of an under-collateralized
//! vault position and receives vault shares worth the repayment times the
//! vault's liquidation rate. The deposit is bounded by the leg's debt, by
//! the shares available and by the ratio at which the position is
//! considered restored.

use serde::{Deserialize, Serialize};

use crate::core::currency::CurrencyId;
use crate::core::vault::{VaultAccount, VaultConfig, VaultId};
use crate::error::{Error, Result};
use crate::storage::ledger::{refresh_account_context, BalanceLedger};
use crate::utils::constants::*;
use crate::utils::crypto::AccountId;
use crate::utils::math::*;
use crate::valuation::health::{check_account_health, vault_health, HealthFactors, ValuationContext};

// ═══════════════════════════════════════════════════════════════════════════════
// DELEVERAGE RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Computed deleverage of one debt leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultDeleverage {
    /// Vault account being deleveraged
    pub account: AccountId,
    /// Vault
    pub vault: VaultId,
    /// Maturity of the position
    pub maturity: u64,
    /// Debt leg (0 = primary, 1/2 = secondary)
    pub currency_index: u8,
    /// Currency of the leg
    pub currency: CurrencyId,
    /// Deposit accepted, in the leg's underlying
    pub deposit_underlying: i128,
    /// Deposit in primary underlying
    pub deposit_primary: i128,
    /// Shares moved to the liquidator
    pub vault_shares_to_liquidator: i128,
    /// Position's ratio before the deleverage
    pub ratio_before: i128,
}

/// Ensure the liquidator may deleverage positions in this vault
fn authorize(config: &VaultConfig, liquidator: &AccountId) -> Result<()> {
    if config.only_vault_deleverage && config.operator.as_ref() != Some(liquidator) {
        return Err(Error::Unauthorized(format!(
            "only the operator of {} may deleverage",
            config.id
        )));
    }
    Ok(())
}

fn load_position<L: BalanceLedger + ?Sized>(
    ledger: &L,
    account: &AccountId,
    vault: VaultId,
) -> Result<VaultAccount> {
    ledger
        .vault_account(account, vault)?
        .ok_or_else(|| Error::VaultAccountNotFound {
            account: account.to_hex(),
            vault: vault.0,
        })
}

// ═══════════════════════════════════════════════════════════════════════════════
// CALCULATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Compute the deposit and shares for deleveraging one debt leg
///
/// `deposit_cap` is the most the liquidator is willing to deposit in the
/// leg's underlying; zero means uncapped.
#[allow(clippy::too_many_arguments)]
pub fn calculate_deleverage<L: BalanceLedger + ?Sized>(
    ctx: &ValuationContext<'_>,
    ledger: &L,
    account: &AccountId,
    liquidator: &AccountId,
    vault: VaultId,
    currency_index: u8,
    deposit_cap: i128,
) -> Result<VaultDeleverage> {
    let config = ctx.vaults.get(vault)?;
    authorize(config, liquidator)?;
    if account == liquidator {
        return Err(Error::SelfLiquidation);
    }
    if deposit_cap < 0 {
        return Err(Error::InvalidParameter {
            name: "deposit_cap".into(),
            reason: format!("must be non-negative, got {}", deposit_cap),
        });
    }

    let health = vault_health(ctx, ledger, account, vault)?;
    let factors = &health.factors;
    if !factors.is_below(config.min_collateral_ratio) {
        tracing::warn!(
            account = %account,
            vault = %vault,
            ratio = factors.collateral_ratio,
            "deleverage rejected: vault position is healthy"
        );
        return Err(Error::PositionHealthy {
            ratio: factors.collateral_ratio,
            minimum: config.min_collateral_ratio,
        });
    }

    let leg = *health.leg(currency_index)?;
    let leg_debt = safe_neg(leg.debt_underlying)?;
    if leg_debt == 0 {
        return Err(Error::NothingToLiquidate(format!(
            "no debt on leg {} of {}",
            currency_index, vault
        )));
    }
    let share_value = health.vault_share_value;
    if share_value <= 0 {
        return Err(Error::NothingToLiquidate(format!("no share value in {}", vault)));
    }
    let position = load_position(ledger, account, vault)?;

    let liquidation_rate = config.liquidation_rate_bps;
    let to_leg = |primary: i128| mul_div(primary, RATE_PRECISION, leg.rate_to_primary);

    // Shares are paid out at the liquidation rate; deposits beyond this
    // would claim more than the position holds
    let mut max_deposit = leg_debt.min(to_leg(mul_div(share_value, BPS_DIVISOR, liquidation_rate)?)?);

    // Above the liquidation rate each deposit lifts the ratio; stop at the
    // max deleverage ratio
    let ratio_at_liquidation_rate = mul_div(liquidation_rate, RATIO_PRECISION, BPS_DIVISOR)?;
    let target = config.max_deleverage_collateral_ratio;
    if factors.collateral_ratio >= ratio_at_liquidation_rate && target > ratio_at_liquidation_rate {
        let debt = safe_neg(factors.debt_value)?;
        let excess = safe_sub(mul_div(target, debt, RATIO_PRECISION)?, factors.collateral_value)?;
        let to_target = mul_div(excess, RATIO_PRECISION, safe_sub(target, ratio_at_liquidation_rate)?)?;
        max_deposit = max_deposit.min(to_leg(to_target)?);
    }

    let mut deposit = if deposit_cap > 0 {
        max_deposit.min(deposit_cap)
    } else {
        max_deposit
    };

    // Remaining debt must not fall below the minimum borrow size
    let remaining = safe_sub(leg_debt, deposit)?;
    if remaining > 0 && remaining < config.min_account_borrow_size {
        if deposit_cap > 0 && deposit_cap < leg_debt {
            return Err(Error::InvalidParameter {
                name: "deposit_cap".into(),
                reason: format!(
                    "remaining debt {} would fall below minimum borrow size {}",
                    remaining, config.min_account_borrow_size
                ),
            });
        }
        deposit = leg_debt;
    }

    if deposit <= 0 {
        return Err(Error::NothingToLiquidate(format!(
            "no deposit possible on leg {} of {}",
            currency_index, vault
        )));
    }

    let deposit_primary = mul_div(deposit, leg.rate_to_primary, RATE_PRECISION)?;
    let mut shares = mul_div(
        safe_mul(position.vault_shares, deposit_primary)?,
        liquidation_rate,
        safe_mul(BPS_DIVISOR, share_value)?,
    )?
    .min(position.vault_shares);

    // Below the liquidation rate the premium would drain collateral faster
    // than debt; shares leave in proportion to the debt repaid
    let total_debt = safe_neg(factors.debt_value)?;
    if factors.collateral_ratio < ratio_at_liquidation_rate && total_debt > 0 {
        shares = shares.min(mul_div(position.vault_shares, deposit_primary, total_debt)?);
    }
    if shares <= 0 {
        return Err(Error::NothingToLiquidate(format!(
            "deposit {} buys no shares of {}",
            deposit, vault
        )));
    }

    tracing::debug!(
        account = %account,
        vault = %vault,
        leg = currency_index,
        deposit,
        deposit_primary,
        shares,
        "vault deleverage computed"
    );

    Ok(VaultDeleverage {
        account: *account,
        vault,
        maturity: position.maturity,
        currency_index,
        currency: leg.currency,
        deposit_underlying: deposit,
        deposit_primary,
        vault_shares_to_liquidator: shares,
        ratio_before: factors.collateral_ratio,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// FINALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Write a computed deleverage to the ledger
///
/// Repays the leg on the position and on the vault aggregate, moves the
/// shares to the liquidator's position at the same maturity and debits
/// the liquidator's cash in the leg currency. Returns the position's new
/// health factors.
pub fn finalize_deleverage<L: BalanceLedger + ?Sized>(
    ctx: &ValuationContext<'_>,
    ledger: &mut L,
    deleverage: &VaultDeleverage,
    liquidator: &AccountId,
    min_ratio: i128,
) -> Result<HealthFactors> {
    let index = deleverage.currency_index;
    let mut position = load_position(ledger, &deleverage.account, deleverage.vault)?;

    let new_debt = safe_add(position.debt(index)?, deleverage.deposit_underlying)?;
    if new_debt > 0 {
        return Err(Error::InvariantViolation(format!(
            "deleverage repays more than leg {} debt of {}",
            index, deleverage.account
        )));
    }
    position.set_debt(index, new_debt)?;

    if position.vault_shares < deleverage.vault_shares_to_liquidator {
        return Err(Error::InsufficientShares {
            required: deleverage.vault_shares_to_liquidator,
            available: position.vault_shares,
        });
    }
    position.vault_shares = safe_sub(position.vault_shares, deleverage.vault_shares_to_liquidator)?;

    let mut state = ledger.vault_state(deleverage.vault, deleverage.maturity)?;
    state.set_debt(index, safe_add(state.debt(index)?, deleverage.deposit_underlying)?)?;

    let mut receiver = match ledger.vault_account(liquidator, deleverage.vault)? {
        Some(existing) if existing.maturity == deleverage.maturity || existing.is_empty() => {
            VaultAccount {
                maturity: deleverage.maturity,
                ..existing
            }
        }
        Some(existing) => {
            return Err(Error::InvalidParameter {
                name: "liquidator".into(),
                reason: format!(
                    "holds a position in {} at maturity {}, not {}",
                    deleverage.vault, existing.maturity, deleverage.maturity
                ),
            })
        }
        None => VaultAccount::new(*liquidator, deleverage.vault, deleverage.maturity),
    };
    receiver.vault_shares = safe_add(receiver.vault_shares, deleverage.vault_shares_to_liquidator)?;

    let cash_rate = ctx.oracle.cash_rate(deleverage.currency, ctx.time)?;
    let mut balance = ledger.balance(liquidator, deleverage.currency)?;
    balance.cash = safe_sub(balance.cash, cash_rate.to_cash_up(deleverage.deposit_underlying)?)?;

    ledger.set_vault_account(position)?;
    ledger.set_vault_account(receiver)?;
    ledger.set_vault_state(state)?;
    ledger.set_balance(liquidator, deleverage.currency, balance)?;

    refresh_account_context(ledger, liquidator, ctx.currencies, ctx.time)?;
    check_account_health(ctx, ledger, liquidator, min_ratio)?;

    let after = vault_health(ctx, ledger, &deleverage.account, deleverage.vault)?.factors;
    if after.collateral_ratio < deleverage.ratio_before {
        return Err(Error::InvariantViolation(format!(
            "deleverage lowered ratio of {} in {} from {} to {}",
            deleverage.account, deleverage.vault, deleverage.ratio_before, after.collateral_ratio
        )));
    }
    Ok(after)
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY / EXIT CHECK
// ═══════════════════════════════════════════════════════════════════════════════

/// Check a vault position against its vault's ratio bounds
///
/// Transient and secondary cash must already be cleared. A position with
/// debt must sit at or above the vault minimum; a position holding shares
/// must not exceed the maximum required ratio, which also rejects shares
/// held without any debt.
pub fn check_vault_account_collateral_ratio<L: BalanceLedger + ?Sized>(
    ctx: &ValuationContext<'_>,
    ledger: &L,
    vault: VaultId,
    account: &AccountId,
) -> Result<()> {
    let config = ctx.vaults.get(vault)?;
    let position = match ledger.vault_account(account, vault)? {
        Some(position) => position,
        None => return Ok(()),
    };

    if position.temp_cash_balance != 0 {
        return Err(Error::TransientCashNotCleared(position.temp_cash_balance));
    }
    for (i, cash) in position.secondary_cash.iter().enumerate() {
        if *cash != 0 {
            return Err(Error::SecondaryCashNotSettled {
                leg: i as u8 + 1,
                amount: *cash,
            });
        }
    }
    if position.is_empty() {
        return Ok(());
    }

    let factors = vault_health(ctx, ledger, account, vault)?.factors;
    if factors.is_below(config.min_collateral_ratio) {
        return Err(Error::CollateralRatioTooLow {
            current: factors.collateral_ratio,
            minimum: config.min_collateral_ratio,
        });
    }
    if position.vault_shares > 0 && factors.collateral_ratio > config.max_required_account_collateral_ratio {
        return Err(Error::CollateralRatioTooHigh {
            current: factors.collateral_ratio,
            maximum: config.max_required_account_collateral_ratio,
        });
    }
    Ok(())
}
