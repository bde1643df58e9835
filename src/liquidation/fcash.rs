//! fCash liquidation.
//!
//! A liquidator takes fCash off an under-collateralized account at a
//! discount that sits between the oracle value and the risk-adjusted value
//! used by the health check. The difference is the account's gain in free
//! collateral and the liquidator's bounded profit.
//!
//! Liquidation runs in two phases. The calculation is a pure function of
//! committed state that returns an [`FCashLiquidation`]; finalization takes
//! that value and writes both parties' portfolios and balances.

use serde::{Deserialize, Serialize};

use crate::core::currency::CurrencyId;
use crate::error::{Error, Result};
use crate::storage::ledger::{refresh_account_context, BalanceLedger};
use crate::utils::constants::*;
use crate::utils::crypto::AccountId;
use crate::utils::math::*;
use crate::utils::validation::validate_liquidation_request;
use crate::valuation::discount::{negative_fcash_factors, positive_fcash_factors};
use crate::valuation::health::{account_health, check_account_health, AccountHealth, HealthFactors, ValuationContext};

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Computed transfer between a liquidated account and its liquidator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FCashLiquidation {
    /// Account being liquidated
    pub liquidated: AccountId,
    /// Currency the liquidator pays in
    pub local_currency: CurrencyId,
    /// Currency of the transferred fCash
    pub fcash_currency: CurrencyId,
    /// Maturities in request order
    pub maturities: Vec<u64>,
    /// Notional moved from the liquidated account to the liquidator, per maturity
    pub fcash_transferred: Vec<i128>,
    /// Liquidation discount factor per maturity (rate precision)
    pub discount_factors: Vec<i128>,
    /// Local underlying paid by the liquidator (negative = received)
    pub local_underlying_from_liquidator: i128,
    /// Local stable cash paid by the liquidator (negative = received)
    pub local_cash_from_liquidator: i128,
    /// Liquidated account's ratio before the transfer
    pub ratio_before: i128,
}

impl FCashLiquidation {
    /// Whether the liquidation moves anything
    pub fn is_empty(&self) -> bool {
        self.fcash_transferred.iter().all(|f| *f == 0)
    }

    /// Whether this is a cross-currency liquidation
    pub fn is_cross_currency(&self) -> bool {
        self.local_currency != self.fcash_currency
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED CHECKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate the request and load the account's health, which must be below `min_ratio`
fn liquidatable_health<L: BalanceLedger + ?Sized>(
    ctx: &ValuationContext<'_>,
    ledger: &L,
    liquidated: &AccountId,
    liquidator: &AccountId,
    maturities: &[u64],
    max_amounts: &[i128],
    min_ratio: i128,
) -> Result<AccountHealth> {
    validate_liquidation_request(maturities, max_amounts, ctx.time)?;
    if liquidated == liquidator {
        return Err(Error::SelfLiquidation);
    }

    let health = account_health(ctx, ledger, liquidated)?;
    if !health.factors.is_below(min_ratio) {
        tracing::warn!(
            account = %liquidated,
            ratio = health.factors.collateral_ratio,
            min_ratio,
            "liquidation rejected: account is healthy"
        );
        return Err(Error::PositionHealthy {
            ratio: health.factors.collateral_ratio,
            minimum: min_ratio,
        });
    }
    Ok(health)
}

/// Shortfall in reference units: collateral still needed to reach `min_ratio`
fn shortfall(factors: &HealthFactors, min_ratio: i128) -> Result<i128> {
    Ok(safe_neg(factors.free_collateral(min_ratio)?)?.max(0))
}

/// Apply a caller cap, where zero means uncapped
fn apply_cap(amount: i128, cap: i128) -> i128 {
    if cap > 0 {
        amount.min(cap)
    } else {
        amount
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOCAL CURRENCY
// ═══════════════════════════════════════════════════════════════════════════════

/// Compute a local-currency fCash liquidation
///
/// The direction follows the sign of the account's net local value. When
/// it is negative the liquidator buys the account's positive fCash for
/// cash. When it is positive the account's debt sits in another currency,
/// so the liquidator assumes the account's negative fCash and is paid from
/// the account's local cash.
#[allow(clippy::too_many_arguments)]
pub fn calculate_local<L: BalanceLedger + ?Sized>(
    ctx: &ValuationContext<'_>,
    ledger: &L,
    liquidated: &AccountId,
    liquidator: &AccountId,
    local_currency: CurrencyId,
    maturities: &[u64],
    max_amounts: &[i128],
    min_ratio: i128,
) -> Result<FCashLiquidation> {
    let config = ctx.currencies.get(local_currency)?;
    let health = liquidatable_health(
        ctx, ledger, liquidated, liquidator, maturities, max_amounts, min_ratio,
    )?;

    let net_local = health.net_local(local_currency);
    if net_local == 0 {
        return Err(Error::NothingToLiquidate(format!(
            "no net value in currency {}",
            local_currency
        )));
    }

    let exchange_rate = ctx.oracle.exchange_rate(local_currency)?;
    let cash_rate = ctx.oracle.cash_rate(local_currency, ctx.time)?;
    let portfolio = ledger.portfolio(liquidated)?;
    let shortfall = shortfall(&health.factors, min_ratio)?;

    // Net local value increase that closes the shortfall, capped so the
    // sign of the net local value never flips
    let mut remaining = if net_local < 0 {
        let debt_reduction = mul_div_up(shortfall, RATIO_PRECISION, min_ratio)?;
        let buffered = mul_div_up(debt_reduction, BPS_DIVISOR, config.debt_buffer_bps)?;
        mul_div_up(buffered, RATE_PRECISION, exchange_rate)?.min(-net_local)
    } else {
        let haircut = mul_div_up(shortfall, BPS_DIVISOR, config.collateral_haircut_bps)?;
        mul_div_up(haircut, RATE_PRECISION, exchange_rate)?
    };

    // Cash the account can pay when the liquidator assumes its debt
    let mut cash_available = if net_local > 0 {
        cash_rate.to_underlying(ledger.balance(liquidated, local_currency)?.cash)?.max(0)
    } else {
        0
    };

    let mut transferred = Vec::with_capacity(maturities.len());
    let mut discount_factors = Vec::with_capacity(maturities.len());
    let mut underlying_from_liquidator = 0i128;

    for (maturity, cap) in maturities.iter().zip(max_amounts) {
        let notional = portfolio.notional(local_currency, *maturity);
        let rate = ctx.oracle.oracle_rate(local_currency, *maturity, ctx.time)?;
        let time_to_maturity = maturity - ctx.time;

        if remaining <= 0 || (net_local < 0 && notional <= 0) || (net_local > 0 && notional >= 0) {
            transferred.push(0);
            discount_factors.push(0);
            continue;
        }

        if net_local < 0 {
            let factors = positive_fcash_factors(config, rate, time_to_maturity)?;
            let benefit_per_unit = safe_sub(factors.liquidation, factors.risk_adjusted)?;
            if benefit_per_unit <= 0 {
                tracing::debug!(maturity, rate, "selling fCash at this maturity does not improve health");
                transferred.push(0);
                discount_factors.push(factors.liquidation);
                continue;
            }
            let mut fcash = mul_div_up(remaining, RATE_PRECISION, benefit_per_unit)?;
            fcash = apply_cap(fcash.min(notional), *cap);

            let payment = mul_div_up(fcash, factors.liquidation, RATE_PRECISION)?;
            let benefit = mul_div(fcash, benefit_per_unit, RATE_PRECISION)?;
            remaining = safe_sub(remaining, benefit)?;
            underlying_from_liquidator = safe_add(underlying_from_liquidator, payment)?;

            tracing::debug!(maturity, fcash, payment, df = factors.liquidation, "positive fCash purchased");
            transferred.push(fcash);
            discount_factors.push(factors.liquidation);
        } else {
            let factors = negative_fcash_factors(config, rate, time_to_maturity)?;
            let benefit_per_unit = safe_sub(factors.risk_adjusted, factors.liquidation)?;
            // Rates at or below the liquidation buffer leave nothing to gain
            if benefit_per_unit <= 0 {
                tracing::debug!(maturity, rate, "assuming debt at this maturity does not improve health");
                transferred.push(0);
                discount_factors.push(factors.liquidation);
                continue;
            }
            let mut fcash = mul_div_up(remaining, RATE_PRECISION, benefit_per_unit)?;
            fcash = apply_cap(fcash.min(-notional), *cap);
            fcash = fcash.min(mul_div(cash_available, RATE_PRECISION, factors.liquidation)?);
            if fcash <= 0 {
                transferred.push(0);
                discount_factors.push(factors.liquidation);
                continue;
            }

            let payment = mul_div(fcash, factors.liquidation, RATE_PRECISION)?;
            let benefit = mul_div(fcash, benefit_per_unit, RATE_PRECISION)?;
            remaining = safe_sub(remaining, benefit)?;
            cash_available = safe_sub(cash_available, payment)?;
            underlying_from_liquidator = safe_sub(underlying_from_liquidator, payment)?;

            tracing::debug!(maturity, fcash = -fcash, payment, df = factors.liquidation, "negative fCash assumed");
            transferred.push(-fcash);
            discount_factors.push(factors.liquidation);
        }
    }

    finish(
        health.factors.collateral_ratio,
        *liquidated,
        local_currency,
        local_currency,
        maturities,
        transferred,
        discount_factors,
        underlying_from_liquidator,
        cash_rate.to_cash_up(underlying_from_liquidator)?,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// CROSS CURRENCY
// ═══════════════════════════════════════════════════════════════════════════════

/// Compute a cross-currency fCash liquidation
///
/// The liquidator pays local currency, which reduces the account's local
/// debt, and receives positive fCash in the collateral currency. A
/// maturity contributes only when the debt relief outweighs the collateral
/// given up at the risk-adjusted value.
#[allow(clippy::too_many_arguments)]
pub fn calculate_cross<L: BalanceLedger + ?Sized>(
    ctx: &ValuationContext<'_>,
    ledger: &L,
    liquidated: &AccountId,
    liquidator: &AccountId,
    local_currency: CurrencyId,
    fcash_currency: CurrencyId,
    maturities: &[u64],
    max_amounts: &[i128],
    min_ratio: i128,
) -> Result<FCashLiquidation> {
    if local_currency == fcash_currency {
        return Err(Error::InvalidParameter {
            name: "fcash_currency".into(),
            reason: "must differ from the local currency".into(),
        });
    }
    let local_config = ctx.currencies.get(local_currency)?;
    let collateral_config = ctx.currencies.get(fcash_currency)?;
    let health = liquidatable_health(
        ctx, ledger, liquidated, liquidator, maturities, max_amounts, min_ratio,
    )?;

    let net_local = health.net_local(local_currency);
    let net_collateral = health.net_local(fcash_currency);
    if net_local >= 0 {
        return Err(Error::NothingToLiquidate(format!(
            "no debt in local currency {}",
            local_currency
        )));
    }
    if net_collateral <= 0 {
        return Err(Error::NothingToLiquidate(format!(
            "no collateral in currency {}",
            fcash_currency
        )));
    }

    let local_rate = ctx.oracle.exchange_rate(local_currency)?;
    let collateral_rate = ctx.oracle.exchange_rate(fcash_currency)?;
    let cash_rate = ctx.oracle.cash_rate(local_currency, ctx.time)?;
    let portfolio = ledger.portfolio(liquidated)?;

    let mut remaining = shortfall(&health.factors, min_ratio)?;
    let mut local_capacity = -net_local;
    let mut collateral_capacity = net_collateral;

    let mut transferred = Vec::with_capacity(maturities.len());
    let mut discount_factors = Vec::with_capacity(maturities.len());
    let mut underlying_from_liquidator = 0i128;

    for (maturity, cap) in maturities.iter().zip(max_amounts) {
        let notional = portfolio.notional(fcash_currency, *maturity);
        if remaining <= 0 || notional <= 0 || local_capacity <= 0 || collateral_capacity <= 0 {
            transferred.push(0);
            discount_factors.push(0);
            continue;
        }

        let rate = ctx.oracle.oracle_rate(fcash_currency, *maturity, ctx.time)?;
        let factors = positive_fcash_factors(collateral_config, rate, maturity - ctx.time)?;

        // Free collateral gained per unit of fCash, in collateral underlying (rate precision)
        let relief = mul_div(
            apply_bps(factors.liquidation, local_config.debt_buffer_bps)?,
            min_ratio,
            RATIO_PRECISION,
        )?;
        let given_up = apply_bps(factors.risk_adjusted, collateral_config.collateral_haircut_bps)?;
        let benefit_per_unit = safe_sub(relief, given_up)?;
        if benefit_per_unit <= 0 {
            tracing::debug!(maturity, relief, given_up, "maturity does not improve health");
            transferred.push(0);
            discount_factors.push(factors.liquidation);
            continue;
        }

        let required_collateral = mul_div_up(remaining, RATE_PRECISION, collateral_rate)?;
        let mut fcash = mul_div_up(required_collateral, RATE_PRECISION, benefit_per_unit)?;
        fcash = apply_cap(fcash.min(notional), *cap);

        // Payment must not flip the local currency positive
        let local_limit = mul_div(
            mul_div(local_capacity, local_rate, collateral_rate)?,
            RATE_PRECISION,
            factors.liquidation,
        )?;
        // fCash taken must not exceed the collateral currency's net value
        let collateral_limit = mul_div(collateral_capacity, RATE_PRECISION, factors.risk_adjusted)?;
        fcash = fcash.min(local_limit).min(collateral_limit);
        if fcash <= 0 {
            transferred.push(0);
            discount_factors.push(factors.liquidation);
            continue;
        }

        let paid_collateral_terms = mul_div_up(fcash, factors.liquidation, RATE_PRECISION)?;
        let payment = mul_div_up(paid_collateral_terms, collateral_rate, local_rate)?.min(local_capacity);
        let benefit = mul_div(mul_div(fcash, benefit_per_unit, RATE_PRECISION)?, collateral_rate, RATE_PRECISION)?;

        remaining = safe_sub(remaining, benefit)?;
        local_capacity = safe_sub(local_capacity, payment)?;
        collateral_capacity = safe_sub(
            collateral_capacity,
            mul_div_up(fcash, factors.risk_adjusted, RATE_PRECISION)?,
        )?;
        underlying_from_liquidator = safe_add(underlying_from_liquidator, payment)?;

        tracing::debug!(maturity, fcash, payment, df = factors.liquidation, "collateral fCash purchased");
        transferred.push(fcash);
        discount_factors.push(factors.liquidation);
    }

    finish(
        health.factors.collateral_ratio,
        *liquidated,
        local_currency,
        fcash_currency,
        maturities,
        transferred,
        discount_factors,
        underlying_from_liquidator,
        cash_rate.to_cash_up(underlying_from_liquidator)?,
    )
}

#[allow(clippy::too_many_arguments)]
fn finish(
    ratio_before: i128,
    liquidated: AccountId,
    local_currency: CurrencyId,
    fcash_currency: CurrencyId,
    maturities: &[u64],
    fcash_transferred: Vec<i128>,
    discount_factors: Vec<i128>,
    local_underlying_from_liquidator: i128,
    local_cash_from_liquidator: i128,
) -> Result<FCashLiquidation> {
    let liquidation = FCashLiquidation {
        liquidated,
        local_currency,
        fcash_currency,
        maturities: maturities.to_vec(),
        fcash_transferred,
        discount_factors,
        local_underlying_from_liquidator,
        local_cash_from_liquidator,
        ratio_before,
    };
    if liquidation.is_empty() {
        return Err(Error::NothingToLiquidate(
            "no fCash transferable at the given maturities".into(),
        ));
    }
    Ok(liquidation)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FINALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Write a computed liquidation to the ledger
///
/// Moves the fCash and the local cash between both parties, refreshes
/// their contexts, asserts the liquidated account did not get less healthy
/// and runs the liquidator's own health check. Returns the liquidated
/// account's new health factors.
pub fn finalize<L: BalanceLedger + ?Sized>(
    ctx: &ValuationContext<'_>,
    ledger: &mut L,
    liquidation: &FCashLiquidation,
    liquidator: &AccountId,
    min_ratio: i128,
) -> Result<HealthFactors> {
    let liquidated = &liquidation.liquidated;
    if liquidated == liquidator {
        return Err(Error::SelfLiquidation);
    }

    let mut liquidated_portfolio = ledger.portfolio(liquidated)?;
    let mut liquidator_portfolio = ledger.portfolio(liquidator)?;
    let currency = liquidation.fcash_currency;

    for (maturity, fcash) in liquidation.maturities.iter().zip(&liquidation.fcash_transferred) {
        if *fcash == 0 {
            continue;
        }
        let held = liquidated_portfolio.notional(currency, *maturity);
        if held.signum() != fcash.signum() || held.abs() < fcash.abs() {
            return Err(Error::InsufficientBalance {
                required: *fcash,
                available: held,
            });
        }
        liquidated_portfolio.add(currency, *maturity, safe_neg(*fcash)?)?;
        liquidator_portfolio.add(currency, *maturity, *fcash)?;
    }
    ledger.set_portfolio(liquidated, liquidated_portfolio)?;
    ledger.set_portfolio(liquidator, liquidator_portfolio)?;

    let local = liquidation.local_currency;
    let cash = liquidation.local_cash_from_liquidator;
    let mut liquidated_balance = ledger.balance(liquidated, local)?;
    let mut liquidator_balance = ledger.balance(liquidator, local)?;
    liquidated_balance.cash = safe_add(liquidated_balance.cash, cash)?;
    liquidator_balance.cash = safe_sub(liquidator_balance.cash, cash)?;
    ledger.set_balance(liquidated, local, liquidated_balance)?;
    ledger.set_balance(liquidator, local, liquidator_balance)?;

    refresh_account_context(ledger, liquidated, ctx.currencies, ctx.time)?;
    refresh_account_context(ledger, liquidator, ctx.currencies, ctx.time)?;

    let after = account_health(ctx, ledger, liquidated)?.factors;
    if after.collateral_ratio < liquidation.ratio_before {
        return Err(Error::InvariantViolation(format!(
            "liquidation lowered ratio of {} from {} to {}",
            liquidated, liquidation.ratio_before, after.collateral_ratio
        )));
    }

    check_account_health(ctx, ledger, liquidator, min_ratio)?;
    Ok(after)
}
