//! Health factor computation for accounts and vault positions.
//!
//! Account health nets every currency's cash and risk-adjusted fCash into
//! a signed local value, then converts positive values to haircut
//! collateral and negative values to buffered debt in the reference unit.
//! Vault health compares the value of the vault shares against the debt of
//! every borrow leg expressed in the primary currency.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::currency::{CurrencyId, CurrencyRegistry};
use crate::core::vault::{VaultId, VaultRegistry};
use crate::error::{Error, Result};
use crate::oracle::rate_oracle::RateOracle;
use crate::oracle::vault_shares::VaultShareValuation;
use crate::storage::ledger::BalanceLedger;
use crate::utils::constants::*;
use crate::utils::crypto::AccountId;
use crate::utils::math::*;
use crate::valuation::discount::risk_adjusted_present_value;

// ═══════════════════════════════════════════════════════════════════════════════
// CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Read-only inputs shared by every valuation
#[derive(Clone, Copy)]
pub struct ValuationContext<'a> {
    /// Rate source
    pub oracle: &'a dyn RateOracle,
    /// Registered currencies
    pub currencies: &'a CurrencyRegistry,
    /// Registered vaults
    pub vaults: &'a VaultRegistry,
    /// Vault share pricing
    pub share_valuation: &'a dyn VaultShareValuation,
    /// Valuation time
    pub time: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// HEALTH FACTORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Collateral against debt of a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthFactors {
    /// collateral / -debt in ratio precision; `i128::MAX` without debt
    pub collateral_ratio: i128,
    /// Haircut collateral value
    pub collateral_value: i128,
    /// Buffered debt value (zero or negative)
    pub debt_value: i128,
    /// Exchange rates used, by currency (rate precision)
    pub exchange_rates: BTreeMap<CurrencyId, i128>,
}

impl HealthFactors {
    fn new(
        collateral_value: i128,
        debt_value: i128,
        exchange_rates: BTreeMap<CurrencyId, i128>,
    ) -> Result<Self> {
        Ok(Self {
            collateral_ratio: collateral_ratio(collateral_value, debt_value)?,
            collateral_value,
            debt_value,
            exchange_rates,
        })
    }

    /// Collateral left after covering debt at `min_ratio`; negative when short
    pub fn free_collateral(&self, min_ratio: i128) -> Result<i128> {
        let required = mul_div_up(safe_neg(self.debt_value)?, min_ratio, RATIO_PRECISION)?;
        safe_sub(self.collateral_value, required)
    }

    /// Whether the ratio is strictly below `min_ratio`
    pub fn is_below(&self, min_ratio: i128) -> bool {
        self.debt_value < 0 && self.collateral_ratio < min_ratio
    }

    /// Whether the position carries debt
    pub fn has_debt(&self) -> bool {
        self.debt_value < 0
    }
}

/// Account health with the per-currency net values behind it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountHealth {
    /// Aggregate factors in the reference unit
    pub factors: HealthFactors,
    /// Net local value per currency in underlying (before haircut or buffer)
    pub net_local: BTreeMap<CurrencyId, i128>,
}

impl AccountHealth {
    /// Net local value of a currency (zero if not held)
    pub fn net_local(&self, currency: CurrencyId) -> i128 {
        self.net_local.get(&currency).copied().unwrap_or(0)
    }
}

/// One borrow leg of a vault position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultDebtLeg {
    /// Leg currency
    pub currency: CurrencyId,
    /// Debt in the leg's underlying (zero or negative)
    pub debt_underlying: i128,
    /// Leg underlying to primary underlying (rate precision)
    pub rate_to_primary: i128,
    /// Debt in primary underlying
    pub debt_in_primary: i128,
}

/// Vault position health
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultHealth {
    /// Factors in primary underlying
    pub factors: HealthFactors,
    /// Value of the account's shares in primary underlying
    pub vault_share_value: i128,
    /// Borrow legs in index order (primary first)
    pub debt_legs: Vec<VaultDebtLeg>,
}

impl VaultHealth {
    /// Leg by index
    pub fn leg(&self, index: u8) -> Result<&VaultDebtLeg> {
        self.debt_legs
            .get(index as usize)
            .ok_or(Error::InvalidCurrencyIndex(index))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCOUNT VALUATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Net value of an account's cash and fCash in one currency, in underlying
pub fn net_local_value<L: BalanceLedger + ?Sized>(
    ctx: &ValuationContext<'_>,
    ledger: &L,
    account: &AccountId,
    currency: CurrencyId,
) -> Result<i128> {
    let config = ctx.currencies.get(currency)?;
    let balance = ledger.balance(account, currency)?;
    let portfolio = ledger.portfolio(account)?;

    let mut net = if balance.cash != 0 {
        ctx.oracle
            .cash_rate(currency, ctx.time)?
            .to_underlying(balance.cash)?
    } else {
        0
    };

    for asset in portfolio.assets_in(currency) {
        let pv = risk_adjusted_present_value(config, ctx.oracle, asset, ctx.time)?;
        tracing::trace!(currency = %currency, maturity = asset.maturity, notional = asset.notional, pv, "fCash valued");
        net = safe_add(net, pv)?;
    }

    Ok(net)
}

/// Health of an account across every registered currency
pub fn account_health<L: BalanceLedger + ?Sized>(
    ctx: &ValuationContext<'_>,
    ledger: &L,
    account: &AccountId,
) -> Result<AccountHealth> {
    let mut collateral = 0i128;
    let mut debt = 0i128;
    let mut net_local = BTreeMap::new();
    let mut exchange_rates = BTreeMap::new();

    for config in ctx.currencies.iter() {
        let net = net_local_value(ctx, ledger, account, config.id)?;
        if net == 0 {
            continue;
        }

        let exchange_rate = ctx.oracle.exchange_rate(config.id)?;
        let reference = mul_div_floor(net, exchange_rate, RATE_PRECISION)?;
        if net > 0 {
            collateral = safe_add(collateral, apply_bps(reference, config.collateral_haircut_bps)?)?;
        } else {
            debt = safe_add(debt, apply_bps(reference, config.debt_buffer_bps)?)?;
        }

        net_local.insert(config.id, net);
        exchange_rates.insert(config.id, exchange_rate);
    }

    Ok(AccountHealth {
        factors: HealthFactors::new(collateral, debt, exchange_rates)?,
        net_local,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// VAULT VALUATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Health of an account's position in a vault, in primary underlying
pub fn vault_health<L: BalanceLedger + ?Sized>(
    ctx: &ValuationContext<'_>,
    ledger: &L,
    account: &AccountId,
    vault: VaultId,
) -> Result<VaultHealth> {
    let config = ctx.vaults.get(vault)?;
    let position = ledger
        .vault_account(account, vault)?
        .ok_or_else(|| Error::VaultAccountNotFound {
            account: account.to_hex(),
            vault: vault.0,
        })?;

    let vault_share_value = if position.vault_shares != 0 {
        ctx.share_valuation.shares_to_underlying(
            vault,
            position.maturity,
            position.vault_shares,
            ctx.time,
        )?
    } else {
        0
    };
    let collateral = safe_add(vault_share_value, position.temp_cash_balance)?;

    let primary_rate = ctx.oracle.exchange_rate(config.primary_currency)?;
    let mut exchange_rates = BTreeMap::new();
    let mut debt_legs = Vec::with_capacity(config.leg_count());
    let mut debt = 0i128;

    for index in 0..config.leg_count() as u8 {
        let currency = config.leg_currency(index)?;
        let debt_underlying = position.debt(index)?;
        if debt_underlying > 0 {
            return Err(Error::InvariantViolation(format!(
                "{} leg {} holds positive debt {}",
                vault, index, debt_underlying
            )));
        }

        let rate_to_primary = if index == 0 {
            RATE_PRECISION
        } else {
            let leg_rate = ctx.oracle.exchange_rate(currency)?;
            mul_div(leg_rate, RATE_PRECISION, primary_rate)?
        };
        let debt_in_primary = mul_div_floor(debt_underlying, rate_to_primary, RATE_PRECISION)?;
        debt = safe_add(debt, debt_in_primary)?;

        exchange_rates.insert(currency, rate_to_primary);
        debt_legs.push(VaultDebtLeg {
            currency,
            debt_underlying,
            rate_to_primary,
            debt_in_primary,
        });
    }

    Ok(VaultHealth {
        factors: HealthFactors::new(collateral, debt, exchange_rates)?,
        vault_share_value,
        debt_legs,
    })
}

/// Health factors of an account, or of its position in `vault`
pub fn compute_health_factors<L: BalanceLedger + ?Sized>(
    ctx: &ValuationContext<'_>,
    ledger: &L,
    account: &AccountId,
    vault: Option<VaultId>,
) -> Result<HealthFactors> {
    match vault {
        Some(vault) => Ok(vault_health(ctx, ledger, account, vault)?.factors),
        None => Ok(account_health(ctx, ledger, account)?.factors),
    }
}

/// Fail if an account carrying debt sits below `min_ratio`
///
/// Accounts whose context shows no debt are always solvent and skip the
/// valuation entirely.
pub fn check_account_health<L: BalanceLedger + ?Sized>(
    ctx: &ValuationContext<'_>,
    ledger: &L,
    account: &AccountId,
    min_ratio: i128,
) -> Result<()> {
    if !ledger.account_context(account)?.has_debt {
        return Ok(());
    }

    let factors = account_health(ctx, ledger, account)?.factors;
    if factors.is_below(min_ratio) {
        tracing::warn!(account = %account, ratio = factors.collateral_ratio, min_ratio, "account health check failed");
        return Err(Error::CollateralRatioTooLow {
            current: factors.collateral_ratio,
            minimum: min_ratio,
        });
    }
    Ok(())
}

/// Advance the oracle's accrual state for `currencies` to `time`
pub fn accrue_currencies(
    oracle: &mut dyn RateOracle,
    currencies: impl IntoIterator<Item = CurrencyId>,
    time: u64,
) -> Result<()> {
    for currency in currencies {
        oracle.accrue(currency, time)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::CurrencyConfig;
    use crate::core::portfolio::{AccountBalance, Portfolio};
    use crate::core::vault::{VaultAccount, VaultConfig};
    use crate::oracle::rate_oracle::{CurrencyRates, StaticRateOracle};
    use crate::oracle::vault_shares::StaticShareValuation;
    use crate::storage::ledger::InMemoryLedger;

    const USDC: CurrencyId = CurrencyId(1);
    const ETH: CurrencyId = CurrencyId(2);

    struct Fixture {
        oracle: StaticRateOracle,
        currencies: CurrencyRegistry,
        vaults: VaultRegistry,
        shares: StaticShareValuation,
    }

    impl Fixture {
        fn new() -> Self {
            let oracle = StaticRateOracle::new()
                .with_currency(USDC, CurrencyRates::flat(RATE_PRECISION, RATE_PRECISION, 50_000_000))
                .with_currency(ETH, CurrencyRates::flat(RATE_PRECISION, 2 * RATE_PRECISION, 50_000_000));

            let mut currencies = CurrencyRegistry::new();
            currencies.register(CurrencyConfig::new(USDC, "USDC")).unwrap();
            currencies.register(CurrencyConfig::new(ETH, "ETH")).unwrap();

            let mut vaults = VaultRegistry::new();
            vaults
                .register(VaultConfig::new(VaultId(1), USDC).with_secondary(ETH), &currencies)
                .unwrap();

            Self {
                oracle,
                currencies,
                vaults,
                shares: StaticShareValuation::new().with_price(VaultId(1), RATE_PRECISION),
            }
        }

        fn ctx(&self) -> ValuationContext<'_> {
            ValuationContext {
                oracle: &self.oracle,
                currencies: &self.currencies,
                vaults: &self.vaults,
                share_valuation: &self.shares,
                time: 0,
            }
        }
    }

    #[test]
    fn test_cash_only_account() {
        let fixture = Fixture::new();
        let alice = AccountId::repeat(1);
        let mut ledger = InMemoryLedger::new();
        ledger.set_balance(&alice, USDC, AccountBalance::cash(1_000)).unwrap();
        ledger.set_balance(&alice, ETH, AccountBalance::cash(-100)).unwrap();

        let health = account_health(&fixture.ctx(), &ledger, &alice).unwrap();
        // 1000 * 80% collateral, 100 ETH * 2 * 120% debt
        assert_eq!(health.factors.collateral_value, 800);
        assert_eq!(health.factors.debt_value, -240);
        assert_eq!(health.factors.collateral_ratio, 800 * RATIO_PRECISION / 240);
        assert_eq!(health.net_local(ETH), -100);
        assert_eq!(health.factors.exchange_rates[&ETH], 2 * RATE_PRECISION);
    }

    #[test]
    fn test_no_debt_is_infinite_ratio() {
        let fixture = Fixture::new();
        let alice = AccountId::repeat(1);
        let mut ledger = InMemoryLedger::new();
        ledger.set_balance(&alice, USDC, AccountBalance::cash(10)).unwrap();

        let factors = compute_health_factors(&fixture.ctx(), &ledger, &alice, None).unwrap();
        assert_eq!(factors.collateral_ratio, INFINITE_RATIO);
        assert!(!factors.is_below(RATIO_PRECISION));
    }

    #[test]
    fn test_fcash_nets_within_currency() {
        let fixture = Fixture::new();
        let alice = AccountId::repeat(1);
        let mut ledger = InMemoryLedger::new();
        ledger.set_balance(&alice, USDC, AccountBalance::cash(-900)).unwrap();
        let mut portfolio = Portfolio::new();
        portfolio.add(USDC, SECONDS_IN_YEAR, 1_000).unwrap();
        ledger.set_portfolio(&alice, portfolio).unwrap();

        let health = account_health(&fixture.ctx(), &ledger, &alice).unwrap();
        // 1000 * exp(-0.065) = 937.06..., net 37
        assert_eq!(health.net_local(USDC), 937 - 900);
        assert_eq!(health.factors.collateral_value, 29);
        assert_eq!(health.factors.debt_value, 0);
    }

    #[test]
    fn test_health_check_skipped_without_debt_flag() {
        use crate::storage::ledger::refresh_account_context;

        let fixture = Fixture::new();
        let alice = AccountId::repeat(1);
        let mut ledger = InMemoryLedger::new();
        ledger.set_balance(&alice, USDC, AccountBalance::cash(-100)).unwrap();

        // Context not refreshed yet: no debt flag, check passes
        assert!(check_account_health(&fixture.ctx(), &ledger, &alice, RATIO_PRECISION).is_ok());

        refresh_account_context(&mut ledger, &alice, &fixture.currencies, 0).unwrap();
        assert!(matches!(
            check_account_health(&fixture.ctx(), &ledger, &alice, RATIO_PRECISION),
            Err(Error::CollateralRatioTooLow { current: 0, .. })
        ));
    }

    #[test]
    fn test_free_collateral() {
        let factors = HealthFactors::new(150, -100, BTreeMap::new()).unwrap();
        assert_eq!(factors.free_collateral(RATIO_PRECISION).unwrap(), 50);
        assert_eq!(factors.free_collateral(2 * RATIO_PRECISION).unwrap(), -50);
    }

    #[test]
    fn test_vault_health_converts_secondary_debt() {
        let fixture = Fixture::new();
        let alice = AccountId::repeat(1);
        let mut ledger = InMemoryLedger::new();
        let mut position = VaultAccount::new(alice, VaultId(1), SECONDS_IN_YEAR);
        position.vault_shares = 3_000;
        position.account_debt_underlying = -1_000;
        position.secondary_debt = [-500, 0];
        ledger.set_vault_account(position).unwrap();

        let health = vault_health(&fixture.ctx(), &ledger, &alice, VaultId(1)).unwrap();
        assert_eq!(health.vault_share_value, 3_000);
        assert_eq!(health.factors.debt_value, -2_000);
        assert_eq!(health.factors.collateral_ratio, 1_500_000_000);
        assert_eq!(health.leg(1).unwrap().rate_to_primary, 2 * RATE_PRECISION);
        assert!(health.leg(2).is_err());
    }

    #[test]
    fn test_missing_vault_account() {
        let fixture = Fixture::new();
        let ledger = InMemoryLedger::new();
        assert!(matches!(
            vault_health(&fixture.ctx(), &ledger, &AccountId::repeat(9), VaultId(1)),
            Err(Error::VaultAccountNotFound { vault: 1, .. })
        ));
    }
}
