//! nToken redemption.
//!
//! Redeeming shares runs in three stages:
//! 1. Withdraw the redeemer's pro-rata share of the pool: cash, liquidity
//!    tokens in every market and the pool's own fCash.
//! 2. Optionally sell the net fCash claim at each market maturity back to
//!    the market. Trades that cannot clear, and fCash at maturities without
//!    a market, become residuals.
//! 3. Credit the cash, place residuals in the redeemer's portfolio and
//!    shrink the supply.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::currency::CurrencyId;
use crate::core::ntoken::NTokenPortfolio;
use crate::error::{Error, Result};
use crate::market::MarketAdapter;
use crate::storage::ledger::{refresh_account_context, BalanceLedger};
use crate::utils::crypto::AccountId;
use crate::utils::math::*;
use crate::utils::validation::validate_positive;
use crate::valuation::health::{check_account_health, ValuationContext};

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST / RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Parameters of one redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemRequest {
    /// Account redeeming
    pub redeemer: AccountId,
    /// nToken currency
    pub currency: CurrencyId,
    /// Shares to redeem
    pub shares: i128,
    /// Sell the net fCash claims back to the markets
    pub sell_residual: bool,
    /// Accept residual fCash into the redeemer's portfolio
    pub accept_residual_assets: bool,
    /// Redemption runs inside a batch, where residuals are never allowed
    #[serde(default)]
    pub batched: bool,
}

impl RedeemRequest {
    /// Standalone redemption
    pub fn new(redeemer: AccountId, currency: CurrencyId, shares: i128) -> Self {
        Self {
            redeemer,
            currency,
            shares,
            sell_residual: true,
            accept_residual_assets: false,
            batched: false,
        }
    }

    /// Set the residual handling flags
    pub fn with_residuals(mut self, sell_residual: bool, accept_residual_assets: bool) -> Self {
        self.sell_residual = sell_residual;
        self.accept_residual_assets = accept_residual_assets;
        self
    }

    /// Mark the redemption as part of a batch
    pub fn batched(mut self) -> Self {
        self.batched = true;
        self.accept_residual_assets = false;
        self
    }
}

/// Outcome of a redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NTokenRedemption {
    /// Account that redeemed
    pub redeemer: AccountId,
    /// nToken currency
    pub currency: CurrencyId,
    /// Shares burned
    pub shares: i128,
    /// Stable cash credited to the redeemer
    pub cash_redeemed: i128,
    /// fCash placed in the redeemer's portfolio, by maturity
    pub residuals: BTreeMap<u64, i128>,
}

impl NTokenRedemption {
    /// Whether residual fCash was placed
    pub fn has_residual_placed(&self) -> bool {
        !self.residuals.is_empty()
    }
}

/// Pool share withdrawn before disposal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Withdrawal {
    cash: i128,
    /// Net fCash claim at market maturities
    market_fcash: BTreeMap<u64, i128>,
    /// fCash at maturities without a market
    idiosyncratic: BTreeMap<u64, i128>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAGES
// ═══════════════════════════════════════════════════════════════════════════════

/// Reject a partial withdrawal that would leave exactly zero tokens
pub fn check_remaining_tokens(maturity: u64, tokens: i128, removed: i128, full: bool) -> Result<()> {
    if !full && removed > 0 && tokens == removed {
        return Err(Error::DustLiquidityPosition(maturity));
    }
    Ok(())
}

/// Stage 1: take the pro-rata share of cash, liquidity and fCash out of the pool
fn withdraw<L: BalanceLedger + ?Sized>(
    ledger: &mut L,
    ntoken: &mut NTokenPortfolio,
    shares: i128,
) -> Result<Withdrawal> {
    let supply = ntoken.total_supply;
    let currency = ntoken.currency;
    let full = shares == supply;
    let mut withdrawal = Withdrawal {
        cash: pro_rata(ntoken.cash_balance, shares, supply)?,
        ..Withdrawal::default()
    };
    ntoken.cash_balance = safe_sub(ntoken.cash_balance, withdrawal.cash)?;

    let mut pool_fcash = Vec::with_capacity(ntoken.liquidity_tokens.len());
    for token in ntoken.liquidity_tokens.iter_mut() {
        let removed = if full {
            token.tokens
        } else {
            pro_rata(token.tokens, shares, supply)?
        };
        check_remaining_tokens(token.maturity, token.tokens, removed, full)?;

        let mut claim_fcash = 0;
        if removed > 0 {
            let mut market = ledger
                .market(currency, token.maturity)?
                .ok_or(Error::MarketNotFound {
                    currency: currency.0,
                    maturity: token.maturity,
                })?;
            let claim = market.remove_liquidity(removed)?;
            ledger.set_market(market)?;

            token.tokens = safe_sub(token.tokens, removed)?;
            withdrawal.cash = safe_add(withdrawal.cash, claim.cash)?;
            claim_fcash = claim.fcash;
        }

        let held = ntoken.fcash.get(&token.maturity).copied().unwrap_or(0);
        let share = pro_rata(held, shares, supply)?;
        pool_fcash.push((token.maturity, safe_sub(held, share)?));

        let net = safe_add(claim_fcash, share)?;
        if net != 0 {
            withdrawal.market_fcash.insert(token.maturity, net);
        }
    }
    for (maturity, remaining) in pool_fcash {
        ntoken.set_fcash(maturity, remaining);
    }

    let idiosyncratic: Vec<(u64, i128)> = ntoken.idiosyncratic_fcash().collect();
    for (maturity, held) in idiosyncratic {
        let share = pro_rata(held, shares, supply)?;
        ntoken.set_fcash(maturity, safe_sub(held, share)?);
        if share != 0 {
            withdrawal.idiosyncratic.insert(maturity, share);
        }
    }

    ntoken.liquidity_tokens.retain(|t| t.tokens > 0);
    Ok(withdrawal)
}

/// Stage 2: sell market fCash claims; whatever cannot be sold is a residual
fn dispose<L: BalanceLedger + ?Sized>(
    ctx: &ValuationContext<'_>,
    ledger: &mut L,
    adapter: &dyn MarketAdapter,
    currency: CurrencyId,
    withdrawal: Withdrawal,
    sell: bool,
) -> Result<(i128, BTreeMap<u64, i128>)> {
    let mut cash = withdrawal.cash;
    let mut residuals = withdrawal.idiosyncratic;

    if !sell {
        for (maturity, net) in withdrawal.market_fcash {
            residuals.insert(maturity, net);
        }
        return Ok((cash, residuals));
    }

    let cash_rate = ctx.oracle.cash_rate(currency, ctx.time)?;
    for (maturity, net) in withdrawal.market_fcash {
        let market = ledger
            .market(currency, maturity)?
            .ok_or(Error::MarketNotFound {
                currency: currency.0,
                maturity,
            })?;

        match adapter.execute_trade(&market, safe_neg(net)?, &cash_rate, ctx.time)? {
            Some(outcome) => {
                tracing::debug!(maturity, fcash = net, cash = outcome.cash_to_account, "residual sold");
                cash = safe_add(cash, outcome.cash_to_account)?;
                ledger.set_market(outcome.new_market)?;
            }
            None => {
                tracing::warn!(
                    currency = %currency,
                    maturity,
                    fcash = net,
                    "residual trade did not clear, keeping fCash"
                );
                residuals.insert(maturity, net);
            }
        }
    }

    Ok((cash, residuals))
}

// ═══════════════════════════════════════════════════════════════════════════════
// REDEMPTION ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-currency redemption totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionTotals {
    /// Completed redemptions
    pub redemptions: u64,
    /// Shares burned
    pub shares_redeemed: i128,
    /// Cash paid out
    pub cash_redeemed: i128,
    /// Redemptions that placed residual fCash
    pub with_residuals: u64,
}

/// Engine converting nToken shares into cash and residual fCash
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedemptionEngine {
    totals: BTreeMap<CurrencyId, RedemptionTotals>,
}

impl RedemptionEngine {
    /// Create a new redemption engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Redeem nToken shares and write the result to `ledger`
    pub fn redeem<L: BalanceLedger + ?Sized>(
        &mut self,
        ctx: &ValuationContext<'_>,
        ledger: &mut L,
        adapter: &dyn MarketAdapter,
        request: &RedeemRequest,
        min_ratio: i128,
    ) -> Result<NTokenRedemption> {
        let currency = request.currency;
        ctx.currencies.get(currency)?;
        validate_positive(request.shares, "shares")?;

        let mut ntoken = ledger.ntoken(currency)?.ok_or(Error::NTokenNotFound(currency.0))?;
        if request.shares > ntoken.total_supply {
            return Err(Error::InsufficientShares {
                required: request.shares,
                available: ntoken.total_supply,
            });
        }
        let mut balance = ledger.balance(&request.redeemer, currency)?;
        if balance.ntoken_balance < request.shares {
            return Err(Error::InsufficientShares {
                required: request.shares,
                available: balance.ntoken_balance,
            });
        }

        let withdrawal = withdraw(ledger, &mut ntoken, request.shares)?;
        let (cash, residuals) = dispose(ctx, ledger, adapter, currency, withdrawal, request.sell_residual)?;

        if !residuals.is_empty() {
            if request.batched {
                return Err(Error::ResidualsInBatch);
            }
            if !request.accept_residual_assets {
                return Err(Error::ResidualsNotAccepted);
            }
        }

        balance.ntoken_balance = safe_sub(balance.ntoken_balance, request.shares)?;
        balance.cash = safe_add(balance.cash, cash)?;
        ledger.set_balance(&request.redeemer, currency, balance)?;

        if !residuals.is_empty() {
            let mut portfolio = ledger.portfolio(&request.redeemer)?;
            for (maturity, notional) in &residuals {
                portfolio.add(currency, *maturity, *notional)?;
            }
            ledger.set_portfolio(&request.redeemer, portfolio)?;
        }

        ntoken.total_supply = safe_sub(ntoken.total_supply, request.shares)?;
        ledger.set_ntoken(ntoken)?;

        refresh_account_context(ledger, &request.redeemer, ctx.currencies, ctx.time)?;
        if !residuals.is_empty() {
            check_account_health(ctx, ledger, &request.redeemer, min_ratio)?;
        }

        let totals = self.totals.entry(currency).or_default();
        totals.redemptions += 1;
        totals.shares_redeemed = safe_add(totals.shares_redeemed, request.shares)?;
        totals.cash_redeemed = safe_add(totals.cash_redeemed, cash)?;
        if !residuals.is_empty() {
            totals.with_residuals += 1;
        }

        tracing::info!(
            redeemer = %request.redeemer,
            currency = %currency,
            shares = request.shares,
            cash,
            residuals = residuals.len(),
            "nToken redeemed"
        );

        Ok(NTokenRedemption {
            redeemer: request.redeemer,
            currency,
            shares: request.shares,
            cash_redeemed: cash,
            residuals,
        })
    }

    /// Totals for a currency
    pub fn totals(&self, currency: CurrencyId) -> RedemptionTotals {
        self.totals.get(&currency).copied().unwrap_or_default()
    }

    /// Totals for every currency redeemed so far
    pub fn all_totals(&self) -> &BTreeMap<CurrencyId, RedemptionTotals> {
        &self.totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::{CurrencyConfig, CurrencyRegistry};
    use crate::core::ntoken::LiquidityToken;
    use crate::core::portfolio::AccountBalance;
    use crate::core::vault::VaultRegistry;
    use crate::market::{ConstantRateMarket, MarketState};
    use crate::oracle::rate_oracle::{CurrencyRates, StaticRateOracle};
    use crate::oracle::vault_shares::StaticShareValuation;
    use crate::storage::ledger::InMemoryLedger;
    use crate::utils::constants::*;

    const USDC: CurrencyId = CurrencyId(1);
    const M1: u64 = 90 * SECONDS_IN_DAY;
    const IDIO: u64 = 120 * SECONDS_IN_DAY;

    struct Fixture {
        oracle: StaticRateOracle,
        currencies: CurrencyRegistry,
        vaults: VaultRegistry,
        shares: StaticShareValuation,
    }

    impl Fixture {
        fn new() -> Self {
            let mut currencies = CurrencyRegistry::new();
            currencies.register(CurrencyConfig::new(USDC, "USDC")).unwrap();
            Self {
                oracle: StaticRateOracle::new()
                    .with_currency(USDC, CurrencyRates::flat(RATE_PRECISION, RATE_PRECISION, 50_000_000)),
                currencies,
                vaults: VaultRegistry::new(),
                shares: StaticShareValuation::new(),
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

    fn alice() -> AccountId {
        AccountId::repeat(1)
    }

    /// Supply 1000, cash 10000, 500 of 1000 tokens in the M1 market
    fn ledger(idiosyncratic: i128) -> InMemoryLedger {
        let mut ledger = InMemoryLedger::new();
        let mut pool = NTokenPortfolio::new(USDC);
        pool.total_supply = 1_000;
        pool.cash_balance = 10_000;
        pool.liquidity_tokens.push(LiquidityToken { maturity: M1, tokens: 500 });
        pool.set_fcash(M1, -4_000);
        pool.set_fcash(IDIO, idiosyncratic);
        ledger.set_ntoken(pool).unwrap();
        ledger
            .set_market(MarketState::new(USDC, M1, 20_000, 18_000, 1_000, 50_000_000))
            .unwrap();
        ledger
            .set_balance(&alice(), USDC, AccountBalance { cash: 0, ntoken_balance: 1_000 })
            .unwrap();
        ledger
    }

    #[test]
    fn test_redeem_and_sell() {
        let fixture = Fixture::new();
        let mut ledger = ledger(0);
        let mut engine = RedemptionEngine::new();
        let request = RedeemRequest::new(alice(), USDC, 100);

        let result = engine
            .redeem(&fixture.ctx(), &mut ledger, &ConstantRateMarket::default(), &request, RATIO_PRECISION)
            .unwrap();

        // 1000 pool cash + 900 market cash + 600 net fCash sold at exp(-0.053 / 4)
        assert_eq!(result.cash_redeemed, 1_000 + 900 + 592);
        assert!(!result.has_residual_placed());

        let pool = ledger.ntoken(USDC).unwrap().unwrap();
        assert_eq!(pool.total_supply, 900);
        assert_eq!(pool.cash_balance, 9_000);
        assert_eq!(pool.liquidity_tokens[0].tokens, 450);
        assert_eq!(pool.fcash[&M1], -3_600);

        let balance = ledger.balance(&alice(), USDC).unwrap();
        assert_eq!(balance.ntoken_balance, 900);
        assert_eq!(balance.cash, 2_492);
        assert_eq!(engine.totals(USDC).shares_redeemed, 100);
    }

    #[test]
    fn test_keep_fcash_as_residual() {
        let fixture = Fixture::new();
        let mut ledger = ledger(0);
        let request = RedeemRequest::new(alice(), USDC, 100).with_residuals(false, true);

        let result = RedemptionEngine::new()
            .redeem(&fixture.ctx(), &mut ledger, &ConstantRateMarket::default(), &request, RATIO_PRECISION)
            .unwrap();
        assert_eq!(result.cash_redeemed, 1_900);
        assert_eq!(result.residuals.get(&M1), Some(&600));
        assert_eq!(ledger.portfolio(&alice()).unwrap().notional(USDC, M1), 600);
    }

    #[test]
    fn test_residuals_require_acceptance() {
        let fixture = Fixture::new();
        let mut ledger = ledger(0);
        let request = RedeemRequest::new(alice(), USDC, 100).with_residuals(false, false);
        assert_eq!(
            RedemptionEngine::new()
                .redeem(&fixture.ctx(), &mut ledger, &ConstantRateMarket::default(), &request, RATIO_PRECISION)
                .unwrap_err(),
            Error::ResidualsNotAccepted
        );
    }

    #[test]
    fn test_idiosyncratic_fcash_never_sold() {
        let fixture = Fixture::new();
        let mut ledger = ledger(300);

        let batched = RedeemRequest::new(alice(), USDC, 100).batched();
        assert_eq!(
            RedemptionEngine::new()
                .redeem(&fixture.ctx(), &mut ledger.clone(), &ConstantRateMarket::default(), &batched, RATIO_PRECISION)
                .unwrap_err(),
            Error::ResidualsInBatch
        );

        let request = RedeemRequest::new(alice(), USDC, 100).with_residuals(true, true);
        let result = RedemptionEngine::new()
            .redeem(&fixture.ctx(), &mut ledger, &ConstantRateMarket::default(), &request, RATIO_PRECISION)
            .unwrap();
        assert_eq!(result.residuals, BTreeMap::from([(IDIO, 30)]));
        assert_eq!(ledger.ntoken(USDC).unwrap().unwrap().fcash[&IDIO], 270);
    }

    #[test]
    fn test_uncleared_trade_becomes_residual() {
        let fixture = Fixture::new();
        let mut ledger = ledger(0);
        let adapter = ConstantRateMarket {
            max_trade_share_bps: 1,
            ..ConstantRateMarket::default()
        };
        let request = RedeemRequest::new(alice(), USDC, 100).with_residuals(true, true);
        let result = RedemptionEngine::new()
            .redeem(&fixture.ctx(), &mut ledger, &adapter, &request, RATIO_PRECISION)
            .unwrap();
        assert_eq!(result.cash_redeemed, 1_900);
        assert_eq!(result.residuals.get(&M1), Some(&600));
    }

    #[test]
    fn test_full_redemption_withdraws_all_tokens() {
        let fixture = Fixture::new();
        let mut ledger = ledger(0);
        let request = RedeemRequest::new(alice(), USDC, 1_000).with_residuals(false, true);
        let result = RedemptionEngine::new()
            .redeem(&fixture.ctx(), &mut ledger, &ConstantRateMarket::default(), &request, RATIO_PRECISION)
            .unwrap();

        // 10000 pool cash + half the market's 18000
        assert_eq!(result.cash_redeemed, 19_000);
        assert_eq!(result.residuals.get(&M1), Some(&6_000));
        let pool = ledger.ntoken(USDC).unwrap().unwrap();
        assert_eq!(pool.total_supply, 0);
        assert!(pool.liquidity_tokens.is_empty());
        assert!(pool.fcash.is_empty());
        assert_eq!(ledger.market(USDC, M1).unwrap().unwrap().total_liquidity, 500);
    }

    #[test]
    fn test_share_checks() {
        let fixture = Fixture::new();
        let mut ledger = ledger(0);
        let mut engine = RedemptionEngine::new();
        let adapter = ConstantRateMarket::default();

        let zero = RedeemRequest::new(alice(), USDC, 0);
        assert_eq!(
            engine.redeem(&fixture.ctx(), &mut ledger, &adapter, &zero, RATIO_PRECISION).unwrap_err(),
            Error::ZeroAmount
        );

        let too_many = RedeemRequest::new(alice(), USDC, 1_001);
        assert!(matches!(
            engine.redeem(&fixture.ctx(), &mut ledger, &adapter, &too_many, RATIO_PRECISION),
            Err(Error::InsufficientShares { required: 1_001, available: 1_000 })
        ));

        let stranger = RedeemRequest::new(AccountId::repeat(9), USDC, 10);
        assert!(matches!(
            engine.redeem(&fixture.ctx(), &mut ledger, &adapter, &stranger, RATIO_PRECISION),
            Err(Error::InsufficientShares { available: 0, .. })
        ));
    }

    #[test]
    fn test_dust_guard() {
        assert_eq!(check_remaining_tokens(7, 10, 10, false).unwrap_err(), Error::DustLiquidityPosition(7));
        assert!(check_remaining_tokens(7, 10, 10, true).is_ok());
        assert!(check_remaining_tokens(7, 10, 3, false).is_ok());
    }
}
