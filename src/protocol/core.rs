//! Solvency core - entry points and transactional boundary.
//!
//! The core owns the ledger, the collaborators and both engines. Every
//! mutating entry point runs under the reentrancy guard, accrues the
//! oracle, stages its writes in a [`LedgerTransaction`] and commits them
//! only when the engine returned successfully. Events are pushed after the
//! commit.

use crate::core::config::{ProtocolConfig, ProtocolParams};
use crate::core::currency::{CurrencyId, CurrencyRegistry};
use crate::core::vault::{VaultId, VaultRegistry};
use crate::error::{Error, Result};
use crate::liquidation::engine::{LiquidationEngine, LiquidationReceipt, LiquidationStats};
use crate::liquidation::fcash::FCashLiquidation;
use crate::liquidation::vault::{check_vault_account_collateral_ratio, VaultDeleverage};
use crate::market::MarketAdapter;
use crate::oracle::rate_oracle::RateOracle;
use crate::oracle::vault_shares::VaultShareValuation;
use crate::protocol::events::*;
use crate::redemption::ntoken::{NTokenRedemption, RedeemRequest, RedemptionEngine, RedemptionTotals};
use crate::storage::ledger::BalanceLedger;
use crate::storage::transaction::LedgerTransaction;
use crate::utils::crypto::AccountId;
use crate::utils::guard::ReentrancyGuard;
use crate::valuation::health::{accrue_currencies, compute_health_factors, HealthFactors, ValuationContext};

// ═══════════════════════════════════════════════════════════════════════════════
// COLLABORATORS
// ═══════════════════════════════════════════════════════════════════════════════

/// External collaborators plus the registries they are read against
struct Environment {
    oracle: Box<dyn RateOracle>,
    market: Box<dyn MarketAdapter>,
    share_valuation: Box<dyn VaultShareValuation>,
    currencies: CurrencyRegistry,
    vaults: VaultRegistry,
}

impl Environment {
    fn context(&self, time: u64) -> ValuationContext<'_> {
        ValuationContext {
            oracle: &*self.oracle,
            currencies: &self.currencies,
            vaults: &self.vaults,
            share_valuation: &*self.share_valuation,
            time,
        }
    }

    fn accrue(&mut self, time: u64) -> Result<()> {
        accrue_currencies(&mut *self.oracle, self.currencies.iter().map(|c| c.id), time)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOLVENCY CORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Solvency core - orchestrates valuation, liquidation and redemption
pub struct SolvencyCore<L: BalanceLedger> {
    /// Committed state
    ledger: L,
    /// Oracle, market, share pricing and registries
    env: Environment,
    /// Protocol parameters
    params: ProtocolParams,
    /// Liquidation engine
    liquidation: LiquidationEngine,
    /// Redemption engine
    redemption: RedemptionEngine,
    /// Emitted events
    event_log: EventLog,
    /// Call-in-progress flag for mutating entry points
    guard: ReentrancyGuard,
    /// Current time
    time: u64,
}

impl<L: BalanceLedger> SolvencyCore<L> {
    /// Create a core from a validated configuration
    pub fn new(
        config: &ProtocolConfig,
        ledger: L,
        oracle: Box<dyn RateOracle>,
        market: Box<dyn MarketAdapter>,
        share_valuation: Box<dyn VaultShareValuation>,
        time: u64,
    ) -> Result<Self> {
        config.params.validate()?;
        let (currencies, vaults) = config.registries()?;

        tracing::debug!(
            currencies = currencies.len(),
            vaults = vaults.len(),
            time,
            "solvency core initialized"
        );

        Ok(Self {
            ledger,
            env: Environment {
                oracle,
                market,
                share_valuation,
                currencies,
                vaults,
            },
            params: config.params.clone(),
            liquidation: LiquidationEngine::new(),
            redemption: RedemptionEngine::new(),
            event_log: EventLog::with_capacity(config.params.max_events),
            guard: ReentrancyGuard::new(),
            time,
        })
    }

    /// Move the clock forward
    pub fn advance_time(&mut self, time: u64) -> Result<()> {
        if time < self.time {
            return Err(Error::InvalidParameter {
                name: "time".into(),
                reason: format!("{} is before current time {}", time, self.time),
            });
        }
        self.time = time;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // VIEWS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Health factors of an account, or of its position in `vault`
    pub fn compute_health_factors(
        &self,
        account: &AccountId,
        vault: Option<VaultId>,
    ) -> Result<HealthFactors> {
        compute_health_factors(&self.env.context(self.time), &self.ledger, account, vault)
    }

    /// Health factors after advancing every currency's accrual to now
    ///
    /// Use this instead of the view when the result feeds a mutating call.
    pub fn accrue_health_factors(
        &mut self,
        account: &AccountId,
        vault: Option<VaultId>,
    ) -> Result<HealthFactors> {
        self.env.accrue(self.time)?;
        compute_health_factors(&self.env.context(self.time), &self.ledger, account, vault)
    }

    /// Check a vault position against its vault's entry/exit ratio bounds
    pub fn check_vault_account_collateral_ratio(
        &self,
        vault: VaultId,
        account: &AccountId,
    ) -> Result<()> {
        check_vault_account_collateral_ratio(&self.env.context(self.time), &self.ledger, vault, account)
    }

    /// Dry-run a local-currency fCash liquidation
    pub fn calculate_fcash_local(
        &self,
        liquidator: &AccountId,
        liquidated: &AccountId,
        local_currency: CurrencyId,
        maturities: &[u64],
        max_amounts: &[i128],
    ) -> Result<FCashLiquidation> {
        self.liquidation.calculate_local(
            &self.env.context(self.time),
            &self.ledger,
            liquidated,
            liquidator,
            local_currency,
            maturities,
            max_amounts,
            self.params.min_collateral_ratio,
        )
    }

    /// Dry-run a cross-currency fCash liquidation
    pub fn calculate_fcash_cross_currency(
        &self,
        liquidator: &AccountId,
        liquidated: &AccountId,
        local_currency: CurrencyId,
        fcash_currency: CurrencyId,
        maturities: &[u64],
        max_amounts: &[i128],
    ) -> Result<FCashLiquidation> {
        self.liquidation.calculate_cross(
            &self.env.context(self.time),
            &self.ledger,
            liquidated,
            liquidator,
            local_currency,
            fcash_currency,
            maturities,
            max_amounts,
            self.params.min_collateral_ratio,
        )
    }

    /// Dry-run a vault deleverage
    pub fn calculate_deleverage(
        &self,
        liquidator: &AccountId,
        account: &AccountId,
        vault: VaultId,
        currency_index: u8,
        deposit_cap: i128,
    ) -> Result<VaultDeleverage> {
        self.liquidation.calculate_deleverage(
            &self.env.context(self.time),
            &self.ledger,
            account,
            liquidator,
            vault,
            currency_index,
            deposit_cap,
        )
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate fCash in the account's local currency
    pub fn liquidate_fcash_local(
        &mut self,
        liquidator: &AccountId,
        liquidated: &AccountId,
        local_currency: CurrencyId,
        maturities: &[u64],
        max_amounts: &[i128],
    ) -> Result<LiquidationReceipt<FCashLiquidation>> {
        let _token = self.guard.enter()?;
        self.env.accrue(self.time)?;

        let ctx = self.env.context(self.time);
        let min_ratio = self.params.min_collateral_ratio;
        let mut engine = self.liquidation.clone();
        let mut tx = LedgerTransaction::new(&self.ledger);
        let receipt = engine.liquidate_local(
            &ctx,
            &mut tx,
            liquidated,
            liquidator,
            local_currency,
            maturities,
            max_amounts,
            min_ratio,
        )?;
        let writes = tx.into_writes();

        writes.apply(&mut self.ledger)?;
        self.liquidation = engine;
        self.emit_fcash(&receipt.outcome, liquidator);
        Ok(receipt)
    }

    /// Liquidate collateral fCash in exchange for local currency
    pub fn liquidate_fcash_cross_currency(
        &mut self,
        liquidator: &AccountId,
        liquidated: &AccountId,
        local_currency: CurrencyId,
        fcash_currency: CurrencyId,
        maturities: &[u64],
        max_amounts: &[i128],
    ) -> Result<LiquidationReceipt<FCashLiquidation>> {
        let _token = self.guard.enter()?;
        self.env.accrue(self.time)?;

        let ctx = self.env.context(self.time);
        let min_ratio = self.params.min_collateral_ratio;
        let mut engine = self.liquidation.clone();
        let mut tx = LedgerTransaction::new(&self.ledger);
        let receipt = engine.liquidate_cross(
            &ctx,
            &mut tx,
            liquidated,
            liquidator,
            local_currency,
            fcash_currency,
            maturities,
            max_amounts,
            min_ratio,
        )?;
        let writes = tx.into_writes();

        writes.apply(&mut self.ledger)?;
        self.liquidation = engine;
        self.emit_fcash(&receipt.outcome, liquidator);
        Ok(receipt)
    }

    /// Write a liquidation computed earlier by one of the calculate calls
    ///
    /// Fails if the liquidated account no longer holds the notional being
    /// moved or its ratio would not improve at the current state.
    pub fn finalize_fcash_liquidation(
        &mut self,
        liquidator: &AccountId,
        liquidation: FCashLiquidation,
    ) -> Result<LiquidationReceipt<FCashLiquidation>> {
        let _token = self.guard.enter()?;
        self.env.accrue(self.time)?;

        let ctx = self.env.context(self.time);
        let min_ratio = self.params.min_collateral_ratio;
        let mut engine = self.liquidation.clone();
        let mut tx = LedgerTransaction::new(&self.ledger);
        let receipt = engine.finalize_fcash(&ctx, &mut tx, liquidation, liquidator, min_ratio)?;
        let writes = tx.into_writes();

        writes.apply(&mut self.ledger)?;
        self.liquidation = engine;
        self.emit_fcash(&receipt.outcome, liquidator);
        Ok(receipt)
    }

    /// Repay vault debt on one leg in exchange for the position's shares
    pub fn deleverage_vault_account(
        &mut self,
        liquidator: &AccountId,
        account: &AccountId,
        vault: VaultId,
        currency_index: u8,
        deposit_cap: i128,
    ) -> Result<LiquidationReceipt<VaultDeleverage>> {
        let _token = self.guard.enter()?;
        self.env.accrue(self.time)?;

        let ctx = self.env.context(self.time);
        let min_ratio = self.params.min_collateral_ratio;
        let mut engine = self.liquidation.clone();
        let mut tx = LedgerTransaction::new(&self.ledger);
        let receipt = engine.deleverage(
            &ctx,
            &mut tx,
            account,
            liquidator,
            vault,
            currency_index,
            deposit_cap,
            min_ratio,
        )?;
        let writes = tx.into_writes();

        writes.apply(&mut self.ledger)?;
        self.liquidation = engine;

        let outcome = &receipt.outcome;
        self.event_log.push(ProtocolEvent::VaultDeleverage(VaultDeleverageEvent {
            account: outcome.account,
            liquidator: *liquidator,
            vault: outcome.vault,
            currency_index: outcome.currency_index,
            deposit_underlying: outcome.deposit_underlying,
            vault_shares_to_liquidator: outcome.vault_shares_to_liquidator,
            timestamp: self.time,
        }));
        Ok(receipt)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REDEMPTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Redeem nToken shares as a standalone call
    pub fn redeem_ntoken(
        &mut self,
        redeemer: &AccountId,
        currency: CurrencyId,
        shares: i128,
        sell_residual: bool,
        accept_residual_assets: bool,
    ) -> Result<NTokenRedemption> {
        let request = RedeemRequest::new(*redeemer, currency, shares)
            .with_residuals(sell_residual, accept_residual_assets);
        self.redeem(&request)
    }

    /// Redeem nToken shares inside a batch; fails if residuals would be placed
    pub fn redeem_ntoken_batched(
        &mut self,
        redeemer: &AccountId,
        currency: CurrencyId,
        shares: i128,
    ) -> Result<NTokenRedemption> {
        let request = RedeemRequest::new(*redeemer, currency, shares).batched();
        self.redeem(&request)
    }

    /// Redeem according to a prepared request
    pub fn redeem(&mut self, request: &RedeemRequest) -> Result<NTokenRedemption> {
        let _token = self.guard.enter()?;
        self.env.accrue(self.time)?;

        let ctx = self.env.context(self.time);
        let min_ratio = self.params.min_collateral_ratio;
        let mut engine = self.redemption.clone();
        let mut tx = LedgerTransaction::new(&self.ledger);
        let redemption = engine.redeem(&ctx, &mut tx, &*self.env.market, request, min_ratio)?;
        let writes = tx.into_writes();

        writes.apply(&mut self.ledger)?;
        self.redemption = engine;

        self.event_log.push(ProtocolEvent::NTokenSupplyChange(NTokenSupplyChangeEvent {
            account: redemption.redeemer,
            currency: redemption.currency,
            supply_change: -redemption.shares,
            cash_redeemed: redemption.cash_redeemed,
            timestamp: self.time,
        }));
        Ok(redemption)
    }

    fn emit_fcash(&mut self, outcome: &FCashLiquidation, liquidator: &AccountId) {
        self.event_log.push(ProtocolEvent::LiquidatefCash(LiquidatefCashEvent {
            liquidated: outcome.liquidated,
            liquidator: *liquidator,
            local_currency: outcome.local_currency,
            fcash_currency: outcome.fcash_currency,
            maturities: outcome.maturities.clone(),
            fcash_transferred: outcome.fcash_transferred.clone(),
            local_cash_from_liquidator: outcome.local_cash_from_liquidator,
            timestamp: self.time,
        }));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Committed ledger
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Mutable ledger, for host-side bookkeeping outside the core
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Consume the core and return its ledger
    pub fn into_ledger(self) -> L {
        self.ledger
    }

    /// Mutable oracle, for rate updates
    pub fn oracle_mut(&mut self) -> &mut dyn RateOracle {
        &mut *self.env.oracle
    }

    /// Protocol parameters
    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    /// Registered currencies
    pub fn currencies(&self) -> &CurrencyRegistry {
        &self.env.currencies
    }

    /// Registered vaults
    pub fn vaults(&self) -> &VaultRegistry {
        &self.env.vaults
    }

    /// Event history
    pub fn events(&self) -> &EventLog {
        &self.event_log
    }

    /// Take the event history, leaving an empty log
    pub fn take_events(&mut self) -> EventLog {
        std::mem::replace(&mut self.event_log, EventLog::with_capacity(self.params.max_events))
    }

    /// Liquidation statistics
    pub fn liquidation_stats(&self) -> &LiquidationStats {
        self.liquidation.statistics()
    }

    /// Redemption totals for a currency
    pub fn redemption_totals(&self, currency: CurrencyId) -> RedemptionTotals {
        self.redemption.totals(currency)
    }

    /// Handle to the reentrancy guard shared with the host
    pub fn reentrancy_guard(&self) -> ReentrancyGuard {
        self.guard.clone()
    }

    /// Current time
    pub fn time(&self) -> u64 {
        self.time
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
