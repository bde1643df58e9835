//! Liquidation engine.
//!
//! Runs the fCash and vault liquidation algorithms against a ledger and
//! keeps running statistics. Each entry point computes the transfer from
//! committed state, writes it through the ledger it is given and only then
//! updates the counters, so a failed liquidation leaves no trace.

use serde::{Deserialize, Serialize};

use crate::core::currency::CurrencyId;
use crate::core::vault::VaultId;
use crate::error::{Error, Result};
use crate::liquidation::fcash::{self, FCashLiquidation};
use crate::liquidation::vault::{calculate_deleverage, finalize_deleverage, VaultDeleverage};
use crate::storage::ledger::BalanceLedger;
use crate::utils::crypto::AccountId;
use crate::utils::math::safe_add;
use crate::valuation::health::{HealthFactors, ValuationContext};

// ═══════════════════════════════════════════════════════════════════════════════
// RECEIPT
// ═══════════════════════════════════════════════════════════════════════════════

/// A finalized liquidation with the position's health afterwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationReceipt<T> {
    /// Computed transfer that was written
    pub outcome: T,
    /// Health of the liquidated position after the write
    pub health_after: HealthFactors,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATISTICS
// ═══════════════════════════════════════════════════════════════════════════════

/// Running liquidation statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationStats {
    /// Local-currency fCash liquidations
    pub local_liquidations: u64,
    /// Cross-currency fCash liquidations
    pub cross_liquidations: u64,
    /// Vault deleverages
    pub deleverages: u64,
    /// Sum of |local cash| moved by fCash liquidations
    pub total_local_cash: i128,
    /// Sum of vault shares moved to liquidators
    pub total_vault_shares_transferred: i128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine for liquidating under-collateralized accounts and vault positions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidationEngine {
    stats: LiquidationStats,
}

impl LiquidationEngine {
    /// Create a new liquidation engine
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // fCASH LIQUIDATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Dry-run a local-currency fCash liquidation
    #[allow(clippy::too_many_arguments)]
    pub fn calculate_local<L: BalanceLedger + ?Sized>(
        &self,
        ctx: &ValuationContext<'_>,
        ledger: &L,
        liquidated: &AccountId,
        liquidator: &AccountId,
        local_currency: CurrencyId,
        maturities: &[u64],
        max_amounts: &[i128],
        min_ratio: i128,
    ) -> Result<FCashLiquidation> {
        fcash::calculate_local(
            ctx, ledger, liquidated, liquidator, local_currency, maturities, max_amounts, min_ratio,
        )
    }

    /// Compute and write a local-currency fCash liquidation
    #[allow(clippy::too_many_arguments)]
    pub fn liquidate_local<L: BalanceLedger + ?Sized>(
        &mut self,
        ctx: &ValuationContext<'_>,
        ledger: &mut L,
        liquidated: &AccountId,
        liquidator: &AccountId,
        local_currency: CurrencyId,
        maturities: &[u64],
        max_amounts: &[i128],
        min_ratio: i128,
    ) -> Result<LiquidationReceipt<FCashLiquidation>> {
        let liquidation = self.calculate_local(
            ctx, ledger, liquidated, liquidator, local_currency, maturities, max_amounts, min_ratio,
        )?;
        self.finalize_fcash(ctx, ledger, liquidation, liquidator, min_ratio)
    }

    /// Dry-run a cross-currency fCash liquidation
    #[allow(clippy::too_many_arguments)]
    pub fn calculate_cross<L: BalanceLedger + ?Sized>(
        &self,
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
        fcash::calculate_cross(
            ctx,
            ledger,
            liquidated,
            liquidator,
            local_currency,
            fcash_currency,
            maturities,
            max_amounts,
            min_ratio,
        )
    }

    /// Compute and write a cross-currency fCash liquidation
    #[allow(clippy::too_many_arguments)]
    pub fn liquidate_cross<L: BalanceLedger + ?Sized>(
        &mut self,
        ctx: &ValuationContext<'_>,
        ledger: &mut L,
        liquidated: &AccountId,
        liquidator: &AccountId,
        local_currency: CurrencyId,
        fcash_currency: CurrencyId,
        maturities: &[u64],
        max_amounts: &[i128],
        min_ratio: i128,
    ) -> Result<LiquidationReceipt<FCashLiquidation>> {
        let liquidation = self.calculate_cross(
            ctx,
            ledger,
            liquidated,
            liquidator,
            local_currency,
            fcash_currency,
            maturities,
            max_amounts,
            min_ratio,
        )?;
        self.finalize_fcash(ctx, ledger, liquidation, liquidator, min_ratio)
    }

    /// Write a previously computed fCash liquidation
    ///
    /// The liquidated account must still hold every notional being moved;
    /// a stale calculation fails instead of applying partially.
    pub fn finalize_fcash<L: BalanceLedger + ?Sized>(
        &mut self,
        ctx: &ValuationContext<'_>,
        ledger: &mut L,
        liquidation: FCashLiquidation,
        liquidator: &AccountId,
        min_ratio: i128,
    ) -> Result<LiquidationReceipt<FCashLiquidation>> {
        let health_after = fcash::finalize(ctx, ledger, &liquidation, liquidator, min_ratio)?;

        if liquidation.is_cross_currency() {
            self.stats.cross_liquidations += 1;
        } else {
            self.stats.local_liquidations += 1;
        }
        self.stats.total_local_cash = safe_add(
            self.stats.total_local_cash,
            liquidation.local_cash_from_liquidator.abs(),
        )?;

        tracing::info!(
            liquidated = %liquidation.liquidated,
            liquidator = %liquidator,
            local = %liquidation.local_currency,
            fcash = %liquidation.fcash_currency,
            cash = liquidation.local_cash_from_liquidator,
            ratio_before = liquidation.ratio_before,
            ratio_after = health_after.collateral_ratio,
            "fCash liquidated"
        );

        Ok(LiquidationReceipt {
            outcome: liquidation,
            health_after,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // VAULT DELEVERAGE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Dry-run a vault deleverage
    #[allow(clippy::too_many_arguments)]
    pub fn calculate_deleverage<L: BalanceLedger + ?Sized>(
        &self,
        ctx: &ValuationContext<'_>,
        ledger: &L,
        account: &AccountId,
        liquidator: &AccountId,
        vault: VaultId,
        currency_index: u8,
        deposit_cap: i128,
    ) -> Result<VaultDeleverage> {
        calculate_deleverage(ctx, ledger, account, liquidator, vault, currency_index, deposit_cap)
    }

    /// Compute and write a vault deleverage
    #[allow(clippy::too_many_arguments)]
    pub fn deleverage<L: BalanceLedger + ?Sized>(
        &mut self,
        ctx: &ValuationContext<'_>,
        ledger: &mut L,
        account: &AccountId,
        liquidator: &AccountId,
        vault: VaultId,
        currency_index: u8,
        deposit_cap: i128,
        min_ratio: i128,
    ) -> Result<LiquidationReceipt<VaultDeleverage>> {
        let deleverage =
            calculate_deleverage(ctx, ledger, account, liquidator, vault, currency_index, deposit_cap)?;
        let health_after = finalize_deleverage(ctx, ledger, &deleverage, liquidator, min_ratio)?;

        self.stats.deleverages += 1;
        self.stats.total_vault_shares_transferred = safe_add(
            self.stats.total_vault_shares_transferred,
            deleverage.vault_shares_to_liquidator,
        )?;

        tracing::info!(
            account = %account,
            liquidator = %liquidator,
            vault = %vault,
            leg = currency_index,
            deposit = deleverage.deposit_underlying,
            shares = deleverage.vault_shares_to_liquidator,
            ratio_after = health_after.collateral_ratio,
            "vault position deleveraged"
        );

        Ok(LiquidationReceipt {
            outcome: deleverage,
            health_after,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Get statistics
    pub fn statistics(&self) -> &LiquidationStats {
        &self.stats
    }

    /// Total liquidations of every kind
    pub fn total_liquidations(&self) -> u64 {
        self.stats.local_liquidations + self.stats.cross_liquidations + self.stats.deleverages
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}
