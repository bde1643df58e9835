//! Staged, all-or-nothing ledger writes.
//!
//! A [`LedgerTransaction`] reads through to a ledger but keeps every write
//! in memory. An operation that succeeds turns its transaction into
//! [`LedgerWrites`] and applies them; an operation that fails simply drops
//! the transaction and the ledger never observes a partial effect.

use std::collections::BTreeMap;

use crate::core::currency::CurrencyId;
use crate::core::ntoken::NTokenPortfolio;
use crate::core::portfolio::{AccountBalance, AccountContext, Portfolio};
use crate::core::vault::{VaultAccount, VaultId, VaultState};
use crate::error::Result;
use crate::market::MarketState;
use crate::storage::ledger::BalanceLedger;
use crate::utils::crypto::AccountId;

// ═══════════════════════════════════════════════════════════════════════════════
// STAGED WRITES
// ═══════════════════════════════════════════════════════════════════════════════

/// Writes staged by a transaction, ready to commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerWrites {
    balances: BTreeMap<(AccountId, CurrencyId), AccountBalance>,
    portfolios: BTreeMap<AccountId, Portfolio>,
    contexts: BTreeMap<AccountId, AccountContext>,
    vault_accounts: BTreeMap<(AccountId, VaultId), VaultAccount>,
    vault_states: BTreeMap<(VaultId, u64), VaultState>,
    ntokens: BTreeMap<CurrencyId, NTokenPortfolio>,
    markets: BTreeMap<(CurrencyId, u64), MarketState>,
}

impl LedgerWrites {
    /// Number of staged entries
    pub fn len(&self) -> usize {
        self.balances.len()
            + self.portfolios.len()
            + self.contexts.len()
            + self.vault_accounts.len()
            + self.vault_states.len()
            + self.ntokens.len()
            + self.markets.len()
    }

    /// Check if nothing was staged
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Commit every staged write to `ledger`
    ///
    /// Values are validated when staged, so applying to an in-memory
    /// ledger cannot fail halfway.
    pub fn apply<L: BalanceLedger + ?Sized>(self, ledger: &mut L) -> Result<()> {
        let count = self.len();
        for ((account, currency), balance) in self.balances {
            ledger.set_balance(&account, currency, balance)?;
        }
        for (account, portfolio) in self.portfolios {
            ledger.set_portfolio(&account, portfolio)?;
        }
        for (account, context) in self.contexts {
            ledger.set_account_context(&account, context)?;
        }
        for (_, vault_account) in self.vault_accounts {
            ledger.set_vault_account(vault_account)?;
        }
        for (_, state) in self.vault_states {
            ledger.set_vault_state(state)?;
        }
        for (_, ntoken) in self.ntokens {
            ledger.set_ntoken(ntoken)?;
        }
        for (_, market) in self.markets {
            ledger.set_market(market)?;
        }
        tracing::trace!(writes = count, "ledger writes committed");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Read-through view of a ledger that stages all writes
#[derive(Debug)]
pub struct LedgerTransaction<'a, L: BalanceLedger + ?Sized> {
    base: &'a L,
    writes: LedgerWrites,
}

impl<'a, L: BalanceLedger + ?Sized> LedgerTransaction<'a, L> {
    /// Begin a transaction over `base`
    pub fn new(base: &'a L) -> Self {
        Self {
            base,
            writes: LedgerWrites::default(),
        }
    }

    /// Finish the transaction, returning the staged writes
    pub fn into_writes(self) -> LedgerWrites {
        self.writes
    }
}

impl<'a, L: BalanceLedger + ?Sized> BalanceLedger for LedgerTransaction<'a, L> {
    fn balance(&self, account: &AccountId, currency: CurrencyId) -> Result<AccountBalance> {
        match self.writes.balances.get(&(*account, currency)) {
            Some(balance) => Ok(*balance),
            None => self.base.balance(account, currency),
        }
    }

    fn set_balance(
        &mut self,
        account: &AccountId,
        currency: CurrencyId,
        balance: AccountBalance,
    ) -> Result<()> {
        self.writes.balances.insert((*account, currency), balance);
        Ok(())
    }

    fn portfolio(&self, account: &AccountId) -> Result<Portfolio> {
        match self.writes.portfolios.get(account) {
            Some(portfolio) => Ok(portfolio.clone()),
            None => self.base.portfolio(account),
        }
    }

    fn set_portfolio(&mut self, account: &AccountId, portfolio: Portfolio) -> Result<()> {
        self.writes.portfolios.insert(*account, portfolio);
        Ok(())
    }

    fn account_context(&self, account: &AccountId) -> Result<AccountContext> {
        match self.writes.contexts.get(account) {
            Some(context) => Ok(context.clone()),
            None => self.base.account_context(account),
        }
    }

    fn set_account_context(&mut self, account: &AccountId, context: AccountContext) -> Result<()> {
        self.writes.contexts.insert(*account, context);
        Ok(())
    }

    fn vault_account(&self, account: &AccountId, vault: VaultId) -> Result<Option<VaultAccount>> {
        match self.writes.vault_accounts.get(&(*account, vault)) {
            Some(vault_account) => Ok(Some(vault_account.clone())),
            None => self.base.vault_account(account, vault),
        }
    }

    fn set_vault_account(&mut self, vault_account: VaultAccount) -> Result<()> {
        self.writes
            .vault_accounts
            .insert((vault_account.account, vault_account.vault), vault_account);
        Ok(())
    }

    fn vault_state(&self, vault: VaultId, maturity: u64) -> Result<VaultState> {
        match self.writes.vault_states.get(&(vault, maturity)) {
            Some(state) => Ok(state.clone()),
            None => self.base.vault_state(vault, maturity),
        }
    }

    fn set_vault_state(&mut self, state: VaultState) -> Result<()> {
        self.writes
            .vault_states
            .insert((state.vault, state.maturity), state);
        Ok(())
    }

    fn ntoken(&self, currency: CurrencyId) -> Result<Option<NTokenPortfolio>> {
        match self.writes.ntokens.get(&currency) {
            Some(ntoken) => Ok(Some(ntoken.clone())),
            None => self.base.ntoken(currency),
        }
    }

    fn set_ntoken(&mut self, ntoken: NTokenPortfolio) -> Result<()> {
        ntoken.validate()?;
        self.writes.ntokens.insert(ntoken.currency, ntoken);
        Ok(())
    }

    fn market(&self, currency: CurrencyId, maturity: u64) -> Result<Option<MarketState>> {
        match self.writes.markets.get(&(currency, maturity)) {
            Some(market) => Ok(Some(market.clone())),
            None => self.base.market(currency, maturity),
        }
    }

    fn set_market(&mut self, market: MarketState) -> Result<()> {
        self.writes
            .markets
            .insert((market.currency, market.maturity), market);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ledger::InMemoryLedger;

    const USDC: CurrencyId = CurrencyId(1);

    #[test]
    fn test_reads_see_staged_writes() {
        let alice = AccountId::repeat(1);
        let mut ledger = InMemoryLedger::new();
        ledger.set_balance(&alice, USDC, AccountBalance::cash(100)).unwrap();

        let mut tx = LedgerTransaction::new(&ledger);
        assert_eq!(tx.balance(&alice, USDC).unwrap().cash, 100);
        tx.set_balance(&alice, USDC, AccountBalance::cash(40)).unwrap();
        assert_eq!(tx.balance(&alice, USDC).unwrap().cash, 40);

        // Base ledger untouched until commit
        assert_eq!(ledger.balance(&alice, USDC).unwrap().cash, 100);
    }

    #[test]
    fn test_commit_applies_all() {
        let alice = AccountId::repeat(1);
        let mut ledger = InMemoryLedger::new();

        let writes = {
            let mut tx = LedgerTransaction::new(&ledger);
            tx.set_balance(&alice, USDC, AccountBalance::cash(7)).unwrap();
            let mut portfolio = Portfolio::new();
            portfolio.add(USDC, 100, 3).unwrap();
            tx.set_portfolio(&alice, portfolio).unwrap();
            tx.into_writes()
        };
        assert_eq!(writes.len(), 2);
        writes.apply(&mut ledger).unwrap();

        assert_eq!(ledger.balance(&alice, USDC).unwrap().cash, 7);
        assert_eq!(ledger.portfolio(&alice).unwrap().notional(USDC, 100), 3);
    }

    #[test]
    fn test_dropped_transaction_leaves_no_trace() {
        let alice = AccountId::repeat(1);
        let ledger = InMemoryLedger::new();
        {
            let mut tx = LedgerTransaction::new(&ledger);
            tx.set_balance(&alice, USDC, AccountBalance::cash(7)).unwrap();
        }
        assert_eq!(ledger, InMemoryLedger::new());
    }

    #[test]
    fn test_invalid_ntoken_rejected_at_stage_time() {
        let ledger = InMemoryLedger::new();
        let mut tx = LedgerTransaction::new(&ledger);
        let mut ntoken = NTokenPortfolio::new(USDC);
        ntoken.total_supply = -1;
        assert!(tx.set_ntoken(ntoken).is_err());
    }
}
