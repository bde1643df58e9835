//! Balance ledger.
//!
//! The ledger holds every piece of persistent state the solvency core
//! reads and writes: per-currency balances, fCash portfolios, account
//! context flags, vault positions and aggregates, nToken pools and markets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::currency::{CurrencyId, CurrencyRegistry};
use crate::core::ntoken::NTokenPortfolio;
use crate::core::portfolio::{AccountBalance, AccountContext, Portfolio};
use crate::core::vault::{VaultAccount, VaultId, VaultState};
use crate::error::{Error, Result};
use crate::market::MarketState;
use crate::utils::crypto::AccountId;

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Persistent state accessed by the engines
pub trait BalanceLedger: Send + Sync {
    /// Balance of an account in a currency (zero if never set)
    fn balance(&self, account: &AccountId, currency: CurrencyId) -> Result<AccountBalance>;

    /// Store a balance
    fn set_balance(
        &mut self,
        account: &AccountId,
        currency: CurrencyId,
        balance: AccountBalance,
    ) -> Result<()>;

    /// fCash portfolio of an account
    fn portfolio(&self, account: &AccountId) -> Result<Portfolio>;

    /// Store a portfolio
    fn set_portfolio(&mut self, account: &AccountId, portfolio: Portfolio) -> Result<()>;

    /// Context flags of an account
    fn account_context(&self, account: &AccountId) -> Result<AccountContext>;

    /// Store context flags
    fn set_account_context(&mut self, account: &AccountId, context: AccountContext) -> Result<()>;

    /// Vault position of an account, if any
    fn vault_account(&self, account: &AccountId, vault: VaultId) -> Result<Option<VaultAccount>>;

    /// Store a vault position
    fn set_vault_account(&mut self, vault_account: VaultAccount) -> Result<()>;

    /// Aggregate state of a vault at a maturity (empty if never set)
    fn vault_state(&self, vault: VaultId, maturity: u64) -> Result<VaultState>;

    /// Store a vault aggregate
    fn set_vault_state(&mut self, state: VaultState) -> Result<()>;

    /// nToken pool of a currency, if initialized
    fn ntoken(&self, currency: CurrencyId) -> Result<Option<NTokenPortfolio>>;

    /// Store an nToken pool
    fn set_ntoken(&mut self, ntoken: NTokenPortfolio) -> Result<()>;

    /// Market at (currency, maturity), if listed
    fn market(&self, currency: CurrencyId, maturity: u64) -> Result<Option<MarketState>>;

    /// Store a market
    fn set_market(&mut self, market: MarketState) -> Result<()>;
}

/// Recompute and store an account's context flags after a mutation
pub fn refresh_account_context<L: BalanceLedger + ?Sized>(
    ledger: &mut L,
    account: &AccountId,
    currencies: &CurrencyRegistry,
    time: u64,
) -> Result<AccountContext> {
    let mut balances = Vec::with_capacity(currencies.len());
    for config in currencies.iter() {
        balances.push((config.id, ledger.balance(account, config.id)?));
    }
    let portfolio = ledger.portfolio(account)?;

    let mut context = ledger.account_context(account)?;
    context.refresh(balances, &portfolio, time);
    ledger.set_account_context(account, context.clone())?;
    Ok(context)
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory ledger (for tests, simulation and scenario files)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryLedger {
    #[serde(default)]
    balances: BTreeMap<AccountId, BTreeMap<CurrencyId, AccountBalance>>,
    #[serde(default)]
    portfolios: BTreeMap<AccountId, Portfolio>,
    #[serde(default)]
    contexts: BTreeMap<AccountId, AccountContext>,
    #[serde(default)]
    vault_accounts: BTreeMap<AccountId, BTreeMap<VaultId, VaultAccount>>,
    #[serde(default)]
    vault_states: BTreeMap<VaultId, BTreeMap<u64, VaultState>>,
    #[serde(default)]
    ntokens: BTreeMap<CurrencyId, NTokenPortfolio>,
    #[serde(default)]
    markets: BTreeMap<CurrencyId, BTreeMap<u64, MarketState>>,
}

impl InMemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts with any stored balance, portfolio or vault position
    pub fn accounts(&self) -> Vec<AccountId> {
        let mut accounts: Vec<AccountId> = self
            .balances
            .keys()
            .chain(self.portfolios.keys())
            .chain(self.vault_accounts.keys())
            .copied()
            .collect();
        accounts.sort();
        accounts.dedup();
        accounts
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

impl BalanceLedger for InMemoryLedger {
    fn balance(&self, account: &AccountId, currency: CurrencyId) -> Result<AccountBalance> {
        Ok(self
            .balances
            .get(account)
            .and_then(|m| m.get(&currency))
            .copied()
            .unwrap_or_default())
    }

    fn set_balance(
        &mut self,
        account: &AccountId,
        currency: CurrencyId,
        balance: AccountBalance,
    ) -> Result<()> {
        let entry = self.balances.entry(*account).or_default();
        if balance.is_empty() {
            entry.remove(&currency);
            if entry.is_empty() {
                self.balances.remove(account);
            }
        } else {
            entry.insert(currency, balance);
        }
        Ok(())
    }

    fn portfolio(&self, account: &AccountId) -> Result<Portfolio> {
        Ok(self.portfolios.get(account).cloned().unwrap_or_default())
    }

    fn set_portfolio(&mut self, account: &AccountId, portfolio: Portfolio) -> Result<()> {
        if portfolio.is_empty() {
            self.portfolios.remove(account);
        } else {
            self.portfolios.insert(*account, portfolio);
        }
        Ok(())
    }

    fn account_context(&self, account: &AccountId) -> Result<AccountContext> {
        Ok(self.contexts.get(account).cloned().unwrap_or_default())
    }

    fn set_account_context(&mut self, account: &AccountId, context: AccountContext) -> Result<()> {
        self.contexts.insert(*account, context);
        Ok(())
    }

    fn vault_account(&self, account: &AccountId, vault: VaultId) -> Result<Option<VaultAccount>> {
        Ok(self
            .vault_accounts
            .get(account)
            .and_then(|m| m.get(&vault))
            .cloned())
    }

    fn set_vault_account(&mut self, vault_account: VaultAccount) -> Result<()> {
        self.vault_accounts
            .entry(vault_account.account)
            .or_default()
            .insert(vault_account.vault, vault_account);
        Ok(())
    }

    fn vault_state(&self, vault: VaultId, maturity: u64) -> Result<VaultState> {
        Ok(self
            .vault_states
            .get(&vault)
            .and_then(|m| m.get(&maturity))
            .cloned()
            .unwrap_or_else(|| VaultState::new(vault, maturity)))
    }

    fn set_vault_state(&mut self, state: VaultState) -> Result<()> {
        self.vault_states
            .entry(state.vault)
            .or_default()
            .insert(state.maturity, state);
        Ok(())
    }

    fn ntoken(&self, currency: CurrencyId) -> Result<Option<NTokenPortfolio>> {
        Ok(self.ntokens.get(&currency).cloned())
    }

    fn set_ntoken(&mut self, ntoken: NTokenPortfolio) -> Result<()> {
        ntoken.validate()?;
        self.ntokens.insert(ntoken.currency, ntoken);
        Ok(())
    }

    fn market(&self, currency: CurrencyId, maturity: u64) -> Result<Option<MarketState>> {
        Ok(self
            .markets
            .get(&currency)
            .and_then(|m| m.get(&maturity))
            .cloned())
    }

    fn set_market(&mut self, market: MarketState) -> Result<()> {
        self.markets
            .entry(market.currency)
            .or_default()
            .insert(market.maturity, market);
        Ok(())
    }
}
