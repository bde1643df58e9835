//! Protocol events for state change notifications.
//!
//! Events are append-only audit records of committed liquidations and
//! redemptions. They are never read back by the engines.

use serde::{Deserialize, Serialize};

use crate::core::currency::CurrencyId;
use crate::core::vault::VaultId;
use crate::utils::constants::DEFAULT_MAX_EVENTS;
use crate::utils::crypto::{AccountId, Hash};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All protocol event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    /// fCash moved from a liquidated account to a liquidator
    LiquidatefCash(LiquidatefCashEvent),
    /// Vault debt repaid by a liquidator in exchange for shares
    VaultDeleverage(VaultDeleverageEvent),
    /// nToken supply changed by a redemption
    NTokenSupplyChange(NTokenSupplyChangeEvent),
}

impl ProtocolEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::LiquidatefCash(_) => "LiquidatefCash",
            Self::VaultDeleverage(_) => "VaultDeleverage",
            Self::NTokenSupplyChange(_) => "NTokenSupplyChange",
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::LiquidatefCash(e) => e.timestamp,
            Self::VaultDeleverage(e) => e.timestamp,
            Self::NTokenSupplyChange(e) => e.timestamp,
        }
    }

    /// Account whose position the event changed
    pub fn account(&self) -> &AccountId {
        match self {
            Self::LiquidatefCash(e) => &e.liquidated,
            Self::VaultDeleverage(e) => &e.account,
            Self::NTokenSupplyChange(e) => &e.account,
        }
    }

    /// Compute event hash
    pub fn hash(&self) -> Hash {
        let data = bincode::serialize(self).unwrap_or_default();
        Hash::sha256(&data)
    }
}

/// Emitted when fCash is liquidated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidatefCashEvent {
    /// Liquidated account
    pub liquidated: AccountId,
    /// Liquidator
    pub liquidator: AccountId,
    /// Currency paid by the liquidator
    pub local_currency: CurrencyId,
    /// Currency of the transferred fCash
    pub fcash_currency: CurrencyId,
    /// Maturities in request order
    pub maturities: Vec<u64>,
    /// Notional transferred per maturity
    pub fcash_transferred: Vec<i128>,
    /// Local stable cash paid by the liquidator
    pub local_cash_from_liquidator: i128,
    /// Timestamp
    pub timestamp: u64,
}

/// Emitted when a vault position is deleveraged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultDeleverageEvent {
    /// Deleveraged account
    pub account: AccountId,
    /// Liquidator
    pub liquidator: AccountId,
    /// Vault
    pub vault: VaultId,
    /// Debt leg
    pub currency_index: u8,
    /// Deposit in the leg's underlying
    pub deposit_underlying: i128,
    /// Shares moved to the liquidator
    pub vault_shares_to_liquidator: i128,
    /// Timestamp
    pub timestamp: u64,
}

/// Emitted when nToken shares are redeemed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NTokenSupplyChangeEvent {
    /// Redeemer
    pub account: AccountId,
    /// nToken currency
    pub currency: CurrencyId,
    /// Change in total supply (negative on redemption)
    pub supply_change: i128,
    /// Cash credited to the redeemer
    pub cash_redeemed: i128,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Bounded history of emitted events
///
/// Every pushed event extends a running hash chain, so the head commits to
/// the whole history even after old events are pruned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<ProtocolEvent>,
    max_events: usize,
    head: Hash,
    total: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_EVENTS)
    }

    /// Create a log keeping at most `max_events`
    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            max_events: max_events.max(1),
            head: Hash::default(),
            total: 0,
        }
    }

    /// Add an event to the log (with pruning)
    pub fn push(&mut self, event: ProtocolEvent) {
        self.head = Hash::chain(&self.head, event.hash().as_bytes());
        self.total += 1;
        self.events.push(event);

        if self.events.len() > self.max_events {
            self.events.drain(0..self.events.len() - self.max_events);
        }
    }

    /// Get retained events
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get events concerning an account
    pub fn for_account(&self, account: &AccountId) -> Vec<&ProtocolEvent> {
        self.events.iter().filter(|e| e.account() == account).collect()
    }

    /// Get the number of retained events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events ever pushed, including pruned ones
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Hash chain head over every event ever pushed
    pub fn head(&self) -> Hash {
        self.head
    }

    /// Append another log's events in order
    pub fn merge(&mut self, other: EventLog) {
        for event in other.events {
            self.push(event);
        }
    }

    /// Drop retained events; the hash chain is kept
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
