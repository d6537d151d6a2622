//! Persistence layer.
//!
//! The bankroll ledger talks to a [`LedgerStore`]: an in-memory store for
//! simulations and tests, and a SQLite store for the persistent paper-trading
//! bankroll. The match/team/odds/strategy archive is a JSON snapshot (see
//! [`archive`]).

pub mod archive;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Mutex;

use crate::types::{
    EntryId, LedgerEntry, LedgerError, NewLedgerEntry, NewWager, Wager, WagerId, WagerStatus,
};

pub use archive::{Archive, MatchQuery};
pub use sqlite::SqliteLedgerStore;

/// Balance after applying `change` to `current`. A movement that would
/// take the balance below zero is rejected.
pub(crate) fn next_balance(current: Decimal, change: Decimal) -> Result<Decimal, LedgerError> {
    let balance = current + change;
    if balance < Decimal::ZERO {
        return Err(LedgerError::InsufficientFunds {
            needed: -change,
            available: current,
        });
    }
    Ok(balance)
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Wager and ledger persistence.
///
/// Every write reads the latest balance, checks funds and appends its
/// entry under one exclusive lock (a write transaction for SQLite), so
/// independent handles on the same ledger cannot double-spend. `opening`
/// is the balance assumed while the ledger is still empty.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Most recent ledger entry (highest id).
    async fn latest_entry(&self) -> Result<Option<LedgerEntry>>;

    async fn wager(&self, id: WagerId) -> Result<Option<Wager>>;

    async fn wagers_by_status(&self, status: WagerStatus) -> Result<Vec<Wager>>;

    /// All wagers, oldest first.
    async fn all_wagers(&self) -> Result<Vec<Wager>>;

    /// Up to `limit` ledger entries, most recent first.
    async fn ledger_entries(&self, limit: usize) -> Result<Vec<LedgerEntry>>;

    /// Insert a pending wager and its placement entry. The entry's
    /// `wager_id` is filled in by the store.
    async fn record_placement(
        &self,
        wager: NewWager,
        entry: NewLedgerEntry,
        opening: Decimal,
    ) -> Result<(Wager, LedgerEntry), LedgerError>;

    /// Persist a settled wager (status, profit, settled_at) and, if given,
    /// its ledger entry. Fails with `AlreadySettled` unless the stored
    /// wager is still pending.
    async fn record_settlement(
        &self,
        wager: &Wager,
        entry: Option<NewLedgerEntry>,
        opening: Decimal,
    ) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Append a ledger entry not tied to a wager (deposit, withdrawal).
    async fn record_adjustment(
        &self,
        entry: NewLedgerEntry,
        opening: Decimal,
    ) -> Result<LedgerEntry, LedgerError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    wagers: Vec<Wager>,
    entries: Vec<LedgerEntry>,
}

impl MemoryState {
    fn append_entry(&mut self, entry: NewLedgerEntry, opening: Decimal) -> Result<LedgerEntry, LedgerError> {
        let current = self.entries.last().map_or(opening, |e| e.balance);
        let balance = next_balance(current, entry.change)?;
        let id: EntryId = self.entries.last().map_or(1, |e| e.id + 1);
        let entry = LedgerEntry {
            id,
            balance,
            change: entry.change,
            reason: entry.reason,
            wager_id: entry.wager_id,
            timestamp: Utc::now(),
            notes: entry.notes,
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }
}

/// Process-local store; used by simulations and tests.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<MemoryState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("memory ledger store poisoned"))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn latest_entry(&self) -> Result<Option<LedgerEntry>> {
        Ok(self.lock()?.entries.last().cloned())
    }

    async fn wager(&self, id: WagerId) -> Result<Option<Wager>> {
        Ok(self.lock()?.wagers.iter().find(|w| w.id == id).cloned())
    }

    async fn wagers_by_status(&self, status: WagerStatus) -> Result<Vec<Wager>> {
        Ok(self
            .lock()?
            .wagers
            .iter()
            .filter(|w| w.status == status)
            .cloned()
            .collect())
    }

    async fn all_wagers(&self) -> Result<Vec<Wager>> {
        Ok(self.lock()?.wagers.clone())
    }

    async fn ledger_entries(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        Ok(self.lock()?.entries.iter().rev().take(limit).cloned().collect())
    }

    async fn record_placement(
        &self,
        wager: NewWager,
        entry: NewLedgerEntry,
        opening: Decimal,
    ) -> Result<(Wager, LedgerEntry), LedgerError> {
        let mut state = self.lock()?;
        let id: WagerId = state.wagers.last().map_or(1, |w| w.id + 1);
        let entry = state.append_entry(
            NewLedgerEntry {
                wager_id: Some(id),
                ..entry
            },
            opening,
        )?;
        let wager = Wager {
            id,
            match_id: wager.match_id,
            strategy_id: wager.strategy_id,
            market: wager.market,
            selection: wager.selection,
            odds: wager.odds,
            stake: wager.stake,
            status: WagerStatus::Pending,
            is_paper_trade: wager.is_paper_trade,
            profit_loss: None,
            placed_at: entry.timestamp,
            settled_at: None,
            notes: wager.notes,
        };
        state.wagers.push(wager.clone());
        Ok((wager, entry))
    }

    async fn record_settlement(
        &self,
        wager: &Wager,
        entry: Option<NewLedgerEntry>,
        opening: Decimal,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let mut state = self.lock()?;
        let index = state
            .wagers
            .iter()
            .position(|w| w.id == wager.id)
            .ok_or(LedgerError::WagerNotFound(wager.id))?;
        let stored = state.wagers[index].status;
        if stored.is_settled() {
            return Err(LedgerError::AlreadySettled {
                id: wager.id,
                status: stored,
            });
        }
        let entry = entry
            .map(|entry| state.append_entry(entry, opening))
            .transpose()?;
        state.wagers[index] = wager.clone();
        Ok(entry)
    }

    async fn record_adjustment(
        &self,
        entry: NewLedgerEntry,
        opening: Decimal,
    ) -> Result<LedgerEntry, LedgerError> {
        self.lock()?.append_entry(entry, opening)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
