//! Bankroll ledger.
//!
//! The balance is whatever the most recent ledger entry says. Stakes are
//! locked at placement (balance − stake); a winning settlement credits the
//! full return (stake × odds); a losing settlement writes no entry at all.
//! Voids refund the stake. The store derives each new balance inside its
//! own write transaction, so bankrolls sharing a database serialise there.

use chrono::Utc;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::storage::LedgerStore;
use crate::strategy::kelly::{KellyCalculator, KellyConfig};
use crate::strategy::risk::{RiskAlert, RiskConfig, RiskMonitor};
use crate::types::{
    LedgerEntry, LedgerError, LedgerReason, NewLedgerEntry, NewWager, Wager, WagerId, WagerStatus,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BankrollConfig {
    /// Balance reported before the first ledger entry exists.
    pub initial_balance: Decimal,
    pub kelly_fraction: f64,
    pub kelly_cap: f64,
    pub database_url: String,
}

impl Default for BankrollConfig {
    fn default() -> Self {
        Self {
            initial_balance: dec!(1000),
            kelly_fraction: 0.5,
            kelly_cap: 0.05,
            database_url: "sqlite://betlab.db".to_string(),
        }
    }
}

/// Point-in-time view of the bankroll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankrollSummary {
    pub balance: Decimal,
    pub initial_balance: Decimal,
    /// Sum of pending stakes. Already deducted from `balance`.
    pub active_exposure: Decimal,
    pub realised_profit: Decimal,
    pub pending: usize,
    pub won: usize,
    pub lost: usize,
    pub void: usize,
    /// Percent of decided (won + lost) wagers.
    pub win_rate: f64,
    /// Percent change of equity (balance plus locked stakes) against the
    /// initial balance. Pending wagers do not move it.
    pub roi: f64,
}

// ---------------------------------------------------------------------------
// Bankroll
// ---------------------------------------------------------------------------

pub struct Bankroll<S: LedgerStore> {
    store: S,
    config: BankrollConfig,
    kelly: KellyCalculator,
    risk: RiskMonitor,
}

impl<S: LedgerStore> Bankroll<S> {
    pub fn new(store: S, config: BankrollConfig, risk_config: RiskConfig) -> Self {
        let kelly = KellyCalculator::new(KellyConfig {
            fraction: config.kelly_fraction,
            cap: config.kelly_cap,
        });
        let risk = RiskMonitor::new(risk_config, config.initial_balance);
        Self {
            store,
            config,
            kelly,
            risk,
        }
    }

    pub fn config(&self) -> &BankrollConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn get_current_balance(&self) -> Result<Decimal, LedgerError> {
        Ok(self
            .store
            .latest_entry()
            .await?
            .map_or(self.config.initial_balance, |e| e.balance))
    }

    pub async fn get_active_exposure(&self) -> Result<Decimal, LedgerError> {
        let pending = self.store.wagers_by_status(WagerStatus::Pending).await?;
        Ok(pending.iter().map(|w| w.stake).sum())
    }

    /// Lock the stake and record a pending wager.
    pub async fn place_bet(&self, wager: NewWager) -> Result<Wager, LedgerError> {
        if wager.stake <= Decimal::ZERO {
            return Err(LedgerError::InvalidStake(wager.stake));
        }
        if wager.odds <= Decimal::ONE {
            return Err(LedgerError::InvalidOdds(wager.odds));
        }

        let match_id = wager.match_id;
        let entry = NewLedgerEntry {
            change: -wager.stake,
            reason: LedgerReason::BetPlaced,
            wager_id: None,
            notes: Some(format!("Placed {} @ {}", wager.selection, wager.odds)),
        };
        let (placed, entry) = self
            .store
            .record_placement(wager, entry, self.config.initial_balance)
            .await
            .inspect_err(|err| {
                if let LedgerError::InsufficientFunds { needed, available } = err {
                    warn!(stake = %needed, balance = %available, match_id, "Insufficient funds, wager rejected");
                }
            })?;
        info!(
            wager_id = placed.id,
            match_id = placed.match_id,
            selection = %placed.selection,
            stake = %placed.stake,
            odds = %placed.odds,
            balance = %entry.balance,
            "Wager placed"
        );
        Ok(placed)
    }

    /// Settle a pending wager as won or lost.
    pub async fn settle_bet(&self, id: WagerId, won: bool) -> Result<Wager, LedgerError> {
        let wager = self.pending_wager(id).await?;

        let (settled, entry) = if won {
            let payout = wager.stake * wager.odds;
            let settled = Wager {
                status: WagerStatus::Won,
                profit_loss: Some(payout - wager.stake),
                settled_at: Some(Utc::now()),
                ..wager
            };
            let entry = NewLedgerEntry {
                change: payout,
                reason: LedgerReason::BetWon,
                wager_id: Some(id),
                notes: Some(format!("Won wager #{id}")),
            };
            (settled, Some(entry))
        } else {
            let settled = Wager {
                status: WagerStatus::Lost,
                profit_loss: Some(-wager.stake),
                settled_at: Some(Utc::now()),
                ..wager
            };
            (settled, None)
        };

        self.commit_settlement(&settled, entry).await?;
        info!(
            wager_id = id,
            status = %settled.status,
            profit = %settled.profit_loss.unwrap_or_default(),
            "Wager settled"
        );
        Ok(settled)
    }

    /// Cancel a pending wager and refund its stake.
    pub async fn void_bet(&self, id: WagerId) -> Result<Wager, LedgerError> {
        let wager = self.pending_wager(id).await?;

        let entry = NewLedgerEntry {
            change: wager.stake,
            reason: LedgerReason::BetVoid,
            wager_id: Some(id),
            notes: Some(format!("Voided wager #{id}")),
        };
        let settled = Wager {
            status: WagerStatus::Void,
            profit_loss: Some(Decimal::ZERO),
            settled_at: Some(Utc::now()),
            ..wager
        };
        self.commit_settlement(&settled, Some(entry)).await?;
        info!(wager_id = id, refund = %settled.stake, "Wager voided");
        Ok(settled)
    }

    pub async fn deposit(&self, amount: Decimal, notes: Option<String>) -> Result<LedgerEntry, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidStake(amount));
        }
        let entry = self
            .store
            .record_adjustment(
                NewLedgerEntry {
                    change: amount,
                    reason: LedgerReason::Deposit,
                    wager_id: None,
                    notes,
                },
                self.config.initial_balance,
            )
            .await?;
        info!(amount = %amount, balance = %entry.balance, "Deposit");
        Ok(entry)
    }

    pub async fn withdraw(&self, amount: Decimal, notes: Option<String>) -> Result<LedgerEntry, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidStake(amount));
        }
        let entry = self
            .store
            .record_adjustment(
                NewLedgerEntry {
                    change: -amount,
                    reason: LedgerReason::Withdrawal,
                    wager_id: None,
                    notes,
                },
                self.config.initial_balance,
            )
            .await
            .inspect_err(|err| {
                if let LedgerError::InsufficientFunds { available, .. } = err {
                    warn!(amount = %amount, balance = %available, "Insufficient funds, withdrawal rejected");
                }
            })?;
        info!(amount = %amount, balance = %entry.balance, "Withdrawal");
        Ok(entry)
    }

    pub async fn summary(&self) -> Result<BankrollSummary, LedgerError> {
        let balance = self.get_current_balance().await?;
        let wagers = self.store.all_wagers().await?;

        let count = |status: WagerStatus| wagers.iter().filter(|w| w.status == status).count();
        let (pending, won, lost, void) = (
            count(WagerStatus::Pending),
            count(WagerStatus::Won),
            count(WagerStatus::Lost),
            count(WagerStatus::Void),
        );
        let active_exposure: Decimal = wagers
            .iter()
            .filter(|w| w.status == WagerStatus::Pending)
            .map(|w| w.stake)
            .sum();
        let realised_profit: Decimal = wagers.iter().filter_map(|w| w.profit_loss).sum();

        let win_rate = if won + lost > 0 {
            won as f64 / (won + lost) as f64 * 100.0
        } else {
            0.0
        };
        let initial = self.config.initial_balance;
        let equity = balance + active_exposure;
        let roi = if initial > Decimal::ZERO {
            ((equity - initial) / initial * dec!(100)).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };

        Ok(BankrollSummary {
            balance,
            initial_balance: initial,
            active_exposure,
            realised_profit,
            pending,
            won,
            lost,
            void,
            win_rate,
            roi,
        })
    }

    /// Ledger entries, most recent first.
    pub async fn history(&self, limit: usize) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.store.ledger_entries(limit).await?)
    }

    pub async fn risk_alerts(&self) -> Result<Vec<RiskAlert>, LedgerError> {
        let balance = self.get_current_balance().await?;
        let exposure = self.get_active_exposure().await?;
        let settled: Vec<Wager> = self
            .store
            .all_wagers()
            .await?
            .into_iter()
            .filter(|w| w.status.is_settled())
            .collect();
        Ok(self.risk.check(balance, exposure, &settled))
    }

    /// Fractional-Kelly stake against the current balance.
    pub async fn suggest_stake(&self, odds: Decimal, probability: f64) -> Result<Decimal, LedgerError> {
        let balance = self.get_current_balance().await?;
        Ok(self.kelly.stake(balance, odds, probability))
    }

    /// The store re-checks the pending status inside its transaction; a
    /// settlement racing another handle surfaces as `AlreadySettled`.
    async fn commit_settlement(&self, settled: &Wager, entry: Option<NewLedgerEntry>) -> Result<(), LedgerError> {
        self.store
            .record_settlement(settled, entry, self.config.initial_balance)
            .await
            .inspect_err(|err| {
                if let LedgerError::AlreadySettled { id, status } = err {
                    warn!(wager_id = id, status = %status, "Wager already settled");
                }
            })?;
        Ok(())
    }

    async fn pending_wager(&self, id: WagerId) -> Result<Wager, LedgerError> {
        let wager = self
            .store
            .wager(id)
            .await?
            .ok_or(LedgerError::WagerNotFound(id))?;
        if wager.status.is_settled() {
            warn!(wager_id = id, status = %wager.status, "Wager already settled");
            return Err(LedgerError::AlreadySettled {
                id,
                status: wager.status,
            });
        }
        Ok(wager)
    }
}
