//! Historical backtesting engine.
//!
//! Replays every finished match in chronological order through one
//! strategy. The team history index starts empty and each match is added
//! only after it has been evaluated, so a decision can never see its own
//! result or anything later. Stakes are flat; the running balance is kept
//! in memory and can be projected into ledger rows afterwards.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::history::HistoryIndex;
use crate::storage::Archive;
use crate::strategy::odds::{OddsConfig, OddsResolver, OddsSource};
use crate::strategy::{Decision, StrategyEvaluator};
use crate::types::{
    LedgerEntry, LedgerReason, MatchId, Outcome, Strategy, StrategyId, TargetOutcome,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_balance: Decimal,
    /// Stake placed on every triggered match.
    pub flat_stake: Decimal,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_balance: dec!(1000),
            flat_stake: dec!(10),
        }
    }
}

// ---------------------------------------------------------------------------
// Backtest results
// ---------------------------------------------------------------------------

/// One simulated wager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestBet {
    pub match_id: MatchId,
    pub date: DateTime<Utc>,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub target: TargetOutcome,
    pub selection: Outcome,
    pub odds: Decimal,
    pub odds_source: OddsSource,
    pub home_score: u32,
    pub away_score: u32,
    pub won: bool,
    pub stake: Decimal,
    pub profit: Decimal,
    /// Running balance after this wager settled.
    pub balance: Decimal,
}

/// Complete backtest performance report for one strategy.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub strategy_id: StrategyId,
    pub strategy_name: String,
    pub initial_balance: Decimal,
    pub final_balance: Decimal,
    pub total_profit: Decimal,
    pub total_staked: Decimal,
    /// Profit over total staked, in percent.
    pub roi: f64,
    pub matches_evaluated: usize,
    pub wins: usize,
    pub losses: usize,
    /// Percent of placed wagers that won.
    pub win_rate: f64,
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: f64,
    pub peak_balance: Decimal,
    /// Wagers priced from the default table rather than a bookmaker.
    pub defaulted_odds: usize,
    /// Triggered matches skipped because the running balance was below the stake.
    pub skipped_insufficient_funds: usize,
    pub bets: Vec<BacktestBet>,
}

impl BacktestReport {
    pub fn total_bets(&self) -> usize {
        self.bets.len()
    }

    /// Replay the run as ledger rows: a `bet_placed` debit per wager and a
    /// `bet_won` credit of `stake·odds` per winner. Losses add no row.
    pub fn ledger_entries(&self) -> Vec<LedgerEntry> {
        let mut entries = Vec::with_capacity(self.bets.len() * 2);
        let mut next_id = 1;
        for (i, bet) in self.bets.iter().enumerate() {
            let wager_id = Some(i as i64 + 1);
            let before = bet.balance - bet.profit;
            let after_placement = before - bet.stake;
            entries.push(LedgerEntry {
                id: next_id,
                balance: after_placement,
                change: -bet.stake,
                reason: LedgerReason::BetPlaced,
                wager_id,
                timestamp: bet.date,
                notes: Some(format!("match {} {}", bet.match_id, bet.selection)),
            });
            next_id += 1;
            if bet.won {
                let credit = bet.stake * bet.odds;
                entries.push(LedgerEntry {
                    id: next_id,
                    balance: after_placement + credit,
                    change: credit,
                    reason: LedgerReason::BetWon,
                    wager_id,
                    timestamp: bet.date,
                    notes: None,
                });
                next_id += 1;
            }
        }
        entries
    }
}

// ---------------------------------------------------------------------------
// Backtester
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Backtester {
    config: BacktestConfig,
    resolver: OddsResolver,
}

impl Backtester {
    pub fn new(config: BacktestConfig, odds_config: OddsConfig) -> Self {
        Self {
            config,
            resolver: OddsResolver::new(odds_config),
        }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run one strategy over every finished match in the archive.
    pub fn run(&self, archive: &Archive, strategy: &Strategy) -> BacktestReport {
        let evaluator = StrategyEvaluator::new(&self.resolver);
        let stake = self.config.flat_stake;
        let initial = self.config.initial_balance;

        let mut history = HistoryIndex::new();
        let mut balance = initial;
        let mut peak = initial;
        let mut max_dd = Decimal::ZERO;
        let mut bets = Vec::new();
        let mut skipped = 0usize;
        let mut evaluated = 0usize;

        for m in archive.finished_matches() {
            evaluated += 1;
            let home_name = archive.team_name(m.home_team_id);
            let away_name = archive.team_name(m.away_team_id);

            let decision = evaluator.evaluate(
                strategy,
                m,
                home_name,
                away_name,
                archive.odds_for(m.id),
                &history,
            );

            if let (Decision::Triggered(resolved), Some((home_score, away_score))) =
                (decision, m.score())
            {
                if balance < stake {
                    debug!(
                        match_id = m.id,
                        balance = %balance,
                        stake = %stake,
                        "Running balance below stake — skipped"
                    );
                    skipped += 1;
                } else {
                    let won = resolved.outcome.is_hit(home_score, away_score);
                    let profit = if won {
                        stake * resolved.odds - stake
                    } else {
                        -stake
                    };
                    balance += profit;

                    if balance > peak {
                        peak = balance;
                    }
                    max_dd = max_dd.max(peak - balance);

                    bets.push(BacktestBet {
                        match_id: m.id,
                        date: m.date,
                        league: m.league.clone(),
                        home_team: home_name.to_string(),
                        away_team: away_name.to_string(),
                        target: strategy.target_outcome,
                        selection: resolved.outcome,
                        odds: resolved.odds,
                        odds_source: resolved.source,
                        home_score,
                        away_score,
                        won,
                        stake,
                        profit,
                        balance,
                    });
                }
            }

            // Only now does this match become history.
            history.record(m);
        }

        let report = summarise(strategy, initial, balance, peak, max_dd, evaluated, skipped, bets);
        info!(
            strategy = %strategy.name,
            matches = report.matches_evaluated,
            bets = report.total_bets(),
            win_rate = format!("{:.1}%", report.win_rate),
            roi = format!("{:.1}%", report.roi),
            final_balance = format!("€{:.2}", report.final_balance),
            defaulted_odds = report.defaulted_odds,
            "Backtest complete"
        );
        report
    }

    /// Backtest independent strategies concurrently, each on a blocking task
    /// with its own history index. Reports come back in input order.
    pub async fn run_all(
        &self,
        archive: Arc<Archive>,
        strategies: Vec<Strategy>,
    ) -> Result<Vec<BacktestReport>> {
        let handles: Vec<_> = strategies
            .into_iter()
            .map(|strategy| {
                let backtester = self.clone();
                let archive = Arc::clone(&archive);
                tokio::task::spawn_blocking(move || backtester.run(&archive, &strategy))
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            reports.push(handle.await.context("Backtest task failed")?);
        }
        Ok(reports)
    }
}

#[allow(clippy::too_many_arguments)]
fn summarise(
    strategy: &Strategy,
    initial: Decimal,
    balance: Decimal,
    peak: Decimal,
    max_dd: Decimal,
    evaluated: usize,
    skipped: usize,
    bets: Vec<BacktestBet>,
) -> BacktestReport {
    let wins = bets.iter().filter(|b| b.won).count();
    let losses = bets.len() - wins;
    let total_staked: Decimal = bets.iter().map(|b| b.stake).sum();
    let total_profit = balance - initial;
    let defaulted_odds = bets
        .iter()
        .filter(|b| b.odds_source == OddsSource::Default)
        .count();

    let win_rate = if bets.is_empty() {
        0.0
    } else {
        wins as f64 / bets.len() as f64 * 100.0
    };
    let roi = if total_staked > Decimal::ZERO {
        (total_profit / total_staked * dec!(100)).to_f64().unwrap_or(0.0)
    } else {
        0.0
    };
    let max_drawdown_pct = if peak > Decimal::ZERO {
        (max_dd / peak * dec!(100)).to_f64().unwrap_or(0.0)
    } else {
        0.0
    };

    BacktestReport {
        strategy_id: strategy.id,
        strategy_name: strategy.name.clone(),
        initial_balance: initial,
        final_balance: balance,
        total_profit,
        total_staked,
        roi,
        matches_evaluated: evaluated,
        wins,
        losses,
        win_rate,
        max_drawdown: max_dd,
        max_drawdown_pct,
        peak_balance: peak,
        defaulted_odds,
        skipped_insufficient_funds: skipped,
        bets,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
