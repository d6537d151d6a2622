//! Risk monitor.
//!
//! Produces human-readable warnings for drawdown from the initial bankroll,
//! stake exposure relative to the current balance, and the current run of
//! consecutive losses. Alerts are advisory; nothing here blocks placement.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::types::{Wager, WagerStatus};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Alert when (initial − balance) / initial reaches this fraction.
    pub drawdown_limit: f64,
    /// Alert when exposure / balance reaches this fraction.
    pub exposure_limit: f64,
    /// Alert when this many most-recent settled wagers are losses.
    pub losing_streak_limit: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            drawdown_limit: 0.20,
            exposure_limit: 0.15,
            losing_streak_limit: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskAlert {
    Drawdown { drawdown: f64, limit: f64 },
    Exposure { ratio: f64, limit: f64 },
    LosingStreak { streak: usize, limit: usize },
}

impl fmt::Display for RiskAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskAlert::Drawdown { drawdown, limit } => write!(
                f,
                "High drawdown warning: {:.1}% (limit {:.1}%)",
                drawdown * 100.0,
                limit * 100.0
            ),
            RiskAlert::Exposure { ratio, limit } => write!(
                f,
                "High exposure warning: {:.1}% locked (limit {:.1}%)",
                ratio * 100.0,
                limit * 100.0
            ),
            RiskAlert::LosingStreak { streak, .. } => {
                write!(f, "Stop-loss warning: {streak} consecutive losses")
            }
        }
    }
}

/// Count of consecutive losses, most recent first, stopping at the first
/// win. Pending and void wagers are skipped.
pub fn losing_streak(settled: &[Wager]) -> usize {
    let mut ordered: Vec<&Wager> = settled.iter().collect();
    ordered.sort_by(|a, b| b.placed_at.cmp(&a.placed_at).then(b.id.cmp(&a.id)));

    let mut streak = 0;
    for wager in ordered {
        match wager.status {
            WagerStatus::Lost => streak += 1,
            WagerStatus::Won => break,
            WagerStatus::Pending | WagerStatus::Void => {}
        }
    }
    streak
}

pub struct RiskMonitor {
    config: RiskConfig,
    initial_balance: Decimal,
}

impl RiskMonitor {
    pub fn new(config: RiskConfig, initial_balance: Decimal) -> Self {
        Self {
            config,
            initial_balance,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Evaluate all checks; thresholds are inclusive.
    pub fn check(&self, balance: Decimal, exposure: Decimal, settled: &[Wager]) -> Vec<RiskAlert> {
        let mut alerts = Vec::new();

        if self.initial_balance > Decimal::ZERO {
            let drawdown = ((self.initial_balance - balance) / self.initial_balance)
                .to_f64()
                .unwrap_or(0.0);
            if drawdown >= self.config.drawdown_limit {
                alerts.push(RiskAlert::Drawdown {
                    drawdown,
                    limit: self.config.drawdown_limit,
                });
            }
        }

        let ratio = if balance > Decimal::ZERO {
            (exposure / balance).to_f64().unwrap_or(0.0)
        } else if exposure > Decimal::ZERO {
            1.0
        } else {
            0.0
        };
        if ratio >= self.config.exposure_limit {
            alerts.push(RiskAlert::Exposure {
                ratio,
                limit: self.config.exposure_limit,
            });
        }

        let streak = losing_streak(settled);
        if self.config.losing_streak_limit > 0 && streak >= self.config.losing_streak_limit {
            alerts.push(RiskAlert::LosingStreak {
                streak,
                limit: self.config.losing_streak_limit,
            });
        }

        for alert in &alerts {
            warn!(balance = %balance, exposure = %exposure, "{}", alert);
        }
        alerts
    }
}
