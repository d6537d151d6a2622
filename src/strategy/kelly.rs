//! Kelly criterion stake sizing.
//!
//! Fractional Kelly on decimal odds, capped at a fraction of the bankroll.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Kelly sizing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KellyConfig {
    /// Fractional Kelly multiplier (0.5 = half-Kelly).
    pub fraction: f64,
    /// Maximum stake as a fraction of bankroll.
    pub cap: f64,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            fraction: 0.5,
            cap: 0.05,
        }
    }
}

/// Full Kelly fraction `(b·p − q) / b` with `b = odds − 1`.
///
/// `None` for odds at or below 1 or a non-finite probability.
pub fn kelly_fraction(odds: Decimal, probability: f64) -> Option<f64> {
    if odds <= Decimal::ONE || !probability.is_finite() {
        return None;
    }
    let b = (odds - Decimal::ONE).to_f64()?;
    let p = probability.clamp(0.0, 1.0);
    let q = 1.0 - p;
    Some((b * p - q) / b)
}

/// Suggested stake: `bankroll · min(f·fraction, cap)`, rounded to cents.
///
/// Zero when there is no positive edge (`p·odds ≤ 1`) or odds ≤ 1.
pub fn kelly_stake(
    bankroll: Decimal,
    odds: Decimal,
    probability: f64,
    fraction: f64,
    cap: f64,
) -> Decimal {
    if bankroll <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let Some(f) = kelly_fraction(odds, probability) else {
        return Decimal::ZERO;
    };
    // f and p·odds − 1 share a sign; a small epsilon keeps p·odds == 1 at zero.
    if f <= 1e-12 {
        debug!(odds = %odds, probability, kelly = f, "Negative Kelly — no stake");
        return Decimal::ZERO;
    }

    let share = (f * fraction).min(cap).max(0.0);
    let Some(share) = Decimal::from_f64(share) else {
        return Decimal::ZERO;
    };
    let stake = (bankroll * share).round_dp(2);

    debug!(
        odds = %odds,
        probability,
        raw_kelly = format!("{:.2}%", f * 100.0),
        stake = format!("€{:.2}", stake),
        "Stake sized"
    );
    stake
}

pub struct KellyCalculator {
    config: KellyConfig,
}

impl KellyCalculator {
    pub fn new(config: KellyConfig) -> Self {
        Self { config }
    }

    /// Access the Kelly configuration.
    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    pub fn stake(&self, bankroll: Decimal, odds: Decimal, probability: f64) -> Decimal {
        kelly_stake(
            bankroll,
            odds,
            probability,
            self.config.fraction,
            self.config.cap,
        )
    }
}
