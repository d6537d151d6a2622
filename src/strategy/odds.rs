//! Odds resolution.
//!
//! Picks a decimal price for an outcome from a match's bookmaker rows,
//! walking a bookmaker preference list, then any row exposing the outcome,
//! then a fixed table of estimated defaults. Every price is tagged with
//! where it came from so reports can separate observed from estimated
//! economics.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::types::{OddsRecord, Outcome, TargetOutcome};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OddsConfig {
    /// Bookmakers searched first, in order (case-insensitive).
    pub bookmaker_preference: Vec<String>,
}

impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            bookmaker_preference: vec![
                "Bet365".to_string(),
                "Pinnacle".to_string(),
                "Average".to_string(),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved price
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OddsSource {
    Observed { bookmaker: String },
    Default,
}

impl fmt::Display for OddsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OddsSource::Observed { bookmaker } => write!(f, "{bookmaker}"),
            OddsSource::Default => write!(f, "default"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedOdds {
    pub outcome: Outcome,
    pub odds: Decimal,
    pub source: OddsSource,
}

impl ResolvedOdds {
    pub fn is_default(&self) -> bool {
        self.source == OddsSource::Default
    }
}

// ---------------------------------------------------------------------------
// Payload decoding
// ---------------------------------------------------------------------------

/// Decode an odds payload that may be an object or a string-encoded object.
pub fn decode_payload(data: &Value) -> Option<Map<String, Value>> {
    match data {
        Value::Object(map) => Some(map.clone()),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Some(map),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "Unparseable odds payload");
                None
            }
        },
        _ => None,
    }
}

/// Decode one price; numbers and numeric strings are accepted, anything not
/// strictly greater than 1 is rejected.
pub fn decode_price(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    let price = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()?;
    (price > Decimal::ONE).then_some(price)
}

fn price_in_row(row: &OddsRecord, key: &str) -> Option<Decimal> {
    let Some(payload) = decode_payload(&row.data) else {
        warn!(
            match_id = row.match_id,
            bookmaker = %row.bookmaker,
            "Malformed odds payload — skipping row"
        );
        return None;
    };
    payload
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .and_then(|(_, v)| decode_price(v))
}

/// Lowercase, trimmed, internal whitespace collapsed.
pub fn normalise_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OddsResolver {
    config: OddsConfig,
}

impl OddsResolver {
    pub fn new(config: OddsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OddsConfig {
        &self.config
    }

    /// Concrete outcome for a target. `Win` resolves to the side whose team
    /// is in `selected_teams`, home first; `None` if neither side is.
    pub fn resolve_selection(
        target: TargetOutcome,
        home_name: &str,
        away_name: &str,
        selected_teams: &[String],
    ) -> Option<Outcome> {
        match target {
            TargetOutcome::Fixed(outcome) => Some(outcome),
            TargetOutcome::Win => {
                let selected: Vec<String> =
                    selected_teams.iter().map(|t| normalise_name(t)).collect();
                if selected.contains(&normalise_name(home_name)) {
                    Some(Outcome::HomeWin)
                } else if selected.contains(&normalise_name(away_name)) {
                    Some(Outcome::AwayWin)
                } else {
                    None
                }
            }
        }
    }

    /// Price `outcome` from the given rows (all belonging to one match).
    /// Never fails: falls back to the default table.
    pub fn price(&self, outcome: Outcome, rows: &[OddsRecord]) -> ResolvedOdds {
        let key = outcome.odds_key();

        let mut ordered: Vec<&OddsRecord> = rows.iter().collect();
        ordered.sort_by(|a, b| {
            b.captured_at
                .cmp(&a.captured_at)
                .then_with(|| a.bookmaker.cmp(&b.bookmaker))
        });

        for preferred in &self.config.bookmaker_preference {
            let found = ordered
                .iter()
                .filter(|row| row.bookmaker.eq_ignore_ascii_case(preferred))
                .find_map(|row| price_in_row(row, key).map(|p| (p, row.bookmaker.clone())));
            if let Some((odds, bookmaker)) = found {
                return ResolvedOdds {
                    outcome,
                    odds,
                    source: OddsSource::Observed { bookmaker },
                };
            }
        }

        if let Some((odds, bookmaker)) = ordered
            .iter()
            .find_map(|row| price_in_row(row, key).map(|p| (p, row.bookmaker.clone())))
        {
            return ResolvedOdds {
                outcome,
                odds,
                source: OddsSource::Observed { bookmaker },
            };
        }

        debug!(outcome = %outcome, rows = rows.len(), "No observed odds — using default");
        ResolvedOdds {
            outcome,
            odds: outcome.default_odds(),
            source: OddsSource::Default,
        }
    }

    /// Resolve a strategy target for a match and price it.
    ///
    /// `None` only when a `Win` target cannot be tied to either side.
    pub fn resolve(
        &self,
        target: TargetOutcome,
        home_name: &str,
        away_name: &str,
        selected_teams: &[String],
        rows: &[OddsRecord],
    ) -> Option<ResolvedOdds> {
        let outcome = Self::resolve_selection(target, home_name, away_name, selected_teams)?;
        Some(self.price(outcome, rows))
    }
}

impl Default for OddsResolver {
    fn default() -> Self {
        Self::new(OddsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn make_row(bookmaker: &str, data: Value, minutes: i64) -> OddsRecord {
        OddsRecord {
            match_id: 1,
            bookmaker: bookmaker.to_string(),
            market: "1x2".to_string(),
            data,
            captured_at: Utc.with_ymd_and_hms(2024, 10, 1, 12, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    #[test]
    fn test_decode_payload_object_and_string() {
        let obj = json!({"home": 2.1});
        assert!(decode_payload(&obj).is_some());

        let encoded = Value::String(r#"{"home": "2.10", "away": 3.4}"#.to_string());
        let map = decode_payload(&encoded).unwrap();
        assert_eq!(decode_price(&map["home"]), Some(dec!(2.10)));
        assert_eq!(decode_price(&map["away"]), Some(dec!(3.4)));

        assert!(decode_payload(&Value::String("not json".to_string())).is_none());
        assert!(decode_payload(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_decode_price_rejects_invalid() {
        assert_eq!(decode_price(&json!("abc")), None);
        assert_eq!(decode_price(&json!(1.0)), None);
        assert_eq!(decode_price(&json!(0.5)), None);
        assert_eq!(decode_price(&json!(null)), None);
        assert_eq!(decode_price(&json!("1.85")), Some(dec!(1.85)));
    }

    #[test]
    fn test_preference_order() {
        let resolver = OddsResolver::default();
        let rows = vec![
            make_row("Unibet", json!({"home": 2.5}), 0),
            make_row("Pinnacle", json!({"home": 2.2}), 0),
            make_row("bet365", json!({"home": 2.1}), 0),
        ];
        let resolved = resolver.price(Outcome::HomeWin, &rows);
        assert_eq!(resolved.odds, dec!(2.1));
        assert_eq!(
            resolved.source,
            OddsSource::Observed {
                bookmaker: "bet365".to_string()
            }
        );
    }

    #[test]
    fn test_preferred_without_key_falls_through() {
        let resolver = OddsResolver::default();
        let rows = vec![
            make_row("Bet365", json!({"home": 2.1}), 0),
            make_row("Unibet", json!({"btts_yes": 1.8}), 0),
        ];
        let resolved = resolver.price(Outcome::BttsYes, &rows);
        assert_eq!(resolved.odds, dec!(1.8));
        assert!(!resolved.is_default());
    }

    #[test]
    fn test_malformed_rows_skipped() {
        let resolver = OddsResolver::default();
        let rows = vec![
            make_row("Bet365", Value::String("{broken".to_string()), 0),
            make_row("Bet365", json!({"draw": "n/a"}), 5),
            make_row("Pinnacle", json!({"draw": "3.30"}), 0),
        ];
        let resolved = resolver.price(Outcome::Draw, &rows);
        assert_eq!(resolved.odds, dec!(3.30));
    }

    #[test]
    fn test_latest_capture_wins_within_bookmaker() {
        let resolver = OddsResolver::default();
        let rows = vec![
            make_row("Bet365", json!({"away": 3.0}), 0),
            make_row("Bet365", json!({"away": 3.2}), 30),
        ];
        assert_eq!(resolver.price(Outcome::AwayWin, &rows).odds, dec!(3.2));
    }

    #[test]
    fn test_default_table() {
        let resolver = OddsResolver::default();
        let cases = [
            (Outcome::HomeWin, dec!(2.0)),
            (Outcome::AwayWin, dec!(3.5)),
            (Outcome::Draw, dec!(3.2)),
            (Outcome::Over25, dec!(1.9)),
            (Outcome::Under25, dec!(1.9)),
            (Outcome::BttsYes, dec!(1.75)),
            (Outcome::BttsNo, dec!(2.1)),
        ];
        for (outcome, expected) in cases {
            let resolved = resolver.price(outcome, &[]);
            assert_eq!(resolved.odds, expected, "{outcome}");
            assert!(resolved.is_default());
        }
    }

    #[test]
    fn test_win_target_resolution() {
        let teams = vec!["  FC   Porto ".to_string()];
        assert_eq!(
            OddsResolver::resolve_selection(TargetOutcome::Win, "fc porto", "Benfica", &teams),
            Some(Outcome::HomeWin)
        );
        assert_eq!(
            OddsResolver::resolve_selection(TargetOutcome::Win, "Benfica", "FC Porto", &teams),
            Some(Outcome::AwayWin)
        );
        assert_eq!(
            OddsResolver::resolve_selection(TargetOutcome::Win, "Benfica", "Sporting", &teams),
            None
        );
        assert_eq!(
            OddsResolver::resolve_selection(
                TargetOutcome::Fixed(Outcome::Draw),
                "Benfica",
                "Sporting",
                &[]
            ),
            Some(Outcome::Draw)
        );
    }

    #[test]
    fn test_resolve_excludes_unmatched_win() {
        let resolver = OddsResolver::default();
        assert!(resolver
            .resolve(TargetOutcome::Win, "A", "B", &["C".to_string()], &[])
            .is_none());
        let resolved = resolver
            .resolve(TargetOutcome::Win, "A", "B", &["b".to_string()], &[])
            .unwrap();
        assert_eq!(resolved.outcome, Outcome::AwayWin);
        assert_eq!(resolved.odds, dec!(3.5));
    }
}
