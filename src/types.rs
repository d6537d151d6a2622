//! Shared types for BETLAB.
//!
//! These types form the data model used across all modules.
//! Match/Team/Odds records are owned by the archive and read-only to the
//! engines; Wager and LedgerEntry are created only by the bankroll ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TeamId = i64;
pub type MatchId = i64;
pub type StrategyId = i64;
pub type WagerId = i64;
pub type EntryId = i64;

/// Rolling window used when a condition does not specify one.
pub const DEFAULT_WINDOW: usize = 5;

// ---------------------------------------------------------------------------
// Teams & matches
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub league: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    #[serde(alias = "timed")]
    Scheduled,
    Live,
    Finished,
    Postponed,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::Scheduled => write!(f, "scheduled"),
            MatchStatus::Live => write!(f, "live"),
            MatchStatus::Finished => write!(f, "finished"),
            MatchStatus::Postponed => write!(f, "postponed"),
        }
    }
}

impl FromStr for MatchStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "scheduled" | "timed" => Ok(MatchStatus::Scheduled),
            "live" => Ok(MatchStatus::Live),
            "finished" => Ok(MatchStatus::Finished),
            "postponed" => Ok(MatchStatus::Postponed),
            _ => Err(ParseError::unknown("match status", s)),
        }
    }
}

/// A football fixture. Scores are present iff the match is finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    pub league: String,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub round: Option<String>,
    pub date: DateTime<Utc>,
    pub status: MatchStatus,
    #[serde(default)]
    pub home_score: Option<u32>,
    #[serde(default)]
    pub away_score: Option<u32>,
    #[serde(default)]
    pub statistics: Option<serde_json::Value>,
}

impl Match {
    /// Final score, only for finished matches with both scores recorded.
    pub fn score(&self) -> Option<(u32, u32)> {
        if self.status != MatchStatus::Finished {
            return None;
        }
        Some((self.home_score?, self.away_score?))
    }

    pub fn is_finished(&self) -> bool {
        self.score().is_some()
    }

    /// Scores are non-null iff status is finished.
    pub fn is_consistent(&self) -> bool {
        let has_scores = self.home_score.is_some() && self.away_score.is_some();
        let has_any = self.home_score.is_some() || self.away_score.is_some();
        match self.status {
            MatchStatus::Finished => has_scores,
            _ => !has_any,
        }
    }

    pub fn involves(&self, team_id: TeamId) -> bool {
        self.home_team_id == team_id || self.away_team_id == team_id
    }
}

/// One bookmaker's prices for one market of one match.
///
/// `data` is kept raw: collectors have stored it both as a JSON object and
/// as a string-encoded object, so decoding happens in the odds resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsRecord {
    pub match_id: MatchId,
    pub bookmaker: String,
    #[serde(default)]
    pub market: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub captured_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A concrete, settleable betting outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "home_win")]
    HomeWin,
    #[serde(rename = "away_win")]
    AwayWin,
    #[serde(rename = "draw")]
    Draw,
    #[serde(rename = "over_2.5")]
    Over25,
    #[serde(rename = "under_2.5")]
    Under25,
    #[serde(rename = "over_1.5")]
    Over15,
    #[serde(rename = "under_1.5")]
    Under15,
    #[serde(rename = "btts_yes")]
    BttsYes,
    #[serde(rename = "btts_no")]
    BttsNo,
}

impl Outcome {
    pub const ALL: &'static [Outcome] = &[
        Outcome::HomeWin,
        Outcome::AwayWin,
        Outcome::Draw,
        Outcome::Over25,
        Outcome::Under25,
        Outcome::Over15,
        Outcome::Under15,
        Outcome::BttsYes,
        Outcome::BttsNo,
    ];

    /// Canonical name, as used in strategy definitions.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::HomeWin => "home_win",
            Outcome::AwayWin => "away_win",
            Outcome::Draw => "draw",
            Outcome::Over25 => "over_2.5",
            Outcome::Under25 => "under_2.5",
            Outcome::Over15 => "over_1.5",
            Outcome::Under15 => "under_1.5",
            Outcome::BttsYes => "btts_yes",
            Outcome::BttsNo => "btts_no",
        }
    }

    /// Key of this outcome inside a bookmaker odds payload.
    pub fn odds_key(&self) -> &'static str {
        match self {
            Outcome::HomeWin => "home",
            Outcome::AwayWin => "away",
            other => other.as_str(),
        }
    }

    /// Market identifier recorded on wagers.
    pub fn market(&self) -> &'static str {
        match self {
            Outcome::HomeWin | Outcome::AwayWin | Outcome::Draw => "1x2",
            Outcome::Over25 | Outcome::Under25 | Outcome::Over15 | Outcome::Under15 => {
                "over_under"
            }
            Outcome::BttsYes | Outcome::BttsNo => "btts",
        }
    }

    /// Whether the outcome occurred for a final score.
    pub fn is_hit(&self, home: u32, away: u32) -> bool {
        let total = home + away;
        match self {
            Outcome::HomeWin => home > away,
            Outcome::AwayWin => away > home,
            Outcome::Draw => home == away,
            Outcome::Over25 => total > 2,
            Outcome::Under25 => total <= 2,
            Outcome::Over15 => total > 1,
            Outcome::Under15 => total <= 1,
            Outcome::BttsYes => home > 0 && away > 0,
            Outcome::BttsNo => home == 0 || away == 0,
        }
    }

    /// Estimated price used when no bookmaker exposes this outcome.
    pub fn default_odds(&self) -> Decimal {
        match self {
            Outcome::HomeWin => dec!(2.0),
            Outcome::AwayWin => dec!(3.5),
            Outcome::Draw => dec!(3.2),
            Outcome::Over25 | Outcome::Under25 => dec!(1.9),
            Outcome::Over15 => dec!(1.35),
            Outcome::Under15 => dec!(3.0),
            Outcome::BttsYes => dec!(1.75),
            Outcome::BttsNo => dec!(2.1),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "home_win" | "home" => Ok(Outcome::HomeWin),
            "away_win" | "away" => Ok(Outcome::AwayWin),
            "draw" => Ok(Outcome::Draw),
            "over_2.5" | "over_2_5" | "over25" => Ok(Outcome::Over25),
            "under_2.5" | "under_2_5" | "under25" => Ok(Outcome::Under25),
            "over_1.5" | "over_1_5" | "over15" => Ok(Outcome::Over15),
            "under_1.5" | "under_1_5" | "under15" => Ok(Outcome::Under15),
            "btts_yes" | "btts" => Ok(Outcome::BttsYes),
            "btts_no" => Ok(Outcome::BttsNo),
            _ => Err(ParseError::unknown("outcome", s)),
        }
    }
}

/// What a strategy bets on: a fixed outcome, or `win` meaning "the side
/// belonging to the strategy's selected teams".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetOutcome {
    Fixed(Outcome),
    Win,
}

impl fmt::Display for TargetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetOutcome::Fixed(outcome) => write!(f, "{outcome}"),
            TargetOutcome::Win => write!(f, "win"),
        }
    }
}

impl FromStr for TargetOutcome {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("win") {
            return Ok(TargetOutcome::Win);
        }
        s.parse::<Outcome>()
            .map(TargetOutcome::Fixed)
            .map_err(|_| ParseError::unknown("target outcome", s))
    }
}

impl TryFrom<String> for TargetOutcome {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TargetOutcome> for String {
    fn from(value: TargetOutcome) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Strategies & conditions
// ---------------------------------------------------------------------------

/// Which side of the fixture a condition looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Entity {
    #[serde(rename = "home_team", alias = "home")]
    HomeTeam,
    #[serde(rename = "away_team", alias = "away")]
    AwayTeam,
}

/// Restricts the rolling window to matches played in a given venue role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueContext {
    #[default]
    #[serde(alias = "all")]
    Overall,
    Home,
    Away,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==", alias = "=")]
    Eq,
    #[serde(rename = "!=", alias = "<>")]
    Ne,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
        };
        f.write_str(symbol)
    }
}

/// Rolling-form statistics a condition can test.
///
/// Rates are percentages (0–100); averages are per match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Metric {
    AvgGoalsScored,
    AvgGoalsConceded,
    AvgTotalGoals,
    WinRate,
    DrawRate,
    LossRate,
    CleanSheetRate,
    BttsRate,
    Over25Rate,
    Under25Rate,
    ScoringRate,
    PointsPerGame,
}

/// Translation table from builder labels and free-text names to metrics.
/// Keys are normalised: lowercase, separators collapsed to `_`.
const METRIC_SYNONYMS: &[(&str, Metric)] = &[
    ("avg_goals_scored", Metric::AvgGoalsScored),
    ("goals_scored", Metric::AvgGoalsScored),
    ("goals_for", Metric::AvgGoalsScored),
    ("average_goals_scored", Metric::AvgGoalsScored),
    ("avg_goals_conceded", Metric::AvgGoalsConceded),
    ("goals_conceded", Metric::AvgGoalsConceded),
    ("goals_against", Metric::AvgGoalsConceded),
    ("average_goals_conceded", Metric::AvgGoalsConceded),
    ("avg_total_goals", Metric::AvgTotalGoals),
    ("total_goals_avg", Metric::AvgTotalGoals),
    ("total_goals", Metric::AvgTotalGoals),
    ("win_rate", Metric::WinRate),
    ("win_percentage", Metric::WinRate),
    ("wins", Metric::WinRate),
    ("draw_rate", Metric::DrawRate),
    ("draw_percentage", Metric::DrawRate),
    ("loss_rate", Metric::LossRate),
    ("loss_percentage", Metric::LossRate),
    ("clean_sheet_rate", Metric::CleanSheetRate),
    ("clean_sheets", Metric::CleanSheetRate),
    ("clean_sheets_percentage", Metric::CleanSheetRate),
    ("clean_sheet_percentage", Metric::CleanSheetRate),
    ("btts_rate", Metric::BttsRate),
    ("btts_percentage", Metric::BttsRate),
    ("both_teams_scored", Metric::BttsRate),
    ("both_teams_to_score", Metric::BttsRate),
    ("over_2_5_rate", Metric::Over25Rate),
    ("over_2_5_percentage", Metric::Over25Rate),
    ("over_25_percentage", Metric::Over25Rate),
    ("under_2_5_rate", Metric::Under25Rate),
    ("under_2_5_percentage", Metric::Under25Rate),
    ("under_25_percentage", Metric::Under25Rate),
    ("scoring_rate", Metric::ScoringRate),
    ("scoring_frequency", Metric::ScoringRate),
    ("points_per_game", Metric::PointsPerGame),
    ("ppg", Metric::PointsPerGame),
];

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::AvgGoalsScored => "avg_goals_scored",
            Metric::AvgGoalsConceded => "avg_goals_conceded",
            Metric::AvgTotalGoals => "avg_total_goals",
            Metric::WinRate => "win_rate",
            Metric::DrawRate => "draw_rate",
            Metric::LossRate => "loss_rate",
            Metric::CleanSheetRate => "clean_sheet_rate",
            Metric::BttsRate => "btts_rate",
            Metric::Over25Rate => "over_2_5_rate",
            Metric::Under25Rate => "under_2_5_rate",
            Metric::ScoringRate => "scoring_rate",
            Metric::PointsPerGame => "points_per_game",
        }
    }

    fn normalise(label: &str) -> String {
        let mut out = String::with_capacity(label.len());
        for c in label.trim().to_lowercase().chars() {
            let c = match c {
                ' ' | '-' | '.' | '/' => '_',
                '%' => continue,
                other => other,
            };
            if c == '_' && out.ends_with('_') {
                continue;
            }
            out.push(c);
        }
        out.trim_matches('_').to_string()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = Metric::normalise(s);
        METRIC_SYNONYMS
            .iter()
            .find(|(label, _)| *label == key)
            .map(|(_, metric)| *metric)
            .ok_or_else(|| ParseError::unknown("metric", s))
    }
}

impl TryFrom<String> for Metric {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Metric> for String {
    fn from(value: Metric) -> Self {
        value.as_str().to_string()
    }
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}

fn default_active() -> bool {
    true
}

/// A single predicate over a team's rolling form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub entity: Entity,
    #[serde(default)]
    pub context: VenueContext,
    pub metric: Metric,
    pub operator: Operator,
    #[serde(alias = "value")]
    pub threshold: f64,
    #[serde(default = "default_window", alias = "last_n_games")]
    pub window: usize,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entity = match self.entity {
            Entity::HomeTeam => "home",
            Entity::AwayTeam => "away",
        };
        write!(
            f,
            "{entity}.{}[{:?}, last {}] {} {}",
            self.metric, self.context, self.window, self.operator, self.threshold
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: StrategyId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub target_outcome: TargetOutcome,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub leagues: Vec<String>,
    #[serde(default)]
    pub teams: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

// ---------------------------------------------------------------------------
// Wagers & ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WagerStatus {
    Pending,
    Won,
    Lost,
    Void,
}

impl WagerStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, WagerStatus::Pending)
    }
}

impl fmt::Display for WagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WagerStatus::Pending => write!(f, "pending"),
            WagerStatus::Won => write!(f, "won"),
            WagerStatus::Lost => write!(f, "lost"),
            WagerStatus::Void => write!(f, "void"),
        }
    }
}

impl FromStr for WagerStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(WagerStatus::Pending),
            "won" => Ok(WagerStatus::Won),
            "lost" => Ok(WagerStatus::Lost),
            "void" => Ok(WagerStatus::Void),
            _ => Err(ParseError::unknown("wager status", s)),
        }
    }
}

/// A placed wager (paper or real).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub id: WagerId,
    pub match_id: MatchId,
    pub strategy_id: Option<StrategyId>,
    pub market: String,
    pub selection: String,
    pub odds: Decimal,
    pub stake: Decimal,
    pub status: WagerStatus,
    pub is_paper_trade: bool,
    /// Set only on settlement.
    pub profit_loss: Option<Decimal>,
    pub placed_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl fmt::Display for Wager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} match={} {}:{} €{:.2} @ {} [{}]",
            self.id, self.match_id, self.market, self.selection, self.stake, self.odds, self.status
        )?;
        if let Some(pl) = self.profit_loss {
            write!(f, " P/L €{pl:.2}")?;
        }
        Ok(())
    }
}

/// Wager fields supplied at placement time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWager {
    pub match_id: MatchId,
    pub strategy_id: Option<StrategyId>,
    pub market: String,
    pub selection: String,
    pub odds: Decimal,
    pub stake: Decimal,
    pub is_paper_trade: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    BetPlaced,
    BetWon,
    BetVoid,
    Deposit,
    Withdrawal,
}

impl fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerReason::BetPlaced => write!(f, "bet_placed"),
            LedgerReason::BetWon => write!(f, "bet_won"),
            LedgerReason::BetVoid => write!(f, "bet_void"),
            LedgerReason::Deposit => write!(f, "deposit"),
            LedgerReason::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

impl FromStr for LedgerReason {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "bet_placed" => Ok(LedgerReason::BetPlaced),
            "bet_won" => Ok(LedgerReason::BetWon),
            "bet_void" => Ok(LedgerReason::BetVoid),
            "deposit" => Ok(LedgerReason::Deposit),
            "withdrawal" => Ok(LedgerReason::Withdrawal),
            _ => Err(ParseError::unknown("ledger reason", s)),
        }
    }
}

/// Append-only bankroll event. `balance` is the balance after the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub balance: Decimal,
    pub change: Decimal,
    pub reason: LedgerReason,
    pub wager_id: Option<WagerId>,
    pub timestamp: DateTime<Utc>,
    pub notes: Option<String>,
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.change >= Decimal::ZERO { "+" } else { "" };
        write!(
            f,
            "{} {:<10} {sign}{:.2} → €{:.2}",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.reason.to_string(),
            self.change,
            self.balance
        )
    }
}

/// A balance movement. The store derives the resulting balance from the
/// latest entry inside the same transaction that appends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub change: Decimal,
    pub reason: LedgerReason,
    pub wager_id: Option<WagerId>,
    pub notes: Option<String>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Recoverable bankroll ledger outcomes, returned as values.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient funds: need €{needed:.2}, have €{available:.2}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Wager not found: {0}")]
    WagerNotFound(WagerId),

    #[error("Wager {id} already settled ({status})")]
    AlreadySettled { id: WagerId, status: WagerStatus },

    #[error("Invalid stake: {0}")]
    InvalidStake(Decimal),

    #[error("Invalid odds: {0}")]
    InvalidOdds(Decimal),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Unknown label at the deserialisation boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    pub fn unknown(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
