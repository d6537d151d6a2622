//! Historical evaluation: chronological backtests, bounded previews of
//! unsaved rules, accumulator construction over their wagers, and
//! season-level team and market returns.

pub mod accumulator;
pub mod preview;
pub mod runner;
pub mod teams;

pub use accumulator::{build_accumulators, Accumulator, AccumulatorConfig, Leg};
pub use preview::{PreviewConfig, PreviewEngine, PreviewRequest, PreviewResult};
pub use runner::{BacktestConfig, BacktestReport, Backtester};
pub use teams::{RankBy, TeamAnalyzer, TeamReport, TeamReportConfig, TeamReportQuery};
