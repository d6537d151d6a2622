//! Live-facing engines: the upcoming-fixture signal scanner and the
//! persistent bankroll ledger.

pub mod bankroll;
pub mod scanner;

pub use bankroll::{Bankroll, BankrollConfig, BankrollSummary};
pub use scanner::{ScannerConfig, Signal, SignalScanner};
