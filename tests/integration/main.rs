//! End-to-end tests through the public `betlab` API.

mod fixtures;
mod ledger;
mod simulation;
