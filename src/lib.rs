//! campo: field tool custody for construction sites
//!
//! Tracks which tools left the warehouse with whom, via numbered
//! check-out reports backed by a shared record store, with a local
//! reference cache and a custody ledger mirror for offline-tolerant
//! conflict detection.

pub mod cli;
pub mod core;
