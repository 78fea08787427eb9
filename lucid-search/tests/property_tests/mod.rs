//! Property-based tests for lucid-search
//!
//! Checks the search against brute-force enumeration on random conflict
//! graphs, and the ledger indexes against linear scans.

mod ledger_properties;
mod search_properties;
