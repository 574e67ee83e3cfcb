//! Change-aware caching over a remote file store, and the versioned record
//! ledger built on top of it.
//!
//! `ChangeAwareCache` keeps in-memory snapshots of folder listings, file
//! listings and file contents, invalidated wholesale by one cheap change-feed
//! probe per read. `RecordStore` treats a single remote CSV file as a
//! multi-version, pin-aware table of records grouped by scope folder, with
//! all mutations serialized behind a store-wide lock.

mod cache;
mod config;
mod ledger;
#[cfg(test)]
pub(crate) mod testing;

pub use cache::ChangeAwareCache;
pub use config::Config;
pub use ledger::{RecordStore, ScopeMatch, VersionedRecord};
