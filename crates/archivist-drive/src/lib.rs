//! Drive-style REST backend for the archivist remote store contract.

mod client;

pub use client::DriveClient;
