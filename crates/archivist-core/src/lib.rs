//! Core contract for the archivist storage stack.
//!
//! This crate defines the abstractions shared by the remote client and the
//! caching/record layers built on top of it:
//! - `RemoteStore`: the remote hierarchical file store boundary
//! - `StoreError`: the error taxonomy (transient vs. terminal vs. config)
//! - `RetryPolicy`: bounded retry-with-backoff for transient failures

mod error;
mod remote;
mod retry;

pub use error::StoreError;
pub use remote::{ChangePage, ChangeToken, EntryKind, RemoteEntry, RemoteStore};
pub use retry::RetryPolicy;
