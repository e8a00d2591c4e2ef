//! Identity provider backed by UserClusterIdentity objects
//!
//! A single watch task keeps an in-memory index keyed by
//! `username@clusterName`; lookups never wait on the API server.

mod index;
mod provider;

pub use index::{IdentityIndex, IdentityMatch, IndexWriter};
pub use provider::{UserClusterIdentityProvider, PROVIDER_NAME};
