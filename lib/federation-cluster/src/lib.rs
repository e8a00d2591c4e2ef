//! Connections to member clusters
//!
//! Resolves which server address of a registered cluster is reachable from
//! this host, reads the credential bundle for it out of the right store and
//! produces rate-limited clients.

pub mod address;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod rate_limit;
pub mod resolver;
pub mod store;

pub use address::{resolve_server_address, DefaultRouteInterface, HostInterface, StaticHostInterface};
pub use client::ClusterClient;
pub use config::{ClientAuth, ClientConfig, ResolverConfig};
pub use credentials::CredentialBundle;
pub use error::{ConnectionError, Result};
pub use rate_limit::RateLimiter;
pub use resolver::ClusterConnectionResolver;
pub use store::{wait_for_secret, CredentialStore, KubeCredentialStore, PollSettings, StoreAccessors};
