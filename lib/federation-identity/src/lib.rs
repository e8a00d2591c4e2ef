//! Identity providers for the federation control plane
//!
//! An identity provider decides, for an acting user and a member cluster,
//! where the credential to use is stored and whom to impersonate.

pub mod error;
pub mod provider;
pub mod registry;
pub mod single;
pub mod usercluster;

pub use error::{IdentityError, Result};
pub use provider::IdentityProvider;
pub use registry::{IdentityProviderRegistry, ProviderContext};
pub use single::SingleIdentityProvider;
pub use usercluster::{IdentityIndex, IdentityMatch, UserClusterIdentityProvider};
