//! Resource adapters and scheduling for federated objects
//!
//! This library provides:
//! - A uniform adapter per resource kind, for the federation store and for
//!   member clusters
//! - Per-cluster splitting of placement-sensitive fields and status folding
//! - A registry of the built-in kinds

pub mod adapter;
pub mod adapters;
pub mod error;
pub mod meta;
pub mod object;
pub mod qualified_name;
pub mod registry;
pub mod scheduling;

pub use adapter::{AdaptedKind, ObjectEventStream, ResourceAdapter, TypedAdapter};
pub use error::{CoreError, Result};
pub use object::{FederatedObject, FederatedStatus, PerClusterStatus};
pub use qualified_name::QualifiedName;
pub use registry::{AdapterFactory, AdapterRegistry};
pub use scheduling::{SchedulingAdapter, SchedulingPreferences};
