//! Platform side of reconciliation: HTTP transport, row normalisation and
//! per-record mutation dispatch.

pub mod normalize;

#[cfg(feature = "http")]
pub mod executor;
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use executor::{MutationExecutor, MutationFailure, MutationKind, MutationTally};
#[cfg(feature = "http")]
pub use http::{PlatformClient, PlatformConfig, RemotePlatform, SyncError};
pub use normalize::{normalize_row, normalize_rows};
