//! Keeps a local mod cache synchronized with a remotely published
//! manifest, admitting only artifacts whose detached PGP signatures verify
//! against a locally curated trust store.
//!
//! The pieces compose as a pipeline: [`Fetcher`] decides fetch versus
//! cache reuse per resource, [`KeyClient`] optionally augments the trust
//! store from key servers, [`KeyStore`] owns the merged key rings and the
//! verification logic, and [`SyncService`] runs the whole cycle on its own
//! runtime and hands the admitted paths back to the host.

#![forbid(unsafe_code)]

/// Time source abstraction used by key expiry checks.
pub mod clock;
mod config;
mod error;
mod fetch;
mod hkp;
mod keystore;
pub mod pgp;
mod sync;

pub use config::*;
pub use error::*;
pub use fetch::*;
pub use hkp::*;
pub use keystore::*;
pub use sync::*;

pub mod reexports {
    pub use {base64, ed25519_compact, flate2, log, serde_json, sha1, sha2};
}
