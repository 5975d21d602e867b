//! Controller module for HTTPProxy reconciliation
//! This module contains the controller loop, the issuer and Certificate
//! derivation, and access to the API server.

pub mod certificate;
pub mod issuer;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod preflight;
mod reconciler;
pub mod store;

pub use certificate::{build_certificate, owner_reference};
pub use issuer::{resolve_issuer, IssuerDefaults, WATCHED_ANNOTATIONS};
pub use preflight::{ensure_crd_exists, ensure_required_crds, preflight, REQUIRED_CRDS};
pub use reconciler::{reconcile_key, run_controller, Context, Outcome, SkipReason};
pub use store::{KubeStore, ObjectKey, ObjectStore, ProxyEvent, FIELD_MANAGER};
