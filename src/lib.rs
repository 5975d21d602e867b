//! contour-cert-shim: cert-manager Certificates for Contour HTTPProxies
//!
//! Watches `projectcontour.io/v1` HTTPProxy resources and, for every proxy
//! that terminates TLS and names a cert-manager issuer in its annotations,
//! keeps a `cert-manager.io/v1` Certificate for its virtual host in sync.

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod leader_election;
pub mod probes;

pub use crate::error::{Error, Result};
