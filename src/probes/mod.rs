//! Health, readiness and metrics endpoints
//!
//! Probes and metrics are served on separate ports so the metrics listener
//! can be firewalled independently of kubelet probes.

mod handlers;
mod server;

pub use handlers::{HealthResponse, Readiness};
#[cfg(feature = "metrics")]
pub use server::metrics_router;
pub use server::{bind, probe_router, serve};
