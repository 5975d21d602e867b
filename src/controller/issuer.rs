//! Issuer resolution from cert-manager annotations
//!
//! Mirrors the annotation contract of cert-manager's ingress-shim so a proxy
//! is annotated exactly like an Ingress would be.

use std::collections::BTreeMap;

use crate::crd::IssuerRef;

/// Namespace-scoped issuer to sign the proxy's certificate
pub const ISSUER_ANNOTATION: &str = "cert-manager.io/issuer";
/// Cluster-scoped issuer to sign the proxy's certificate
pub const CLUSTER_ISSUER_ANNOTATION: &str = "cert-manager.io/cluster-issuer";
/// Overrides the kind of the namespace-scoped issuer
pub const ISSUER_KIND_ANNOTATION: &str = "cert-manager.io/issuer-kind";
/// Overrides the kind of the cluster-scoped issuer
pub const CLUSTER_ISSUER_KIND_ANNOTATION: &str = "cert-manager.io/cluster-issuer-kind";
/// Overrides the issuer API group (external issuers)
pub const ISSUER_GROUP_ANNOTATION: &str = "cert-manager.io/issuer-group";

pub const ISSUER_DEFAULT_KIND: &str = "Issuer";
pub const CLUSTER_ISSUER_DEFAULT_KIND: &str = "ClusterIssuer";

/// Every annotation key the shim reads
pub const WATCHED_ANNOTATIONS: [&str; 5] = [
    ISSUER_ANNOTATION,
    CLUSTER_ISSUER_ANNOTATION,
    ISSUER_KIND_ANNOTATION,
    CLUSTER_ISSUER_KIND_ANNOTATION,
    ISSUER_GROUP_ANNOTATION,
];

/// Process-wide issuer defaults, fixed at startup
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IssuerDefaults {
    pub name: String,
    pub kind: String,
    pub group: String,
}

/// Resolve the issuer for a proxy from its annotations.
///
/// The namespace issuer annotation wins over the cluster issuer annotation.
/// Only the default group is taken from `defaults`: a proxy without either
/// issuer annotation resolves to an empty name, meaning it has not opted in.
pub fn resolve_issuer(
    annotations: &BTreeMap<String, String>,
    defaults: &IssuerDefaults,
) -> IssuerRef {
    let mut issuer = IssuerRef {
        name: String::new(),
        kind: String::new(),
        group: defaults.group.clone(),
    };

    if let Some(name) = annotations.get(CLUSTER_ISSUER_ANNOTATION) {
        issuer.name = name.clone();
        issuer.kind = annotations
            .get(CLUSTER_ISSUER_KIND_ANNOTATION)
            .cloned()
            .unwrap_or_else(|| CLUSTER_ISSUER_DEFAULT_KIND.to_string());
    }

    if let Some(name) = annotations.get(ISSUER_ANNOTATION) {
        issuer.name = name.clone();
        issuer.kind = annotations
            .get(ISSUER_KIND_ANNOTATION)
            .cloned()
            .unwrap_or_else(|| ISSUER_DEFAULT_KIND.to_string());
    }

    if let Some(group) = annotations.get(ISSUER_GROUP_ANNOTATION) {
        issuer.group = group.clone();
    }

    issuer
}
