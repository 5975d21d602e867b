//! Desired Certificate construction for an HTTPProxy
//!
//! The Certificate shares the proxy's namespace and name and carries a
//! controller owner reference back to it, so the API server garbage collects
//! it with the proxy and the controller can map Certificate events back.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::crd::{Certificate, CertificateSpec, HttpProxy, IssuerRef, TlsIntent, SERVER_USAGES};
use crate::error::{Error, Result};

/// Create the controller OwnerReference pointing at the proxy
///
/// Deletion of the proxy is blocked until the Certificate is collected.
pub fn owner_reference(proxy: &HttpProxy) -> Result<OwnerReference> {
    let meta = proxy.meta();
    let uid = meta
        .uid
        .clone()
        .ok_or(Error::MissingObjectKey("metadata.uid"))?;
    let name = meta
        .name
        .clone()
        .ok_or(Error::MissingObjectKey("metadata.name"))?;

    Ok(OwnerReference {
        api_version: HttpProxy::api_version(&()).to_string(),
        kind: HttpProxy::kind(&()).to_string(),
        name,
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

/// Build the desired Certificate for a proxy that opted into TLS
pub fn build_certificate(
    proxy: &HttpProxy,
    tls: &TlsIntent<'_>,
    issuer: IssuerRef,
) -> Result<Certificate> {
    let namespace = proxy
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;

    let mut certificate = Certificate::new(
        &proxy.name_any(),
        CertificateSpec {
            common_name: Some(tls.fqdn.to_string()),
            dns_names: vec![tls.fqdn.to_string()],
            secret_name: tls.secret_name.to_string(),
            issuer_ref: issuer,
            usages: SERVER_USAGES.to_vec(),
        },
    );
    certificate.metadata.namespace = Some(namespace);
    certificate.metadata.owner_references = Some(vec![owner_reference(proxy)?]);

    Ok(certificate)
}
