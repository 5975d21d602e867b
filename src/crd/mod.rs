//! Custom Resource types read and written by the shim
//!
//! Neither CRD is owned by this project: `HTTPProxy` belongs to Contour and
//! `Certificate` belongs to cert-manager. Only the fields the shim reads or
//! manages are modelled.

mod certificate;
mod http_proxy;


pub use certificate::{Certificate, CertificateSpec, IssuerRef, KeyUsage, SERVER_USAGES};
pub use http_proxy::{HttpProxySpec, TlsIntent, VirtualHost, VirtualHostTls, HTTPProxy as HttpProxy};
