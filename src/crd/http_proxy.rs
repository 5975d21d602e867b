//! Contour `HTTPProxy` (projectcontour.io/v1)
//!
//! See <https://projectcontour.io/docs/main/config/api/#projectcontour.io/v1.HTTPProxy>.
//! Routes, includes and TCP proxying are left out; serde ignores them on decode.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::controller::SkipReason;

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "projectcontour.io",
    version = "v1",
    kind = "HTTPProxy",
    plural = "httpproxies",
    shortname = "proxy",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct HttpProxySpec {
    /// Root proxies declare the virtual host they serve
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtualhost: Option<VirtualHost>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualHost {
    #[serde(default)]
    pub fqdn: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<VirtualHostTls>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualHostTls {
    #[serde(default)]
    pub secret_name: String,
}

/// Hostname and secret of a proxy that has opted into TLS termination
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TlsIntent<'a> {
    pub fqdn: &'a str,
    pub secret_name: &'a str,
}

impl HttpProxySpec {
    /// Check, in order, that the virtual host, its fqdn, its TLS block and
    /// the TLS secret name are all set.
    pub fn tls_intent(&self) -> Result<TlsIntent<'_>, SkipReason> {
        let virtualhost = self.virtualhost.as_ref().ok_or(SkipReason::NoVirtualHost)?;
        if virtualhost.fqdn.is_empty() {
            return Err(SkipReason::EmptyFqdn);
        }
        let tls = virtualhost.tls.as_ref().ok_or(SkipReason::NoTls)?;
        if tls.secret_name.is_empty() {
            return Err(SkipReason::EmptySecretName);
        }

        Ok(TlsIntent {
            fqdn: &virtualhost.fqdn,
            secret_name: &tls.secret_name,
        })
    }
}
