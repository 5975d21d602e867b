//! cert-manager `Certificate` (cert-manager.io/v1)
//!
//! See <https://cert-manager.io/docs/reference/api-docs/#cert-manager.io/v1.Certificate>.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Certificate",
    shortname = "cert",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,

    #[serde(default)]
    pub dns_names: Vec<String>,

    pub secret_name: String,

    pub issuer_ref: IssuerRef,

    #[serde(default)]
    pub usages: Vec<KeyUsage>,
}

/// Reference to the Issuer or ClusterIssuer that signs the certificate
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerRef {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
}

/// Key usages understood by cert-manager, serialized in their spaced form
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    #[serde(rename = "digital signature")]
    DigitalSignature,
    #[serde(rename = "key encipherment")]
    KeyEncipherment,
    #[serde(rename = "server auth")]
    ServerAuth,
    #[serde(rename = "client auth")]
    ClientAuth,
}

/// Usages requested for every certificate the shim manages
pub const SERVER_USAGES: [KeyUsage; 4] = [
    KeyUsage::DigitalSignature,
    KeyUsage::KeyEncipherment,
    KeyUsage::ServerAuth,
    KeyUsage::ClientAuth,
];
