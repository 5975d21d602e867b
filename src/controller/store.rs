//! Access to the Kubernetes API server as the shared object store
//!
//! The reconciler only needs three operations, so they sit behind the
//! `ObjectStore` trait; `KubeStore` is the production implementation.

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Event;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{
    api::{Api, ObjectMeta, Patch, PatchParams, PostParams},
    Client, Resource, ResourceExt,
};
use tracing::{debug, instrument};

use crate::crd::{Certificate, HttpProxy};
use crate::error::{Error, Result};

/// Field manager identity used for every server-side apply
pub const FIELD_MANAGER: &str = "cert-manager-httpproxy-shim";

/// Component name reported on emitted events
pub const EVENT_COMPONENT: &str = "cert-manager-contour-httpproxy";

/// Namespace/name identity of an HTTPProxy and of its Certificate
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an object delivered by the watch
    pub fn from_resource<K: Resource>(obj: &K) -> Result<Self> {
        let meta = obj.meta();
        let namespace = meta
            .namespace
            .clone()
            .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
        let name = meta
            .name
            .clone()
            .ok_or(Error::MissingObjectKey("metadata.name"))?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kubernetes event type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Warning,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Warning => "Warning",
        }
    }
}

/// An event to record against a proxy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyEvent {
    pub type_: EventType,
    pub reason: String,
    pub message: String,
}

impl ProxyEvent {
    pub fn warning(reason: &str, message: impl Into<String>) -> Self {
        Self {
            type_: EventType::Warning,
            reason: reason.to_string(),
            message: message.into(),
        }
    }
}

/// Operations the reconciler performs against the shared store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a proxy, `None` when it does not exist
    async fn get_proxy(&self, key: &ObjectKey) -> Result<Option<HttpProxy>>;

    /// Server-side apply the Certificate, taking ownership of conflicting fields
    async fn apply_certificate(&self, certificate: &Certificate) -> Result<()>;

    /// Record a Kubernetes event on the proxy
    async fn record_event(&self, proxy: &HttpProxy, event: &ProxyEvent) -> Result<()>;
}

/// `ObjectStore` backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    dry_run: bool,
}

impl KubeStore {
    pub fn new(client: Client, dry_run: bool) -> Self {
        Self { client, dry_run }
    }

    fn apply_params(&self) -> PatchParams {
        let params = PatchParams::apply(FIELD_MANAGER).force();
        if self.dry_run {
            params.dry_run()
        } else {
            params
        }
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    #[instrument(skip(self, key), fields(key = %key))]
    async fn get_proxy(&self, key: &ObjectKey) -> Result<Option<HttpProxy>> {
        let api: Api<HttpProxy> = Api::namespaced(self.client.clone(), &key.namespace);
        api.get_opt(&key.name).await.map_err(Error::KubeError)
    }

    #[instrument(skip(self, certificate), fields(name = %certificate.name_any(), namespace = certificate.namespace()))]
    async fn apply_certificate(&self, certificate: &Certificate) -> Result<()> {
        let namespace = certificate
            .namespace()
            .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
        let api: Api<Certificate> = Api::namespaced(self.client.clone(), &namespace);

        api.patch(
            &certificate.name_any(),
            &self.apply_params(),
            &Patch::Apply(certificate),
        )
        .await
        .map_err(Error::KubeError)?;

        debug!(dry_run = self.dry_run, "Certificate applied");
        Ok(())
    }

    async fn record_event(&self, proxy: &HttpProxy, event: &ProxyEvent) -> Result<()> {
        let namespace = proxy
            .namespace()
            .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
        let events: Api<Event> = Api::namespaced(self.client.clone(), &namespace);

        let time = chrono::Utc::now();
        let event = Event {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}-", proxy.name_any())),
                ..Default::default()
            },
            type_: Some(event.type_.as_str().to_string()),
            reason: Some(event.reason.clone()),
            message: Some(event.message.clone()),
            involved_object: proxy.object_ref(&()),
            source: Some(k8s_openapi::api::core::v1::EventSource {
                component: Some(EVENT_COMPONENT.to_string()),
                ..Default::default()
            }),
            first_timestamp: Some(Time(time)),
            last_timestamp: Some(Time(time)),
            count: Some(1),
            ..Default::default()
        };

        events
            .create(&PostParams::default(), &event)
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{CertificateSpec, HttpProxySpec, IssuerRef, SERVER_USAGES};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store_for(server: &MockServer, dry_run: bool) -> KubeStore {
        let config = kube::Config::new(server.uri().parse().unwrap());
        let client = Client::try_from(config).unwrap();
        KubeStore::new(client, dry_run)
    }

    fn certificate() -> Certificate {
        let mut cert = Certificate::new(
            "web",
            CertificateSpec {
                common_name: Some("web.example.com".to_string()),
                dns_names: vec!["web.example.com".to_string()],
                secret_name: "web-tls".to_string(),
                issuer_ref: IssuerRef {
                    name: "my-issuer".to_string(),
                    kind: "Issuer".to_string(),
                    group: "cert-manager.io".to_string(),
                },
                usages: SERVER_USAGES.to_vec(),
            },
        );
        cert.metadata.namespace = Some("ns".to_string());
        cert
    }

    fn not_found() -> serde_json::Value {
        json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": "httpproxies.projectcontour.io \"web\" not found",
            "reason": "NotFound",
            "code": 404
        })
    }

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::new("ns", "web").to_string(), "ns/web");
    }

    #[test]
    fn test_object_key_from_resource() {
        let proxy = HttpProxy::new("web", HttpProxySpec::default());
        assert!(matches!(
            ObjectKey::from_resource(&proxy),
            Err(Error::MissingObjectKey("metadata.namespace"))
        ));

        let mut proxy = proxy;
        proxy.metadata.namespace = Some("ns".to_string());
        assert_eq!(
            ObjectKey::from_resource(&proxy).unwrap(),
            ObjectKey::new("ns", "web")
        );
    }

    #[tokio::test]
    async fn test_get_proxy_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apis/projectcontour.io/v1/namespaces/ns/httpproxies/web"))
            .respond_with(ResponseTemplate::new(404).set_body_json(not_found()))
            .mount(&server)
            .await;

        let store = store_for(&server, false).await;
        let proxy = store.get_proxy(&ObjectKey::new("ns", "web")).await.unwrap();
        assert!(proxy.is_none());
    }

    #[tokio::test]
    async fn test_get_proxy_server_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apis/projectcontour.io/v1/namespaces/ns/httpproxies/web"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "kind": "Status",
                "apiVersion": "v1",
                "status": "Failure",
                "message": "etcdserver: request timed out",
                "reason": "InternalError",
                "code": 500
            })))
            .mount(&server)
            .await;

        let store = store_for(&server, false).await;
        let err = store
            .get_proxy(&ObjectKey::new("ns", "web"))
            .await
            .unwrap_err();
        match err {
            Error::KubeError(kube::Error::Api(resp)) => assert_eq!(resp.code, 500),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_apply_certificate_uses_forced_server_side_apply() {
        let server = MockServer::start().await;
        let cert = certificate();
        Mock::given(method("PATCH"))
            .and(path("/apis/cert-manager.io/v1/namespaces/ns/certificates/web"))
            .and(query_param("fieldManager", FIELD_MANAGER))
            .and(query_param("force", "true"))
            .and(header("content-type", "application/apply-patch+yaml"))
            .and(body_partial_json(json!({
                "apiVersion": "cert-manager.io/v1",
                "kind": "Certificate",
                "spec": { "secretName": "web-tls" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&cert))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server, false).await;
        store.apply_certificate(&cert).await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_certificate_dry_run() {
        let server = MockServer::start().await;
        let cert = certificate();
        Mock::given(method("PATCH"))
            .and(path("/apis/cert-manager.io/v1/namespaces/ns/certificates/web"))
            .and(query_param("dryRun", "All"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&cert))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server, true).await;
        store.apply_certificate(&cert).await.unwrap();
    }

    #[tokio::test]
    async fn test_record_event_targets_proxy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/namespaces/ns/events"))
            .and(body_partial_json(json!({
                "type": "Warning",
                "reason": "CertificateApplyFailed",
                "involvedObject": { "kind": "HTTPProxy", "name": "web", "namespace": "ns" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "Event",
                "metadata": { "name": "web-abcde", "namespace": "ns" },
                "involvedObject": { "kind": "HTTPProxy", "name": "web", "namespace": "ns" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut proxy = HttpProxy::new("web", HttpProxySpec::default());
        proxy.metadata.namespace = Some("ns".to_string());

        let store = store_for(&server, false).await;
        store
            .record_event(
                &proxy,
                &ProxyEvent::warning("CertificateApplyFailed", "apply failed"),
            )
            .await
            .unwrap();
    }
}
