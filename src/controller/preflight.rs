//! Startup checks that the CRDs the shim reads and writes are installed

use kube::Client;
use tracing::info;

use crate::error::{Error, Result};
use crate::probes::Readiness;

/// `(apiVersion, kind)` pairs that must be served before the controller starts
pub const REQUIRED_CRDS: [(&str, &str); 2] = [
    ("projectcontour.io/v1", "HTTPProxy"),
    ("cert-manager.io/v1", "Certificate"),
];

/// Fail unless the API server serves `kind` in `api_version`
pub async fn ensure_crd_exists(client: &Client, api_version: &str, kind: &str) -> Result<()> {
    let not_installed = || Error::CrdNotInstalled {
        api_version: api_version.to_string(),
        kind: kind.to_string(),
    };

    let resources = match client.list_api_group_resources(api_version).await {
        Ok(resources) => resources,
        Err(kube::Error::Api(resp)) if resp.code == 404 => return Err(not_installed()),
        Err(e) => return Err(Error::KubeError(e)),
    };

    if resources.resources.iter().any(|r| r.kind == kind) {
        info!("{} {} CRD is available", api_version, kind);
        Ok(())
    } else {
        Err(not_installed())
    }
}

/// Check every entry of [`REQUIRED_CRDS`]
pub async fn ensure_required_crds(client: &Client) -> Result<()> {
    for (api_version, kind) in REQUIRED_CRDS {
        ensure_crd_exists(client, api_version, kind).await?;
    }
    Ok(())
}

/// Run the CRD checks and report ready once they pass.
///
/// Readiness does not depend on leadership: standby replicas are ready too.
pub async fn preflight(client: &Client, readiness: &Readiness) -> Result<()> {
    ensure_required_crds(client).await?;
    readiness.set_ready(true);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Certificate, HttpProxy};
    use kube::Resource;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> Client {
        let config = kube::Config::new(server.uri().parse().unwrap());
        Client::try_from(config).unwrap()
    }

    fn resource_list(group_version: &str, kind: &str, plural: &str) -> serde_json::Value {
        json!({
            "kind": "APIResourceList",
            "apiVersion": "v1",
            "groupVersion": group_version,
            "resources": [{
                "name": plural,
                "singularName": kind.to_lowercase(),
                "namespaced": true,
                "kind": kind,
                "verbs": ["get", "list", "watch", "patch"]
            }]
        })
    }

    #[test]
    fn test_required_crds_match_resource_types() {
        assert_eq!(
            REQUIRED_CRDS[0],
            (&*HttpProxy::api_version(&()), &*HttpProxy::kind(&()))
        );
        assert_eq!(
            REQUIRED_CRDS[1],
            (&*Certificate::api_version(&()), &*Certificate::kind(&()))
        );
    }

    #[tokio::test]
    async fn test_all_crds_installed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apis/projectcontour.io/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(resource_list(
                "projectcontour.io/v1",
                "HTTPProxy",
                "httpproxies",
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/apis/cert-manager.io/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(resource_list(
                "cert-manager.io/v1",
                "Certificate",
                "certificates",
            )))
            .mount(&server)
            .await;

        ensure_required_crds(&client_for(&server)).await.unwrap();
    }

    #[tokio::test]
    async fn test_preflight_marks_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apis/projectcontour.io/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(resource_list(
                "projectcontour.io/v1",
                "HTTPProxy",
                "httpproxies",
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/apis/cert-manager.io/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(resource_list(
                "cert-manager.io/v1",
                "Certificate",
                "certificates",
            )))
            .mount(&server)
            .await;

        let readiness = Readiness::default();
        preflight(&client_for(&server), &readiness).await.unwrap();
        assert!(readiness.is_ready());
    }

    #[tokio::test]
    async fn test_preflight_failure_stays_unready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apis/projectcontour.io/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(resource_list(
                "projectcontour.io/v1",
                "HTTPProxy",
                "httpproxies",
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/apis/cert-manager.io/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(resource_list(
                "cert-manager.io/v1",
                "Issuer",
                "issuers",
            )))
            .mount(&server)
            .await;

        let readiness = Readiness::default();
        let err = preflight(&client_for(&server), &readiness).await.unwrap_err();
        assert!(matches!(err, Error::CrdNotInstalled { .. }));
        assert!(!readiness.is_ready());
    }

    #[tokio::test]
    async fn test_group_served_without_kind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apis/cert-manager.io/v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(resource_list(
                "cert-manager.io/v1",
                "Issuer",
                "issuers",
            )))
            .mount(&server)
            .await;

        let err = ensure_crd_exists(&client_for(&server), "cert-manager.io/v1", "Certificate")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CrdNotInstalled { ref kind, .. } if kind == "Certificate"));
    }

    #[tokio::test]
    async fn test_group_not_served() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/apis/projectcontour.io/v1"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "kind": "Status",
                "apiVersion": "v1",
                "status": "Failure",
                "message": "the server could not find the requested resource",
                "reason": "NotFound",
                "code": 404
            })))
            .mount(&server)
            .await;

        let err = ensure_crd_exists(&client_for(&server), "projectcontour.io/v1", "HTTPProxy")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CrdNotInstalled { .. }));
    }
}
