// Copyright Istio Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use prost::Message;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::catalog::MeshCatalog;
use crate::identity::{CertManager, CertificateProvider};
use crate::metrics::Metrics;
use crate::provider::{EndpointProvider, KubeProvider, LocalStore, ServiceProvider};
use crate::xds::types::endpoint::ClusterLoadAssignment;
use crate::xds::types::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use crate::xds::types::tls::Secret;
use crate::xds::types::{self, CLUSTER_LOAD_ASSIGNMENT_TYPE, SECRET_TYPE};
use crate::xds::{EdsGenerator, Proxy, SdsGenerator};
use crate::config;

/// Builds the control plane from `config`, reading cluster state from the configured local file
/// and signing with the configured (or a freshly generated) root.
pub async fn build(config: Arc<config::Config>) -> anyhow::Result<Bound> {
    let store = match &config.local_config {
        Some(path) => LocalStore::from_file(path)
            .await
            .with_context(|| format!("local config {} loads", path.display()))?,
        None => {
            warn!("no local config configured, serving an empty mesh");
            LocalStore::default()
        }
    };
    let mut registry = Registry::default();
    let metrics = Metrics::from(&mut registry);
    let cert_manager = CertManager::from_config(&config.ca, metrics.identity.clone())
        .context("certificate authority loads")?;
    Ok(build_with_cert(
        config,
        Arc::new(store),
        Arc::new(cert_manager),
        registry,
        metrics,
    ))
}

/// Wires a catalog over `store` and the discovery generators around `cert_manager`.
pub fn build_with_cert(
    config: Arc<config::Config>,
    store: Arc<LocalStore>,
    cert_manager: Arc<dyn CertificateProvider>,
    registry: Registry,
    metrics: Metrics,
) -> Bound {
    let kube = Arc::new(KubeProvider::new(
        store.clone(),
        config.default_app_protocol.clone(),
    ));
    let catalog = Arc::new(MeshCatalog::new(
        store.clone(),
        store,
        vec![kube.clone() as Arc<dyn ServiceProvider>],
        vec![kube as Arc<dyn EndpointProvider>],
        &config,
    ));
    let sds = SdsGenerator::new(
        catalog.clone(),
        cert_manager,
        config.clone(),
        metrics.xds.clone(),
    );
    let eds = EdsGenerator::new(catalog.clone(), metrics.xds.clone());
    Bound {
        catalog,
        sds,
        eds,
        registry,
        version: AtomicU64::new(0),
    }
}

pub struct Bound {
    pub catalog: Arc<MeshCatalog>,
    sds: SdsGenerator,
    eds: EdsGenerator,
    registry: Registry,
    version: AtomicU64,
}

impl Bound {
    /// Answers one discovery request from `proxy`, dispatching on the requested type.
    #[instrument(skip_all, fields(type_url = %req.type_url))]
    pub async fn respond(
        &self,
        proxy: &Proxy,
        req: &DiscoveryRequest,
        cancel: &CancellationToken,
    ) -> anyhow::Result<DiscoveryResponse> {
        let resources = match req.type_url.as_str() {
            t if t == SECRET_TYPE.as_str() => self
                .sds
                .build(proxy, &req.resource_names, cancel)
                .await?
                .iter()
                .map(|s| types::to_any(&SECRET_TYPE, s))
                .collect(),
            t if t == CLUSTER_LOAD_ASSIGNMENT_TYPE.as_str() => self
                .eds
                .build(&req.resource_names)
                .iter()
                .map(|c| types::to_any(&CLUSTER_LOAD_ASSIGNMENT_TYPE, c))
                .collect(),
            other => anyhow::bail!("unsupported resource type {other:?}"),
        };
        let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(DiscoveryResponse {
            version_info: version.to_string(),
            resources,
            type_url: req.type_url.clone(),
            nonce: uuid::Uuid::new_v4().to_string(),
        })
    }

    /// Returns the current metrics in the Prometheus text format.
    pub fn encode_metrics(&self) -> anyhow::Result<String> {
        let mut out = String::new();
        encode(&mut out, &self.registry)?;
        Ok(out)
    }
}

/// RenderRequest is the input of the `render` command: a proxy and the requests it sends.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RenderRequest {
    pub proxy: Proxy,
    #[serde(default)]
    pub requests: Vec<DiscoveryRequest>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderedResponse {
    type_url: String,
    version_info: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    secrets: Vec<Secret>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cluster_load_assignments: Vec<ClusterLoadAssignment>,
}

/// Answers every request in `input` and renders the responses as YAML. Private keys are never
/// rendered.
pub async fn render(bound: &Bound, input: &RenderRequest) -> anyhow::Result<String> {
    let cancel = CancellationToken::new();
    let mut rendered = Vec::with_capacity(input.requests.len());
    for req in &input.requests {
        let resp = bound.respond(&input.proxy, req, &cancel).await?;
        rendered.push(decode(&resp)?);
    }
    info!(responses = rendered.len(), "rendered");
    Ok(serde_yaml::to_string(&rendered)?)
}

fn decode(resp: &DiscoveryResponse) -> anyhow::Result<RenderedResponse> {
    let mut out = RenderedResponse {
        type_url: resp.type_url.clone(),
        version_info: resp.version_info.clone(),
        secrets: Vec::new(),
        cluster_load_assignments: Vec::new(),
    };
    for any in &resp.resources {
        match any.type_url.as_str() {
            t if t == SECRET_TYPE.as_str() => out.secrets.push(Secret::decode(any.value.as_slice())?),
            t if t == CLUSTER_LOAD_ASSIGNMENT_TYPE.as_str() => out
                .cluster_load_assignments
                .push(ClusterLoadAssignment::decode(any.value.as_slice())?),
            other => anyhow::bail!("cannot render resource type {other:?}"),
        }
    }
    Ok(out)
}
