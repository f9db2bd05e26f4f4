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

//! The mesh catalog is the single view of the mesh the discovery builders query. It owns no
//! state: every answer is computed from the providers at call time.

use std::collections::BTreeSet;
use std::sync::Arc;

use itertools::Itertools;
use tracing::{debug, instrument, trace};

use crate::config;
use crate::identity::ServiceIdentity;
use crate::k8s::{self, KubeController};
use crate::provider::{self, EndpointProvider, MeshSpec, ServiceProvider};
use crate::state::{
    Endpoint, Locality, MeshService, PortProtocolMap, TrafficSplit, WeightedCluster,
};
use crate::strng::Strng;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("service {0} not found")]
    ServiceNotFound(MeshService),
    #[error("provider {provider} disagrees on the protocol of port {port} of service {service}")]
    ProviderMismatch {
        service: MeshService,
        port: u32,
        provider: String,
    },
    #[error("policy lookup failed: {0}")]
    PolicyLookupFailed(String),
}

/// MeshCatalog combines an ordered list of providers. Each query documents how provider
/// answers are combined; providers are always consulted in order.
pub struct MeshCatalog {
    kube: Arc<dyn KubeController>,
    mesh_spec: Arc<dyn MeshSpec>,
    service_providers: Vec<Arc<dyn ServiceProvider>>,
    endpoint_providers: Vec<Arc<dyn EndpointProvider>>,
    permissive_traffic_policy_mode: bool,
    default_app_protocol: Strng,
}

impl MeshCatalog {
    pub fn new(
        kube: Arc<dyn KubeController>,
        mesh_spec: Arc<dyn MeshSpec>,
        service_providers: Vec<Arc<dyn ServiceProvider>>,
        endpoint_providers: Vec<Arc<dyn EndpointProvider>>,
        cfg: &config::Config,
    ) -> Self {
        MeshCatalog {
            kube,
            mesh_spec,
            service_providers,
            endpoint_providers,
            permissive_traffic_policy_mode: cfg.permissive_traffic_policy_mode,
            default_app_protocol: cfg.default_app_protocol.clone(),
        }
    }

    /// Returns the identities of the workloads backing `svc`. The first provider with a
    /// non-empty answer wins; answers are never merged.
    #[instrument(level = "debug", skip_all, fields(%svc))]
    pub fn list_service_identities_for_service(
        &self,
        svc: &MeshService,
    ) -> Result<Vec<ServiceIdentity>, Error> {
        let mut known = false;
        for p in &self.service_providers {
            match p.list_service_identities_for_service(svc) {
                Ok(ids) if !ids.is_empty() => {
                    trace!(provider = p.name(), count = ids.len(), "found identities");
                    return Ok(ids);
                }
                Ok(_) => known = true,
                Err(provider::Error::NotFound(_)) => continue,
                Err(e) => return Err(Error::PolicyLookupFailed(e.to_string())),
            }
        }
        if known {
            Ok(Vec::new())
        } else {
            Err(Error::ServiceNotFound(svc.clone()))
        }
    }

    /// Returns the protocol of each target port of `svc`. Every provider that knows the service
    /// must report the same mapping.
    pub fn get_target_port_to_protocol_mapping_for_service(
        &self,
        svc: &MeshService,
    ) -> Result<PortProtocolMap, Error> {
        let mut agreed: Option<PortProtocolMap> = None;
        for p in &self.service_providers {
            let mapping = match p.get_target_port_to_protocol_mapping_for_service(svc) {
                Ok(m) => m,
                Err(provider::Error::NotFound(_)) => continue,
                Err(e) => return Err(Error::PolicyLookupFailed(e.to_string())),
            };
            if let Some(first) = &agreed {
                if *first != mapping {
                    let port = first
                        .keys()
                        .chain(mapping.keys())
                        .filter(|k| first.get(*k) != mapping.get(*k))
                        .min()
                        .copied()
                        .unwrap_or_default();
                    return Err(Error::ProviderMismatch {
                        service: svc.clone(),
                        port,
                        provider: p.name().to_string(),
                    });
                }
            } else {
                agreed = Some(mapping);
            }
        }
        agreed.ok_or_else(|| Error::ServiceNotFound(svc.clone()))
    }

    /// Returns the protocol of each service port of `svc`, as declared on the Kubernetes service.
    pub fn get_port_to_protocol_mapping_for_service(
        &self,
        svc: &MeshService,
    ) -> Result<PortProtocolMap, Error> {
        let ks = self
            .kube
            .get_service(svc)
            .ok_or_else(|| Error::ServiceNotFound(svc.clone()))?;
        Ok(ks
            .ports
            .iter()
            .map(|p| {
                (
                    p.port,
                    k8s::app_protocol_for_port(p, &self.default_app_protocol),
                )
            })
            .collect())
    }

    fn traffic_splits(&self) -> Result<Vec<TrafficSplit>, Error> {
        self.mesh_spec
            .list_traffic_splits()
            .map_err(|e| Error::PolicyLookupFailed(e.to_string()))
    }

    /// Returns the apex service of every traffic split that has `backend` as a backend. A split
    /// only matches backends in its own namespace.
    pub fn get_apex_services_for_backend_service(
        &self,
        backend: &MeshService,
    ) -> Result<Vec<MeshService>, Error> {
        Ok(self
            .traffic_splits()?
            .iter()
            .filter(|s| s.has_backend(backend))
            .map(TrafficSplit::apex)
            .collect())
    }

    pub fn is_traffic_split_backend_service(&self, svc: &MeshService) -> Result<bool, Error> {
        Ok(self.traffic_splits()?.iter().any(|s| s.has_backend(svc)))
    }

    /// Returns the names `svc` is reachable by from `locality`. The first provider that knows the
    /// service answers.
    pub fn get_service_hostnames(
        &self,
        svc: &MeshService,
        locality: Locality,
    ) -> Result<Vec<Strng>, Error> {
        for p in &self.service_providers {
            match p.get_hostnames_for_service(svc, locality) {
                Ok(hosts) => return Ok(hosts),
                Err(provider::Error::NotFound(_)) => continue,
                Err(e) => return Err(Error::PolicyLookupFailed(e.to_string())),
            }
        }
        Err(Error::ServiceNotFound(svc.clone()))
    }

    pub fn get_default_weighted_cluster_for_service(&self, svc: &MeshService) -> WeightedCluster {
        svc.default_weighted_cluster()
    }

    /// Returns the clusters traffic to `svc` is sent to. A split in the service's namespace with
    /// `svc` as its apex redirects traffic to its backends, in split order.
    pub fn get_weighted_clusters_for_upstream(
        &self,
        svc: &MeshService,
    ) -> Result<Vec<WeightedCluster>, Error> {
        let splits = self.traffic_splits()?;
        let split = splits
            .iter()
            .find(|s| s.namespace == svc.namespace && s.service == svc.name);
        let Some(split) = split else {
            return Ok(vec![self.get_default_weighted_cluster_for_service(svc)]);
        };
        debug!(%svc, split = %split.name, "upstream is a traffic split apex");
        Ok(split
            .backends
            .iter()
            .map(|b| WeightedCluster {
                cluster_name: MeshService::new(&b.service, &split.namespace)
                    .default_weighted_cluster()
                    .cluster_name,
                weight: b.weight,
            })
            .collect())
    }

    /// Concatenates the services of every provider, in provider order. Duplicates are kept.
    pub fn list_mesh_services(&self) -> Result<Vec<MeshService>, Error> {
        let mut services = Vec::new();
        for p in &self.service_providers {
            services.extend(
                p.list_services()
                    .map_err(|e| Error::PolicyLookupFailed(e.to_string()))?,
            );
        }
        Ok(services)
    }

    /// Returns the identities allowed to connect to workloads running as `identity`, sorted and
    /// without duplicates. In permissive mode every known service account is allowed.
    #[instrument(level = "debug", skip_all, fields(%identity))]
    pub fn list_inbound_service_identities(
        &self,
        identity: &ServiceIdentity,
    ) -> Result<Vec<ServiceIdentity>, Error> {
        if self.permissive_traffic_policy_mode {
            return Ok(self
                .kube
                .list_service_accounts()
                .iter()
                .map(|sa| sa.to_service_identity())
                .sorted()
                .dedup()
                .collect());
        }
        let destination = identity
            .to_k8s_service_account()
            .map_err(|e| Error::PolicyLookupFailed(e.to_string()))?;
        let targets = self
            .mesh_spec
            .list_traffic_targets()
            .map_err(|e| Error::PolicyLookupFailed(e.to_string()))?;
        let allowed: BTreeSet<ServiceIdentity> = targets
            .iter()
            .filter(|t| t.destination == destination)
            .flat_map(|t| t.sources.iter().map(|sa| sa.to_service_identity()))
            .collect();
        Ok(allowed.into_iter().collect())
    }

    /// Concatenates the endpoints of every provider that knows `svc`, in provider order.
    pub fn list_endpoints_for_service(&self, svc: &MeshService) -> Result<Vec<Endpoint>, Error> {
        let mut endpoints = Vec::new();
        for p in &self.endpoint_providers {
            match p.list_endpoints_for_service(svc) {
                Ok(eps) => endpoints.extend(eps),
                Err(provider::Error::NotFound(_)) => continue,
                Err(e) => return Err(Error::PolicyLookupFailed(e.to_string())),
            }
        }
        Ok(endpoints)
    }
}
