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

use std::collections::BTreeSet;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use tracing::trace;

use super::{EndpointProvider, Error, ServiceProvider};
use crate::identity::ServiceIdentity;
use crate::k8s::{self, KubeController, KubeService};
use crate::state::{Endpoint, Locality, MeshService, PortProtocolMap};
use crate::strng::Strng;

const PROVIDER_NAME: &str = "kubernetes";

/// KubeProvider answers service and endpoint queries from Kubernetes services and the pods
/// their selectors match.
#[derive(Clone)]
pub struct KubeProvider {
    kube: Arc<dyn KubeController>,
    default_app_protocol: Strng,
}

impl KubeProvider {
    pub fn new(kube: Arc<dyn KubeController>, default_app_protocol: Strng) -> Self {
        KubeProvider {
            kube,
            default_app_protocol,
        }
    }

    fn service(&self, svc: &MeshService) -> Result<KubeService, Error> {
        self.kube
            .get_service(svc)
            .ok_or_else(|| Error::NotFound(svc.clone()))
    }
}

impl ServiceProvider for KubeProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn list_services(&self) -> Result<Vec<MeshService>, Error> {
        Ok(self
            .kube
            .list_services()
            .iter()
            .map(KubeService::mesh_service)
            .collect())
    }

    fn list_service_identities_for_service(
        &self,
        svc: &MeshService,
    ) -> Result<Vec<ServiceIdentity>, Error> {
        let ks = self.service(svc)?;
        let identities: BTreeSet<ServiceIdentity> = self
            .kube
            .list_pods()
            .iter()
            .filter(|p| ks.selects(p))
            .map(|p| p.service_account().to_service_identity())
            .collect();
        trace!(%svc, count = identities.len(), "resolved service identities");
        Ok(identities.into_iter().collect())
    }

    fn get_target_port_to_protocol_mapping_for_service(
        &self,
        svc: &MeshService,
    ) -> Result<PortProtocolMap, Error> {
        let ks = self.service(svc)?;
        let mut mapping = PortProtocolMap::new();
        for p in &ks.ports {
            let port = p.target_port();
            let protocol = k8s::app_protocol_for_port(p, &self.default_app_protocol);
            match mapping.entry(port) {
                Entry::Vacant(e) => {
                    e.insert(protocol);
                }
                Entry::Occupied(e) if *e.get() == protocol => {}
                Entry::Occupied(e) => {
                    return Err(Error::ConflictingTargetPort {
                        service: svc.clone(),
                        port,
                        first: e.get().clone(),
                        second: protocol,
                    });
                }
            }
        }
        Ok(mapping)
    }

    fn get_hostnames_for_service(
        &self,
        svc: &MeshService,
        locality: Locality,
    ) -> Result<Vec<Strng>, Error> {
        let ks = self.service(svc)?;
        Ok(k8s::hostnames_for_service(&ks, locality))
    }
}

impl EndpointProvider for KubeProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn list_endpoints_for_service(&self, svc: &MeshService) -> Result<Vec<Endpoint>, Error> {
        let ks = self.service(svc)?;
        let pods = self.kube.list_pods();
        let endpoints = pods
            .iter()
            .filter(|p| ks.selects(p))
            .filter_map(|p| p.ip)
            .flat_map(|ip| {
                ks.ports.iter().map(move |port| Endpoint {
                    ip,
                    port: port.target_port(),
                })
            })
            .collect();
        Ok(endpoints)
    }
}
