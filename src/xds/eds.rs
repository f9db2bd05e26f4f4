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

use tracing::{debug, instrument, warn};

use super::metrics::{Metrics, ResourceType, ResponseLabels, ResponseOutcome, SkippedLabels};
use super::types::core::{Address, Locality, SocketAddress, socket_address};
use super::types::endpoint::{ClusterLoadAssignment, Endpoint, LbEndpoint, LocalityLbEndpoints};
use super::{Error, Resolution};
use crate::catalog::MeshCatalog;
use crate::metrics::IncrementRecorder;
use crate::state::{self, MeshService};

const ZONE: &str = "zone";
const TOTAL_WEIGHT: u32 = 100;

/// EdsGenerator builds one load assignment per requested cluster.
pub struct EdsGenerator {
    catalog: Arc<MeshCatalog>,
    metrics: Arc<Metrics>,
}

impl EdsGenerator {
    pub fn new(catalog: Arc<MeshCatalog>, metrics: Arc<Metrics>) -> Self {
        EdsGenerator { catalog, metrics }
    }

    #[instrument(name = "eds", skip_all)]
    pub fn build(&self, cluster_names: &[String]) -> Vec<ClusterLoadAssignment> {
        let mut assignments = Vec::with_capacity(cluster_names.len());
        for name in cluster_names {
            match self.resolve(name) {
                Resolution::Resolved(cla) => assignments.push(cla),
                Resolution::Skipped(e) | Resolution::Fatal(e) => {
                    warn!(cluster = %name, "skipping cluster: {e}");
                    self.metrics.increment(&SkippedLabels {
                        resource_type: ResourceType::ClusterLoadAssignment,
                        code: e.code(),
                    });
                }
            }
        }
        debug!(
            requested = cluster_names.len(),
            built = assignments.len(),
            "built load assignments"
        );
        self.metrics.increment(&ResponseLabels {
            resource_type: ResourceType::ClusterLoadAssignment,
            outcome: ResponseOutcome::Success,
        });
        assignments
    }

    fn resolve(&self, name: &str) -> Resolution<ClusterLoadAssignment> {
        let svc = match name.parse::<MeshService>() {
            Ok(svc) => svc,
            Err(_) => return Resolution::Skipped(Error::InvalidClusterName(name.to_string())),
        };
        Resolution::skip_on_err(
            self.catalog
                .list_endpoints_for_service(&svc)
                .map(|eps| load_assignment(name, &eps))
                .map_err(Error::from),
        )
    }
}

/// Spreads the total weight evenly over `endpoints` in a single locality. Envoy rejects a zero
/// endpoint weight, so large services get a weight of 1 each.
fn load_assignment(cluster_name: &str, endpoints: &[state::Endpoint]) -> ClusterLoadAssignment {
    let weight = (TOTAL_WEIGHT / (endpoints.len() as u32).max(1)).max(1);
    let lb_endpoints = endpoints
        .iter()
        .map(|ep| LbEndpoint {
            endpoint: Some(Endpoint {
                address: Some(Address {
                    socket_address: Some(SocketAddress {
                        protocol: socket_address::Protocol::Tcp as i32,
                        address: ep.ip.to_string(),
                        port_value: ep.port,
                    }),
                }),
            }),
            load_balancing_weight: Some(weight),
        })
        .collect();
    ClusterLoadAssignment {
        cluster_name: cluster_name.to_string(),
        endpoints: vec![LocalityLbEndpoints {
            locality: Some(Locality {
                zone: ZONE.to_string(),
                ..Default::default()
            }),
            lb_endpoints,
        }],
    }
}
