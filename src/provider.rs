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

//! Sources of service, endpoint and policy state. The catalog combines any number of them.

use crate::identity::ServiceIdentity;
use crate::state::{Endpoint, Locality, MeshService, PortProtocolMap, TrafficSplit, TrafficTarget};
use crate::strng::Strng;

pub mod kube;
pub mod local;

pub use kube::KubeProvider;
pub use local::{LocalConfig, LocalStore};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The provider does not know the service. Callers may ask the next provider.
    #[error("service {0} not found")]
    NotFound(MeshService),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    /// Two ports of the service deliver to the same target port with different protocols.
    #[error("service {service} maps target port {port} to both {first} and {second}")]
    ConflictingTargetPort {
        service: MeshService,
        port: u32,
        first: Strng,
        second: Strng,
    },
}

/// ServiceProvider answers questions about services from one source of truth.
pub trait ServiceProvider: Send + Sync {
    /// A short name used in logs and errors.
    fn name(&self) -> &str;

    fn list_services(&self) -> Result<Vec<MeshService>, Error>;

    /// Identities of the workloads backing `svc`.
    fn list_service_identities_for_service(
        &self,
        svc: &MeshService,
    ) -> Result<Vec<ServiceIdentity>, Error>;

    /// Application protocol of every target port of `svc`.
    fn get_target_port_to_protocol_mapping_for_service(
        &self,
        svc: &MeshService,
    ) -> Result<PortProtocolMap, Error>;

    fn get_hostnames_for_service(
        &self,
        svc: &MeshService,
        locality: Locality,
    ) -> Result<Vec<Strng>, Error>;
}

/// EndpointProvider lists the live addresses of services.
pub trait EndpointProvider: Send + Sync {
    fn name(&self) -> &str;

    fn list_endpoints_for_service(&self, svc: &MeshService) -> Result<Vec<Endpoint>, Error>;
}

/// MeshSpec is the source of traffic policy.
pub trait MeshSpec: Send + Sync {
    fn list_traffic_splits(&self) -> Result<Vec<TrafficSplit>, Error>;

    fn list_traffic_targets(&self) -> Result<Vec<TrafficTarget>, Error>;
}
