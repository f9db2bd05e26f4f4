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

//! Value types shared by providers, the catalog and the discovery builders. All of them are
//! projections recomputed per query; nothing here is cached.

use std::collections::BTreeMap;

use crate::strng::Strng;

pub mod policy;
pub mod service;

pub use policy::*;
pub use service::*;

/// PortProtocolMap maps a target port to its application protocol. Ordered so two maps compare
/// and display deterministically.
pub type PortProtocolMap = BTreeMap<u32, Strng>;

/// Locality is where a client is relative to a service; it decides which hostnames are usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locality {
    /// Same namespace: the bare service name resolves.
    LocalNS,
    /// Same cluster, other namespace.
    LocalCluster,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid service name {0:?}: expected <namespace>/<name>")]
    InvalidMeshService(String),
}
