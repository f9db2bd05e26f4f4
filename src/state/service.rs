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

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::state::ParseError;
use crate::strng::{self, Strng};

const NAMESPACE_SEPARATOR: char = '/';

pub const DEFAULT_CLUSTER_WEIGHT: u32 = 100;

/// MeshService is a service known to the mesh, identified by namespace and name.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MeshService {
    pub name: Strng,
    pub namespace: Strng,
}

impl MeshService {
    pub fn new(name: impl AsRef<str>, namespace: impl AsRef<str>) -> Self {
        MeshService {
            name: strng::new(name),
            namespace: strng::new(namespace),
        }
    }

    /// The default upstream cluster for this service: itself, with full weight.
    pub fn default_weighted_cluster(&self) -> WeightedCluster {
        WeightedCluster {
            cluster_name: strng::new(self.to_string()),
            weight: DEFAULT_CLUSTER_WEIGHT,
        }
    }
}

impl fmt::Display for MeshService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{NAMESPACE_SEPARATOR}{}", self.namespace, self.name)
    }
}

impl FromStr for MeshService {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(NAMESPACE_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(name), None) if !namespace.is_empty() && !name.is_empty() => {
                Ok(MeshService::new(name, namespace))
            }
            _ => Err(ParseError::InvalidMeshService(s.to_string())),
        }
    }
}

/// WeightedCluster is an upstream cluster with its share of the traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedCluster {
    pub cluster_name: Strng,
    pub weight: u32,
}

/// Endpoint is one live address serving a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn display_and_parse() {
        let svc = MeshService::new("bookstore", "default");
        assert_eq!(svc.to_string(), "default/bookstore");
        assert_eq!("default/bookstore".parse::<MeshService>().unwrap(), svc);
    }

    #[test_case(""; "empty")]
    #[test_case("bookstore"; "no separator")]
    #[test_case("/bookstore"; "empty namespace")]
    #[test_case("default/"; "empty name")]
    #[test_case("a/b/c"; "too many separators")]
    fn parse_invalid(input: &str) {
        assert_eq!(
            input.parse::<MeshService>(),
            Err(ParseError::InvalidMeshService(input.to_string()))
        );
    }

    #[test]
    fn default_weighted_cluster() {
        let wc = MeshService::new("bookstore", "default").default_weighted_cluster();
        assert_eq!(wc.cluster_name, "default/bookstore");
        assert_eq!(wc.weight, 100);
    }
}
