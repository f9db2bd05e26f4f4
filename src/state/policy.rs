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

use crate::identity::K8sServiceAccount;
use crate::state::MeshService;
use crate::strng::Strng;

/// TrafficSplit routes requests addressed to an apex service across weighted backends.
/// Backend names are resolved in the namespace of the split itself.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrafficSplit {
    pub name: Strng,
    pub namespace: Strng,
    /// Name of the apex service. Clients address this one.
    pub service: Strng,
    #[serde(default)]
    pub backends: Vec<TrafficSplitBackend>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrafficSplitBackend {
    pub service: Strng,
    pub weight: u32,
}

impl TrafficSplit {
    pub fn apex(&self) -> MeshService {
        MeshService::new(&self.service, &self.namespace)
    }

    /// Whether `svc` is one of the backends. The backend must live in the split's namespace.
    pub fn has_backend(&self, svc: &MeshService) -> bool {
        self.namespace == svc.namespace && self.backends.iter().any(|b| b.service == svc.name)
    }
}

/// TrafficTarget allows the `sources` to connect to workloads running as `destination`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrafficTarget {
    pub name: Strng,
    pub namespace: Strng,
    pub destination: K8sServiceAccount,
    #[serde(default)]
    pub sources: Vec<K8sServiceAccount>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strng;

    fn split() -> TrafficSplit {
        TrafficSplit {
            name: strng::literal!("bookstore-split"),
            namespace: strng::literal!("default"),
            service: strng::literal!("bookstore-apex"),
            backends: vec![
                TrafficSplitBackend {
                    service: strng::literal!("bookstore-v1"),
                    weight: 90,
                },
                TrafficSplitBackend {
                    service: strng::literal!("bookstore-v2"),
                    weight: 10,
                },
            ],
        }
    }

    #[test]
    fn backend_matching_is_namespaced() {
        let s = split();
        assert!(s.has_backend(&MeshService::new("bookstore-v1", "default")));
        assert!(!s.has_backend(&MeshService::new("bookstore-v1", "bar")));
        assert!(!s.has_backend(&MeshService::new("bookstore-v3", "default")));
        assert_eq!(s.apex(), MeshService::new("bookstore-apex", "default"));
    }

    #[test]
    fn deserialize() {
        let yaml = r#"
name: split
namespace: default
service: apex
backends:
- service: v1
  weight: 100
"#;
        let s: TrafficSplit = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(s.backends.len(), 1);
        assert_eq!(s.backends[0].weight, 100);
    }
}
