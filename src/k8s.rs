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

//! Kubernetes shaped descriptors and the narrow controller interface the mesh reads them
//! through. Watching and caching the API server is left to the controller implementation.

use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::identity::K8sServiceAccount;
use crate::state::{Locality, MeshService};
use crate::strng::{self, Strng};

const PROTOCOL_HTTP: &str = "http";
const PROTOCOL_TCP: &str = "tcp";
const PROTOCOL_GRPC: &str = "grpc";

/// Port name prefixes that declare a protocol, in match order.
const PORT_NAME_PROTOCOLS: [&str; 3] = [PROTOCOL_HTTP, PROTOCOL_TCP, PROTOCOL_GRPC];

const CLUSTER_DOMAIN: &str = "cluster.local";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KubeService {
    pub name: Strng,
    pub namespace: Strng,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    /// Pods carrying all of these labels back the service. An empty selector selects nothing.
    #[serde(default)]
    pub selector: BTreeMap<Strng, Strng>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServicePort {
    #[serde(default)]
    pub name: Strng,
    pub port: u32,
    #[serde(default)]
    pub target_port: Option<u32>,
    /// Transport protocol as declared on the port: TCP, UDP or SCTP.
    #[serde(default)]
    pub protocol: Option<Strng>,
    #[serde(default)]
    pub app_protocol: Option<Strng>,
}

impl ServicePort {
    /// The port on the pod traffic is delivered to. Defaults to the service port.
    pub fn target_port(&self) -> u32 {
        self.target_port.unwrap_or(self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Pod {
    pub name: Strng,
    pub namespace: Strng,
    #[serde(default)]
    pub labels: BTreeMap<Strng, Strng>,
    #[serde(default = "default_service_account")]
    pub service_account: Strng,
    /// Unset until the pod is scheduled.
    #[serde(default)]
    pub ip: Option<IpAddr>,
}

fn default_service_account() -> Strng {
    strng::literal!("default")
}

impl Pod {
    pub fn service_account(&self) -> K8sServiceAccount {
        K8sServiceAccount::new(&self.service_account, &self.namespace)
    }
}

impl KubeService {
    pub fn mesh_service(&self) -> MeshService {
        MeshService::new(&self.name, &self.namespace)
    }

    pub fn selects(&self, pod: &Pod) -> bool {
        pod.namespace == self.namespace
            && !self.selector.is_empty()
            && self
                .selector
                .iter()
                .all(|(k, v)| pod.labels.get(k) == Some(v))
    }
}

/// KubeController is the read side of the Kubernetes API the mesh depends on.
pub trait KubeController: Send + Sync {
    fn get_service(&self, svc: &MeshService) -> Option<KubeService>;
    fn list_services(&self) -> Vec<KubeService>;
    fn list_pods(&self) -> Vec<Pod>;
    fn list_service_accounts(&self) -> Vec<K8sServiceAccount>;
}

/// Returns every name `svc` can be reached by from `locality`. The bare name only resolves
/// within the service's own namespace. Each name is listed once without a port and then once
/// per service port.
pub fn hostnames_for_service(svc: &KubeService, locality: Locality) -> Vec<Strng> {
    let name = &svc.name;
    let ns = &svc.namespace;
    let mut hosts = Vec::with_capacity(5);
    if locality == Locality::LocalNS {
        hosts.push(name.to_string());
    }
    hosts.push(format!("{name}.{ns}"));
    hosts.push(format!("{name}.{ns}.svc"));
    hosts.push(format!("{name}.{ns}.svc.cluster"));
    hosts.push(format!("{name}.{ns}.svc.{CLUSTER_DOMAIN}"));

    let with_ports = svc
        .ports
        .iter()
        .flat_map(|p| hosts.iter().map(move |h| format!("{h}:{}", p.port)))
        .collect::<Vec<_>>();
    hosts
        .into_iter()
        .chain(with_ports)
        .map(strng::new)
        .collect()
}

/// Determines the application protocol of a port. In order of precedence:
/// 1. `appProtocol`
/// 2. the declared transport protocol, unless it is TCP which the API server fills in by default
/// 3. a `http`, `tcp` or `grpc` port name prefix, case-insensitive
/// 4. `default`
pub fn app_protocol_for_port(port: &ServicePort, default: &Strng) -> Strng {
    if let Some(app_protocol) = port.app_protocol.as_ref().filter(|p| !p.is_empty()) {
        return app_protocol.clone();
    }
    if let Some(protocol) = port.protocol.as_ref().filter(|p| !p.is_empty()) {
        if !protocol.eq_ignore_ascii_case("TCP") {
            return strng::new(protocol.to_ascii_lowercase());
        }
    }
    let name = port.name.to_ascii_lowercase();
    PORT_NAME_PROTOCOLS
        .iter()
        .find(|p| name.starts_with(**p))
        .map(strng::new)
        .unwrap_or_else(|| default.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn port(
        name: &str,
        protocol: Option<&str>,
        app_protocol: Option<&str>,
    ) -> ServicePort {
        ServicePort {
            name: strng::new(name),
            port: 80,
            target_port: None,
            protocol: protocol.map(strng::new),
            app_protocol: app_protocol.map(strng::new),
        }
    }

    #[test_case(port("", None, Some("tcp")), "tcp"; "app protocol wins")]
    #[test_case(port("http-web", Some("UDP"), Some("grpc")), "grpc"; "app protocol over everything")]
    #[test_case(port("http-web", Some("UDP"), None), "udp"; "declared protocol over name")]
    #[test_case(port("tcp-db", Some("TCP"), None), "tcp"; "default tcp does not shadow name")]
    #[test_case(port("GRPC-api", None, None), "grpc"; "name prefix is case insensitive")]
    #[test_case(port("http2", None, None), "http"; "name prefix")]
    #[test_case(port("web", Some("TCP"), None), "http"; "fallback to default")]
    #[test_case(port("", None, Some("")), "http"; "empty app protocol ignored")]
    fn protocol_precedence(p: ServicePort, expected: &str) {
        assert_eq!(app_protocol_for_port(&p, &strng::literal!("http")), expected);
    }

    #[test]
    fn default_is_configurable() {
        let p = port("web", None, None);
        assert_eq!(app_protocol_for_port(&p, &strng::literal!("tcp")), "tcp");
    }

    fn svc(ports: &[u32]) -> KubeService {
        KubeService {
            name: strng::literal!("bookstore"),
            namespace: strng::literal!("default"),
            ports: ports
                .iter()
                .map(|p| ServicePort {
                    name: strng::EMPTY,
                    port: *p,
                    target_port: None,
                    protocol: None,
                    app_protocol: None,
                })
                .collect(),
            selector: BTreeMap::new(),
        }
    }

    #[test]
    fn hostnames_local_namespace() {
        let hosts = hostnames_for_service(&svc(&[8888]), Locality::LocalNS);
        assert_eq!(
            hosts,
            vec![
                "bookstore",
                "bookstore.default",
                "bookstore.default.svc",
                "bookstore.default.svc.cluster",
                "bookstore.default.svc.cluster.local",
                "bookstore:8888",
                "bookstore.default:8888",
                "bookstore.default.svc:8888",
                "bookstore.default.svc.cluster:8888",
                "bookstore.default.svc.cluster.local:8888",
            ]
        );
    }

    #[test]
    fn hostnames_local_cluster() {
        let hosts = hostnames_for_service(&svc(&[80, 90]), Locality::LocalCluster);
        assert_eq!(hosts.len(), 12);
        assert!(!hosts.iter().any(|h| h == "bookstore" || h == "bookstore:80"));
        assert_eq!(hosts[0], "bookstore.default");
        assert_eq!(hosts[4], "bookstore.default:80");
        assert_eq!(hosts[8], "bookstore.default:90");
    }

    #[test]
    fn empty_selector_selects_nothing() {
        let s = svc(&[80]);
        let pod = Pod {
            name: strng::literal!("bookstore-1"),
            namespace: strng::literal!("default"),
            labels: BTreeMap::from([(strng::literal!("app"), strng::literal!("bookstore"))]),
            service_account: strng::literal!("bookstore"),
            ip: None,
        };
        assert!(!s.selects(&pod));

        let mut s = s;
        s.selector
            .insert(strng::literal!("app"), strng::literal!("bookstore"));
        assert!(s.selects(&pod));

        let mut other_ns = pod.clone();
        other_ns.namespace = strng::literal!("bar");
        assert!(!s.selects(&other_ns));
    }
}
