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

//! Fixtures shared by unit tests, integration tests and benches: a small bookstore mesh with a
//! traffic split and an access policy.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::catalog::MeshCatalog;
use crate::identity::{K8sServiceAccount, ProxyIdentity, ProxyKind};
use crate::k8s::{KubeService, Pod, ServicePort};
use crate::provider::{
    EndpointProvider, KubeProvider, LocalConfig, LocalStore, ServiceProvider,
};
use crate::state::{MeshService, TrafficSplit, TrafficSplitBackend, TrafficTarget};
use crate::strng::{self, Strng};
use crate::{config, telemetry};

pub const NAMESPACE: &str = "default";
pub const SERVICE_PORT: u32 = 8888;
pub const SERVICE_TARGET_PORT: u32 = 9999;

pub const BOOKSTORE_V1_IP: &str = "10.0.0.1";
pub const BOOKSTORE_V2_IP: &str = "10.0.0.2";
pub const BOOKBUYER_IP: &str = "10.0.0.3";

pub const TRAFFIC_SPLIT_NAME: &str = "bookstore-split";
pub const TRAFFIC_TARGET_NAME: &str = "bookbuyer-to-bookstore";

static TRACING: Lazy<()> = Lazy::new(telemetry::setup_logging);

pub fn initialize_telemetry() {
    Lazy::force(&TRACING);
}

pub fn bookstore_v1() -> MeshService {
    MeshService::new("bookstore-v1", NAMESPACE)
}

pub fn bookstore_v2() -> MeshService {
    MeshService::new("bookstore-v2", NAMESPACE)
}

pub fn bookstore_apex() -> MeshService {
    MeshService::new("bookstore-apex", NAMESPACE)
}

pub fn bookbuyer() -> MeshService {
    MeshService::new("bookbuyer", NAMESPACE)
}

pub fn bookstore_service_account() -> K8sServiceAccount {
    K8sServiceAccount::new("bookstore", NAMESPACE)
}

pub fn bookbuyer_service_account() -> K8sServiceAccount {
    K8sServiceAccount::new("bookbuyer", NAMESPACE)
}

/// Returns the common name of a sidecar certificate for `sa`.
pub fn proxy_common_name(sa: &K8sServiceAccount) -> crate::tls::CommonName {
    ProxyIdentity::new(ProxyKind::Sidecar, sa.clone()).common_name()
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<Strng, Strng> {
    pairs
        .iter()
        .map(|(k, v)| (strng::new(k), strng::new(v)))
        .collect()
}

fn kube_service(svc: &MeshService, selector: &[(&str, &str)]) -> KubeService {
    KubeService {
        name: svc.name.clone(),
        namespace: svc.namespace.clone(),
        ports: vec![ServicePort {
            name: strng::literal!("http"),
            port: SERVICE_PORT,
            target_port: Some(SERVICE_TARGET_PORT),
            protocol: Some(strng::literal!("TCP")),
            app_protocol: None,
        }],
        selector: labels(selector),
    }
}

fn pod(name: &str, sa: &K8sServiceAccount, labels_: &[(&str, &str)], ip: &str) -> Pod {
    Pod {
        name: strng::new(name),
        namespace: sa.namespace.clone(),
        labels: labels(labels_),
        service_account: sa.name.clone(),
        ip: ip.parse().ok(),
    }
}

pub fn bookstore_traffic_split() -> TrafficSplit {
    TrafficSplit {
        name: strng::new(TRAFFIC_SPLIT_NAME),
        namespace: strng::new(NAMESPACE),
        service: bookstore_apex().name,
        backends: vec![
            TrafficSplitBackend {
                service: bookstore_v1().name,
                weight: 90,
            },
            TrafficSplitBackend {
                service: bookstore_v2().name,
                weight: 10,
            },
        ],
    }
}

pub fn bookbuyer_traffic_target() -> TrafficTarget {
    TrafficTarget {
        name: strng::new(TRAFFIC_TARGET_NAME),
        namespace: strng::new(NAMESPACE),
        destination: bookstore_service_account(),
        sources: vec![bookbuyer_service_account()],
    }
}

/// The bookstore mesh: two bookstore versions behind an apex split, and a bookbuyer allowed to
/// call the bookstore.
pub fn local_config() -> LocalConfig {
    let store = bookstore_service_account();
    let buyer = bookbuyer_service_account();
    LocalConfig {
        services: vec![
            kube_service(&bookstore_v1(), &[("app", "bookstore"), ("version", "v1")]),
            kube_service(&bookstore_v2(), &[("app", "bookstore"), ("version", "v2")]),
            kube_service(&bookstore_apex(), &[("app", "bookstore")]),
            kube_service(&bookbuyer(), &[("app", "bookbuyer")]),
        ],
        pods: vec![
            pod(
                "bookstore-v1-0",
                &store,
                &[("app", "bookstore"), ("version", "v1")],
                BOOKSTORE_V1_IP,
            ),
            pod(
                "bookstore-v2-0",
                &store,
                &[("app", "bookstore"), ("version", "v2")],
                BOOKSTORE_V2_IP,
            ),
            pod("bookbuyer-0", &buyer, &[("app", "bookbuyer")], BOOKBUYER_IP),
        ],
        service_accounts: vec![],
        traffic_splits: vec![bookstore_traffic_split()],
        traffic_targets: vec![bookbuyer_traffic_target()],
    }
}

/// Returns a catalog over a single Kubernetes provider backed by [local_config].
pub fn test_catalog(cfg: &config::Config) -> MeshCatalog {
    let store = Arc::new(LocalStore::new(local_config()));
    let kube = Arc::new(KubeProvider::new(
        store.clone(),
        cfg.default_app_protocol.clone(),
    ));
    MeshCatalog::new(
        store.clone(),
        store,
        vec![kube.clone() as Arc<dyn ServiceProvider>],
        vec![kube as Arc<dyn EndpointProvider>],
        cfg,
    )
}
