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

use prometheus_client::registry::Registry;
use prost::Message;
use tokio_util::sync::CancellationToken;

use meshcontrol::app::{self, Bound};
use meshcontrol::config;
use meshcontrol::identity::mock::new_cert_manager;
use meshcontrol::metrics::Metrics;
use meshcontrol::provider::LocalStore;
use meshcontrol::state::Locality;
use meshcontrol::test_helpers::*;
use meshcontrol::tls::SerialNumber;
use meshcontrol::xds::Proxy;
use meshcontrol::xds::types::endpoint::ClusterLoadAssignment;
use meshcontrol::xds::types::matcher::string_matcher::MatchPattern;
use meshcontrol::xds::types::service::discovery::v3::DiscoveryRequest;
use meshcontrol::xds::types::tls::Secret;
use meshcontrol::xds::types::{CLUSTER_LOAD_ASSIGNMENT_TYPE, SECRET_TYPE};

fn bound(cfg: config::Config) -> Bound {
    initialize_telemetry();
    let mut registry = Registry::default();
    let metrics = Metrics::from(&mut registry);
    app::build_with_cert(
        Arc::new(cfg),
        Arc::new(LocalStore::new(local_config())),
        Arc::new(new_cert_manager()),
        registry,
        metrics,
    )
}

fn proxy_for(sa: &meshcontrol::identity::K8sServiceAccount) -> Proxy {
    Proxy::new(proxy_common_name(sa), SerialNumber::new("42"))
}

fn request(type_url: &str, names: &[&str]) -> DiscoveryRequest {
    DiscoveryRequest {
        type_url: type_url.to_string(),
        resource_names: names.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

async fn secrets(b: &Bound, proxy: &Proxy, names: &[&str]) -> Vec<Secret> {
    b.respond(
        proxy,
        &request(SECRET_TYPE.as_str(), names),
        &CancellationToken::new(),
    )
    .await
    .unwrap()
    .resources
    .iter()
    .map(|any| {
        assert_eq!(any.type_url, SECRET_TYPE.as_str());
        Secret::decode(any.value.as_slice()).unwrap()
    })
    .collect()
}

fn exact_sans(secret: &Secret) -> Vec<String> {
    secret
        .validation_context()
        .expect("validation context")
        .match_subject_alt_names
        .iter()
        .filter_map(|m| match &m.match_pattern {
            Some(MatchPattern::Exact(s)) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn service_cert_and_outbound_root() {
    let b = bound(config::Config::default());
    let got = secrets(
        &b,
        &proxy_for(&bookbuyer_service_account()),
        &[
            "service-cert:default/bookbuyer",
            "root-cert-for-mtls-outbound:default/bookstore-v1",
        ],
    )
    .await;
    assert_eq!(got.len(), 2);
    assert!(got[0].tls_certificate().is_some());

    let expected: Vec<String> = b
        .catalog
        .list_service_identities_for_service(&bookstore_v1())
        .unwrap()
        .iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(exact_sans(&got[1]), expected);
    assert_eq!(expected, vec!["bookstore.default".to_string()]);
}

#[tokio::test]
async fn foreign_inbound_root_is_excluded() {
    let b = bound(config::Config::default());
    let got = secrets(
        &b,
        &proxy_for(&bookbuyer_service_account()),
        &[
            "root-cert-for-mtls-inbound:default/bookstore",
            "root-cert-for-mtls-inbound:default/bookbuyer",
            "service-cert:default/bookbuyer",
        ],
    )
    .await;
    let names: Vec<&str> = got.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "root-cert-for-mtls-inbound:default/bookbuyer",
            "service-cert:default/bookbuyer"
        ]
    );
}

#[tokio::test]
async fn permissive_mode_allows_every_account_inbound() {
    let b = bound(config::Config {
        permissive_traffic_policy_mode: true,
        inbound_san_validation: true,
        ..Default::default()
    });
    let got = secrets(
        &b,
        &proxy_for(&bookstore_service_account()),
        &["root-cert-for-mtls-inbound:default/bookstore"],
    )
    .await;
    assert_eq!(
        exact_sans(&got[0]),
        vec!["bookbuyer.default".to_string(), "bookstore.default".to_string()]
    );
}

#[tokio::test]
async fn endpoints_for_split_backends() {
    let b = bound(config::Config::default());
    let clusters = b
        .catalog
        .get_weighted_clusters_for_upstream(&bookstore_apex())
        .unwrap();
    let names: Vec<String> = clusters.iter().map(|c| c.cluster_name.to_string()).collect();
    assert_eq!(names, vec!["default/bookstore-v1", "default/bookstore-v2"]);
    assert_eq!(
        clusters.iter().map(|c| c.weight).collect::<Vec<_>>(),
        vec![90, 10]
    );

    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let resp = b
        .respond(
            &proxy_for(&bookbuyer_service_account()),
            &request(CLUSTER_LOAD_ASSIGNMENT_TYPE.as_str(), &names),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let clas: Vec<ClusterLoadAssignment> = resp
        .resources
        .iter()
        .map(|any| ClusterLoadAssignment::decode(any.value.as_slice()).unwrap())
        .collect();
    assert_eq!(clas.len(), 2);
    for (cla, ip) in clas.iter().zip([BOOKSTORE_V1_IP, BOOKSTORE_V2_IP]) {
        let lb = &cla.endpoints[0].lb_endpoints;
        assert_eq!(lb.len(), 1);
        let addr = lb[0]
            .endpoint
            .as_ref()
            .and_then(|e| e.address.as_ref())
            .and_then(|a| a.socket_address.as_ref())
            .unwrap();
        assert_eq!(addr.address, ip);
        assert_eq!(addr.port_value, SERVICE_TARGET_PORT);
    }
}

#[tokio::test]
async fn split_backends_and_hostnames() {
    let b = bound(config::Config::default());
    assert!(
        b.catalog
            .is_traffic_split_backend_service(&bookstore_v2())
            .unwrap()
    );
    assert_eq!(
        b.catalog
            .get_apex_services_for_backend_service(&bookstore_v2())
            .unwrap(),
        vec![bookstore_apex()]
    );
    assert!(
        !b.catalog
            .is_traffic_split_backend_service(&bookbuyer())
            .unwrap()
    );

    let local = b
        .catalog
        .get_service_hostnames(&bookstore_v1(), Locality::LocalNS)
        .unwrap();
    assert!(local.iter().any(|h| h.as_str() == "bookstore-v1"));
    assert!(
        local
            .iter()
            .any(|h| h.as_str() == "bookstore-v1.default.svc.cluster.local:8888")
    );
    let cluster = b
        .catalog
        .get_service_hostnames(&bookstore_v1(), Locality::LocalCluster)
        .unwrap();
    assert!(cluster.iter().all(|h| h.contains('.')));
}

#[tokio::test]
async fn concurrent_requests() {
    let b = Arc::new(bound(config::Config::default()));
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let b = b.clone();
        tasks.push(tokio::spawn(async move {
            secrets(
                &b,
                &proxy_for(&bookbuyer_service_account()),
                &["service-cert:default/bookbuyer"],
            )
            .await
        }));
    }
    let mut chains = Vec::new();
    for t in tasks {
        let got = t.await.unwrap();
        assert_eq!(got.len(), 1);
        let chain = got[0]
            .tls_certificate()
            .and_then(|t| t.certificate_chain.as_ref())
            .and_then(|c| c.as_inline_bytes())
            .unwrap()
            .clone();
        chains.push(chain);
    }
    chains.sort();
    chains.dedup();
    assert_eq!(chains.len(), 8, "every request gets its own certificate");
}
